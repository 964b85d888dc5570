use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// 设置后启动Prometheus抓取端点，例如 `0.0.0.0:9100`
    pub metrics_listen_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_listen_address: None,
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_one_of(
            &self.log_level.to_lowercase(),
            &["trace", "debug", "info", "warn", "error"],
            "observability.log_level",
        )?;

        if let Some(address) = &self.metrics_listen_address {
            address.parse::<std::net::SocketAddr>().map_err(|e| {
                crate::ConfigError::Validation(format!(
                    "observability.metrics_listen_address is invalid: {e}"
                ))
            })?;
        }

        Ok(())
    }
}
