use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig,
    observability::ObservabilityConfig,
    queue::{QueueConfig, ReaperConfig},
    worker::WorkerConfig,
};
use crate::validation::ConfigValidator;

/// 环境变量前缀，例如 `JOBQUEUE_DATABASE__URL`
pub const ENV_PREFIX: &str = "JOBQUEUE";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/jobqueue.toml",
    "jobqueue.toml",
    "/etc/jobqueue/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub reaper: ReaperConfig,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        Self::load_with_env(config_path, None)
    }

    /// `env` 为 `None` 时读取进程环境变量
    pub fn load_with_env(
        config_path: Option<&str>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let defaults = AppConfig::default();
            builder = builder
                .set_default("database.url", defaults.database.url)?
                .set_default("reaper.lease_timeout_minutes", defaults.reaper.lease_timeout_minutes as i64)?
                .set_default("worker.queue_name", defaults.worker.queue_name)?
                .set_default("observability.log_level", defaults.observability.log_level)?;
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("worker.job_types")
                .try_parsing(true)
                .source(env),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.queue.validate()?;
        self.reaper.validate()?;
        self.worker.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
