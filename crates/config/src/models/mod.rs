pub mod app_config;
pub mod database;
pub mod observability;
pub mod queue;
pub mod worker;

pub use app_config::*;
pub use database::*;
pub use observability::*;
pub use queue::*;
pub use worker::*;
