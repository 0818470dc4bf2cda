//! Configuration shared by every microservice runtime

use serde::Deserialize;
use std::env;

/// Identity settings read by [`crate::MicroserviceRuntime`]. Service-specific
/// settings (bind address, store, logging) live with each service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}
