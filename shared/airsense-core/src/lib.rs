//! Airsense Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Standard service trait the pipeline service implements
//! - Telemetry domain types (RawReading, ActualRecord, ForecastResult)
//! - Error handling utilities
//! - Configuration management

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::{AirsenseError, Result};
pub use service::{AirsenseService, DependencyStatus, HealthStatus, MicroserviceRuntime, ReadinessStatus};
