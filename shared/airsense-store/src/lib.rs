//! Airsense Store
//!
//! Persistence contract for actual records and forecast results, with a
//! PostgreSQL implementation over a connection pool and an in-memory one.

mod error;
mod memory;
mod pool;
mod postgres;
mod repository;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use pool::{PoolConfig, StorePool};
pub use postgres::PgTelemetryStore;
pub use repository::TelemetryStore;
