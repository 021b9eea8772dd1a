//! # Database Module
//!
//! PostgreSQL integration over tokio-postgres and deadpool. Includes
//! connection management, models, embedded migrations and the strategy
//! store consumed by the scheduler.

pub mod connection;
pub mod migrations;
pub mod models;
pub mod store;

pub use connection::{DatabaseConfig, DatabaseConnection};
pub use models::*;
pub use store::{NewExecution, NewStrategy, PostgresStore, StrategyStore};
