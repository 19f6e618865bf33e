//! Common library for the ExamMaster backend
//!
//! This crate provides shared functionality used by the auth and API
//! services, including database connectivity, the key-value cache used for
//! sessions and one-time tokens, and error handling.
//!
//! ```rust,no_run
//! use exam_common::database::{DatabaseConfig, init_pool, health_check};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
