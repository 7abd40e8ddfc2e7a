//! `mallgate` paces calls to a rate-limited dependency, one mall at a time.
//! "Hello world" example:
//! ```
//! use mallgate_lib::{Gateway, GatewayConfig, MallKey, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let gateway = Gateway::with_simulator(GatewayConfig::default())?;
//!   let outcome = gateway.call(MallKey::new("mall-a")?, "hello").await?;
//!   println!("{outcome}");
//!   Ok(())
//! }
//! ```
//!
//! Every mall gets its own worker with a bounded queue, its own pacing and
//! its own retry loop, so a congested mall never slows down another one.
//! To call something other than the built-in simulator, implement
//! [`downstream::Downstream`] and pass it to [`Gateway::new`]:
//!
//! ```
//! use async_trait::async_trait;
//! use http::StatusCode;
//! use mallgate_lib::downstream::{Attempt, Downstream};
//! use mallgate_lib::metrics::MetricsAggregator;
//! use mallgate_lib::{Gateway, GatewayConfig, MallKey, Result};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct Upper;
//!
//! #[async_trait]
//! impl Downstream for Upper {
//!     async fn call(&self, _key: &MallKey, payload: &str) -> Attempt {
//!         Attempt {
//!             status: StatusCode::OK,
//!             body: Some(payload.to_uppercase()),
//!             bucket_used: 0,
//!             bucket_max: 10,
//!             retry_after: Duration::ZERO,
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let metrics = Arc::new(MetricsAggregator::new());
//!   let gateway = Gateway::new(GatewayConfig::default(), Arc::new(Upper), metrics)?;
//!   let outcome = gateway.call(MallKey::new("mall-a")?, "hi").await?;
//!   assert_eq!(outcome.result.as_deref(), Some("HI"));
//!   Ok(())
//! }
//! ```

mod config;
mod gateway;
mod types;

pub mod downstream;
pub mod metrics;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{
    DEFAULT_BUCKET_CAPACITY, DEFAULT_LEAK_INTERVAL, DEFAULT_LEAK_RATE_PER_SECOND,
    DEFAULT_MAX_REQUESTS_PER_SECOND, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE_CAPACITY, GatewayConfig,
    MallConfig, MallConfigs,
};
pub use gateway::Gateway;
pub use types::*;
