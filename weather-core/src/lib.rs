//! Core library for the `weather` poller.
//!
//! This crate defines:
//! - Source configuration & validation
//! - A resilient HTTP transport with fixed-delay retries and text decoding
//! - The weather source abstraction (REST-backed and offline stub implementations)
//! - An append-only in-memory store of observations
//! - The periodic fetch → save → render scheduler
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod encoding;
pub mod error;
pub mod format;
pub mod model;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod transport;

pub use config::{Config, SourceConfig};
pub use encoding::TextEncoding;
pub use error::WeatherError;
pub use format::{DefaultFormatter, WeatherFormatter};
pub use model::{Observation, TemperatureUnit, city_equals};
pub use scheduler::{CycleError, CycleStep, PollScheduler, PollSummary};
pub use source::{HttpWeatherSource, SessionState, StubWeatherSource, WeatherSource};
pub use store::{MemoryWeatherStore, WeatherStore};
pub use transport::{HttpTransport, RetryPolicy};
