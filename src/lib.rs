//! GPS Location Tracking Library
//!
//! Samples fixes from a GNSS receiver about once per second, keeps them in a
//! shared observable in-memory store, and renders the accurate ones, most
//! recent first.

pub mod config;
pub mod devices;
pub mod services;
pub mod output;
pub mod utils;
pub mod cli;
pub mod storage;
pub mod ui;

// Re-export commonly used types
pub use config::Config;
pub use devices::{GpsReader, LocationSample, LocationSource, NmeaDecoder, NmeaReplay};
pub use services::GpsService;
pub use output::{DataFormatter, DataSender, ConsoleFormatter, JsonFormatter, CsvFormatter};
pub use storage::{LocationListener, LocationStore, SubscriptionId, ACCURACY_THRESHOLD_METERS};
pub use ui::{LocationView, ViewState};
pub use utils::error::GpsError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
