pub mod settings;

pub use settings::{Config, ConfigOverrides, DisplayConfig, GpsConfig};
