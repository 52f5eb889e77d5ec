pub mod error;

pub use error::GpsError;
