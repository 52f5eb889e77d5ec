pub mod traits;
pub mod gps;

pub use traits::LocationSource;
pub use gps::{GpsReader, LocationSample, NmeaDecoder, NmeaReplay};
