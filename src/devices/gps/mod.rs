pub mod gps_data;
pub mod gps_reader;
pub mod nmea_decoder;

pub use gps_data::LocationSample;
pub use gps_reader::{GpsReader, NmeaReplay, PortSummary};
pub use nmea_decoder::NmeaDecoder;
