use std::sync::atomic::AtomicBool;

use crate::devices::gps::LocationSample;
use crate::utils::error::GpsError;

/// A producer of location samples, e.g. a serial GNSS receiver or a log
/// being replayed.
///
/// `read_locations` blocks the calling thread. It hands every sample to
/// `callback` and returns once `keep_running` is cleared, the callback
/// answers `false`, the input is exhausted, or the source fails.
/// `keep_running` is checked on every read, sample or not, so a silent
/// receiver still releases its port promptly.
pub trait LocationSource: Send {
    fn provider(&self) -> &str;
    fn source_type(&self) -> &str;

    fn read_locations(
        &mut self,
        keep_running: &AtomicBool,
        callback: &mut dyn FnMut(LocationSample) -> bool,
    ) -> Result<(), GpsError>;
}
