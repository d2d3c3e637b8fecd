pub mod clock;

pub use clock::{Clock, SystemClock};

/// One optical-density measurement across all chambers.
///
/// `timestamp` is the raw machine clock of the sensor log line; `ods`
/// holds one value per chamber. A value of `0.0` means "measurement
/// unavailable" for that chamber, never an actual density of zero.
#[derive(Debug, Clone, PartialEq)]
pub struct OdReading {
    pub timestamp: i64,
    pub ods: Vec<f64>,
}

pub trait OdSource {
    fn read(&mut self) -> Result<OdReading, Box<dyn std::error::Error + Send + Sync>>;
}
