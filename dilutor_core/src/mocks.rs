//! Test and helper mocks for dilutor_core

use dilutor_traits::{OdReading, OdSource};

/// An OD source that serves a fixed sequence of readings, then repeats
/// the last one.
pub struct SeqOdSource {
    readings: Vec<OdReading>,
    idx: usize,
}

impl SeqOdSource {
    pub fn new(readings: impl Into<Vec<OdReading>>) -> Self {
        Self {
            readings: readings.into(),
            idx: 0,
        }
    }
}

impl OdSource for SeqOdSource {
    fn read(&mut self) -> Result<OdReading, Box<dyn std::error::Error + Send + Sync>> {
        let i = self.idx.min(self.readings.len().saturating_sub(1));
        self.idx = self.idx.saturating_add(1);
        self.readings
            .get(i)
            .cloned()
            .ok_or_else(|| "no readings configured".into())
    }
}

/// An OD source that always fails.
pub struct FailingOdSource;

impl OdSource for FailingOdSource {
    fn read(&mut self) -> Result<OdReading, Box<dyn std::error::Error + Send + Sync>> {
        Err("sensor offline".into())
    }
}
