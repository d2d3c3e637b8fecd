//! OD input: tail-reads the newest reading from the experiment's OD log.
//!
//! Each line is `<machine_ts> <od_0> ... <od_{N-1}>`, whitespace
//! separated, with ODs already converted upstream; `0` marks a chamber
//! whose measurement could not be taken. Only the last line matters,
//! and it is found by seeking from the end of the file.

use std::path::PathBuf;

use dilutor_traits::{OdReading, OdSource};

use crate::util::tail_line;

pub struct TailOdSource {
    path: PathBuf,
}

impl TailOdSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OdSource for TailOdSource {
    fn read(&mut self) -> Result<OdReading, Box<dyn std::error::Error + Send + Sync>> {
        let line = tail_line(&self.path)
            .map_err(|e| format!("{}: {e}", self.path.display()))?
            .ok_or_else(|| format!("{}: od log is empty", self.path.display()))?;

        let mut fields = line.split_whitespace();
        let timestamp: i64 = fields
            .next()
            .ok_or("od log line has no timestamp")?
            .parse()
            .map_err(|e| format!("od log timestamp: {e}"))?;
        let ods = fields
            .map(|f| f.parse::<f64>().map_err(|e| format!("od value {f:?}: {e}")))
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(OdReading { timestamp, ods })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_the_newest_line() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "1000 0.1 0.1 0.1").unwrap();
        writeln!(f, "2000 0.5 0 0.62").unwrap();
        let reading = TailOdSource::new(f.path()).read().unwrap();
        assert_eq!(reading.timestamp, 2000);
        assert_eq!(reading.ods, vec![0.5, 0.0, 0.62]);
    }

    #[test]
    fn empty_log_errors() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let err = TailOdSource::new(f.path()).read().unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn garbage_line_errors() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "2000 0.5 what 0.62").unwrap();
        assert!(TailOdSource::new(f.path()).read().is_err());
    }
}
