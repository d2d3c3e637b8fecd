//! File-backed persistence: the controller state record and the
//! append-only block log.
//!
//! The tick's single commit point is the atomic replace of the state
//! file; the state embeds the newest block-log row, and the CSV append
//! happens after the rename. A crash between the two leaves the CSV
//! one row behind the committed state, which the next tick detects and
//! repairs from the embedded tail. The CSV is therefore an audit
//! materialization and never an authority the driver reads back.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{Result, TickError};
use crate::state::{BlockLogEntry, ControllerState};
use crate::util::tail_line;

/// Replace `path` with `bytes`: write a sibling temp file, flush it to
/// disk, then rename over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Single-writer handle on the controller state record.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and validate the record. Absence is `ConfigMissing` (the
    /// driver treats it as the bootstrap signal), parse failures are
    /// `ConfigMalformed`, and invariant violations surface as
    /// `InconsistentState`.
    pub fn load(&self) -> Result<ControllerState> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TickError::ConfigMissing(self.path.display().to_string()).into());
            }
            Err(e) => {
                return Err(eyre::Report::new(e)
                    .wrap_err(format!("read controller state {}", self.path.display())));
            }
        };
        let state: ControllerState = toml::from_str(&text)
            .map_err(|e| TickError::ConfigMalformed(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    /// Atomically replace the record. This is the tick's commit point.
    pub fn commit(&self, state: &ControllerState) -> Result<()> {
        let text = toml::to_string(state)
            .map_err(|e| TickError::ConfigMalformed(format!("serialize state: {e}")))?;
        write_atomic(&self.path, text.as_bytes()).map_err(|e| {
            eyre::Report::new(e)
                .wrap_err(format!("commit controller state {}", self.path.display()))
        })
    }
}

/// Append-only CSV audit log of block transitions.
#[derive(Debug, Clone)]
pub struct BlockLog {
    path: PathBuf,
}

impl BlockLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first on a fresh file.
    pub fn append(&self, entry: &BlockLogEntry) -> Result<()> {
        let fresh = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TickError::LogStoreUnavailable(format!("{}: {e}", self.path.display())))?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            wtr.write_record(BlockLogEntry::CSV_HEADER)
                .map_err(|e| TickError::LogStoreUnavailable(e.to_string()))?;
        }
        wtr.write_record(entry.to_record())
            .map_err(|e| TickError::LogStoreUnavailable(e.to_string()))?;
        wtr.flush()
            .map_err(|e| TickError::LogStoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Timestamp of the newest row, read from the file tail (never a
    /// full scan). `None` for a missing, empty, or header-only log.
    pub fn tail_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let line = match tail_line(&self.path) {
            Ok(l) => l,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(
                    TickError::LogStoreUnavailable(format!("{}: {e}", self.path.display())).into(),
                );
            }
        };
        let Some(line) = line else { return Ok(None) };
        let Some(first) = line.split(',').next() else {
            return Ok(None);
        };
        if first == "timestamp" {
            // Header-only file.
            return Ok(None);
        }
        let ts = DateTime::parse_from_rfc3339(first).map_err(|e| {
            TickError::InconsistentState(format!("unparseable block log tail: {e}"))
        })?;
        Ok(Some(ts.with_timezone(&Utc)))
    }

    /// Bring the log tail in line with the committed state.
    ///
    /// Returns true when the committed row had to be (re-)appended,
    /// i.e. a previous tick crashed between the state commit and the
    /// log append. A tail newer than the committed state means someone
    /// else wrote the log and fails the tick.
    pub fn sync_tail(&self, committed: &BlockLogEntry) -> Result<bool> {
        match self.tail_timestamp()? {
            Some(ts) if ts == committed.timestamp => Ok(false),
            Some(ts) if ts > committed.timestamp => Err(TickError::InconsistentState(format!(
                "block log tail ({ts}) is ahead of the committed state ({})",
                committed.timestamp
            ))
            .into()),
            _ => {
                self.append(committed)?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Mode, PhaseTag};
    use chrono::TimeZone;

    fn entry(ts: DateTime<Utc>) -> BlockLogEntry {
        BlockLogEntry {
            timestamp: ts,
            mode: Mode::Chamber,
            setpoint: vec![0.6, 0.6],
            elapsed_hours: 0.0,
            machine_time: 42,
            ods: vec![0.1, 0.2],
        }
    }

    fn state(ts: DateTime<Utc>) -> ControllerState {
        ControllerState {
            chambers: 2,
            setpoint: vec![0.6, 0.6],
            save_setpoint: vec![0.6, 0.6],
            block_start: vec![0.2, 0.2],
            baseline_captured: true,
            phase: PhaseTag::initial(Mode::Chamber, 2),
            ki: 1.0,
            kp: 5.0,
            min_dilution: 0.0,
            max_dilution: 400.0,
            growth_interval_hours: 5.0,
            dilution_interval_hours: 2.0,
            integral_seed: 90.0,
            integral_state: Vec::new(),
            started_at: ts,
            last_entry: entry(ts),
        }
    }

    #[test]
    fn state_commit_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.toml"));
        assert!(!store.exists());

        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let s = state(ts);
        store.commit(&s).unwrap();
        assert!(store.exists());
        // No stray temp file after the rename.
        assert!(!dir.path().join("state.new").exists());
        assert_eq!(store.load().unwrap(), s);
    }

    #[test]
    fn missing_state_is_config_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.toml"));
        let err = store.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TickError>(),
            Some(TickError::ConfigMissing(_))
        ));
    }

    #[test]
    fn garbage_state_is_config_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "chambers = \"many\"").unwrap();
        let err = StateStore::new(&path).load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TickError>(),
            Some(TickError::ConfigMalformed(_))
        ));
    }

    #[test]
    fn append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = BlockLog::new(dir.path().join("blocklog.csv"));
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        log.append(&entry(ts)).unwrap();
        log.append(&entry(ts + chrono::Duration::hours(1))).unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,mode,"));
        assert!(lines[1].contains("chamber"));
    }

    #[test]
    fn sync_tail_heals_a_lost_append() {
        let dir = tempfile::tempdir().unwrap();
        let log = BlockLog::new(dir.path().join("blocklog.csv"));
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::hours(5);
        log.append(&entry(t0)).unwrap();

        // Committed state points at a row the log never received.
        assert!(log.sync_tail(&entry(t1)).unwrap());
        assert_eq!(log.tail_timestamp().unwrap(), Some(t1));
        // Once healed, the same call is a no-op.
        assert!(!log.sync_tail(&entry(t1)).unwrap());
    }

    #[test]
    fn sync_tail_rejects_a_log_from_the_future() {
        let dir = tempfile::tempdir().unwrap();
        let log = BlockLog::new(dir.path().join("blocklog.csv"));
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        log.append(&entry(t0 + chrono::Duration::hours(1))).unwrap();

        let err = log.sync_tail(&entry(t0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TickError>(),
            Some(TickError::InconsistentState(_))
        ));
    }
}
