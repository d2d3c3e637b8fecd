//! Small file helpers shared by the stores and the OD source.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// How much of the file end we read to find the last line. Lines in
/// both the OD log and the block log are far shorter than this.
const TAIL_CHUNK: u64 = 8 * 1024;

/// Return the last non-empty line of `path` without scanning the whole
/// file: reads at most [`TAIL_CHUNK`] bytes from the end.
pub fn tail_line(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }
    let start = len.saturating_sub(TAIL_CHUNK);
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    // The window may open mid-line; only the last line is wanted anyway.
    let text = String::from_utf8_lossy(&buf);
    Ok(text
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::tail_line;
    use std::io::Write;

    #[test]
    fn returns_last_nonempty_line() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "first").unwrap();
        writeln!(f, "second").unwrap();
        writeln!(f).unwrap();
        let line = tail_line(f.path()).unwrap();
        assert_eq!(line.as_deref(), Some("second"));
    }

    #[test]
    fn empty_file_yields_none() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(tail_line(f.path()).unwrap(), None);
    }

    #[test]
    fn finds_tail_of_large_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..10_000 {
            writeln!(f, "1700000{i} 0.1 0.2 0.3").unwrap();
        }
        let line = tail_line(f.path()).unwrap().unwrap();
        assert!(line.starts_with("17000009999"));
    }
}
