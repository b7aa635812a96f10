//! `last_port.data`: a plain integer
//! written once at startup so a later CLI/daemon launch can probe for an
//! already-running instance before binding its own port.

use std::path::Path;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Read the last known port from `<data_dir>/last_port.data`, if present
/// and parseable.
#[must_use]
pub fn read(data_dir: &Path) -> Option<u16> {
    let contents = std::fs::read_to_string(data_dir.join("last_port.data")).ok()?;
    contents.trim().parse().ok()
}

/// Write `port` to `<data_dir>/last_port.data` (git-ignored).
pub fn write(data_dir: &Path, port: u16) -> std::io::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(data_dir.join("last_port.data"), port.to_string())
}

/// Probe `http://localhost:<port>/api/ping`: `true` if a Sparkle daemon
/// answers.
#[must_use]
pub fn responds(port: u16) -> bool {
    let url = format!("http://127.0.0.1:{port}/api/ping");
    ureq::get(&url)
        .timeout(PROBE_TIMEOUT)
        .call()
        .map(|resp| resp.status() == 200)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn tmp(label: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("sparkle-portfile-test-{label}-{n}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn roundtrips_through_the_file() {
        let dir = tmp("roundtrip");
        write(&dir, 4455).unwrap();
        assert_eq!(read(&dir), Some(4455));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tmp("missing");
        assert_eq!(read(&dir), None);
    }

    #[test]
    fn garbage_contents_read_as_none() {
        let dir = tmp("garbage");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("last_port.data"), "not-a-port").unwrap();
        assert_eq!(read(&dir), None);
    }

    #[test]
    fn nothing_responds_on_an_unbound_port() {
        assert!(!responds(1));
    }
}
