use std::{path::Path, time::Duration};

use duckdb::{AccessMode, Config, Connection};
use log::warn;

/// Open a DuckDB connection, retrying with exponential backoff while another
/// process holds the file lock.  The file is created if it doesn't exist.
/// Suggested `max_attempts = 8`, `initial_wait = Duration::from_millis(25)`.
pub fn open_with_retry(
    duckdb_path: &Path,
    max_attempts: u32,
    initial_wait: Duration,
    access_mode: AccessMode,
) -> Result<Connection, duckdb::Error> {
    let mut attempts = 0;
    let mut wait_duration = initial_wait;

    loop {
        // duckdb's AccessMode is not Clone; rebuild an identical value per attempt
        let mode = match access_mode {
            AccessMode::Automatic => AccessMode::Automatic,
            AccessMode::ReadOnly => AccessMode::ReadOnly,
            AccessMode::ReadWrite => AccessMode::ReadWrite,
        };
        let config = Config::default().access_mode(mode)?;
        match Connection::open_with_flags(duckdb_path, config) {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                attempts += 1;
                if attempts >= max_attempts {
                    return Err(e);
                }
                warn!(
                    "failed to open {}: {} (attempt {}/{}), retrying in {:?}",
                    duckdb_path.display(),
                    e,
                    attempts,
                    max_attempts,
                    wait_duration
                );
                std::thread::sleep(wait_duration);
                wait_duration *= 2;
            }
        }
    }
}
