//! Per-session artifact storage.
//!
//! Every page fetched from the provider is persisted verbatim as its own
//! artifact under the session's working directory:
//!
//! ```text
//! <session-root>/<session>/page.<n>.json     (n = 0, 1, 2, ... in fetch order)
//! ```
//!
//! Writes are atomic (temp + fsync + rename + directory fsync) and create
//! any missing parent directories, so a page either exists completely or
//! not at all. The paging loop relies on this: a page is durable before the
//! decision to fetch the next one is made.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::types::SessionId;

/// Handle to the artifact directory tree. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SessionStore { root: root.into() }
    }

    /// The working directory for one session.
    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str())
    }

    /// Persists one fetched page, keyed by its sequence number, creating
    /// parent directories as needed. Returns the artifact path.
    pub fn save_page(&self, session: &SessionId, seq: usize, body: &[u8]) -> io::Result<PathBuf> {
        let dir = self.session_dir(session);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("page.{seq}.json"));
        let tmp_path = dir.join(format!("page.{seq}.json.tmp"));
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(body)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;

        let dir_handle = OpenOptions::new().read(true).open(&dir)?;
        dir_handle.sync_all()?;

        Ok(path)
    }
}
