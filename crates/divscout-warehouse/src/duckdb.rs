//! Connection pooling over one DuckDB file.
//!
//! Every lease is cloned from a single root connection, so all of them see the
//! same database instance. Opening the file a second time from this process
//! would create an independent instance with its own write lock.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

struct Shared {
    path: PathBuf,
    keep_idle: usize,
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
}

#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Open `path` and keep at most `keep_idle` spare connections around.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, keep_idle: usize) -> Result<Self, ::duckdb::Error> {
        let path = path.into();
        let root = Connection::open(&path)?;
        prepare(&root)?;

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                keep_idle: keep_idle.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Borrow a connection for the duration of one operation.
    pub fn lease(&self) -> Result<Lease, ::duckdb::Error> {
        let spare = self.shared.idle.lock().expect("idle list poisoned").pop();
        let connection = match spare {
            Some(connection) => connection,
            None => {
                let fresh = self.shared.root.lock().expect("root connection poisoned").try_clone()?;
                prepare(&fresh)?;
                fresh
            }
        };

        Ok(Lease {
            shared: Arc::clone(&self.shared),
            connection: Some(connection),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    fn idle_len(&self) -> usize {
        self.shared.idle.lock().expect("idle list poisoned").len()
    }
}

/// A connection on loan from a [`ConnectionPool`]; returned on drop.
pub struct Lease {
    shared: Arc<Shared>,
    // Only `None` while dropping.
    connection: Option<Connection>,
}

impl Deref for Lease {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection.as_ref().expect("lease used after release")
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let mut idle = self.shared.idle.lock().expect("idle list poisoned");
            if idle.len() < self.shared.keep_idle {
                idle.push(connection);
            }
        }
    }
}

fn prepare(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}
