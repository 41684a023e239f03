// code from https://github.com/LawnGnome/bb8-rusqlite/blob/main/src/lib.rs

use async_trait::async_trait;
use bb8::ManageConnection;
use rusqlite::{Connection as SqliteConn, OpenFlags};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// A `bb8::ManageConnection` implementation for `rusqlite::Connection`
/// instances, every connection gets the same busy timeout.
#[derive(Clone, Debug)]
pub struct RusqliteConnectionManager(Arc<ConnectionOptions>);

#[derive(Clone, Debug)]
struct ConnectionOptions {
    flags: OpenFlags,
    path: PathBuf,
    busy_timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    #[error("tokio join error: {0}")]
    TokioJoin(#[from] tokio::task::JoinError),
}

impl RusqliteConnectionManager {
    pub fn new<P>(path: P, flags: OpenFlags, busy_timeout: Duration) -> Self
    where
        P: AsRef<Path>,
    {
        Self(Arc::new(ConnectionOptions {
            flags,
            path: path.as_ref().into(),
            busy_timeout,
        }))
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.0.path
    }
}

#[async_trait]
impl ManageConnection for RusqliteConnectionManager {
    type Connection = SqliteConn;
    type Error = Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let options = self.0.clone();

        // rusqlite is synchronous, open the file off the runtime threads.
        Ok(tokio::task::spawn_blocking(move || {
            let conn = SqliteConn::open_with_flags(&options.path, options.flags)?;
            conn.busy_timeout(options.busy_timeout)?;
            Ok::<_, rusqlite::Error>(conn)
        })
        .await??)
    }

    async fn is_valid(
        &self,
        conn: &mut bb8::PooledConnection<'_, Self>,
    ) -> Result<(), Self::Error> {
        // Connection isn't Sync, so block_in_place() instead of spawn_blocking().
        // This needs the multi-threaded runtime.
        let _ = tokio::task::block_in_place(|| conn.execute("SELECT 1", []))?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
