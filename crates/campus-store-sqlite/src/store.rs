//! [`SqliteStore`], the SQLite implementation of the Campus store traits.
//!
//! The trait implementations live next to the tables they touch
//! (`profiles.rs`, `classes.rs`, ...). Each one is a thin async wrapper that
//! runs a synchronous function through [`SqliteStore::read`] or
//! [`SqliteStore::write`].

use std::path::Path;

use campus_core::{school::COORDINATION_SUBJECT_NAME, store::Backend};
use rusqlite::Connection;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::encode_uuid,
  schema::{SCHEMA, SEED_COORDINATION},
};

/// A Campus store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let coordination_id = encode_uuid(Uuid::new_v4());
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(SCHEMA)?;
        conn.execute(
          SEED_COORDINATION,
          rusqlite::params![coordination_id, COORDINATION_SUBJECT_NAME],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a read-only closure on the connection thread.
  pub(crate) async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside a transaction. The transaction commits when `f` returns
  /// `Ok` and rolls back otherwise.
  pub(crate) async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match f(&tx) {
          Ok(value) => {
            tx.commit()?;
            Ok(Ok(value))
          }
          Err(e) => Ok(Err(e)),
        }
      })
      .await?
  }
}

impl Backend for SqliteStore {
  type Error = Error;
}
