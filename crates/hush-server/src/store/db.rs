use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use super::model::{Secret, SecretRow};
use super::SecretStore;

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Thread-safe handle to the redb-backed secret table.
///
/// redb admits a single write transaction at a time, so every
/// read-modify-write below is serialized against concurrent requests.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl SecretStore for RedbStore {
    fn find_by_hash(&self, hash: &str) -> Result<Option<Secret>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let raw_bytes: Option<Vec<u8>> = table.get(hash)?.map(|guard| guard.value().to_vec());
        raw_bytes
            .map(|bytes| decode(&bytes).and_then(Secret::try_from))
            .transpose()
    }

    fn insert(&self, secret: &Secret) -> Result<()> {
        let bytes = encode(&SecretRow::from(secret))?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            table.insert(secret.hash.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;

        debug!(hash = %secret.hash, "stored secret");
        Ok(())
    }

    fn update_remaining_views(&self, hash: &str, remaining_views: i64) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            let raw_bytes: Option<Vec<u8>> =
                table.get(hash)?.map(|guard| guard.value().to_vec());
            if let Some(bytes) = raw_bytes {
                let mut row = decode(&bytes)?;
                row.remaining_views = remaining_views;
                table.insert(hash, encode(&row)?.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn consume_view(&self, hash: &str) -> Result<Option<i64>> {
        let write_txn = self.db.begin_write()?;
        let remaining = {
            let mut table = write_txn.open_table(SECRETS)?;

            // Clone the bytes so the AccessGuard borrow on `table` ends before mutation.
            let raw_bytes: Option<Vec<u8>> =
                table.get(hash)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => None,
                Some(bytes) => {
                    let mut row = decode(&bytes)?;
                    if row.remaining_views <= 0 {
                        None
                    } else {
                        row.remaining_views -= 1;
                        table.insert(hash, encode(&row)?.as_slice())?;
                        Some(row.remaining_views)
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(remaining)
    }

    fn delete(&self, hash: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        // Table and guard are statement temporaries, dropped before commit.
        let existed = write_txn.open_table(SECRETS)?.remove(hash)?.is_some();
        write_txn.commit()?;
        Ok(existed)
    }
}

fn encode(row: &SecretRow) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(row, bincode::config::standard()).context("bincode encode")
}

fn decode(bytes: &[u8]) -> Result<SecretRow> {
    let (row, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode")?;
    Ok(row)
}
