pub mod ops;
pub mod schema;

use std::path::Path;

use anyhow::Context;
use log::info;
use redb::{Database, ReadTransaction, ReadableTable, Table, WriteTransaction};
use thiserror::Error;

use crate::models::{EntityKind, InvalidTransition};
use schema::{
    BATCH_ITEMS_TABLE, BATCH_TABLE, DATASET_TABLE, ITEM_TABLE, PROJECT_BATCHES_TABLE,
    PROJECT_TABLE, Record,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("item {0} is not an image")]
    NotAnImage(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("database error: {0}")]
    Database(#[from] redb::Error),
    #[error("corrupt record: {0}")]
    Codec(#[from] bitcode::Error),
}

macro_rules! redb_error {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for StoreError {
                fn from(err: $source) -> Self {
                    StoreError::Database(redb::Error::from(err))
                }
            }
        )*
    };
}

redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Embedded persistence for projects, batches, items and datasets.
pub struct Store {
    db: Database,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        info!("Database opened at {}", path.display());
        Ok(Self::initialize(db)?)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context("failed to create in-memory database")?;
        Ok(Self::initialize(db)?)
    }

    fn initialize(db: Database) -> Result<Self, StoreError> {
        let txn = db.begin_write()?;
        {
            txn.open_table(PROJECT_TABLE)?;
            txn.open_table(BATCH_TABLE)?;
            txn.open_table(ITEM_TABLE)?;
            txn.open_table(DATASET_TABLE)?;
            txn.open_table(PROJECT_BATCHES_TABLE)?;
            txn.open_table(BATCH_ITEMS_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    pub fn begin_read(&self) -> Result<ReadTransaction, StoreError> {
        Ok(self.db.begin_read()?)
    }

    pub fn begin_write(&self) -> Result<WriteTransaction, StoreError> {
        Ok(self.db.begin_write()?)
    }

    pub fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        let txn = self.begin_read()?;
        let table = txn.open_table(R::TABLE)?;
        read_record(&table, id)
    }

    pub fn fetch<R: Record>(&self, id: &str) -> Result<R, StoreError> {
        self.get(id)?
            .ok_or_else(|| StoreError::not_found(R::KIND, id))
    }

    pub fn put<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(R::TABLE)?;
            write_record(&mut table, record)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Read-modify-write in one transaction. Nothing is written when `apply` fails.
    pub fn update<R, F>(&self, id: &str, apply: F) -> Result<R, StoreError>
    where
        R: Record,
        F: FnOnce(&mut R) -> Result<(), StoreError>,
    {
        let txn = self.begin_write()?;
        let record = {
            let mut table = txn.open_table(R::TABLE)?;
            let mut record: R =
                read_record(&table, id)?.ok_or_else(|| StoreError::not_found(R::KIND, id))?;
            apply(&mut record)?;
            write_record(&mut table, &record)?;
            record
        };
        txn.commit()?;
        Ok(record)
    }

    pub fn all<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let txn = self.begin_read()?;
        let table = txn.open_table(R::TABLE)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, bytes) = entry?;
            records.push(bitcode::decode(bytes.value())?);
        }
        Ok(records)
    }
}

pub(crate) fn read_record<R: Record>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    id: &str,
) -> Result<Option<R>, StoreError> {
    match table.get(id)? {
        Some(bytes) => Ok(Some(bitcode::decode(bytes.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn write_record<R: Record>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    record: &R,
) -> Result<(), StoreError> {
    let bytes = bitcode::encode(record);
    table.insert(record.id().as_str(), bytes.as_slice())?;
    Ok(())
}

/// Children of `owner` in a `(owner, child)` relation table.
pub(crate) fn related_ids(
    table: &impl ReadableTable<(&'static str, &'static str), ()>,
    owner: &str,
) -> Result<Vec<String>, StoreError> {
    let mut ids = Vec::new();
    for entry in table.range((owner, "")..)? {
        let (key, _) = entry?;
        let (key_owner, child) = key.value();
        if key_owner != owner {
            break;
        }
        ids.push(child.to_string());
    }
    Ok(ids)
}
