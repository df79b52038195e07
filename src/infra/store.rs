//! Durable keyed document storage on redb.
//!
//! One table per configured (content type, language) partition, keyed by
//! slug, plus a sequence table that hands out partition-scoped ids. redb
//! gives the concurrency discipline the service relies on: a single writer
//! across the whole store and any number of readers over a consistent
//! snapshot.

use std::fmt;
use std::path::Path;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use thiserror::Error;

use crate::domain::document::Fields;

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("__sequences");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown content type `{0}`")]
    UnknownContentType(String),
    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),
    #[error("not found")]
    NotFound,
    #[error("stored document `{slug}` is corrupt: {reason}")]
    Corrupt { slug: String, reason: String },
    #[error("failed to open content store: {0}")]
    Open(#[from] redb::DatabaseError),
    #[error("store transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("store table access failed: {0}")]
    Table(#[from] redb::TableError),
    #[error("store operation failed: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("store commit failed: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("stored document is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifies one (content type, language) partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub content_type: String,
    pub language: String,
}

impl PartitionKey {
    fn table_name(&self) -> String {
        format!("{}/{}", self.content_type, self.language)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.content_type, self.language)
    }
}

/// The fixed sets of content types and languages, established at
/// initialization. Partition lookups validate against this registry.
#[derive(Debug, Clone)]
pub struct ContentRegistry {
    types: Vec<String>,
    languages: Vec<String>,
}

impl ContentRegistry {
    pub fn new(types: Vec<String>, languages: Vec<String>) -> Self {
        Self {
            types: dedup_preserving_order(types),
            languages: dedup_preserving_order(languages),
        }
    }

    pub fn content_types(&self) -> &[String] {
        &self.types
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// The language assumed when a request leaves the field empty.
    pub fn default_language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("en")
    }

    /// Validate a (type, language) pair and produce its partition key.
    pub fn partition(&self, content_type: &str, language: &str) -> Result<PartitionKey, StoreError> {
        if !self.types.iter().any(|t| t == content_type) {
            return Err(StoreError::UnknownContentType(content_type.to_string()));
        }
        if !self.languages.iter().any(|l| l == language) {
            return Err(StoreError::UnsupportedLanguage(language.to_string()));
        }
        Ok(PartitionKey {
            content_type: content_type.to_string(),
            language: language.to_string(),
        })
    }

    /// Every configured partition, in declaration order.
    pub fn partitions(&self) -> impl Iterator<Item = PartitionKey> + '_ {
        self.types.iter().flat_map(move |content_type| {
            self.languages.iter().map(move |language| PartitionKey {
                content_type: content_type.clone(),
                language: language.clone(),
            })
        })
    }
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(values.len());
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

/// Transactional document store partitioned by (content type, language).
pub struct ContentStore {
    db: Database,
    registry: ContentRegistry,
}

impl ContentStore {
    /// Open (or create) the store file and eagerly create every configured
    /// partition table. Failure here is fatal at startup.
    pub fn open(path: &Path, registry: ContentRegistry) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;
        let store = Self { db, registry };
        store.ensure_partitions()?;
        Ok(store)
    }

    fn ensure_partitions(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(SEQUENCES)?;
            for partition in self.registry.partitions() {
                let name = partition.table_name();
                let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
                txn.open_table(definition)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn registry(&self) -> &ContentRegistry {
        &self.registry
    }

    /// Begin the store-wide write transaction. Blocks while another writer
    /// holds it.
    pub fn begin_write(&self) -> Result<WriteTxn, StoreError> {
        Ok(WriteTxn {
            txn: self.db.begin_write()?,
        })
    }

    /// Begin a read-only transaction over a consistent snapshot.
    pub fn begin_read(&self) -> Result<ReadTxn, StoreError> {
        Ok(ReadTxn {
            txn: self.db.begin_read()?,
        })
    }
}

/// An open read-write transaction. Dropping without [`WriteTxn::commit`]
/// aborts every mutation made through it.
pub struct WriteTxn {
    txn: redb::WriteTransaction,
}

impl WriteTxn {
    /// Hand out the next id for the partition. The counter lives in its own
    /// table inside the same transaction, so ids survive restarts and never
    /// repeat within a partition.
    pub fn next_sequence(&self, partition: &PartitionKey) -> Result<u64, StoreError> {
        let mut table = self.txn.open_table(SEQUENCES)?;
        let name = partition.table_name();
        let next = table
            .get(name.as_str())?
            .map(|guard| guard.value())
            .unwrap_or(0)
            + 1;
        table.insert(name.as_str(), next)?;
        Ok(next)
    }

    pub fn exists(&self, partition: &PartitionKey, slug: &str) -> Result<bool, StoreError> {
        let name = partition.table_name();
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let table = self.txn.open_table(definition)?;
        Ok(table.get(slug)?.is_some())
    }

    /// Upsert: inserts and overwrites alike, without error.
    pub fn put(&self, partition: &PartitionKey, slug: &str, fields: &Fields) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(fields)?;
        let name = partition.table_name();
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let mut table = self.txn.open_table(definition)?;
        table.insert(slug, encoded.as_slice())?;
        Ok(())
    }

    pub fn get(&self, partition: &PartitionKey, slug: &str) -> Result<Fields, StoreError> {
        let name = partition.table_name();
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let table = self.txn.open_table(definition)?;
        let guard = table.get(slug)?.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(guard.value())?)
    }

    /// Hard delete. Returns the removed document, or `NotFound`.
    pub fn delete(&self, partition: &PartitionKey, slug: &str) -> Result<Fields, StoreError> {
        let name = partition.table_name();
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let mut table = self.txn.open_table(definition)?;
        let guard = table.remove(slug)?.ok_or(StoreError::NotFound)?;
        let fields = serde_json::from_slice(guard.value())?;
        Ok(fields)
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.txn.commit()?;
        Ok(())
    }
}

/// A read-only snapshot of the store.
pub struct ReadTxn {
    txn: redb::ReadTransaction,
}

impl ReadTxn {
    pub fn get(&self, partition: &PartitionKey, slug: &str) -> Result<Fields, StoreError> {
        let name = partition.table_name();
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let table = self.txn.open_table(definition)?;
        let guard = table.get(slug)?.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(guard.value())?)
    }

    /// Every live document in the partition, ordered by slug.
    pub fn scan(&self, partition: &PartitionKey) -> Result<Vec<(String, Fields)>, StoreError> {
        let name = partition.table_name();
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let table = self.txn.open_table(definition)?;
        let mut documents = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            documents.push((key.value().to_string(), serde_json::from_slice(value.value())?));
        }
        Ok(documents)
    }

    /// A slug-ordered page of the partition, decoding only the requested
    /// window.
    pub fn page(
        &self,
        partition: &PartitionKey,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Fields>, StoreError> {
        let name = partition.table_name();
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let table = self.txn.open_table(definition)?;
        let mut documents = Vec::new();
        for item in table.iter()?.skip(skip).take(limit) {
            let (_, value) = item?;
            documents.push(serde_json::from_slice(value.value())?);
        }
        Ok(documents)
    }

    pub fn count(&self, partition: &PartitionKey) -> Result<u64, StoreError> {
        let name = partition.table_name();
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let table = self.txn.open_table(definition)?;
        Ok(table.len()?)
    }
}
