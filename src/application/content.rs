//! The content service: orchestration of store, index, cache, and attachment
//! materialization behind the endpoint operations.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::domain::document::{self, Fields};
use crate::domain::slug::generate_unique_slug;
use crate::infra::attachments::AttachmentStore;
use crate::infra::cache::{CacheKey, ResponseCache};
use crate::infra::index::{FacetCounts, SearchIndexManager};
use crate::infra::store::{ContentStore, PartitionKey, StoreError};

use super::error::ServiceError;

const DEFAULT_PAGE_LIMIT: usize = 10;

/// Result of a ranked search: total match count plus the fetched page.
#[derive(Debug)]
pub struct SearchOutcome {
    pub total: usize,
    pub hits: Vec<Fields>,
}

#[derive(Debug)]
pub struct FacetsOutcome {
    pub counts: FacetCounts,
}

/// One slug-ordered page of a partition plus its total document count.
#[derive(Debug)]
pub struct ListOutcome {
    pub total: u64,
    pub items: Vec<Fields>,
}

#[derive(Debug)]
pub struct SchemaOutcome {
    pub types: Vec<String>,
    pub languages: Vec<String>,
}

pub struct ContentService {
    store: ContentStore,
    index: SearchIndexManager,
    cache: ResponseCache,
    attachments: Arc<AttachmentStore>,
}

impl ContentService {
    pub fn new(
        store: ContentStore,
        index: SearchIndexManager,
        cache: ResponseCache,
        attachments: Arc<AttachmentStore>,
    ) -> Self {
        Self {
            store,
            index,
            cache,
            attachments,
        }
    }

    /// Reconstruct every partition index from the store. Must succeed before
    /// traffic is served; search answers only reflect indexed documents.
    pub fn rebuild_index(&self) -> Result<(), ServiceError> {
        self.index.rebuild(&self.store)?;
        Ok(())
    }

    /// Store a new document. Assigns the next partition id, resolves the
    /// slug, materializes attachments, and persists in one transaction; the
    /// index is synchronized inside the transaction, before commit.
    pub fn create(
        &self,
        content_type: &str,
        language: &str,
        explicit_slug: &str,
        slug_text: &str,
        content: Option<Value>,
    ) -> Result<Fields, ServiceError> {
        let mut fields = validate_content(content)?;
        let language = self.resolve_language(language);
        let partition = self.store.registry().partition(content_type, &language)?;

        let txn = self.store.begin_write()?;
        let id = txn.next_sequence(&partition)?;

        // An explicit key is stored verbatim; only derived keys go through
        // slugification.
        let explicit = explicit_slug.trim();
        let slug = if !explicit.is_empty() {
            if txn.exists(&partition, explicit)? {
                return Err(ServiceError::DuplicateSlug(explicit.to_string()));
            }
            explicit.to_string()
        } else if !slug_text.is_empty() {
            generate_unique_slug(slug_text, |candidate| {
                txn.exists(&partition, candidate).map(|taken| !taken)
            })?
        } else {
            return Err(ServiceError::EmptyKey);
        };

        document::stamp_new(&mut fields, id, &language, &slug, document::unix_now());
        self.attachments
            .materialize_fields(&partition, id, &mut fields)?;
        txn.put(&partition, &slug, &fields)?;
        // Indexing happens while the write transaction is held, so index
        // mutations apply in commit order and a failure aborts the write.
        self.sync_index(&partition, &slug, &fields)?;
        txn.commit()?;

        debug!(target: "scrigno::content", partition = %partition, slug, id, "created document");
        self.cache
            .set(CacheKey::new(&language, content_type, &slug), fields.clone());
        Ok(fields)
    }

    /// Fetch a document by slug, consulting the response cache first and
    /// populating it on a miss.
    pub fn read(
        &self,
        content_type: &str,
        language: &str,
        slug: &str,
    ) -> Result<Fields, ServiceError> {
        if slug.is_empty() {
            return Err(ServiceError::EmptyKey);
        }
        let language = self.resolve_language(language);
        let partition = self.store.registry().partition(content_type, &language)?;

        let key = CacheKey::new(&language, content_type, slug);
        if let Some(fields) = self.cache.get(&key) {
            return Ok(fields);
        }

        let fields = self.store.begin_read()?.get(&partition, slug)?;
        self.cache.set(key, fields.clone());
        Ok(fields)
    }

    /// Merge new field values over the stored document. Identity and audit
    /// fields are re-asserted; the caller can never move a document between
    /// ids, languages, or slugs through an update.
    pub fn update(
        &self,
        content_type: &str,
        language: &str,
        slug: &str,
        content: Option<Value>,
    ) -> Result<Fields, ServiceError> {
        if slug.is_empty() {
            return Err(ServiceError::EmptyKey);
        }
        let incoming = validate_content(content)?;
        let language = self.resolve_language(language);
        let partition = self.store.registry().partition(content_type, &language)?;

        let txn = self.store.begin_write()?;
        let mut fields = txn.get(&partition, slug)?;
        let id = document::id(&fields).ok_or_else(|| {
            ServiceError::Store(StoreError::Corrupt {
                slug: slug.to_string(),
                reason: "missing numeric id".to_string(),
            })
        })?;

        for (name, value) in incoming {
            fields.insert(name, value);
        }
        self.attachments
            .materialize_fields(&partition, id, &mut fields)?;
        document::touch(&mut fields, document::unix_now());
        document::assert_identity(&mut fields, id, &language, slug);
        txn.put(&partition, slug, &fields)?;
        self.sync_index(&partition, slug, &fields)?;
        txn.commit()?;

        debug!(target: "scrigno::content", partition = %partition, slug, "updated document");
        self.cache
            .set(CacheKey::new(&language, content_type, slug), fields.clone());
        Ok(fields)
    }

    /// Hard-delete a document. The returned copy carries status `deleted`;
    /// nothing of the document remains in store, index, or cache.
    pub fn delete(
        &self,
        content_type: &str,
        language: &str,
        slug: &str,
    ) -> Result<Fields, ServiceError> {
        if slug.is_empty() {
            return Err(ServiceError::EmptyKey);
        }
        let language = self.resolve_language(language);
        let partition = self.store.registry().partition(content_type, &language)?;

        let txn = self.store.begin_write()?;
        let mut removed = txn.delete(&partition, slug)?;
        self.index.delete(&partition, slug).map_err(|err| {
            error!(
                target: "scrigno::content",
                partition = %partition,
                slug,
                error = %err,
                "index delete failed, aborting write"
            );
            ServiceError::from(err)
        })?;
        txn.commit()?;

        self.cache
            .invalidate(&CacheKey::new(&language, content_type, slug));
        debug!(target: "scrigno::content", partition = %partition, slug, "deleted document");
        removed.insert(
            document::STATUS.to_string(),
            Value::from("deleted"),
        );
        Ok(removed)
    }

    /// Ranked full-text search over one partition. Hits are re-fetched from
    /// a store snapshot; slugs the snapshot no longer holds are dropped.
    pub fn search(
        &self,
        content_type: &str,
        language: &str,
        query: &str,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<SearchOutcome, ServiceError> {
        if query.is_empty() {
            return Err(ServiceError::EmptyKey);
        }
        let language = self.resolve_language(language);
        let partition = self.store.registry().partition(content_type, &language)?;

        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let skip = skip.unwrap_or(0);
        let (total, slugs) = self.index.search(&partition, query, limit, skip)?;

        let txn = self.store.begin_read()?;
        let mut hits = Vec::with_capacity(slugs.len());
        for slug in slugs {
            match txn.get(&partition, &slug) {
                Ok(fields) => hits.push(fields),
                Err(StoreError::NotFound) => {
                    debug!(
                        target: "scrigno::content",
                        partition = %partition,
                        slug,
                        "search hit no longer in store, dropped"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(SearchOutcome { total, hits })
    }

    /// Aggregated field-value counts over the documents matching a query.
    pub fn facets(
        &self,
        content_type: &str,
        language: &str,
        query: &str,
        fields: &[String],
    ) -> Result<FacetsOutcome, ServiceError> {
        if query.is_empty() {
            return Err(ServiceError::EmptyKey);
        }
        let language = self.resolve_language(language);
        let partition = self.store.registry().partition(content_type, &language)?;
        let counts = self.index.facets(&partition, query, fields)?;
        Ok(FacetsOutcome { counts })
    }

    /// A slug-ordered page of every document in one partition.
    pub fn list(
        &self,
        content_type: &str,
        language: &str,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<ListOutcome, ServiceError> {
        let language = self.resolve_language(language);
        let partition = self.store.registry().partition(content_type, &language)?;

        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let skip = skip.unwrap_or(0);

        let txn = self.store.begin_read()?;
        let total = txn.count(&partition)?;
        let items = txn.page(&partition, skip, limit)?;
        Ok(ListOutcome { total, items })
    }

    /// The configured content types and languages.
    pub fn schema(&self) -> SchemaOutcome {
        let registry = self.store.registry();
        SchemaOutcome {
            types: registry.content_types().to_vec(),
            languages: registry.languages().to_vec(),
        }
    }

    fn resolve_language(&self, language: &str) -> String {
        if language.is_empty() {
            self.store.registry().default_language().to_string()
        } else {
            language.to_string()
        }
    }

    /// Project a pending write into the partition index. Called while the
    /// store's write transaction is still open, so index mutations serialize
    /// in commit order and a failure aborts the transaction.
    fn sync_index(
        &self,
        partition: &PartitionKey,
        slug: &str,
        fields: &Fields,
    ) -> Result<(), ServiceError> {
        self.index.upsert(partition, slug, fields).map_err(|err| {
            error!(
                target: "scrigno::content",
                partition = %partition,
                slug,
                error = %err,
                "index update failed, aborting write"
            );
            ServiceError::from(err)
        })
    }
}

fn validate_content(content: Option<Value>) -> Result<Fields, ServiceError> {
    match content {
        None | Some(Value::Null) => Err(ServiceError::NullContent),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ServiceError::InvalidContent),
    }
}
