//! In-memory full-text indexes, one per content partition.
//!
//! Each (content type, language) partition owns a RAM-only tantivy index
//! holding a projection of its documents: the slug as the identity term, the
//! document's text flattened into one searchable body, and every scalar
//! field mirrored into a facet hierarchy for aggregation. Indexes are never
//! persisted; [`SearchIndexManager::rebuild`] reconstructs them from the
//! store at every startup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tantivy::collector::{Count, FacetCollector, TopDocs};
use tantivy::query::QueryParser;
use tantivy::schema::{
    Facet, FacetOptions, Field, STORED, STRING, Schema, TEXT, Value as TantivyValue,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use thiserror::Error;
use tracing::debug;

use crate::domain::attachment;
use crate::domain::document::Fields;
use crate::infra::store::{ContentRegistry, ContentStore, PartitionKey, StoreError};

const WRITER_HEAP_BYTES: usize = 15_000_000;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unknown content type `{0}`")]
    UnknownContentType(String),
    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),
    #[error("index operation failed: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("search query could not be parsed: {0}")]
    Query(#[from] tantivy::query::QueryParserError),
    #[error("index writer lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Field-value counts aggregated per requested field.
pub type FacetCounts = BTreeMap<String, BTreeMap<String, u64>>;

struct PartitionIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    slug: Field,
    body: Field,
    facets: Field,
}

impl PartitionIndex {
    fn create() -> Result<Self, IndexError> {
        let mut builder = Schema::builder();
        let slug = builder.add_text_field("slug", STRING | STORED);
        let body = builder.add_text_field("body", TEXT);
        let facets = builder.add_facet_field("facets", FacetOptions::default());
        let index = Index::create_in_ram(builder.build());
        let writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
            slug,
            body,
            facets,
        })
    }

    fn project(&self, slug: &str, fields: &Fields) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        doc.add_text(self.slug, slug);
        doc.add_text(self.body, flatten_text(fields));
        for (field, value) in facet_terms(fields) {
            doc.add_facet(self.facets, Facet::from_path([field.as_str(), value.as_str()]));
        }
        doc
    }

    fn upsert(&self, slug: &str, fields: &Fields) -> Result<(), IndexError> {
        let mut writer = self.writer.lock().map_err(|_| IndexError::Poisoned)?;
        writer.delete_term(Term::from_field_text(self.slug, slug));
        writer.add_document(self.project(slug, fields))?;
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    fn delete(&self, slug: &str) -> Result<(), IndexError> {
        let mut writer = self.writer.lock().map_err(|_| IndexError::Poisoned)?;
        writer.delete_term(Term::from_field_text(self.slug, slug));
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    fn rebuild_from(&self, documents: &[(String, Fields)]) -> Result<(), IndexError> {
        let mut writer = self.writer.lock().map_err(|_| IndexError::Poisoned)?;
        writer.delete_all_documents()?;
        for (slug, fields) in documents {
            writer.add_document(self.project(slug, fields))?;
        }
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    fn search(
        &self,
        query: &str,
        limit: usize,
        skip: usize,
    ) -> Result<(usize, Vec<String>), IndexError> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.body]);
        let parsed = parser.parse_query(query)?;
        let (hits, total) = searcher.search(
            &parsed,
            &(TopDocs::with_limit(limit.max(1)).and_offset(skip), Count),
        )?;

        let mut slugs = Vec::with_capacity(hits.len());
        for (_score, address) in hits {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(slug) = doc.get_first(self.slug).and_then(|value| value.as_str()) {
                slugs.push(slug.to_string());
            }
        }
        Ok((total, slugs))
    }

    fn facets(&self, query: &str, fields: &[String]) -> Result<FacetCounts, IndexError> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.body]);
        let parsed = parser.parse_query(query)?;

        let mut collector = FacetCollector::for_field("facets");
        for field in fields {
            collector.add_facet(Facet::from_path([field.as_str()]));
        }
        let counts = searcher.search(&parsed, &collector)?;

        let mut aggregated = FacetCounts::new();
        for field in fields {
            let path = format!("/{field}");
            let mut values = BTreeMap::new();
            for (facet, count) in counts.get(path.as_str()) {
                if let Some(value) = facet.to_path().into_iter().nth(1) {
                    values.insert(value.to_string(), count);
                }
            }
            aggregated.insert(field.clone(), values);
        }
        Ok(aggregated)
    }
}

/// Owns one [`PartitionIndex`] per configured partition, created eagerly.
pub struct SearchIndexManager {
    partitions: HashMap<PartitionKey, PartitionIndex>,
}

impl SearchIndexManager {
    pub fn new(registry: &ContentRegistry) -> Result<Self, IndexError> {
        let mut partitions = HashMap::new();
        for key in registry.partitions() {
            partitions.insert(key, PartitionIndex::create()?);
        }
        Ok(Self { partitions })
    }

    fn partition(&self, key: &PartitionKey) -> Result<&PartitionIndex, IndexError> {
        self.partitions
            .get(key)
            .ok_or_else(|| IndexError::UnknownContentType(key.content_type.clone()))
    }

    /// Insert or replace the projection stored under `slug`.
    pub fn upsert(&self, key: &PartitionKey, slug: &str, fields: &Fields) -> Result<(), IndexError> {
        self.partition(key)?.upsert(slug, fields)
    }

    /// Remove the projection; absent entries delete to a no-op.
    pub fn delete(&self, key: &PartitionKey, slug: &str) -> Result<(), IndexError> {
        self.partition(key)?.delete(slug)
    }

    /// Ranked search returning the matching slugs and the total match count.
    pub fn search(
        &self,
        key: &PartitionKey,
        query: &str,
        limit: usize,
        skip: usize,
    ) -> Result<(usize, Vec<String>), IndexError> {
        self.partition(key)?.search(query, limit, skip)
    }

    /// Aggregated value counts for the requested fields over the matching
    /// documents.
    pub fn facets(
        &self,
        key: &PartitionKey,
        query: &str,
        fields: &[String],
    ) -> Result<FacetCounts, IndexError> {
        self.partition(key)?.facets(query, fields)
    }

    /// Discard every index and re-derive it from the store. Runs over one
    /// read snapshot; must complete before traffic is served.
    pub fn rebuild(&self, store: &ContentStore) -> Result<(), IndexError> {
        let txn = store.begin_read()?;
        for (key, partition) in &self.partitions {
            let documents = txn.scan(key)?;
            partition.rebuild_from(&documents)?;
            debug!(
                target: "scrigno::index",
                partition = %key,
                documents = documents.len(),
                "rebuilt partition index"
            );
        }
        Ok(())
    }
}

/// Flatten every string in the document (recursively) into one searchable
/// body. Attachment fields are skipped so base64 payloads never pollute the
/// index.
fn flatten_text(fields: &Fields) -> String {
    let mut body = String::new();
    for (name, value) in fields {
        if attachment::is_attachment_field(name) {
            continue;
        }
        collect_text(value, &mut body);
    }
    body
}

fn collect_text(value: &serde_json::Value, body: &mut String) {
    match value {
        serde_json::Value::String(text) => {
            if !body.is_empty() {
                body.push(' ');
            }
            body.push_str(text);
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_text(item, body);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_text(item, body);
            }
        }
        _ => {}
    }
}

/// Scalar top-level fields (and scalar elements of top-level arrays) become
/// facet terms `(field name, rendered value)`.
fn facet_terms(fields: &Fields) -> Vec<(String, String)> {
    let mut terms = Vec::new();
    for (name, value) in fields {
        if attachment::is_attachment_field(name) {
            continue;
        }
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    if let Some(rendered) = render_scalar(item) {
                        terms.push((name.clone(), rendered));
                    }
                }
            }
            other => {
                if let Some(rendered) = render_scalar(other) {
                    terms.push((name.clone(), rendered));
                }
            }
        }
    }
    terms
}

fn render_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
