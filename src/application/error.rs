//! Error taxonomy surfaced by the content service.

use thiserror::Error;

use crate::domain::slug::{SlugError, SlugProbeError};
use crate::infra::attachments::MaterializeError;
use crate::infra::index::IndexError;
use crate::infra::store::StoreError;

/// Every failure a service operation can report. Request-level failures are
/// serialized into the response envelope rather than transport errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown content type `{0}`")]
    UnknownContentType(String),
    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),
    #[error("not found")]
    NotFound,
    #[error("empty key")]
    EmptyKey,
    #[error("null content")]
    NullContent,
    #[error("content must be a JSON object")]
    InvalidContent,
    #[error("slug `{0}` already exists")]
    DuplicateSlug(String),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Attachment(#[from] MaterializeError),
    #[error("store failure: {0}")]
    Store(StoreError),
    #[error("index failure: {0}")]
    Index(IndexError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownContentType(t) => Self::UnknownContentType(t),
            StoreError::UnsupportedLanguage(l) => Self::UnsupportedLanguage(l),
            StoreError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

impl From<IndexError> for ServiceError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::UnknownContentType(t) => Self::UnknownContentType(t),
            IndexError::UnsupportedLanguage(l) => Self::UnsupportedLanguage(l),
            other => Self::Index(other),
        }
    }
}

impl From<SlugProbeError<StoreError>> for ServiceError {
    fn from(err: SlugProbeError<StoreError>) -> Self {
        match err {
            SlugProbeError::Slug(slug) => Self::Slug(slug),
            SlugProbeError::Probe(store) => store.into(),
        }
    }
}
