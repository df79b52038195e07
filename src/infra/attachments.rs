//! Filesystem materialization of document attachments.
//!
//! Attachments live under `{root}/{type}/{language}/{id}/{filename}` and are
//! referenced from documents by the URI `/files/{type}/{language}/{id}/{filename}`.
//! File writes are not covered by the store transaction: a crash between the
//! write and the commit can orphan a file, which is an accepted limitation.

use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::attachment::{self, AttachmentError, AttachmentField};
use crate::domain::document::Fields;
use crate::infra::store::PartitionKey;

/// Errors that can occur while materializing or serving attachments.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Field(#[from] AttachmentError),
    #[error("attachment write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid attachment path")]
    InvalidPath,
}

/// Filesystem-backed attachment storage.
#[derive(Debug)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    /// Initialise storage rooted at the provided directory, creating it if
    /// necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The external reference recorded in documents for a materialized file.
    pub fn uri(partition: &PartitionKey, id: u64, name: &str) -> String {
        format!(
            "/files/{}/{}/{}/{}",
            partition.content_type, partition.language, id, name
        )
    }

    /// Materialize every pending attachment field of the document in place:
    /// write the decoded payload under the partition/id directory, set `uri`,
    /// and strip the raw bytes. Fields that are not pending (already
    /// materialized, or incomplete) are left untouched.
    pub fn materialize_fields(
        &self,
        partition: &PartitionKey,
        id: u64,
        fields: &mut Fields,
    ) -> Result<(), MaterializeError> {
        for (name, value) in fields.iter_mut() {
            if !attachment::is_attachment_field(name) {
                continue;
            }
            let field = AttachmentField::from_value(name, value)?;
            if !field.pending() {
                continue;
            }

            let filename = safe_segment(&field.name)?;
            let payload = field.decode_bytes(name)?;
            let directory = self
                .root
                .join(&partition.content_type)
                .join(&partition.language)
                .join(id.to_string());
            std::fs::create_dir_all(&directory)?;
            std::fs::write(directory.join(filename), &payload)?;

            if let Value::Object(map) = value {
                map.insert(
                    "uri".to_string(),
                    Value::from(Self::uri(partition, id, &field.name)),
                );
                // Raw payloads are never persisted.
                map.remove("bytes");
            }
            debug!(
                target: "scrigno::attachments",
                partition = %partition,
                id,
                field = %name,
                "materialized attachment"
            );
        }
        Ok(())
    }

    /// Read a materialized file back, for serving over the transport layer.
    pub async fn read(
        &self,
        content_type: &str,
        language: &str,
        id: u64,
        name: &str,
    ) -> Result<Vec<u8>, MaterializeError> {
        let path = self
            .root
            .join(checked_segment(content_type)?)
            .join(checked_segment(language)?)
            .join(id.to_string())
            .join(checked_segment(name)?);
        Ok(tokio::fs::read(path).await?)
    }
}

/// Validate that an attachment filename is a single plain path component.
fn safe_segment(name: &str) -> Result<&str, AttachmentError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(AttachmentError::UnsafeName {
            name: name.to_string(),
        }),
    }
}

fn checked_segment(segment: &str) -> Result<&str, MaterializeError> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(segment),
        _ => Err(MaterializeError::InvalidPath),
    }
}
