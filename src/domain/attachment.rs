//! Attachment fields embedded in documents.
//!
//! Any document field whose name starts with `file:` carries an attachment
//! record. Payload bytes travel base64-encoded on the wire and are never
//! persisted; materialization rewrites the field to an external URI.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reserved field-name prefix marking a field as an attachment.
pub const FIELD_PREFIX: &str = "file:";

/// Errors raised while interpreting an attachment field.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("attachment field `{field}` is malformed")]
    Malformed {
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("attachment field `{field}` carries an invalid base64 payload")]
    Payload {
        field: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("attachment name `{name}` is not a plain filename")]
    UnsafeName { name: String },
}

/// Structured value of an attachment field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentField {
    pub name: String,
    pub size: u64,
    /// Base64-encoded payload supplied by the caller; cleared on
    /// materialization.
    pub bytes: Option<String>,
    pub uri: String,
}

impl AttachmentField {
    /// Reinterpret a dynamic field value as an attachment record.
    pub fn from_value(field: &str, value: &Value) -> Result<Self, AttachmentError> {
        serde_json::from_value(value.clone()).map_err(|source| AttachmentError::Malformed {
            field: field.to_string(),
            source,
        })
    }

    /// Whether this field still needs its payload written out.
    ///
    /// A field with only `uri` set is already materialized and must be left
    /// untouched; a field with fresh bytes is (re-)materialized even when a
    /// prior `uri` exists.
    pub fn pending(&self) -> bool {
        !self.name.is_empty()
            && self.size > 0
            && self.bytes.as_deref().is_some_and(|b| !b.is_empty())
    }

    /// Decode the base64 payload.
    pub fn decode_bytes(&self, field: &str) -> Result<Vec<u8>, AttachmentError> {
        let encoded = self.bytes.as_deref().unwrap_or_default();
        BASE64
            .decode(encoded)
            .map_err(|source| AttachmentError::Payload {
                field: field.to_string(),
                source,
            })
    }
}

/// Whether a field name denotes an attachment.
pub fn is_attachment_field(name: &str) -> bool {
    name.starts_with(FIELD_PREFIX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn recognizes_prefixed_fields() {
        assert!(is_attachment_field("file:photo"));
        assert!(!is_attachment_field("photo"));
    }

    #[test]
    fn pending_requires_name_size_and_bytes() {
        let value = json!({"name": "photo.png", "size": 3, "bytes": "AQID"});
        let field = AttachmentField::from_value("file:photo", &value).expect("field");
        assert!(field.pending());
        assert_eq!(field.decode_bytes("file:photo").expect("bytes"), [1, 2, 3]);
    }

    #[test]
    fn uri_only_field_is_not_pending() {
        let value = json!({"name": "photo.png", "size": 3, "uri": "/files/a/en/1/photo.png"});
        let field = AttachmentField::from_value("file:photo", &value).expect("field");
        assert!(!field.pending());
    }

    #[test]
    fn fresh_bytes_trump_existing_uri() {
        let value = json!({
            "name": "photo.png",
            "size": 3,
            "bytes": "AQID",
            "uri": "/files/a/en/1/photo.png"
        });
        let field = AttachmentField::from_value("file:photo", &value).expect("field");
        assert!(field.pending());
    }

    #[test]
    fn invalid_base64_is_reported() {
        let value = json!({"name": "photo.png", "size": 3, "bytes": "%%%"});
        let field = AttachmentField::from_value("file:photo", &value).expect("field");
        assert!(matches!(
            field.decode_bytes("file:photo"),
            Err(AttachmentError::Payload { .. })
        ));
    }
}
