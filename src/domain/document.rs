//! Document representation and system-field bookkeeping.
//!
//! A document is an arbitrary JSON object. The store attaches a handful of
//! system fields on every write; everything else is caller-defined.

use serde_json::{Map, Value};
use time::OffsetDateTime;

/// The dynamic field map every stored document is made of.
pub type Fields = Map<String, Value>;

pub const ID: &str = "id";
pub const LANGUAGE: &str = "language";
pub const SLUG: &str = "slug";
pub const STATUS: &str = "status";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Current wall-clock time as Unix seconds.
pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Stamp the system fields onto a freshly created document.
///
/// `status` is left alone when the caller supplied one; it defaults to the
/// empty string otherwise.
pub fn stamp_new(fields: &mut Fields, id: u64, language: &str, slug: &str, now: i64) {
    fields.insert(ID.to_string(), Value::from(id));
    fields.insert(LANGUAGE.to_string(), Value::from(language));
    fields.insert(SLUG.to_string(), Value::from(slug));
    fields
        .entry(STATUS)
        .or_insert_with(|| Value::from(String::new()));
    fields.insert(CREATED_AT.to_string(), Value::from(now));
    fields.insert(UPDATED_AT.to_string(), Value::from(now));
}

/// Refresh the modification timestamp after an update.
pub fn touch(fields: &mut Fields, now: i64) {
    fields.insert(UPDATED_AT.to_string(), Value::from(now));
}

/// The partition-scoped id assigned at creation, if present and well-formed.
pub fn id(fields: &Fields) -> Option<u64> {
    fields.get(ID)?.as_u64()
}

/// Re-assert the identity fields after merging caller-supplied updates, so a
/// payload cannot detach a document from its storage key.
pub fn assert_identity(fields: &mut Fields, id: u64, language: &str, slug: &str) {
    fields.insert(ID.to_string(), Value::from(id));
    fields.insert(LANGUAGE.to_string(), Value::from(language));
    fields.insert(SLUG.to_string(), Value::from(slug));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_new_sets_system_fields() {
        let mut fields = Fields::new();
        fields.insert("title".to_string(), Value::from("Hello"));
        stamp_new(&mut fields, 7, "en", "hello", 1_700_000_000);

        assert_eq!(fields[ID], Value::from(7));
        assert_eq!(fields[LANGUAGE], Value::from("en"));
        assert_eq!(fields[SLUG], Value::from("hello"));
        assert_eq!(fields[STATUS], Value::from(""));
        assert_eq!(fields[CREATED_AT], Value::from(1_700_000_000));
        assert_eq!(fields[UPDATED_AT], Value::from(1_700_000_000));
        assert_eq!(fields["title"], Value::from("Hello"));
    }

    #[test]
    fn stamp_new_keeps_caller_status() {
        let mut fields = Fields::new();
        fields.insert(STATUS.to_string(), Value::from("draft"));
        stamp_new(&mut fields, 1, "en", "a", 0);
        assert_eq!(fields[STATUS], Value::from("draft"));
    }

    #[test]
    fn touch_moves_updated_at_only() {
        let mut fields = Fields::new();
        stamp_new(&mut fields, 1, "en", "a", 100);
        touch(&mut fields, 200);
        assert_eq!(fields[CREATED_AT], Value::from(100));
        assert_eq!(fields[UPDATED_AT], Value::from(200));
    }

    #[test]
    fn assert_identity_overrides_merged_values() {
        let mut fields = Fields::new();
        stamp_new(&mut fields, 3, "en", "a", 0);
        fields.insert(ID.to_string(), Value::from(99));
        fields.insert(SLUG.to_string(), Value::from("b"));
        assert_identity(&mut fields, 3, "en", "a");
        assert_eq!(id(&fields), Some(3));
        assert_eq!(fields[SLUG], Value::from("a"));
    }
}
