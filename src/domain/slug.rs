//! Storage-key derivation for content items.
//!
//! Free text becomes a lowercase, separator-collapsed key via ASCII
//! slugification (`slug` crate) with Chinese transliteration (`pinyin`
//! crate), so inputs like “基线对齐” become `ji-xian-dui-qi`. Uniqueness is
//! the caller's concern: the probing helper takes a predicate so collisions
//! can be checked inside the same store transaction as the eventual write.

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

/// Errors that can occur while deriving a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Errors from the probing helper, either from derivation itself or from the
/// fallible uniqueness predicate.
#[derive(Debug, Error)]
pub enum SlugProbeError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Probe(E),
}

/// Derive a base slug from the provided human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let transliterated = transliterate_to_ascii(input);
    let candidate = slugify(&transliterated);

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Produce a slug that does not collide according to the supplied predicate.
///
/// The `is_unique` closure must return `Ok(true)` when the candidate is not
/// already present in the target partition. The helper suffixes a monotonic
/// counter (`-2`, `-3`, …) for as long as it takes the predicate to accept
/// one; against a finite key space a free candidate always exists.
pub fn generate_unique_slug<F, E>(input: &str, mut is_unique: F) -> Result<String, SlugProbeError<E>>
where
    F: FnMut(&str) -> Result<bool, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(&base).map_err(SlugProbeError::Probe)? {
        return Ok(base);
    }

    let mut attempt: u64 = 2;
    loop {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate).map_err(SlugProbeError::Probe)? {
            return Ok(candidate);
        }
        attempt += 1;
    }
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            None => {
                // Preserve unhandled characters so slugify can decide how to filter them.
                output.push(ch);
            }
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
