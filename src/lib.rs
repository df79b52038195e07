//! Scrigno is a small headless content backend: JSON documents stored per
//! (content type, language) partition, addressed by slug, with full-text
//! search, facet aggregation, attachment storage, and a TTL response cache.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
