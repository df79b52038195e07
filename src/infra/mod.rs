pub mod attachments;
pub mod cache;
pub mod http;
pub mod index;
pub mod store;
pub mod telemetry;
