//! Core data models for the attachment service.
//!
//! These entities represent cloud file metadata, the content objects files
//! can be linked to, and the per-request actor classification. Rows map to
//! database tables via `sqlx::FromRow` and serialize naturally as JSON via
//! `serde`.

pub mod actor;
pub mod cloud_file;
pub mod content;
