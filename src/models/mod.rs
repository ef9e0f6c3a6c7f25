//! Core data models for the gateway.
//!
//! Metadata records are persisted by [`crate::stores::sqlite`], which maps
//! rows of the single `records` table onto [`record::MetadataRecord`].

pub mod identity;
pub mod record;
