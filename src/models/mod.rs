//! Core data models for bucket iteration.
//!
//! `Blob` is what callers receive; the listing types describe one page of a
//! storage backend's answer.

pub mod blob;
pub mod listing;
