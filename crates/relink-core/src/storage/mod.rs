//! # Storage Module
//!
//! Reference implementation of the normalized record store.

pub mod record_store;

pub use record_store::{Batch, Field, Record, RecordStore};
