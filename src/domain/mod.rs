//! Domain layer containing business entities and logic.
//!
//! Defines the data model, the storage contract and the deletion pipeline,
//! independent of any concrete backend.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Storage trait definition
//! - [`delete_request`] - Delete request handed to the pipeline
//! - [`deletion_worker`] - Batched asynchronous deletion pipeline
//! - [`audit_event`] - Audit notification model
//!
//! # Deletion Flow
//!
//! 1. HTTP handler accepts a list of tokens to delete
//! 2. [`delete_request::DeleteRequest`] is queued (bounded wait, fails fast when full)
//! 3. [`deletion_worker::DeletionPipeline`] workers batch tokens per user
//! 4. Records are tombstoned via [`repositories::UrlStorage::delete_by_tokens`]

pub mod audit_event;
pub mod delete_request;
pub mod deletion_worker;
pub mod entities;
pub mod repositories;
