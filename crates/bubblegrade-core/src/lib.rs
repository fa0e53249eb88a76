//! bubblegrade-core: Answer model, grading engine, and recognition boundary.
//!
//! This crate defines the data model, the grading rules, the normalization of
//! untrusted recognition replies, and the persistence and session logic that
//! the rest of bubblegrade builds on.

pub mod engine;
pub mod error;
pub mod grading;
pub mod image;
pub mod model;
pub mod parser;
pub mod recognition;
pub mod report;
pub mod schema;
pub mod session;
pub mod statistics;
pub mod store;
pub mod traits;
