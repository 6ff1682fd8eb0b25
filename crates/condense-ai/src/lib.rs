//! condense-ai: chat message model and provider capabilities
//!
//! This crate provides the request/response types that flow through the
//! compaction filters, the traits for the upstream capabilities the engine
//! consumes (model metadata and chat completion), and an OpenAI-compatible
//! client with a JSON provider catalog.

pub mod error;
pub mod models;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use providers::catalog::{ProviderCatalog, ProviderSpec};
pub use providers::openai::OpenAIProvider;
pub use providers::{ChatCompletion, Provider, ProviderRegistry};
pub use types::*;
