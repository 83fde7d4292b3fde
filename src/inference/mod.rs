//! Inference Client: HTTP client for the local Ollama generate endpoint.
//!
//! This module handles all communication with the model server:
//! - One non-streaming `/api/generate` request per query
//! - Mapping transport and HTTP failures to [`InferenceError`]
//! - A lightweight reachability probe for startup diagnostics
//!
//! The orchestrator depends on the [`InferenceBackend`] trait rather than the
//! concrete client.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{InferenceBackend, InferenceClient};
pub use errors::InferenceError;
pub use types::{GenerateRequest, GenerateResponse, EMPTY_RESPONSE_FALLBACK};
