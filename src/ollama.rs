/// Ollama HTTP client module.
///
/// This module provides an async HTTP client for the Ollama API that serves as
/// both the query vectorizer and the response generator, including error
/// mapping, retry logic, and timeout configuration.
mod client;

pub use client::{OllamaClient, OllamaClientBuilder, OllamaError, RetryPolicy, retry_with_backoff};
