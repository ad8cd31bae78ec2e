/// Pinecone query client module.
///
/// This module provides the chunk retriever backed by a Pinecone-compatible
/// index query endpoint.
mod client;

pub use client::{PineconeError, PineconeRetriever, PineconeRetrieverBuilder};
