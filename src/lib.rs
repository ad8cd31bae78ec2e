pub mod collaborators;
pub mod composer;
pub mod config;
pub mod models;
pub mod ollama;
pub mod orchestrator;
pub mod pinecone;
pub mod resolver;
pub mod telemetry;

pub use collaborators::{
    ChunkRetriever, EmbeddingError, GenerationError, GenerationErrorKind, QueryVectorizer,
    ResponseGenerator, RetrievalError,
};
pub use composer::{PromptComposer, PromptContext, RenderedPrompt};
pub use config::{ConfigError, PipelineConfig};
pub use models::{
    ChunkId, ChunkMetadata, DocumentId, Query, RawGeneration, RetrievedChunk, ValidatedAnswer,
};
pub use ollama::{OllamaClient, OllamaClientBuilder, OllamaError};
pub use orchestrator::{
    AnsweredQuery, AttemptOutcome, AttemptRecord, CancellationToken, ErrorKind, Orchestrator,
    OrchestratorBuilder, PipelineError,
};
pub use pinecone::{PineconeError, PineconeRetriever, PineconeRetrieverBuilder};
pub use resolver::{FailureKind, FailureReason, StructuredOutputResolver, ValidationFailure};
