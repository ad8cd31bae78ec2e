mod answer;
mod chunk;
mod generation;
mod ids;
mod query;

pub use answer::ValidatedAnswer;
pub use chunk::{ChunkMetadata, RetrievedChunk};
pub use generation::RawGeneration;
pub use ids::{ChunkId, DocumentId};
pub use query::Query;
