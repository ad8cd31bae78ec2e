//! The per-query state machine.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::time::{Instant, timeout};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::collaborators::{
    ChunkRetriever, EmbeddingError, GenerationError, QueryVectorizer, ResponseGenerator,
    RetrievalError,
};
use crate::composer::{PromptComposer, PromptContext, RenderedPrompt};
use crate::config::{ConfigError, PipelineConfig};
use crate::models::{Query, RawGeneration, RetrievedChunk, ValidatedAnswer};
use crate::resolver::{StructuredOutputResolver, ValidationFailure};

use super::attempt::{AttemptOutcome, AttemptRecord};
use super::cancel::CancellationToken;
use super::error::PipelineError;

/// A validated answer together with how it was obtained.
#[derive(Debug, Clone)]
pub struct AnsweredQuery {
    answer: ValidatedAnswer,
    attempts: Vec<AttemptRecord>,
    chunks: Vec<RetrievedChunk>,
}

impl AnsweredQuery {
    /// Returns the validated answer.
    pub fn answer(&self) -> &ValidatedAnswer {
        &self.answer
    }

    /// Returns every attempt, the last one being the accepted attempt.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Returns how many chunks the retriever returned.
    pub fn retrieved_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the chunks the answer cites, in citation order, each once.
    pub fn cited_chunks(&self) -> Vec<&RetrievedChunk> {
        let mut cited: Vec<&RetrievedChunk> = Vec::new();
        for id in self.answer.used_chunk_ids() {
            if cited.iter().any(|chunk| chunk.id() == id) {
                continue;
            }
            if let Some(chunk) = self.chunks.iter().find(|chunk| chunk.id() == id) {
                cited.push(chunk);
            }
        }
        cited
    }

    /// Consumes the trace, keeping only the answer.
    pub fn into_answer(self) -> ValidatedAnswer {
        self.answer
    }
}

/// Builder for constructing `Orchestrator` instances.
#[derive(Default)]
pub struct OrchestratorBuilder {
    vectorizer: Option<Arc<dyn QueryVectorizer>>,
    retriever: Option<Arc<dyn ChunkRetriever>>,
    generator: Option<Arc<dyn ResponseGenerator>>,
    config: Option<PipelineConfig>,
}

impl OrchestratorBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the query vectorizer.
    pub fn vectorizer(mut self, vectorizer: Arc<dyn QueryVectorizer>) -> Self {
        self.vectorizer = Some(vectorizer);
        self
    }

    /// Sets the chunk retriever.
    pub fn retriever(mut self, retriever: Arc<dyn ChunkRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Sets the response generator.
    pub fn generator(mut self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Sets the pipeline configuration. Defaults to `PipelineConfig::default()`.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `Orchestrator`.
    ///
    /// Fails if a collaborator is missing or the configuration is invalid.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Orchestrator {
            vectorizer: self
                .vectorizer
                .ok_or(ConfigError::MissingComponent("vectorizer"))?,
            retriever: self
                .retriever
                .ok_or(ConfigError::MissingComponent("retriever"))?,
            generator: self
                .generator
                .ok_or(ConfigError::MissingComponent("generator"))?,
            composer: PromptComposer::from_config(&config),
            resolver: StructuredOutputResolver::new(),
            config,
        })
    }
}

/// Answers queries by sequencing retrieval, composition, generation and
/// validation.
///
/// An `Orchestrator` holds no per-query state, so one instance can serve any
/// number of concurrent queries behind an `Arc`.
///
/// Timeouts: each collaborator call runs under its own time budget from
/// [`PipelineConfig`]. A timeout ends the query with the collaborator's error
/// kind and does not consume a validation attempt.
pub struct Orchestrator {
    vectorizer: Arc<dyn QueryVectorizer>,
    retriever: Arc<dyn ChunkRetriever>,
    generator: Arc<dyn ResponseGenerator>,
    composer: PromptComposer,
    resolver: StructuredOutputResolver,
    config: PipelineConfig,
}

/// Pipeline states. `DONE` and `FAILED` are the loop's return points.
enum State {
    Retrieving,
    Composing {
        attempt: u32,
        repair_directive: Option<String>,
    },
    Generating {
        attempt: u32,
        context: PromptContext,
        prompt: RenderedPrompt,
    },
    Validating {
        context: PromptContext,
        raw: RawGeneration,
    },
    Retrying {
        attempt: u32,
        failure: ValidationFailure,
    },
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Retrieving => "RETRIEVING",
            Self::Composing { .. } => "COMPOSING",
            Self::Generating { .. } => "GENERATING",
            Self::Validating { .. } => "VALIDATING",
            Self::Retrying { .. } => "RETRYING",
        }
    }
}

impl Orchestrator {
    /// Returns a builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Returns the configuration this orchestrator runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answers `query`, returning a validated answer or a terminal failure.
    pub async fn answer(&self, query: &Query) -> Result<ValidatedAnswer, PipelineError> {
        self.answer_with_trace(query)
            .await
            .map(AnsweredQuery::into_answer)
    }

    /// Answers `query`, also returning the attempt history.
    pub async fn answer_with_trace(&self, query: &Query) -> Result<AnsweredQuery, PipelineError> {
        let span = info_span!("query", session = query.session_id().unwrap_or("-"));
        self.run(query).instrument(span).await
    }

    /// Answers `query` with its attempt history unless `cancel` fires first.
    ///
    /// On cancellation the in-flight collaborator call is dropped, no further
    /// calls are issued, and partial attempt records are discarded.
    pub async fn answer_cancellable(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<AnsweredQuery, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("query cancelled by caller");
                Err(PipelineError::Cancelled)
            }
            result = self.answer_with_trace(query) => result,
        }
    }

    async fn run(&self, query: &Query) -> Result<AnsweredQuery, PipelineError> {
        let mut chunks: Vec<RetrievedChunk> = Vec::new();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut state = State::Retrieving;

        loop {
            debug!(state = state.name(), "entering state");

            state = match state {
                State::Retrieving => {
                    chunks = self.retrieve(query).await?;
                    State::Composing {
                        attempt: 1,
                        repair_directive: None,
                    }
                }
                State::Composing {
                    attempt,
                    repair_directive,
                } => {
                    let (context, prompt) =
                        self.composer.compose(query, &chunks, repair_directive.as_deref());
                    State::Generating {
                        attempt,
                        context,
                        prompt,
                    }
                }
                State::Generating {
                    attempt,
                    context,
                    prompt,
                } => {
                    let raw = self.generate(&prompt, attempt).await?;
                    State::Validating { context, raw }
                }
                State::Validating { context, raw } => {
                    let attempt = raw.attempt();
                    match self.resolver.resolve(&raw, &context) {
                        Ok(answer) => {
                            attempts.push(AttemptRecord::new(
                                raw,
                                &context,
                                AttemptOutcome::Accepted,
                            ));
                            info!(
                                attempts = attempt,
                                insufficient_context = answer.insufficient_context(),
                                "query answered"
                            );
                            return Ok(AnsweredQuery {
                                answer,
                                attempts,
                                chunks,
                            });
                        }
                        Err(failure) => {
                            attempts.push(AttemptRecord::new(
                                raw,
                                &context,
                                AttemptOutcome::Rejected(failure.clone()),
                            ));
                            if attempt >= self.config.max_attempts {
                                warn!(attempts = attempt, "validation attempts exhausted");
                                return Err(PipelineError::ValidationExhausted { attempts });
                            }
                            State::Retrying { attempt, failure }
                        }
                    }
                }
                State::Retrying { attempt, failure } => State::Composing {
                    attempt: attempt + 1,
                    repair_directive: Some(repair_directive(&failure)),
                },
            };
        }
    }

    async fn retrieve(&self, query: &Query) -> Result<Vec<RetrievedChunk>, PipelineError> {
        let embed_timeout = self.config.embed_timeout;
        let vector = timeout(embed_timeout, self.vectorizer.embed(query.text()))
            .await
            .map_err(|_| EmbeddingError::Timeout(embed_timeout))??;

        let retrieve_timeout = self.config.retrieve_timeout;
        let chunks = timeout(
            retrieve_timeout,
            self.retriever.search(&vector, self.config.top_k),
        )
        .await
        .map_err(|_| RetrievalError::Timeout(retrieve_timeout))??;

        debug!(
            dimensions = vector.len(),
            chunks = chunks.len(),
            "retrieval finished"
        );
        Ok(chunks)
    }

    async fn generate(
        &self,
        prompt: &RenderedPrompt,
        attempt: u32,
    ) -> Result<RawGeneration, PipelineError> {
        let generate_timeout = self.config.generate_timeout;
        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();

        let text = timeout(generate_timeout, self.generator.generate(prompt))
            .await
            .map_err(|_| GenerationError::Timeout(generate_timeout))??;

        let latency = clock.elapsed();
        debug!(attempt, latency_ms = latency.as_millis() as u64, "generation finished");
        Ok(RawGeneration::new(text, attempt, started_at, latency))
    }
}

/// Builds the repair directive for the attempt after `failure`.
///
/// Every failure reason is listed on its own line in `Kind: detail` form,
/// e.g. `- MissingField: answer`.
pub fn repair_directive(failure: &ValidationFailure) -> String {
    let mut directive = String::from("Your previous output was rejected for these reasons:\n");
    for reason in failure.reasons() {
        directive.push_str("- ");
        directive.push_str(&reason.to_string());
        directive.push('\n');
    }
    directive.push_str(
        "Return exactly one JSON object with the fields \"answer\" (string), \
\"used_chunk_ids\" (array of strings) and \"insufficient_context\" (boolean), \
citing only ids of chunks shown in <context>.",
    );
    directive
}
