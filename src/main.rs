use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ragline::{
    AnsweredQuery, CancellationToken, ConfigError, OllamaClientBuilder, OllamaError, Orchestrator,
    PineconeError, PineconeRetrieverBuilder, PipelineConfig, PipelineError, Query, RetrievedChunk,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// ragline - retrieval-augmented question answering over a document index
#[derive(Parser)]
#[command(name = "ragline")]
#[command(about = "Answer questions from an indexed knowledge base with cited sources")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask(AskCommand),
    /// Answer questions interactively until `quit`, `exit`, Ctrl-C or end of input
    Chat(ChatCommand),
}

/// Answer a single question
#[derive(Parser)]
struct AskCommand {
    /// The question to answer
    #[arg(value_name = "QUESTION")]
    question: String,

    /// Session identifier attached to log events
    #[arg(short, long, value_name = "ID")]
    session: Option<String>,

    /// Print the validated answer as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    tuning: TuningArgs,
}

/// Start an interactive session
#[derive(Parser)]
struct ChatCommand {
    /// Session identifier attached to log events
    #[arg(short, long, value_name = "ID")]
    session: Option<String>,

    #[command(flatten)]
    tuning: TuningArgs,
}

/// Overrides for the `RAGLINE_*` settings
#[derive(Args, Default)]
struct TuningArgs {
    /// Maximum generate/validate attempts per question
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Number of chunks to retrieve
    #[arg(long, value_name = "N")]
    top_k: Option<usize>,
}

impl TuningArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
    }
}

/// One line typed into the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Quit,
    Blank,
    Question(&'a str),
}

impl<'a> ChatInput<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            Self::Blank
        } else if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            Self::Quit
        } else {
            Self::Question(trimmed)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // .env first so RUST_LOG from it applies
    ragline::config::load_env_files();
    ragline::telemetry::init("warn");

    let result = match &cli.command {
        Commands::Ask(cmd) => handle_ask(cmd).await,
        Commands::Chat(cmd) => handle_chat(cmd).await,
    };

    if let Err(e) = result {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Determines if an error is a user error (vs a pipeline or internal error).
///
/// User errors are empty questions and bad configuration. Everything the
/// pipeline reports while answering is treated as internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.to_string().contains("cannot be empty")
        || error.chain().any(|cause| {
            cause.is::<ConfigError>()
                || matches!(
                    cause.downcast_ref::<PineconeError>(),
                    Some(PineconeError::MissingSetting(_) | PineconeError::InvalidUrl(_))
                )
                || matches!(
                    cause.downcast_ref::<OllamaError>(),
                    Some(OllamaError::InvalidUrl(_))
                )
        })
}

/// Handles the ask command.
async fn handle_ask(cmd: &AskCommand) -> Result<()> {
    let query = build_query(&cmd.question, cmd.session.as_deref())?;
    let orchestrator = build_orchestrator(&cmd.tuning)?;

    let answered = orchestrator.answer_with_trace(&query).await?;

    let mut stdout = io::stdout().lock();
    if cmd.json {
        let rendered = serde_json::to_string_pretty(answered.answer())
            .context("Failed to serialize answer")?;
        writeln!(stdout, "{rendered}")?;
    } else {
        write_answer(&mut stdout, &answered)?;
    }
    Ok(())
}

/// Handles the chat command.
///
/// Ctrl-C cancels the question in flight and returns to the prompt. At the
/// prompt itself it ends the session, as does end of input.
async fn handle_chat(cmd: &ChatCommand) -> Result<()> {
    let orchestrator = build_orchestrator(&cmd.tuning)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Ask a question about the knowledge base. Type 'quit' or 'exit', or press Ctrl-C or Ctrl-D, to leave."
    );

    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let Some(line) = next_line_or_interrupt(&mut lines, ctrl_c())
            .await
            .context("Failed to read input")?
        else {
            println!();
            break;
        };

        let question = match ChatInput::parse(&line) {
            ChatInput::Quit => break,
            ChatInput::Blank => continue,
            ChatInput::Question(question) => question,
        };

        let mut query = Query::new(question);
        if let Some(session) = &cmd.session {
            query = query.with_session(session.as_str());
        }

        let token = CancellationToken::new();
        let watcher = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            })
        };

        let result = orchestrator.answer_cancellable(&query, &token).await;
        watcher.abort();

        match result {
            Ok(answered) => write_answer(&mut io::stdout().lock(), &answered)?,
            Err(PipelineError::Cancelled) => println!("(cancelled)"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}

/// Reads the next line, or `None` once input ends or `interrupt` resolves.
async fn next_line_or_interrupt<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        biased;
        () = interrupt => Ok(None),
        line = lines.next_line() => line,
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Validates the question text and attaches the session, if any.
fn build_query(question: &str, session: Option<&str>) -> Result<Query> {
    if question.trim().is_empty() {
        anyhow::bail!("Question cannot be empty");
    }

    let query = Query::new(question.trim());
    Ok(match session {
        Some(session) => query.with_session(session),
        None => query,
    })
}

/// Wires the Ollama and Pinecone adapters into an orchestrator.
fn build_orchestrator(tuning: &TuningArgs) -> Result<Orchestrator> {
    let mut config = PipelineConfig::from_env().context("Invalid RAGLINE_* setting")?;
    tuning.apply(&mut config);

    let ollama = Arc::new(
        OllamaClientBuilder::new()
            .build()
            .context("Failed to configure Ollama client")?,
    );
    let pinecone = PineconeRetrieverBuilder::new()
        .build()
        .context("Failed to configure Pinecone retriever")?;

    Orchestrator::builder()
        .vectorizer(ollama.clone())
        .generator(ollama)
        .retriever(Arc::new(pinecone))
        .config(config)
        .build()
        .context("Invalid pipeline configuration")
}

/// Prints the answer followed by the cited references.
fn write_answer(out: &mut impl Write, answered: &AnsweredQuery) -> io::Result<()> {
    writeln!(out, "ANSWER:")?;
    writeln!(out, "{}", answered.answer().answer())?;
    writeln!(out)?;
    writeln!(out, "REFERENCES:")?;

    let cited = answered.cited_chunks();
    if cited.is_empty() {
        writeln!(out, "(none)")?;
    }
    for chunk in cited {
        writeln!(out, "- {}", reference_line(chunk))?;
    }
    Ok(())
}

/// Formats one reference as `title [chunk id, document id]`.
///
/// Falls back to the document id when the chunk carries no `title`.
fn reference_line(chunk: &RetrievedChunk) -> String {
    let title = chunk
        .metadata()
        .get("title")
        .and_then(|value| value.as_str())
        .filter(|title| !title.trim().is_empty())
        .unwrap_or(chunk.source().as_str());

    format!(
        "{} [chunk {}, document {}]",
        title,
        chunk.id(),
        chunk.source()
    )
}
