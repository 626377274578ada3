use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use relay_core::{AskRequest, DocumentId, IngestRequest, RagEngine, VectorIndex};
use relay_ollama::OllamaClient;
use relay_rag::{LocalVectorIndex, QdrantIndex, RagConfig, RagOrchestrator};

#[derive(Parser)]
#[command(name = "ragrelay")]
#[command(about = "Retrieval-augmented answers over Ollama and Qdrant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the collection if it does not exist yet
    Init,
    /// Embed and store a passage
    Ingest {
        #[arg(short, long)]
        text: String,
        /// Unsigned integer or UUID; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Answer a question from the stored passages
    Ask {
        #[arg(short, long)]
        question: String,
    },
    /// Show collection and model statistics
    Stats,
    /// Interactive ingest/ask loop
    Session {
        /// Keep passages in process memory instead of Qdrant
        #[arg(long)]
        in_memory: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build an orchestrator over `index` and ensure its collection
///
/// The collection is ensured before the engine is handed out, so every
/// command works against a fresh index.
async fn ready_engine<V>(
    ollama: Arc<OllamaClient>,
    index: Arc<V>,
    config: RagConfig,
) -> Result<Box<dyn RagEngine>>
where
    V: VectorIndex + 'static,
{
    let engine = RagOrchestrator::new(ollama.clone(), index, ollama, config);
    engine.initialize().await?;
    Ok(Box::new(engine))
}

/// Wire the Ollama client and the chosen index into an orchestrator
async fn build_engine(in_memory: bool) -> Result<Box<dyn RagEngine>> {
    let ollama = Arc::new(OllamaClient::from_env()?);
    let config = RagConfig::from_env()?;

    if in_memory {
        return ready_engine(ollama, Arc::new(LocalVectorIndex::new()), config).await;
    }
    let index = QdrantIndex::new(&config.qdrant_url, config.qdrant_api_key.clone())?;
    ready_engine(ollama, Arc::new(index), config).await
}

fn display_help() {
    println!("{}", "Commands:".cyan().bold());
    println!("  {}  store a passage", "ingest <text>".green());
    println!("  {}  answer from stored passages", "ask <question>".green());
    println!("  {}  show collection statistics", "stats".green());
    println!("  {}  leave the session", "exit".green());
}

async fn run_session(engine: &dyn RagEngine) -> Result<()> {
    println!("{}", "RAG relay session".blue().bold());
    println!("{}", "Type 'help' for commands".dimmed());

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        stdout.write_all(b"relay> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        let outcome = match command.to_lowercase().as_str() {
            "exit" | "quit" => break,
            "help" => {
                display_help();
                continue;
            }
            "ingest" => engine
                .ingest(IngestRequest::new(rest))
                .await
                .and_then(|r| Ok(serde_json::to_string(&r)?)),
            "ask" => engine
                .ask(AskRequest::new(rest))
                .await
                .and_then(|r| Ok(serde_json::to_string(&r)?)),
            "stats" => engine
                .stats()
                .await
                .and_then(|v| Ok(serde_json::to_string_pretty(&v)?)),
            other => {
                println!("{} unknown command '{}'", "✗".red(), other);
                continue;
            }
        };

        match outcome {
            Ok(body) => println!("{}", body),
            Err(e) => {
                warn!(stage = ?e.stage(), "request failed");
                println!("{} {}", "✗".red(), e);
            }
        }
    }

    println!("{}", "Goodbye!".green());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            build_engine(false).await?;
            println!("{} collection ready", "✓".green());
        }
        Commands::Ingest { text, id } => {
            let engine = build_engine(false).await?;
            let mut request = IngestRequest::new(text);
            if let Some(id) = id {
                request = request.with_id(id.parse::<DocumentId>()?);
            }
            let response = engine.ingest(request).await?;
            println!("{}", serde_json::to_string(&response)?);
        }
        Commands::Ask { question } => {
            let engine = build_engine(false).await?;
            let response = engine.ask(AskRequest::new(question)).await?;
            println!("{}", serde_json::to_string(&response)?);
        }
        Commands::Stats => {
            let engine = build_engine(false).await?;
            let stats = engine.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Session { in_memory } => {
            let engine = build_engine(in_memory).await?;
            run_session(engine.as_ref()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_ollama::OllamaConfig;

    #[tokio::test]
    async fn test_engine_is_ready_on_a_fresh_index() {
        let ollama = Arc::new(OllamaClient::new(OllamaConfig::new("http://127.0.0.1:1")).unwrap());
        let index = Arc::new(LocalVectorIndex::new());
        let config = RagConfig::default().with_collection("fresh").with_dimension(3);

        let engine = ready_engine(ollama, index.clone(), config).await.unwrap();

        assert_eq!(index.count("fresh").await.unwrap(), 0);
        let stats = engine.stats().await.unwrap();
        assert_eq!(stats["documents"], 0);
        assert_eq!(stats["collection"], "fresh");
    }
}
