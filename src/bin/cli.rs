//! CLI binary for tsuzi.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tsuzi::classifier::ApiClassifier;
use tsuzi::executor::{FunctionExecutor, SystemLauncher};
use tsuzi::llm::ApiLlm;
use tsuzi::pipeline::messages::SynthesizedAudio;
use tsuzi::registry::ManagerRegistry;
use tsuzi::search::SearchClient;
use tsuzi::session::{InputSource, Session, UserInput};
use tsuzi::stt::HttpTranscriber;
use tsuzi::tts::{HttpSynthesizer, NullSynthesizer, Synthesizer};
use tsuzi::AssistantConfig;

/// Tsuzi: local voice/text assistant with intent routing.
#[derive(Parser)]
#[command(name = "tsuzi", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start an interactive conversation.
    Chat,

    /// Print the aggregate state of all managers.
    Status,

    /// Write the default configuration to the given path.
    InitConfig {
        /// Destination file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Suppress noisy dependency logs by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tsuzi=info,reqwest=warn,hyper=warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        AssistantConfig::from_file(path)?
    } else {
        AssistantConfig::default()
    };

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config).await,
        Command::Status => run_status(config).await,
        Command::InitConfig { path } => {
            AssistantConfig::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

async fn run_chat(config: AssistantConfig) -> anyhow::Result<()> {
    println!("Tsuzi v{}", env!("CARGO_PKG_VERSION"));

    let llm: Arc<dyn tsuzi::llm::LanguageBackend> = Arc::new(ApiLlm::new(&config.llm)?);
    let classifier = Arc::new(ApiClassifier::new(&config.router)?);
    let registry = Arc::new(ManagerRegistry::new(
        config.managers.clone(),
        Some(Arc::clone(&llm)),
    ));
    let search = SearchClient::new(&config.managers.search)?;
    let executor = Arc::new(FunctionExecutor::new(
        registry,
        search,
        Arc::new(SystemLauncher),
    ));

    let synthesizer: Arc<dyn Synthesizer> = if config.tts.api_url.is_empty() {
        Arc::new(NullSynthesizer)
    } else {
        Arc::new(HttpSynthesizer::new(&config.tts)?)
    };

    // Playback is delegated to the OS side; the CLI just drains the
    // audio channel.
    let (audio_tx, mut audio_rx) = mpsc::channel::<SynthesizedAudio>(16);
    tokio::spawn(async move { while audio_rx.recv().await.is_some() {} });

    let audio_enabled = config.input.audio_enabled;
    let mut session = Session::new(
        config.clone(),
        classifier,
        llm,
        synthesizer,
        executor,
        audio_tx,
    );
    if audio_enabled {
        session = session.with_transcriber(Arc::new(HttpTranscriber::new(&config.stt)?));
        info!("audio input enabled; utterances arrive via the STT seam");
    }

    // Ctrl+C interrupts the current turn; a second press exits.
    let interrupter = session.interrupter();
    tokio::spawn(async move {
        let mut presses = 0u32;
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            presses += 1;
            if presses == 1 {
                info!("interrupting current turn (Ctrl+C again to quit)");
                interrupter.interrupt();
            } else {
                std::process::exit(0);
            }
        }
    });

    println!("\nReady! Type a message, or \"exit\" to quit.\n");
    let mut source = StdinSource::new();
    session.run(&mut source).await?;
    println!("Bye.");
    Ok(())
}

async fn run_status(config: AssistantConfig) -> anyhow::Result<()> {
    let registry = ManagerRegistry::new(config.managers.clone(), None);
    let snapshot = registry.snapshot().await;
    println!("{}", snapshot.spoken_summary());
    Ok(())
}

/// Input source reading lines from stdin.
struct StdinSource {
    lines: tokio::io::Lines<BufReader<tokio::io::Stdin>>,
}

impl StdinSource {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

#[async_trait::async_trait]
impl InputSource for StdinSource {
    async fn next_utterance(&mut self) -> tsuzi::Result<Option<UserInput>> {
        print!("> ");
        use std::io::Write;
        let _ = std::io::stdout().flush();
        match self.lines.next_line().await {
            Ok(Some(line)) => Ok(Some(UserInput::Text(line))),
            Ok(None) => Ok(None),
            Err(e) => Err(tsuzi::AssistantError::Io(e)),
        }
    }
}
