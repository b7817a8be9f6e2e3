/// Couch Player TV - console remote for a playback session
use clap::{Parser, Subcommand};
use couch_playback::OpenRequest;
use couch_tv::{app, input, App, Flow, Library, PlayerState, TvConfig, TvError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "couch-tv")]
#[command(about = "Couch Player TV front end", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "COUCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a title, reading remote input from stdin
    Play {
        /// Content id or version id
        #[arg(long)]
        content: String,
        /// Start position in seconds, skipping the saved resume point
        #[arg(long)]
        start: Option<u64>,
        /// Hold at the start position instead of playing
        #[arg(long)]
        paused: bool,
    },
    /// List titles in the library
    Catalog,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "couch_tv=info,couch_playback=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = TvConfig::load(cli.config.as_deref())?;
    let library = match &config.library.path {
        Some(path) => Library::load(path)?,
        None => Library::demo(),
    };

    match cli.command {
        Commands::Play {
            content,
            start,
            paused,
        } => play(&config, library, &content, start, paused).await?,
        Commands::Catalog => list(&library),
    }

    Ok(())
}

async fn play(
    config: &TvConfig,
    library: Library,
    content: &str,
    start: Option<u64>,
    paused: bool,
) -> anyhow::Result<()> {
    let source = library
        .find(content)
        .cloned()
        .ok_or_else(|| TvError::UnknownTitle(content.to_string()))?;

    let state = PlayerState::new(config, library)?;
    let reporter = tokio::spawn(app::report_events(state.session.subscribe()));

    let mut request = OpenRequest::new(source);
    if let Some(secs) = start {
        request = request.at(Duration::from_secs(secs));
    }
    if paused {
        request = request.paused();
    }

    let snapshot = state.session.open_and_wait(request).await?;
    tracing::info!("Session {} ready: {}", snapshot.generation, snapshot.state);
    println!("Type a remote key (up/down/left/right/ok/play/menu), 'status', or 'quit'.");

    let mut player = App::new(state.session.clone(), config.display.screen_width);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let event = match input::parse_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        if player.handle(event).await? == Flow::Exit {
            break;
        }
    }

    drop(player);
    state.shutdown().await;
    if let Err(e) = reporter.await {
        tracing::debug!("Event reporter: {}", e);
    }

    Ok(())
}

fn list(library: &Library) {
    for title in library.titles() {
        let versions: Vec<String> = title
            .entry
            .versions
            .iter()
            .map(|v| format!("{} [{}]", v.id, v.version_label()))
            .collect();
        println!(
            "{:<12} {:<24} {}",
            title.entry.content_id.as_str(),
            title.entry.title,
            versions.join(", ")
        );
    }
}
