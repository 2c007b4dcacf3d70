use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use avatar_contracts::artifacts::{Artifact, SavedAvatar};
use avatar_contracts::events::{emit_event, payload, EventKind, EventWriter};
use avatar_contracts::history::HistoryCache;
use avatar_contracts::storage::JsonFileStore;
use avatar_contracts::svg::extract_svg;
use avatar_engine::config::{http_bind_from_env, MISSING_CREDENTIAL_MESSAGE};
use avatar_engine::{
    router, AttemptOutcome, CancelFlag, EndpointClient, EndpointState, FallbackGenerator,
    GalleryConfig, GalleryView, GeminiProvider, GenerationConfig, GeneratorSession,
    SupabaseGallery, GENERATE_AVATAR_PATH,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_HISTORY_PATH: &str = ".avatar/history.json";

#[derive(Debug, Parser)]
#[command(name = "avatar-rs", version, about = "Geometric SVG avatar generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve GET /api/generate-avatar.
    Serve(ServeArgs),
    /// Generate one avatar, record it in history, and write it to disk.
    Generate(GenerateArgs),
    History(HistoryArgs),
    Gallery(GalleryArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct HistoryStoreArgs {
    #[arg(long, default_value = DEFAULT_HISTORY_PATH)]
    history: PathBuf,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Base URL of a running server; generates in-process when omitted.
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[command(flatten)]
    store: HistoryStoreArgs,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[command(subcommand)]
    action: HistoryAction,
    #[arg(long, global = true, default_value = DEFAULT_HISTORY_PATH)]
    history: PathBuf,
}

#[derive(Debug, Subcommand)]
enum HistoryAction {
    List,
    /// Print an entry, or write it to --out.
    Show {
        index: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Parser)]
struct GalleryArgs {
    #[command(subcommand)]
    action: GalleryAction,
    /// Owner id; falls back to SUPABASE_USER_ID.
    #[arg(long, global = true)]
    owner: Option<String>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum GalleryAction {
    List,
    Delete {
        id: i64,
    },
    Save {
        file: PathBuf,
    },
    Download {
        id: i64,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("avatar-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Generate(args) => run_generate(args),
        Command::History(args) => run_history(args),
        Command::Gallery(args) => run_gallery(args),
    }
}

fn event_writer(path: Option<PathBuf>) -> Option<EventWriter> {
    path.map(|path| EventWriter::new(path, Uuid::new_v4().to_string()))
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    let config = GenerationConfig::from_env()?;
    let bind = args.bind.unwrap_or_else(http_bind_from_env);
    let events = event_writer(args.events);
    if config.api_key.is_none() {
        eprintln!("warning: {MISSING_CREDENTIAL_MESSAGE}; {GENERATE_AVATAR_PATH} will answer 500");
    }
    let models: Vec<String> = config.models.iter().map(str::to_string).collect();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        let local = listener
            .local_addr()
            .context("failed to read listener address")?;
        emit_event(
            events.as_ref(),
            EventKind::ServerStarted,
            payload(json!({ "bind": local.to_string(), "models": models })),
        );
        println!("avatar-rs listening on http://{local}{GENERATE_AVATAR_PATH}");

        let state = EndpointState::new(config).with_events(events);
        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server terminated")?;
        Ok::<_, anyhow::Error>(0)
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        eprintln!("failed to listen for ctrl-c: {err}");
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let events = event_writer(args.events);
    let store = JsonFileStore::new(&args.store.history);
    let mut session = GeneratorSession::open(store, events.clone());
    if let Some(reason) = session.history().load_error() {
        eprintln!("warning: {reason}");
    }

    let endpoint = args.endpoint;
    session.generate_with(|| match endpoint.as_deref() {
        Some(url) => EndpointClient::new(url)?.fetch_avatar(),
        None => generate_in_process(events),
    })?;
    if let Some(message) = session.error() {
        bail!("{message}");
    }

    if let Some(path) = session.download_current(&args.out)? {
        println!("wrote {}", path.display());
    }
    println!(
        "history: {} of {} entries in {}",
        session.history().len(),
        avatar_contracts::MAX_HISTORY,
        args.store.history.display()
    );
    Ok(0)
}

fn generate_in_process(events: Option<EventWriter>) -> Result<Artifact> {
    let config = GenerationConfig::from_env()?;
    let api_key = config.credential()?;
    let provider = GeminiProvider::new(api_key, config.api_base.as_deref())?;
    let generator =
        FallbackGenerator::new(config.models.clone(), config.attempt_timeout).with_events(events);

    let generation = generator.generate(&provider, config.style.prompt(), &CancelFlag::new())?;
    for attempt in &generation.attempts {
        if let AttemptOutcome::Failure(reason) = &attempt.outcome {
            eprintln!("model {} failed: {reason}", attempt.model_id);
        }
    }
    println!("generated with {}", generation.model_id);
    Ok(Artifact::now(generation.svg))
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let store = JsonFileStore::new(&args.history);
    match args.action {
        HistoryAction::List => {
            let history = HistoryCache::load(store);
            if let Some(reason) = history.load_error() {
                eprintln!("warning: {reason}");
            }
            if history.is_empty() {
                println!("no history in {}", args.history.display());
            }
            for (index, artifact) in history.entries().iter().enumerate() {
                println!("{index}\t{}", artifact_line(artifact));
            }
        }
        HistoryAction::Show { index, out } => {
            let mut session = GeneratorSession::open(store, None);
            let svg = session.select_history(index)?.content.clone();
            match out {
                Some(dir) => {
                    if let Some(path) = session.download_current(&dir)? {
                        println!("wrote {}", path.display());
                    }
                }
                None => println!("{svg}"),
            }
        }
    }
    Ok(0)
}

fn artifact_line(artifact: &Artifact) -> String {
    let created = artifact
        .created_at_utc()
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| artifact.created_at.to_string());
    format!("{created}\t{} bytes", artifact.content.len())
}

fn saved_line(avatar: &SavedAvatar) -> String {
    format!(
        "{}\t{}\t{} bytes",
        avatar.id,
        avatar.created_at.to_rfc3339(),
        avatar.svg.len()
    )
}

fn run_gallery(args: GalleryArgs) -> Result<i32> {
    let config = GalleryConfig::from_env()?;
    let owner = args
        .owner
        .or_else(|| config.user_id.clone())
        .context("gallery owner unknown; pass --owner or set SUPABASE_USER_ID")?;
    let store = SupabaseGallery::new(config)?;
    let mut view = GalleryView::new(store, owner, event_writer(args.events));

    match args.action {
        GalleryAction::List => {
            let avatars = view.refresh()?;
            if avatars.is_empty() {
                println!("gallery is empty");
            }
            for avatar in avatars {
                println!("{}", saved_line(avatar));
            }
        }
        GalleryAction::Delete { id } => {
            view.refresh()?;
            view.delete(id)?;
            println!("deleted avatar {id}");
        }
        GalleryAction::Save { file } => {
            let svg = read_svg_file(&file)?;
            let saved = view.save(&svg)?;
            println!("saved avatar {}", saved.id);
        }
        GalleryAction::Download { id, out } => {
            view.refresh()?;
            let path = view.download(id, &out)?;
            println!("wrote {}", path.display());
        }
    }
    Ok(0)
}

fn read_svg_file(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let svg = extract_svg(&raw).with_context(|| format!("{} holds no SVG", path.display()))?;
    Ok(svg.to_string())
}

#[cfg(test)]
mod tests {
    use super::{artifact_line, read_svg_file, Cli, Command, GalleryAction, HistoryAction};
    use avatar_contracts::artifacts::Artifact;
    use clap::Parser;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn history_path_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "avatar-rs",
            "history",
            "show",
            "2",
            "--history",
            "/tmp/h.json",
        ])
        .unwrap();
        let Command::History(args) = cli.command else {
            panic!("expected history command");
        };
        assert!(matches!(args.action, HistoryAction::Show { index: 2, out: None }));
        assert_eq!(args.history, PathBuf::from("/tmp/h.json"));
    }

    #[test]
    fn generate_defaults_to_in_process_and_local_history() {
        let cli = Cli::try_parse_from(["avatar-rs", "generate"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate command");
        };
        assert_eq!(args.endpoint, None);
        assert_eq!(args.out, PathBuf::from("."));
        assert_eq!(args.store.history, PathBuf::from(".avatar/history.json"));
    }

    #[test]
    fn gallery_subcommands_parse_ids_and_owner() {
        let cli = Cli::try_parse_from(["avatar-rs", "gallery", "delete", "42", "--owner", "u-1"])
            .unwrap();
        let Command::Gallery(args) = cli.command else {
            panic!("expected gallery command");
        };
        assert!(matches!(args.action, GalleryAction::Delete { id: 42 }));
        assert_eq!(args.owner.as_deref(), Some("u-1"));
        assert!(Cli::try_parse_from(["avatar-rs", "gallery", "delete", "abc"]).is_err());
    }

    #[test]
    fn artifact_line_shows_utc_time_and_size() {
        let line = artifact_line(&Artifact::new("<svg></svg>", 0));
        assert_eq!(line, "1970-01-01T00:00:00+00:00\t11 bytes");
    }

    #[test]
    fn read_svg_file_strips_surrounding_text() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("cat.txt");
        fs::write(&path, "notes\n<svg><circle r=\"4\"/></svg>\ntrailer").unwrap();
        assert_eq!(read_svg_file(&path).unwrap(), "<svg><circle r=\"4\"/></svg>");

        fs::write(&path, "no markup").unwrap();
        assert!(read_svg_file(&path).is_err());
    }
}
