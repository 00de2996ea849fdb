use anyhow::Result;
use clap::Parser;
use lightbox_core::client::{ClientHandle, ViewerClient, intent};
use lightbox_core::config::Config;
use lightbox_core::engine::Projection;
use lightbox_core::history::HistoryCoordinator;
use lightbox_core::model::GenerationParams;
use lightbox_core::nav::{EdgeDirection, NavIntent};
use lightbox_core::session::SessionState;
use lightbox_core::transport::http::HttpApi;
use lightbox_core::transport::mock::{MockArtifactStore, MockBackend, MockHistoryStore, MockPush};
use lightbox_core::transport::websocket::WsPush;
use lightbox_core::transport::{ArtifactStore, GenerationBackend, HistoryStore, PushEvents};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lightbox", about = "Feed viewer for an image generation service")]
struct Cli {
    /// Generation service base URL
    #[arg(long, env = "LIGHTBOX_SERVER")]
    server: Option<String>,

    /// Prompt to submit on startup
    #[arg(long, short = 'p')]
    prompt: Option<String>,

    /// Pull a random preset prompt from the service when none is given
    #[arg(long)]
    preset: bool,

    /// Requested artifact width
    #[arg(long)]
    width: Option<u32>,

    /// Requested artifact height
    #[arg(long)]
    height: Option<u32>,

    /// Reference image path to guide generation
    #[arg(long)]
    image: Option<String>,

    /// Poll cadence in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Run against in-memory mock transports (no service required)
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::from_env();
    if let Some(server) = cli.server.clone() {
        config.server = server;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }

    let backend: Arc<dyn GenerationBackend>;
    let artifacts: Arc<dyn ArtifactStore>;
    let history_store: Arc<dyn HistoryStore>;
    let push: Arc<dyn PushEvents>;
    if cli.mock {
        let mock = Arc::new(MockBackend::generative());
        backend = mock;
        artifacts = Arc::new(MockArtifactStore::new());
        history_store = Arc::new(MockHistoryStore::new());
        push = Arc::new(MockPush::unavailable());
    } else {
        let api = Arc::new(HttpApi::from_server(&config.server)?);
        push = Arc::new(WsPush::from_server(api.base())?);
        backend = api.clone();
        artifacts = api.clone();
        history_store = api;
    }

    let client = ViewerClient::new(
        backend.clone(),
        artifacts,
        history_store,
        push,
        &config,
    );
    let handle = client.handle();
    let history = client.history();
    let mut projection_rx = client.projection_rx();
    let runner = tokio::spawn(client.run());

    let printer = tokio::spawn(async move {
        while projection_rx.changed().await.is_ok() {
            let projection = projection_rx.borrow_and_update().clone();
            print_projection(&projection);
        }
    });

    if let Some(prompt) = startup_prompt(&cli, backend.as_ref()).await {
        let mut params = GenerationParams::new(prompt);
        if let (Some(width), Some(height)) = (cli.width, cli.height) {
            params = params.with_size(width, height);
        }
        if let Some(image) = cli.image.clone() {
            params = params.with_source_image(image);
        }
        handle.submit(params);
    }

    repl(&handle, &history).await?;

    handle.shutdown();
    let _ = runner.await;
    printer.abort();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LIGHTBOX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn startup_prompt(cli: &Cli, backend: &dyn GenerationBackend) -> Option<String> {
    if let Some(prompt) = cli.prompt.clone() {
        return Some(prompt);
    }
    if !cli.preset {
        return None;
    }
    match backend.preset_prompt().await {
        Ok(Some(prompt)) => Some(prompt),
        Ok(None) => {
            eprintln!("no preset prompts available");
            None
        }
        Err(err) => {
            eprintln!("preset prompt fetch failed: {err}");
            None
        }
    }
}

async fn repl(handle: &ClientHandle, history: &Arc<HistoryCoordinator>) -> Result<()> {
    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        match command {
            "q" | "quit" => break,
            "n" | "next" => handle.navigate(NavIntent::Next),
            "b" | "prev" => handle.navigate(NavIntent::Previous),
            "first" => handle.navigate(NavIntent::First),
            "last" => handle.navigate(NavIntent::Last),
            "j" | "jump" => match parts.next().and_then(|raw| raw.parse::<usize>().ok()) {
                Some(index) => handle.navigate(NavIntent::Jump(index)),
                None => println!("usage: jump <index>"),
            },
            "d" | "delete" => handle.delete_current(),
            "stop" => handle.stop(),
            "go" | "resume" => handle.resume(),
            "more" => {
                let count = parts
                    .next()
                    .and_then(|raw| raw.parse::<u32>().ok())
                    .unwrap_or(10);
                handle.request_more(count);
            }
            "new" => {
                let prompt = line.trim_start_matches("new").trim();
                if prompt.is_empty() {
                    println!("usage: new <prompt>");
                } else {
                    handle.submit(GenerationParams::new(prompt));
                }
            }
            "hint" => handle.dismiss_hint(),
            "history" => match history.list().await {
                Ok(records) if records.is_empty() => println!("no history records"),
                Ok(records) => {
                    for record in records {
                        println!(
                            "  {}  {} artifact(s)  {}",
                            record.id, record.artifact_count, record.prompt
                        );
                    }
                }
                Err(err) => println!("history listing failed: {err}"),
            },
            "switch" => match parts.next() {
                Some(id) => handle.switch_history(id),
                None => println!("usage: switch <record-id>"),
            },
            "rm" => match parts.next() {
                Some(id) => handle.delete_record(id),
                None => println!("usage: rm <record-id>"),
            },
            "help" => print_help(),
            other => match intent::for_key(other) {
                Some(nav) => handle.navigate(nav),
                None => println!("unknown command '{other}'; try 'help'"),
            },
        }
    }
    Ok(())
}

fn print_help() {
    println!(
        "commands: n/b move, first/last, jump <i>, d delete, stop, go, more [n], \
         new <prompt>, history, switch <id>, rm <id>, hint, q"
    );
}

fn print_projection(projection: &Projection) {
    let state = match projection.session_state {
        SessionState::Idle => "idle",
        SessionState::Generating => "generating",
        SessionState::Stopped => "stopped",
        SessionState::Superseded => "superseded",
    };
    let position = match projection.cursor {
        Some(cursor) => format!("{}/{}", cursor + 1, projection.feed_len),
        None => format!("-/{}", projection.feed_len),
    };
    let mut line = format!("[{state}] {position} ({} generated)", projection.generated_count);
    if let Some(current) = &projection.current {
        line.push_str(&format!("  {current}"));
    }
    if let Some(edge) = projection.last_edge {
        let note = match (edge.direction, edge.still_generating) {
            (EdgeDirection::Forward, true) => "generating more...",
            (EdgeDirection::Forward, false) => "no more artifacts",
            (EdgeDirection::Backward, _) => "at the first artifact",
        };
        line.push_str(&format!("  <{note}>"));
    }
    if projection.hint_visible {
        line.push_str("  (more artifacts below - navigate with n)");
    }
    if let Some(err) = &projection.last_error {
        line.push_str(&format!("  !{err}"));
    }
    println!("{line}");
}
