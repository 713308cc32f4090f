use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use chatsync_core::memory::MemoryBackend;
use chatsync_core::{
    AppAction, AppReconciler, AppState, AppUpdate, FfiApp, RealtimeChannel, RealtimeTopic,
    ViewportMetrics,
};
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "chatsync")]
#[command(about = "Drive the conversation engine against an in-memory backend")]
struct Cli {
    /// Data directory (chatsync_config.json is read from here)
    #[arg(long, default_value = ".chatsync", env = "CHATSYNC_DATA_DIR")]
    data_dir: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the default config file
    Config,

    /// Open a seeded conversation, page back, send, and receive a reply
    Demo {
        /// Messages already in the conversation
        #[arg(long, default_value_t = 30)]
        history: usize,

        /// Backend page size
        #[arg(long, default_value_t = 10)]
        page_size: usize,

        /// Text to send as the viewer
        #[arg(long, default_value = "hello")]
        text: String,

        /// Print every state snapshot as a JSON line while running
        #[arg(long)]
        follow: bool,
    },
}

const VIEWER: &str = "me";
const PEER: &str = "peer";
const CONVERSATION: &str = "demo";
const WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("create data dir {}", cli.data_dir.display()))?;

    match &cli.cmd {
        Command::Config => {
            println!("{}", chatsync_core::default_config_json());
            Ok(())
        }
        Command::Demo {
            history,
            page_size,
            text,
            follow,
        } => cmd_demo(&cli, *history, *page_size, text, *follow).await,
    }
}

struct PrintReconciler;

impl AppReconciler for PrintReconciler {
    fn reconcile(&self, update: AppUpdate) {
        let AppUpdate::FullState(state) = update;
        match serde_json::to_string(&state) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(%e, "snapshot not serializable"),
        }
    }
}

async fn wait_for(
    app: &FfiApp,
    what: &str,
    f: impl Fn(&AppState) -> bool,
) -> anyhow::Result<AppState> {
    let start = Instant::now();
    loop {
        let state = app.state();
        if f(&state) {
            return Ok(state);
        }
        if start.elapsed() > WAIT {
            return Err(anyhow!("timed out waiting for {what}"));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn message_count(state: &AppState) -> usize {
    state.conversation.as_ref().map_or(0, |c| c.messages.len())
}

async fn cmd_demo(
    cli: &Cli,
    history: usize,
    page_size: usize,
    text: &str,
    follow: bool,
) -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new(page_size));
    let now = chatsync_core::now_millis();
    backend.seed_history(CONVERSATION, VIEWER, PEER, history, now - 60_000);

    let data_dir = cli.data_dir.to_string_lossy().into_owned();
    let app = FfiApp::new(data_dir, VIEWER.to_string(), backend.clone(), backend.clone());
    if follow {
        app.listen_for_updates(Box::new(PrintReconciler));
    }

    app.dispatch(AppAction::OpenConversation {
        conversation_id: CONVERSATION.to_string(),
    });
    let state = wait_for(&app, "initial load", |s| {
        s.conversation.as_ref().is_some_and(|c| !c.loading)
    })
    .await?;
    if let Some(toast) = state.toast {
        return Err(anyhow!("open failed: {toast}"));
    }

    // Pretend the list is 40 units per row and the user flung to the top.
    let loaded = message_count(&state);
    let extent = loaded as f64 * 40.0;
    app.dispatch(AppAction::ViewportScrolled {
        viewport: ViewportMetrics {
            offset: 0.0,
            content_extent: extent,
        },
    });
    if state.conversation.as_ref().is_some_and(|c| c.has_more) {
        let paged = wait_for(&app, "older page", |s| {
            s.toast.is_some()
                || s.conversation
                    .as_ref()
                    .is_some_and(|c| c.scroll_anchor.is_some())
        })
        .await?;
        let new_extent = message_count(&paged) as f64 * 40.0;
        if let Some(offset) = app.restore_scroll_anchor(new_extent) {
            tracing::info!(offset, "scroll restored");
        }
    }

    app.dispatch(AppAction::UpdateDraft {
        text: text.to_string(),
    });
    app.dispatch(AppAction::SendMessage);
    let sent = wait_for(&app, "send confirmation", |s| {
        s.toast.is_some()
            || s.conversation.as_ref().is_some_and(|c| {
                c.messages
                    .last()
                    .is_some_and(|m| m.is_mine && m.text == text && !m.id.starts_with("tmp-"))
            })
    })
    .await?;
    if let Some(toast) = sent.toast {
        return Err(anyhow!("send failed: {toast}"));
    }

    backend
        .broadcast(&RealtimeTopic::typing(CONVERSATION), "typing", PEER)
        .map_err(|e| anyhow!("typing broadcast: {e}"))?;
    wait_for(&app, "peer typing", |s| {
        s.conversation.as_ref().is_some_and(|c| c.peer_is_typing)
    })
    .await?;
    let reply = backend.deliver_peer_message(CONVERSATION, PEER, &format!("re: {text}"));
    let state = wait_for(&app, "reply", |s| {
        s.conversation
            .as_ref()
            .is_some_and(|c| c.messages.iter().any(|m| m.id == reply.id))
    })
    .await?;

    let conversation = state
        .conversation
        .as_ref()
        .context("conversation closed unexpectedly")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "conversation_id": conversation.conversation_id,
            "messages": conversation.messages.len(),
            "has_more": conversation.has_more,
            "peer_is_typing": conversation.peer_is_typing,
            "requested_cursors": backend.requested_cursors(),
            "typing_broadcasts": backend.typing_broadcasts().len(),
            "state": state,
        }))?
    );

    app.dispatch(AppAction::CloseConversation);
    Ok(())
}
