mod app;
mod components;
mod event;
mod handler;
mod tui;
mod ui;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::info;

use workspace_tree::bridge::WatchBridge;
use workspace_tree::config::{AppConfig, TreeConfig, WatcherConfig};
use workspace_tree::fs::{LocalFs, LocalFsOptions};
use workspace_tree::logging::{self, LogTarget};
use workspace_tree::tree::TreeStore;
use workspace_tree::{Result, TreeError};

use crate::app::App;
use crate::event::{Event, EventHandler};
use crate::tui::{install_panic_hook, Tui};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Incremental,
    Debounced,
}

/// Lazily expanded, live-updating workspace tree.
#[derive(Parser, Debug)]
#[command(name = "wtree", version, about)]
struct Cli {
    /// Root directory (defaults to the configured path, else the current directory)
    path: Option<PathBuf>,

    /// Config file to load on top of the discovered ones
    #[arg(long)]
    config: Option<PathBuf>,

    /// Levels below the root's children to fetch up front
    #[arg(long)]
    depth: Option<usize>,

    /// Disable the filesystem watcher
    #[arg(long)]
    no_watcher: bool,

    /// How watcher changes are applied to the tree
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Print the visible rows as JSON and exit
    #[arg(long)]
    dump: bool,
}

impl Cli {
    fn overrides(&self) -> AppConfig {
        AppConfig {
            tree: TreeConfig {
                initial_depth: self.depth,
                ..Default::default()
            },
            watcher: WatcherConfig {
                enabled: self.no_watcher.then_some(false),
                mode: self.mode.map(|mode| match mode {
                    Mode::Incremental => "incremental".to_string(),
                    Mode::Debounced => "debounced".to_string(),
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));

    let target = cli
        .path
        .clone()
        .or_else(|| config.default_path().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let root = target.canonicalize().map_err(|_| {
        TreeError::InvalidPath(format!("{} does not exist", target.display()))
    })?;

    if cli.dump {
        dump(&config, &root).await
    } else {
        run(&config, root).await
    }
}

/// Load the root once and write its visible rows to stdout.
async fn dump(config: &AppConfig, root: &Path) -> Result<()> {
    logging::init(config.log_level(), LogTarget::Stderr)?;

    let (change_tx, _change_rx) = mpsc::unbounded_channel();
    let options = LocalFsOptions {
        watch: None,
        ..config.local_fs_options()
    };
    let store = TreeStore::new(Arc::new(LocalFs::new(options, change_tx)));
    store.load_root(root, config.initial_depth()).await?;

    let rows = store.visible_nodes();
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, rows.as_slice()).map_err(io::Error::from)?;
    writeln!(stdout)?;
    Ok(())
}

async fn run(config: &AppConfig, root: PathBuf) -> Result<()> {
    if let Some(log_file) = config.log_file() {
        if let Err(e) = logging::init(config.log_level(), LogTarget::File(&log_file)) {
            eprintln!("Warning: logging disabled: {}", e);
        }
    }

    let (change_tx, change_rx) = mpsc::unbounded_channel();
    let port = Arc::new(LocalFs::new(config.local_fs_options(), change_tx));
    let store = Arc::new(TreeStore::new(port));
    store.load_root(root.clone(), config.initial_depth()).await?;

    let bridge = WatchBridge::new(change_rx, config.apply_mode());
    bridge.ensure_attached(Arc::clone(&store));
    info!(root = %root.display(), mode = ?bridge.mode(), "explorer started");

    install_panic_hook();
    let mut tui = Tui::new(config.mouse_enabled())?;
    let mut events = EventHandler::new(Duration::from_millis(100));
    let mut app = App::new(store, events.sender(), config.initial_depth(), config.use_icons());
    app.watcher_active = config.watcher_enabled();

    let outcome = event_loop(&mut tui, &mut events, &mut app).await;

    bridge.detach();
    tui.restore()?;
    outcome
}

async fn event_loop(tui: &mut Tui, events: &mut EventHandler, app: &mut App) -> Result<()> {
    loop {
        tui.terminal_mut().draw(|frame| ui::render(app, frame))?;

        match events.next().await? {
            Event::Key(key) => handler::handle_key_event(app, key),
            Event::Mouse(mouse) => handler::handle_mouse_event(app, mouse),
            Event::Tick | Event::Resize(_, _) => {}
            Event::TreeError(message) => app.handle_tree_error(message),
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
