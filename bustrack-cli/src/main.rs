use anyhow::{bail, Context, Result};
use bustrack_core::config::Config;
use bustrack_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use bustrack_core::{
    ChannelKey, FileSessionGuard, FixOptions, LocationStore, MemorySessionGuard, PathView,
    Position, Publisher, Session, SessionGuard, SimulatedFixSource, Subscriber,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bustrack")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a file of fixes through a publisher and print the tracked path
    Simulate {
        /// Channel key to share under
        #[arg(short, long)]
        key: String,

        /// JSON array of {latitude, longitude, timestamp}
        #[arg(short, long)]
        fixes: PathBuf,

        /// Share password stored in the session
        #[arg(long, default_value = "simulated")]
        password: String,

        /// Secret key stored in the session
        #[arg(long, default_value = "simulated")]
        secret_key: String,

        /// Deliver every fix instead of applying the configured thresholds
        #[arg(long)]
        no_filter: bool,

        /// Keep the session in memory instead of the session file
        #[arg(long)]
        ephemeral: bool,

        /// Leave the session stored after the replay, as if the app was evicted
        #[arg(long)]
        keep_session: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the stored share session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Show which channel the stored session shares to
    Show,
    /// Forget the stored session
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    let mut log_config = LogConfig::from_settings(&config.logging)?;
    if let Some(level) = &args.log_level {
        let level = level.parse::<LogLevel>().unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', using 'info'", level);
            LogLevel::Info
        });
        log_config = LogConfig {
            level,
            ..log_config
        };
    }
    if args.json_logs {
        log_config = log_config.json_format(true);
    }
    init_logging_with_config(log_config)?;
    bustrack_core::metrics::init_metrics();

    match args.command {
        Some(Command::Simulate {
            key,
            fixes,
            password,
            secret_key,
            no_filter,
            ephemeral,
            keep_session,
            json,
        }) => {
            let fixes = read_fixes(&fixes)?;
            let guard: Arc<dyn SessionGuard> = if ephemeral {
                Arc::new(MemorySessionGuard::new())
            } else {
                Arc::new(file_guard(&config)?)
            };
            let options = if no_filter {
                FixOptions::unfiltered()
            } else {
                FixOptions::from(&config.publisher)
            };
            let session = Session::new(&key, password, secret_key)?;
            let view = simulate(&config, guard, options, session, fixes, keep_session).await?;
            print_path(&view, json)?;
        }
        Some(Command::Session { action }) => {
            let guard = file_guard(&config)?;
            match action {
                SessionAction::Show => match guard.load()? {
                    Some(session) => println!("Sharing to channel {}", session.channel_key),
                    None => println!("No stored session"),
                },
                SessionAction::Clear => {
                    guard.clear()?;
                    println!("Session cleared");
                }
            }
        }
        Some(Command::Config) => {
            print!("{}", config.to_toml()?);
        }
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(expand(path))?,
        None => Config::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

fn file_guard(config: &Config) -> Result<FileSessionGuard> {
    let path = expand(&config.session.path);
    FileSessionGuard::new(&path)
        .with_context(|| format!("Failed to open session file {}", path.display()))
}

fn read_fixes(path: &Path) -> Result<Vec<Position>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixes from {}", path.display()))?;
    let fixes: Vec<Position> = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a JSON array of fixes", path.display()))?;
    if fixes.is_empty() {
        bail!("{} contains no fixes", path.display());
    }
    Ok(fixes)
}

/// Publish `fixes` under the session's key while a subscriber tracks it
async fn simulate(
    config: &Config,
    guard: Arc<dyn SessionGuard>,
    options: FixOptions,
    session: Session,
    fixes: Vec<Position>,
    keep_session: bool,
) -> Result<PathView> {
    let key: ChannelKey = session.channel_key.clone();
    let store = Arc::new(LocationStore::with_config(&config.store));
    let subscriber = Subscriber::new(store.clone(), &config.tracker);

    // Track before the first fix so the whole replay lands in the path
    let tracking = {
        let key = key.clone();
        tokio::spawn(async move { subscriber.track(key.as_str()).await })
    };
    while store.listener_count(&key)? == 0 && !tracking.is_finished() {
        tokio::task::yield_now().await;
    }

    let publisher = Publisher::with_options(store.clone(), guard, options);
    let source = SimulatedFixSource::new();
    let handle = publisher.start(session, Arc::new(source.clone()))?;

    let mut delivered = 0usize;
    for fix in fixes {
        if source.emit(fix)? {
            delivered += 1;
        }
    }
    info!(key = %key, delivered, "Replay finished");

    let view = tracking.await??;

    // Every accepted write reaches the view as either accepted or ignored
    let written = store.version(&key)?.unwrap_or(0);
    let settle = async {
        while view.accepted() + view.rejected() < written {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), settle).await.is_err() {
        warn!(key = %key, written, "Tracker did not observe every write");
    }

    if !keep_session {
        publisher.stop(&handle)?;
    }
    Ok(view)
}

fn print_path(view: &PathView, json: bool) -> Result<()> {
    let path = view.path();
    if json {
        let out = serde_json::json!({
            "key": view.key().as_str(),
            "path": path,
            "distance_meters": view.distance_meters(),
            "ignored": view.rejected(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for position in &path {
        println!("{}", position);
    }
    println!(
        "{} points, {:.1} m, {} ignored",
        path.len(),
        view.distance_meters(),
        view.rejected()
    );
    Ok(())
}
