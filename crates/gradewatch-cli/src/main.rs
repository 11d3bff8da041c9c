use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use gradewatch::config::{
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_REFRESH_MAX_SECS, DEFAULT_REFRESH_MIN_SECS, DEFAULT_RETRY_DELAY,
    DEFAULT_STATE_FILE, DEFAULT_WEBDRIVER_URL,
};
use gradewatch::notify::DiscordWebhook;
use gradewatch::{
    BrowserPortal, Config, Portal, SeenStore, Watcher, extract_term_grades, parse_page_tables,
};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "gradewatch")]
#[command(about = "Watches the registration portal for newly released grades", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and poll the grade page until every course of the term has a grade
    Watch(WatchArgs),
    /// Extract the grades of a term from a saved grade page
    Extract {
        #[arg(short = 'f', long, help = "Path to the saved HTML grade page")]
        file: PathBuf,

        #[arg(long, env = "TARGET_TERM_TEXT", help = "Term header text to look for")]
        term: String,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct WatchArgs {
    #[arg(long, env = "LOGIN_URL", help = "Portal login page")]
    login_url: String,

    #[arg(long, env = "USER", help = "Portal username")]
    user: String,

    #[arg(long, env = "PASS", hide_env_values = true, help = "Portal password")]
    pass: String,

    #[arg(long, env = "TARGET_TERM_TEXT", help = "Term header text to watch")]
    term: String,

    #[arg(
        long,
        env = "REFRESH_MIN_SEC",
        default_value_t = DEFAULT_REFRESH_MIN_SECS,
        help = "Shortest wait between refreshes, in seconds"
    )]
    refresh_min: u64,

    #[arg(
        long,
        env = "REFRESH_MAX_SEC",
        default_value_t = DEFAULT_REFRESH_MAX_SECS,
        help = "Longest wait between refreshes, in seconds"
    )]
    refresh_max: u64,

    #[arg(
        long,
        env = "DISCORD_WEBHOOK",
        hide_env_values = true,
        help = "Discord webhook receiving notifications"
    )]
    discord_webhook: String,

    #[arg(
        long,
        env = "STATE_FILE",
        default_value = DEFAULT_STATE_FILE,
        help = "File recording grades already notified"
    )]
    state_file: PathBuf,

    #[arg(
        long,
        env = "WEBDRIVER_URL",
        default_value = DEFAULT_WEBDRIVER_URL,
        help = "ChromeDriver endpoint"
    )]
    webdriver_url: String,

    #[arg(long, env = "HEADLESS", help = "Run the browser without a window")]
    headless: bool,

    #[arg(
        long,
        default_value_t = DEFAULT_FAILURE_THRESHOLD,
        help = "Consecutive misses before logging in again"
    )]
    failure_threshold: u32,

    #[arg(
        long,
        default_value_t = DEFAULT_RETRY_DELAY.as_secs(),
        help = "Wait after a failed cycle, in seconds"
    )]
    retry_delay: u64,
}

impl From<WatchArgs> for Config {
    fn from(args: WatchArgs) -> Self {
        Config {
            login_url: args.login_url,
            username: args.user,
            password: args.pass,
            target_term: args.term,
            refresh_min_secs: args.refresh_min,
            refresh_max_secs: args.refresh_max,
            discord_webhook: args.discord_webhook,
            state_file: args.state_file,
            webdriver_url: args.webdriver_url,
            headless: args.headless,
            failure_threshold: args.failure_threshold,
            retry_delay: Duration::from_secs(args.retry_delay),
        }
    }
}

const ENV_FILE: &str = ".env";

/// `.env` beside the executable, then in the working directory.
fn env_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = env::current_exe().ok().as_deref().and_then(Path::parent) {
        candidates.push(dir.join(ENV_FILE));
    }
    candidates.push(PathBuf::from(ENV_FILE));
    candidates
}

/// Loads `path` over the process environment, so its values win over the
/// shell's (`USER` in particular). Returns `false` when there is no file.
fn load_env_file(path: &Path) -> Result<bool, dotenvy::Error> {
    match dotenvy::from_path_override(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

async fn watch(config: Config) {
    let seen = SeenStore::load(&config.state_file);

    let notifier = DiscordWebhook::new(&config.discord_webhook).unwrap_or_else(|e| {
        log::error!("Error creating Discord client: {}", e);
        process::exit(1);
    });

    let portal = BrowserPortal::connect(&config).await.unwrap_or_else(|e| {
        log::error!("Error opening browser: {}", e);
        process::exit(1);
    });

    let mut watcher = Watcher::new(&config, portal, notifier, seen);

    if let Err(e) = watcher.start().await {
        log::error!("Error logging in: {}", e);
        if let Err(e) = watcher.into_portal().close().await {
            log::warn!("Failed to close browser: {}", e);
        }
        process::exit(1);
    }

    log::info!(
        "Watching '{}', state kept in {:?}",
        config.target_term,
        watcher.seen().path()
    );
    watcher.run().await;

    if let Err(e) = watcher.into_portal().close().await {
        log::warn!("Failed to close browser: {}", e);
    }
}

#[tokio::main]
async fn main() {
    // before parsing, so clap's env fallbacks see the file's values
    let env_file = env_file_candidates()
        .into_iter()
        .find_map(|path| match load_env_file(&path) {
            Ok(true) => Some(Ok(path)),
            Ok(false) => None,
            Err(e) => Some(Err((path, e))),
        });

    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match env_file {
        Some(Ok(path)) => log::debug!("Loaded environment from {:?}", path),
        Some(Err((path, e))) => log::warn!("Failed to load {:?}: {}", path, e),
        None => log::debug!("No {} file found", ENV_FILE),
    }

    match cli.command {
        Commands::Watch(args) => {
            let config = Config::from(args).validate().unwrap_or_else(|e| {
                log::error!("Invalid configuration: {e}");
                process::exit(1);
            });

            log::info!("Starting grade watcher");
            watch(config).await;
        }

        Commands::Extract { file, term, format } => {
            let html = fs::read_to_string(&file).unwrap_or_else(|e| {
                log::error!("Error reading {:?}: {}", file, e);
                process::exit(1);
            });

            let tables = parse_page_tables(&html);
            log::debug!("Found {} table(s) in {:?}", tables.len(), file);

            let snapshot = extract_term_grades(&tables, &term).unwrap_or_else(|e| {
                log::error!("{}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&snapshot),
                OutputFormat::Text => println!("{}", snapshot),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_file_overrides_shell_user() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(ENV_FILE);
        fs::write(&path, "USER=portal-user\nPASS=secret\n").unwrap();

        // SAFETY: the only test in this binary that touches the environment
        unsafe { env::set_var("USER", "root") };

        assert!(load_env_file(&path).expect("Should load env file"));
        assert!(!load_env_file(&dir.path().join("missing.env")).unwrap());

        let cli = Cli::try_parse_from([
            "gradewatch",
            "watch",
            "--login-url",
            "https://reg.example.ac.th/login",
            "--term",
            "ภาคการศึกษาที่ 1/2568",
            "--discord-webhook",
            "https://discord.com/api/webhooks/1/token",
        ])
        .expect("Should parse");

        let Commands::Watch(args) = cli.command else {
            panic!("Expected watch command");
        };
        let config = Config::from(args).validate().expect("Should validate");
        assert_eq!(config.username, "portal-user");
        assert_eq!(config.password, "secret");
    }
}
