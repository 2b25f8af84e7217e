//! Boss respawn timer bot for Revolt: CLI parsing, env-file loading, JSON
//! config validation, state restore from the data directory, and the
//! gateway event loop.

use std::{env, path::PathBuf, process, sync::Arc};

use respawn_api::{AuthToken, RevoltClient, DEFAULT_API_URL};
use respawn_bot::{
    config::BotConfig,
    dispatch::{PromptBook, RevoltDispatcher},
    durations::DurationStore,
    facade::Facade,
    handler::BotHandler,
    logging::init_logging,
    preferences::Preferences,
    status::StatusReporter,
    store::TimerStore,
    TimerEngine,
};
use tracing::{debug, error, info, warn};

/// The main entry point of the bot
#[tokio::main]
async fn main() {
    let args = env::args().skip(1).collect::<Vec<String>>();

    // Show help and exit if requested.
    if args.iter().any(|a| a == "--help") {
        print_help();
        process::exit(0);
    }

    // Show version and exit if requested.
    if args.iter().any(|a| a == "--version") {
        println!("respawn_bot {}", env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }

    let mut env_file: Option<String> = None;
    let mut token: Option<String> = None;
    let mut proxy: Option<String> = None;
    let mut data_dir: Option<PathBuf> = None;
    let mut verbose = false;
    let mut config_file: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--proxy" | "-x" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("[ERROR] --proxy requires a proxy URL.");
                    process::exit(1);
                }
                proxy = Some(args[i].clone());
            }
            "--env-file" | "-e" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("[ERROR] --env-file requires a file name.");
                    process::exit(1);
                }
                env_file = Some(args[i].clone());
            }
            "--token" | "-t" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("[ERROR] --token requires a token string.");
                    process::exit(1);
                }
                token = Some(args[i].clone());
            }
            "--data-dir" | "-d" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("[ERROR] --data-dir requires a directory.");
                    process::exit(1);
                }
                data_dir = Some(PathBuf::from(&args[i]));
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            val if val.starts_with('-') => {
                eprintln!("[ERROR] Unknown option '{val}'. See --help.");
                process::exit(1);
            }
            val => {
                if let Some(first) = &config_file {
                    eprintln!(
                        "[WARNING] Multiple config files specified. Using '{first}' and ignoring '{val}'."
                    );
                } else {
                    config_file = Some(val.to_string());
                }
            }
        }
        i += 1;
    }

    init_logging(verbose);

    // If we have an env file, load it; otherwise pick up ./.env when present.
    match env_file {
        Some(env_path) => {
            debug!(path = %env_path, "loading environment file");
            if let Err(e) = dotenvy::from_filename(&env_path) {
                error!(path = %env_path, error = %e, "failed to load .env file");
                process::exit(1);
            }
        }
        None => {
            if dotenvy::dotenv().is_ok() {
                debug!("loaded ./.env");
            }
        }
    }

    let Some(token) = token.or_else(|| env::var("REVOLT_TOKEN").ok()) else {
        error!("no bot token found; pass --token or set REVOLT_TOKEN");
        process::exit(1);
    };

    let mut config = match &config_file {
        Some(path) => match BotConfig::load(path) {
            Ok(config) => {
                debug!(path = %path, "validated config file");
                config
            }
            Err(e) => {
                error!(error = %e, "invalid configuration");
                process::exit(1);
            }
        },
        None => BotConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }

    let parser = match config.parser() {
        Ok(parser) => parser,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(1);
        }
    };

    let base_url = env::var("REVOLT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let ws_url = env::var("REVOLT_WS_URL").ok();
    let client = match RevoltClient::new(base_url, ws_url, proxy) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to build the Revolt client");
            process::exit(1);
        }
    };
    client.set_token(Some(AuthToken::Bot(token))).await;

    // Persistent state.
    info!(dir = %config.data_dir.display(), "loading saved state");
    let prefs = Arc::new(Preferences::open(&config.data_dir).await);
    let durations = DurationStore::open(&config.data_dir).await;
    let store = TimerStore::in_dir(&config.data_dir);

    let render = Arc::new(config.render());
    let prompts = PromptBook::default();
    let dispatcher =
        RevoltDispatcher::new(client.clone(), render.clone(), prefs.clone(), prompts.clone());

    let engine = TimerEngine::builder(Arc::new(dispatcher.clone()))
        .settings(config.engine_settings())
        .durations(durations)
        .store(&store)
        .build();

    // Saved timers come back before any command can reach the engine.
    // Late announcements only need REST, so the gateway can wait.
    let report = engine.restore_from(&store).await;
    if !report.dropped.is_empty() {
        warn!(bosses = ?report.dropped, "dropped timers that elapsed while offline");
    }

    let facade = Facade::new(engine.clone(), prefs.clone(), render.clone(), parser);
    let handler = BotHandler::new(facade, dispatcher.clone(), prompts, prefs.clone());
    client.event_handler(handler).await;

    debug!("starting Revolt event loop");
    if let Err(e) = client.start().await {
        error!(error = %e, "failed to start the Revolt gateway");
        process::exit(1);
    }

    if let Some(every) = config.status_interval() {
        StatusReporter::new(engine.clone(), prefs.clone(), render.clone()).spawn(dispatcher, every);
    }

    info!(prefix = %config.prefix, "bot is running, press Ctrl+C to stop");
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("shutting down");
            if let Err(e) = client.close_ws(Some("Shutting down")).await {
                warn!(error = %e, "error while closing the gateway");
            }
        }
        Err(e) => error!(error = %e, "error waiting for Ctrl+C"),
    }

    engine.flush().await;
    prefs.flush().await;
}

/// Print help text and usage examples
fn print_help() {
    println!(
        r#"Usage: respawn_bot [OPTION]... [CONFIG_FILE]
Run the boss respawn timer bot on Revolt.

CONFIG_FILE is an optional JSON file; every field has a default.

Options:
  -e, --env-file [FILE]        Load environment variables from a .env file.
  -t, --token [TOKEN]          Revolt bot token (defaults to $REVOLT_TOKEN).
  -x, --proxy [PROXY]          HTTP proxy URL for REST traffic.
  -d, --data-dir [DIR]         Directory for saved timers and settings.
  -v, --verbose                Log at debug level (RUST_LOG overrides).
      --help                   Display this help and exit.
      --version                Output version information and exit.

Environment:
  REVOLT_TOKEN                 Bot token.
  REVOLT_API_URL               REST endpoint (default https://api.revolt.chat).
  REVOLT_WS_URL                Gateway endpoint (default wss://ws.revolt.chat/).
  RUST_LOG                     Log filter, e.g. respawn_bot=debug.

Examples:
  respawn_bot -e .env
  respawn_bot -t MyToken config.json
  respawn_bot -d /var/lib/respawn -x http://proxy:8080 config.json
"#
    );
}
