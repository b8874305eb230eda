//! Identify CLI: resolve contact facts against a local contact database.
//!
//! Usage:
//!   identify identify [--email E] [--phone P] [--db path]
//!   identify identify --json '{"email": "...", "phoneNumber": 123}'
//!   identify show <ID>

use clap::{Parser, Subcommand};
use identify::{
    Config, ContactId, IdentifyPayload, IdentifyRequest, IdentityApi, IdentityEngine, OpenStore,
    ReconcileError, SqliteStore,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(
    name = "identify",
    version,
    about = "Reconcile customer contacts that share an email or phone"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level written to stderr (error, warn, info, debug, trace, off)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an email and/or phone to its consolidated identity
    Identify {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Raw request body instead of --email/--phone
        #[arg(long, conflicts_with_all = ["email", "phone"])]
        json: Option<String>,
    },
    /// Show the cluster a contact belongs to
    Show {
        /// Contact id
        id: i64,
    },
}

/// Exit codes: 0 success, 1 failure, 2 bad input
fn exit_code(err: &ReconcileError) -> i32 {
    match err {
        ReconcileError::InvalidInput(_) => 2,
        _ => 1,
    }
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let mut config = Config::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn init_logging(level: &str) -> Result<(), String> {
    let filter: LevelFilter = level
        .parse()
        .map_err(|_| format!("unknown log level '{}'", level))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(filter)
        .init();
    Ok(())
}

fn open_api(config: &Config) -> Result<IdentityApi<SqliteStore>, String> {
    let store = SqliteStore::open_with(&config.db_path, config.store_options())
        .map_err(|e| format!("Failed to open database at {}: {}", config.db_path.display(), e))?;
    let engine = Arc::new(IdentityEngine::new(Arc::new(store)));
    Ok(IdentityApi::new(engine, config.request_timeout()))
}

async fn cmd_identify(
    api: &IdentityApi<SqliteStore>,
    email: Option<String>,
    phone: Option<String>,
    json: Option<String>,
) -> i32 {
    let payload = match json {
        Some(body) => match IdentifyPayload::from_json(&body) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_code(&e);
            }
        },
        None => IdentifyPayload {
            email,
            phone_number: phone.map(identify::PhoneValue::Text),
        },
    };
    match api.identify_payload(payload).await {
        Ok(response) => print_json(&response),
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code(&e)
        }
    }
}

async fn cmd_show(api: &IdentityApi<SqliteStore>, id: i64) -> i32 {
    match api.cluster_of(ContactId::new(id)).await {
        Ok(Some(contact)) => print_json(&identify::IdentifyResponse { contact }),
        Ok(None) => {
            eprintln!("Error: contact {} not found", id);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code(&e)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    let api = match open_api(&config) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = rt.block_on(async {
        match cli.command {
            Commands::Identify { email, phone, json } => cmd_identify(&api, email, phone, json).await,
            Commands::Show { id } => cmd_show(&api, id).await,
        }
    });
    std::process::exit(code);
}
