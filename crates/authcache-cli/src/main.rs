//! authcache - set or inspect the editor's cached login state.
//!
//! Writes the email, tokens and signup marker straight into the editor's
//! SQLite state database so it starts up already signed in.

mod cli;
mod config;
mod format;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use authcache_core::{AuthKey, AuthStore, AuthUpdate, StoreError};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command};
use config::Config;
use format::display_value;

/// Width of the key column in `show` output
const KEY_COLUMN_WIDTH: usize = 30;

const NOTHING_TO_UPDATE: &str =
    "Nothing to update: pass at least one of --email, --access-token, --refresh-token, --signup-type";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    let config_path = Config::config_path()?;
    run(cli, &config_path, &mut io::stdout().lock())
}

fn run(cli: Cli, config_path: &Path, out: &mut impl Write) -> Result<()> {
    let Cli { db, create, command } = cli;
    let mut config = Config::load_from(config_path).context("Failed to load config")?;
    debug!(?config, "Config loaded");

    match command {
        Command::Set(args) => {
            let update = AuthUpdate::from(args);
            // Reject before opening so an empty call never touches the database
            if update.is_empty() {
                anyhow::bail!(NOTHING_TO_UPDATE);
            }

            let store = open_store(&config, db.as_deref(), create)?;
            match store.try_update_auth(&update) {
                Ok(written) => {
                    writeln!(
                        out,
                        "Updated {} cached auth field(s) in {}",
                        written,
                        store.path().display()
                    )?;
                    Ok(())
                }
                Err(StoreError::NoFields) => anyhow::bail!(NOTHING_TO_UPDATE),
                Err(e) => Err(e).context("Failed to update cached auth"),
            }
        }
        Command::Show { reveal, json } => {
            let store = open_store(&config, db.as_deref(), create)?;
            let mut cached = store.cached_auth().context("Failed to read cached auth")?;

            if json {
                if !reveal {
                    cached.access_token = cached.access_token.as_deref().map(format::mask_secret);
                    cached.refresh_token = cached.refresh_token.as_deref().map(format::mask_secret);
                }
                writeln!(out, "{}", serde_json::to_string_pretty(&cached)?)?;
            } else {
                for key in AuthKey::ALL {
                    writeln!(
                        out,
                        "{:<width$} {}",
                        key.as_str(),
                        display_value(cached.get(key), key.is_secret(), reveal),
                        width = KEY_COLUMN_WIDTH
                    )?;
                }
            }
            Ok(())
        }
        Command::Path => {
            let path = config.resolve_db_path(db.as_deref())?;
            writeln!(out, "{}", path.display())?;
            Ok(())
        }
        Command::Config {
            db_path,
            busy_timeout_ms,
            create_if_missing,
        } => {
            if let Some(path) = db_path {
                config.db_path = Some(path);
            }
            if let Some(ms) = busy_timeout_ms {
                config.busy_timeout_ms = Some(ms);
            }
            if let Some(create) = create_if_missing {
                config.create_if_missing = create;
            }
            config.save_to(config_path).context("Failed to save config")?;
            info!(path = %config_path.display(), "Config saved");

            writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?;
            Ok(())
        }
    }
}

fn open_store(config: &Config, db: Option<&Path>, create: bool) -> Result<AuthStore> {
    let store_config = config.store_config(db, create)?;
    AuthStore::open(&store_config).with_context(|| {
        format!(
            "Could not open the editor's state database at {} (use --db or --create)",
            store_config.db_path().display()
        )
    })
}

// ============================================================================
// Tests
// ============================================================================
