//! Command-line interface.
//!
//! # Usage
//!
//! ```bash
//! # Log the editor in as a given account
//! authcache set --email me@example.com --access-token <jwt> --refresh-token <jwt>
//!
//! # Replace only the access token
//! authcache set --access-token <jwt>
//!
//! # Inspect what the editor currently has cached
//! authcache show
//! authcache show --reveal --json
//!
//! # Remember a non-default database location
//! authcache config --db-path /path/to/state.vscdb
//! ```

use std::path::PathBuf;

use authcache_core::AuthUpdate;
use clap::{Parser, Subcommand};

/// Environment variable that overrides the database location
pub const DB_PATH_ENV: &str = "AUTHCACHE_DB_PATH";

#[derive(Parser, Debug)]
#[command(
    name = "authcache",
    version,
    about = "Set or inspect the editor's cached login state"
)]
pub struct Cli {
    /// Path to the editor's state database.
    #[arg(long, global = true, env = DB_PATH_ENV, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Create the database file if it does not exist yet.
    #[arg(long, global = true)]
    pub create: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write cached auth fields. Unset fields keep their current value.
    Set(SetArgs),

    /// Print the cached auth fields.
    Show {
        /// Print tokens in full instead of masking them.
        #[arg(long)]
        reveal: bool,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved database path.
    Path,

    /// Update the saved configuration and print it.
    Config {
        /// Database path to use when --db is not given.
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,

        /// How long to wait for the editor to release its lock.
        #[arg(long, value_name = "MS")]
        busy_timeout_ms: Option<u64>,

        /// Always create the database file if missing.
        #[arg(long, value_name = "BOOL")]
        create_if_missing: Option<bool>,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct SetArgs {
    /// Account email.
    #[arg(long)]
    pub email: Option<String>,

    /// Access token.
    #[arg(long)]
    pub access_token: Option<String>,

    /// Refresh token.
    #[arg(long)]
    pub refresh_token: Option<String>,

    /// Signup type marker (defaults to Auth_0 when any other field is set).
    #[arg(long)]
    pub signup_type: Option<String>,
}

impl From<SetArgs> for AuthUpdate {
    fn from(args: SetArgs) -> Self {
        AuthUpdate {
            email: args.email,
            access_token: args.access_token,
            refresh_token: args.refresh_token,
            signup_type: args.signup_type,
        }
    }
}
