use std::path::PathBuf;
use std::time::Duration;

use chat_sync::EnvConfig;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chat-sync", version, about = "Poll-synced client for the shared chat room")]
pub struct Cli {
    /// Backend origin, e.g. http://127.0.0.1:8000.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Credential file holding the session token.
    #[arg(long, global = true)]
    pub token_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CHAT_SYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and store the token.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "CHAT_SYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Invalidate the token remotely when possible and forget it locally.
    Logout,
    /// Report whether a token is stored.
    Status,
    /// Show the profile, or update it when a field is given.
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Follow the conversation and send each input line.
    Chat {
        /// Overrides CHAT_SYNC_POLL_INTERVAL_MS.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval_ms: Option<u64>,
    },
}

impl Cli {
    pub fn apply_overrides(&self, env: &mut EnvConfig) {
        if let Some(base_url) = &self.base_url {
            env.base_url = base_url.clone();
        }
        if let Some(token_path) = &self.token_path {
            env.token_path = Some(token_path.clone());
        }
        if let Command::Chat {
            poll_interval_ms: Some(ms),
        } = self.command
        {
            env.poll_interval = Duration::from_millis(ms);
        }
    }
}
