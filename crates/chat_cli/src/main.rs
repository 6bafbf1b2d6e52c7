use chat_cli::cli::Cli;
use chat_cli::commands;
use chat_sync::{logging, EnvConfig};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut env = EnvConfig::from_env()?;
    cli.apply_overrides(&mut env);
    logging::init(&env.log_filter);

    commands::run(cli.command, env).await
}
