use std::sync::Arc;

use anyhow::{bail, Context as _};
use chat_api::ChatApiClient;
use chat_sync::{
    EnvConfig, Navigator, ProfileService, SendOutcome, SkipReason, SyncEngine, SyncError,
    SyncEvent,
};
use session_store::{Ack, FileTokenStorage, SessionStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::cli::Command;
use crate::render::{format_profile, Transcript};

const QUIT: &str = "/quit";

/// Everything a command needs, wired to the real transport and credential file.
pub struct Context {
    pub env: EnvConfig,
    pub session: Arc<SessionStore>,
    pub navigator: Arc<Navigator>,
}

impl Context {
    pub fn from_env(env: EnvConfig) -> anyhow::Result<Self> {
        let client = ChatApiClient::new(env.api_config()).context("invalid backend configuration")?;
        let token_path = env.resolve_token_path()?;
        debug!(path = %token_path.display(), "credential file");
        let session = Arc::new(
            SessionStore::open(Arc::new(client), Arc::new(FileTokenStorage::new(token_path)))
                .context("failed to open the credential file")?,
        );
        let navigator = Arc::new(Navigator::new(Arc::clone(&session)));
        Ok(Self {
            env,
            session,
            navigator,
        })
    }
}

pub async fn run(command: Command, env: EnvConfig) -> anyhow::Result<()> {
    let context = Context::from_env(env)?;
    match command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let session = context
                .session
                .register(&username, &email, &password)
                .await
                .context("registration failed")?;
            let name = session.account.map_or(username, |account| account.username);
            println!("registered and signed in as {name}");
        }
        Command::Login { username, password } => {
            let session = context
                .session
                .login(&username, &password)
                .await
                .context("login failed")?;
            let name = session.account.map_or(username, |account| account.username);
            println!("signed in as {name}");
        }
        Command::Logout => match context.session.logout().await {
            Ack::LoggedOut => println!("signed out"),
            Ack::LoggedOutLocally => println!("signed out locally"),
        },
        Command::Status => {
            if context.session.is_authenticated() {
                println!("signed in ({})", context.env.base_url);
            } else {
                println!("signed out");
            }
        }
        Command::Profile { username, email } => {
            let service = ProfileService::new(Arc::clone(&context.navigator));
            let profile = if username.is_none() && email.is_none() {
                service.fetch().await
            } else {
                service.update(username.as_deref(), email.as_deref()).await
            }
            .context("profile request failed")?;
            println!("{}", format_profile(&profile));
        }
        Command::Chat { .. } => chat(&context).await?,
    }
    Ok(())
}

async fn chat(context: &Context) -> anyhow::Result<()> {
    let engine = SyncEngine::new(Arc::clone(&context.navigator), context.env.sync_config());
    let handle = match engine.activate() {
        Ok(handle) => handle,
        Err(SyncError::NotAuthenticated) => bail!("not signed in; run `chat-sync login` first"),
    };

    let mut events = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut transcript = Transcript::default();
    println!("connected to {}; type {QUIT} to leave", context.env.base_url);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SyncEvent::ViewReplaced { .. } | SyncEvent::MessageAppended(_)) => {
                    print_lines(transcript.new_lines(&handle.view()));
                }
                Ok(SyncEvent::Unauthorized) => {
                    eprintln!("the backend rejected the session; sign in again");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                    print_lines(transcript.new_lines(&handle.view()));
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim() == QUIT {
                    break;
                }
                match handle.send_message(&line).await {
                    Ok(SendOutcome::Sent(_)) | Ok(SendOutcome::Skipped(SkipReason::Empty)) => {}
                    Ok(SendOutcome::Skipped(reason)) => eprintln!("not sent ({reason:?})"),
                    Err(error) if error.is_unauthorized() => {
                        eprintln!("the backend rejected the session; sign in again");
                        break;
                    }
                    Err(error) => eprintln!("not sent: {error}"),
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.join().await;
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
