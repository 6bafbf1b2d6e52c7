//! `chat-sync` command line client.
//!
//! Configuration comes from the `CHAT_SYNC_*` environment variables (see
//! [`chat_sync::config`]); `--base-url` and `--token-path` override them. The
//! token is kept in a JSON credential file so later invocations reuse the
//! session.
//!
//! `chat` runs the sync engine in the foreground: new messages are printed as
//! polls land, each stdin line is sent as a message, and `/quit`, end of input,
//! or Ctrl-C tears the session down.

pub mod cli;
pub mod commands;
pub mod render;
