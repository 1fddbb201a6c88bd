//! Chatrelay: a Slack bot that streams chat completions into threads.
//!
//! Mentions arrive over Socket Mode, get parsed into a command with inline
//! option overrides, and are answered by relaying an OpenAI-compatible
//! completion stream into the mention's thread as a progressively edited
//! message. Each channel can persist its own default options.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod options;
pub mod orchestrator;
pub mod store;

pub use error::{Error, Result};
