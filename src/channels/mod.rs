//! Slack channel plumbing.
//!
//! Socket Mode delivers mention events in; the Web API carries replies out.
//! Between them sits the coalescer, which turns a backend's fragment stream
//! into a bounded series of message edits.
//!
//! # Architecture
//!
//! ```text
//!  Socket Mode (wss)                        Web API (https)
//!        │                                        ▲
//!        ▼                                        │
//!  MentionEvent ──► Orchestrator ──► MessageSurface (create/replace)
//!                        │                        ▲
//!                        ▼                        │
//!                  FragmentStream ──────► relay_stream
//! ```

pub mod coalescer;
pub mod command;
pub mod slack;
pub mod socket_mode;
mod surface;

pub use coalescer::{CoalescerConfig, StreamOutcome, relay_stream};
pub use command::{MentionCommand, parse_mention, usage};
pub use slack::{BotIdentity, SlackClient};
pub use socket_mode::{MentionEvent, SocketModeListener};
pub use surface::{MessageHandle, MessageSurface, ReplyTarget};
