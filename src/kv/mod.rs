//! Key-value (Redis) layer.
//!
//! - [`command`]: free-form command tokenizer
//! - [`reply`]: reply values and their text rendering
//! - [`client`]: one Redis connection and its typed operations
//! - [`registry`]: named sessions

pub mod client;
pub mod command;
pub mod registry;
pub mod reply;

pub use client::{KeyInfo, ListEnd, RedisSession, RedisTarget};
pub use command::{CommandArg, tokenize};
pub use registry::RedisRegistry;
pub use reply::{ReplyValue, format_reply};
