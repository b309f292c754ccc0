//! Cine Assist — survey-driven movie recommendation bot.
//!
//! Walks each participant through a fixed question catalog over a chat
//! channel, turns the completed answers into one Ollama generation request,
//! and keeps a durable JSON record per user with operator statistics and
//! broadcast commands on top.

pub mod catalog;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod survey;

pub use error::{Error, Result};
