//! LLM Assistant Gateway
//!
//! Turns a focus, its open tasks and the recent thread history into a chat
//! completion request, and turns the model's answer back into a reply plus
//! structured task suggestions:
//!
//! - `client` - thin HTTP client for an OpenAI-compatible completions API
//! - `prompt` - system prompt and context assembly
//! - `parse` - tolerant extraction of the model's JSON reply

pub mod client;
pub mod parse;
pub mod prompt;

pub use client::{ChatMessage, LlmClient};
pub use parse::{AssistantReply, SuggestedTask};
