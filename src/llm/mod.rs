//! Generation Service integration.
//!
//! Provides an OpenAI-compatible client behind the [`TextGenerator`] trait and
//! the prompts used for answer synthesis and judging.

mod client;
#[cfg(test)]
pub(crate) mod mock;
mod prompts;

pub use client::{LlmClient, Message, Role, Sampling, TextGenerator};
pub use prompts::{NO_INFORMATION_REPLY, Prompts};
