//! Turn a GitHub pull request into an AI-drafted blog post.
//!
//! The pipeline: fetch PR data from GitHub (optionally with staged progress
//! reporting), derive style signals from the user's prior writing, compose
//! system/user prompts, hand them to a chat-completion backend (full or
//! streaming), and persist the resulting markdown to the hosted backend.

pub mod config;
pub mod generate;
pub mod github;
pub mod links;
pub mod prompt;
pub mod store;
pub mod style;
