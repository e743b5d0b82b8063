//! Process Module
//!
//! Exec string tokenizing and subprocess / local stdio wiring.

pub mod launcher;
pub mod tokenizer;

pub use launcher::{launch, LaunchError, LaunchedProcess, StdioHub};
pub use tokenizer::{split_exec, tokenize, TokenizeError};
