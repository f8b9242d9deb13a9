//! DocuChat Chat Client Library
//!
//! Everything the `chat` binary needs besides drawing the transcript: configuration
//! from the environment, parsing of typed commands, the HTTP document uploader and
//! the tokio runtime that hosts the session controller. The binary is a thin
//! wrapper around this library.

pub mod config;
pub mod input;
pub mod runtime;
pub mod upload;
