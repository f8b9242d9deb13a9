//! Parses lines typed into the terminal client.

use std::path::PathBuf;

/// What a line of terminal input asks the client to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// Send the text to the chat service.
    Message(String),
    /// Select these files and upload them.
    Upload(Vec<PathBuf>),
    Quit,
    /// Blank line or a command used incorrectly; `Some` carries a usage hint.
    Ignored(Option<&'static str>),
}

pub const UPLOAD_USAGE: &str = "usage: /upload <path> [<path>...]";

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return ChatInput::Ignored(None);
        }
        if trimmed == "/quit" || trimmed == "/exit" {
            return ChatInput::Quit;
        }
        if let Some(rest) = trimmed.strip_prefix("/upload") {
            // "/uploaded" is an ordinary message.
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                let files: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
                if files.is_empty() {
                    return ChatInput::Ignored(Some(UPLOAD_USAGE));
                }
                return ChatInput::Upload(files);
            }
        }
        ChatInput::Message(trimmed.to_string())
    }
}
