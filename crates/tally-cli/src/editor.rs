//! Interactive prompts
//!
//! Confirmation, line input, and the credential prompt used when a write
//! needs a token.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use async_trait::async_trait;

use tally_core::CredentialPrompt;

/// Prompt for confirmation
///
/// Returns true if user confirms, false otherwise.
/// In non-interactive mode (no TTY), returns false.
pub fn confirm(prompt: &str) -> Result<bool> {
    // Check if stdin is a TTY
    if !atty::is(atty::Stream::Stdin) {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(is_yes(&input))
}

fn is_yes(input: &str) -> bool {
    let input = input.trim().to_lowercase();
    input == "y" || input == "yes"
}

/// Asks for a token on the terminal
///
/// Resolves to `None` when stdin is not a terminal or the line is empty.
pub struct TerminalPrompt;

#[async_trait]
impl CredentialPrompt for TerminalPrompt {
    async fn prompt(&self) -> Option<String> {
        if !atty::is(atty::Stream::Stdin) {
            return None;
        }

        tokio::task::spawn_blocking(|| {
            eprint!("GitHub token (gist scope, kept for this session only): ");
            io::stderr().flush().ok()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).ok()?;
            let token = line.trim().to_string();
            (!token.is_empty()).then_some(token)
        })
        .await
        .ok()
        .flatten()
    }
}
