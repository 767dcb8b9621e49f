//! Reading answers from the local terminal

use std::io::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use rt_core::traits::Prompter;

/// Restores cooked mode on drop unless raw mode was already on
struct RawGuard {
    restore: bool,
}

impl RawGuard {
    fn enter() -> Result<Self> {
        let already = is_raw_mode_enabled().unwrap_or(false);
        if !already {
            enable_raw_mode().context("Failed to enable raw mode")?;
        }
        Ok(Self { restore: !already })
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        if self.restore {
            let _ = disable_raw_mode();
        }
    }
}

/// Read one line from the terminal, echoing it only when `echo` is set.
///
/// Returns `None` when the user presses Esc or Ctrl+C.
pub fn read_line(prompt: &str, echo: bool) -> Result<Option<String>> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;

    let _raw = RawGuard::enter()?;
    let mut line = String::new();
    let answer = loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event::read().context("Failed to read from terminal")?
        else {
            continue;
        };
        if kind == KeyEventKind::Release {
            continue;
        }
        match code {
            KeyCode::Enter => break Some(line),
            KeyCode::Esc => break None,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => break None,
            KeyCode::Backspace => {
                if line.pop().is_some() && echo {
                    write!(stderr, "\x08 \x08")?;
                }
            }
            KeyCode::Char(c) => {
                line.push(c);
                if echo {
                    write!(stderr, "{}", c)?;
                }
            }
            _ => {}
        }
        stderr.flush()?;
    };
    write!(stderr, "\r\n")?;
    stderr.flush()?;
    Ok(answer)
}

/// Read a secret twice and require both entries to match
pub fn read_new_secret(prompt: &str) -> Result<Option<String>> {
    let Some(first) = read_line(prompt, false)? else {
        return Ok(None);
    };
    let Some(second) = read_line("Repeat: ", false)? else {
        return Ok(None);
    };
    if first != second {
        anyhow::bail!("Entries did not match");
    }
    Ok(Some(first))
}

/// [`Prompter`] that asks on the local terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn prompt(&self, text: &str, echo: bool) -> Option<String> {
        let text = text.to_string();
        match tokio::task::spawn_blocking(move || read_line(&text, echo)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!("Prompt failed: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("Prompt task failed: {}", e);
                None
            }
        }
    }
}
