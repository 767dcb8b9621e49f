//! Interactive authentication prompts

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

/// Answers authentication prompts on behalf of the user
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask for one value. `echo` is false for secrets.
    ///
    /// Returning `None` declines, which ends the authentication attempt.
    async fn prompt(&self, text: &str, echo: bool) -> Option<String>;
}

/// Declines every prompt
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompter;

#[async_trait]
impl Prompter for NoPrompter {
    async fn prompt(&self, _text: &str, _echo: bool) -> Option<String> {
        None
    }
}

/// Replies with a fixed list of answers, then declines
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far, in order
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn prompt(&self, text: &str, _echo: bool) -> Option<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(text.to_string());
        }
        self.answers.lock().ok()?.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_prompter_declines() {
        assert_eq!(NoPrompter.prompt("Password: ", false).await, None);
    }

    #[tokio::test]
    async fn test_scripted_prompter_answers_in_order() {
        let prompter = ScriptedPrompter::new(["admin", "secret"]);
        assert_eq!(prompter.prompt("login: ", true).await.as_deref(), Some("admin"));
        assert_eq!(prompter.prompt("Password: ", false).await.as_deref(), Some("secret"));
        assert_eq!(prompter.prompt("Password: ", false).await, None);
        assert_eq!(prompter.asked(), vec!["login: ", "Password: ", "Password: "]);
    }
}
