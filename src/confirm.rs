//! Awaitable yes/no confirmations, decoupled from whatever draws the dialog.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// What the user is being asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub title: String,
    pub text: String,
    pub confirm_label: String,
    pub cancel_label: String,
}

impl ConfirmRequest {
    fn new(title: &str, text: &str, confirm_label: &str) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
            confirm_label: confirm_label.to_string(),
            cancel_label: "Cancelar".to_string(),
        }
    }

    pub fn delete() -> Self {
        Self::new("Tem certeza?", "Você não poderá reverter isso!", "Sim, excluir!")
    }

    pub fn save_changes() -> Self {
        Self::new("Tem certeza?", "Você está prestes a salvar as alterações.", "Sim, salvar!")
    }

    pub fn discard_changes() -> Self {
        Self::new("Tem certeza?", "As alterações não salvas serão perdidas.", "Sim, sair!")
    }

    pub fn logout() -> Self {
        Self::new("Confirmação de Logout", "Você realmente deseja sair?", "Sim, sair!")
    }
}

/// Confirmer
///
/// Resolves to `true` only on an explicit confirmation. Dismissal, cancel and
/// any failure to ask all count as `false`.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, request: ConfirmRequest) -> bool;
}

/// Always answers the same way (the CLI's `--yes`).
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, request: ConfirmRequest) -> bool {
        tracing::debug!(title = %request.title, answer = self.0, "auto confirmation");
        self.0
    }
}

/// ScriptedConfirmer
///
/// Replays queued answers and remembers every question, for tests. Once the
/// script runs out it answers `false`.
#[derive(Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<ConfirmRequest>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::default(),
        }
    }

    pub fn asked(&self) -> Vec<ConfirmRequest> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: ConfirmRequest) -> bool {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(request);
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .unwrap_or(false)
    }
}

/// Asks on the terminal; `s`/`sim`/`y`/`yes` confirm.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, request: ConfirmRequest) -> bool {
        let prompt = format!(
            "{} {} [{} = s / {} = n]: ",
            request.title, request.text, request.confirm_label, request.cancel_label
        );
        let mut stdout = tokio::io::stdout();
        if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(_) => is_affirmative(&line),
            Err(e) => {
                tracing::warn!(error = %e, "could not read confirmation");
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "s" | "sim" | "y" | "yes")
}
