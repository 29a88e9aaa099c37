use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::models::{EntityId, EntityKind};

/// ConsoleError
///
/// The single error type returned by every fallible console operation. The variants
/// map one-to-one onto how the front end must react:
/// - `Auth`: the whole session is gone; re-authenticate.
/// - `Validation`: local and field-scoped; nothing was sent.
/// - `Domain`: the server refused the change; the form stays open.
/// - `Network`: no response at all; offer a retry.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("{message}")]
    Domain {
        status: u16,
        message: String,
        /// Per-field texts when the server answered with a field-keyed map.
        fields: BTreeMap<String, String>,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("session storage failure: {0}")]
    Persistence(String),

    #[error("another edit is already open")]
    EditInProgress,

    #[error("no {0} in the current list")]
    UnknownEntity(EntityId),

    #[error("Seu perfil não tem acesso a {}.", .0.label())]
    Forbidden(EntityKind),
}

impl ConsoleError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ConsoleError::Auth(_))
    }

    /// The text a front end shows in its notice area.
    pub fn notice(&self) -> String {
        match self {
            ConsoleError::Network(_) => {
                "Não foi possível contatar o servidor. Tente novamente.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// AuthError
///
/// Anything that invalidates the session as a whole.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Sessão expirada. Por favor, faça login novamente.")]
    SessionExpired,

    #[error("Nenhuma sessão ativa. Faça login.")]
    NotAuthenticated,

    #[error("Acesso negado pelo servidor (HTTP {status}).")]
    Rejected { status: u16 },
}

/// NetworkError
///
/// Transport failure: the request never produced an HTTP response.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("transport failure: {0}")]
pub struct NetworkError(pub String);

/// ValidationErrors
///
/// Field-scoped local validation failures, keyed by payload field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.insert(field.into(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Ok when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.fields.values().map(String::as_str).collect();
        write!(f, "{}", joined.join(" "))
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_display_in_field_order() {
        let mut errors = ValidationErrors::new();
        errors.add("senha", "Senha fraca.");
        errors.add("data_nascimento", "Data inválida.");
        assert_eq!(errors.to_string(), "Data inválida. Senha fraca.");
        assert!(errors.clone().into_result().is_err());
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn network_notice_is_generic() {
        let err = ConsoleError::from(NetworkError("connection refused".into()));
        assert!(err.notice().contains("Tente novamente"));
        assert!(!err.is_auth());
        assert!(ConsoleError::from(AuthError::SessionExpired).is_auth());
    }
}
