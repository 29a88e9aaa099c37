use serde_json::json;

use crate::{
    api::ApiGateway,
    error::{ConsoleError, ValidationErrors},
    form::{DATE_MESSAGE, PASSWORD_MESSAGE},
    validators::{cpf_digits, is_strong_password, is_valid_date, mask_cpf},
};

pub const REGISTER_PATH: &str = "api/registrar";
pub const REGISTER_FALLBACK: &str = "Erro ao tentar registrar.";
pub const REGISTER_SUCCESS: &str = "Cadastro realizado com sucesso!";

/// SignupForm
///
/// Self-registration from the entry screen. The CPF is kept as digits; use
/// `masked_cpf` for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupForm {
    pub nome: String,
    cpf: String,
    pub senha: String,
    pub data_nascimento: String,
}

impl SignupForm {
    pub fn new(nome: &str, cpf: &str, senha: &str, data_nascimento: &str) -> Self {
        let mut form = Self {
            nome: nome.to_string(),
            senha: senha.to_string(),
            data_nascimento: data_nascimento.to_string(),
            ..Self::default()
        };
        form.set_cpf(cpf);
        form
    }

    pub fn set_cpf(&mut self, raw: &str) {
        self.cpf = cpf_digits(raw);
    }

    pub fn cpf(&self) -> &str {
        &self.cpf
    }

    pub fn masked_cpf(&self) -> String {
        mask_cpf(&self.cpf)
    }

    /// Local checks that block submission: password strength and birth date.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !is_strong_password(&self.senha) {
            errors.add("senha", PASSWORD_MESSAGE);
        }
        if !is_valid_date(self.data_nascimento.trim()) {
            errors.add("data_nascimento", DATE_MESSAGE);
        }
        errors.into_result()
    }

    /// register
    ///
    /// Validates, then `POST api/registrar`. Returns the text to show on success.
    /// Registration does not log the user in.
    pub async fn register(&self, api: &ApiGateway) -> Result<String, ConsoleError> {
        if let Err(errors) = self.validate() {
            tracing::info!(fields = ?errors.fields().keys(), "signup blocked by local validation");
            return Err(errors.into());
        }

        let body = json!({
            "cpf": self.cpf,
            "senha": self.senha,
            "nome": self.nome.trim(),
            "data_nascimento": self.data_nascimento.trim(),
        });

        let response = api.post(REGISTER_PATH, body).await?;
        let status = response.status;
        match response.into_payload(REGISTER_FALLBACK) {
            Ok(payload) => {
                tracing::info!(status, "registration accepted");
                Ok(payload.message.unwrap_or_else(|| REGISTER_SUCCESS.to_string()))
            }
            Err(e) => {
                tracing::warn!(status, error = %e, "registration rejected");
                Err(e)
            }
        }
    }
}
