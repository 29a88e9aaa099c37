use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{
    api::{ApiGateway, ApiPayload},
    confirm::{ConfirmRequest, Confirmer},
    error::{ConsoleError, ValidationErrors},
    gate::{RoleVisibility, SessionGate},
    models::{Entity, EntityId, EntityKind, FieldSpec, InputKind, Presence},
    validators::{cpf_digits, is_strong_password, is_valid_date, mask_cpf},
};

pub const PASSWORD_MESSAGE: &str = "A senha deve ter pelo menos 8 caracteres, incluir letras maiúsculas e minúsculas, números e caracteres especiais.";
pub const DATE_MESSAGE: &str = "Data de nascimento inválida.";

const CREATE_FALLBACK: &str = "Erro ao realizar o cadastro. Tente novamente.";
const EDIT_FALLBACK: &str = "Erro ao salvar as alterações.";
const EDIT_SUCCESS: &str = "Alterações salvas com sucesso.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

impl FieldSpec {
    pub fn presence(&self, mode: FormMode) -> Presence {
        match mode {
            FormMode::Create => self.on_create,
            FormMode::Edit => self.on_edit,
        }
    }
}

/// Banner shown above a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

// --- Shared Field-Validation Core ---

/// FormState
///
/// Values and error slots for one open form, driven entirely by the kind's field
/// schema. Values are kept in stored form: CPF as digits, references as the raw
/// identifier text.
#[derive(Debug, Clone)]
pub struct FormState {
    kind: EntityKind,
    mode: FormMode,
    values: BTreeMap<&'static str, String>,
    initial: BTreeMap<&'static str, String>,
    errors: BTreeMap<String, String>,
    notice: Option<Notice>,
}

impl FormState {
    pub fn blank(kind: EntityKind, mode: FormMode) -> Self {
        let values: BTreeMap<_, _> = kind.fields().iter().map(|f| (f.name, String::new())).collect();
        Self {
            kind,
            mode,
            initial: values.clone(),
            values,
            errors: BTreeMap::new(),
            notice: None,
        }
    }

    /// Pre-populated from an entity, for editing. Write-only fields start blank.
    pub fn from_entity(entity: &Entity) -> Self {
        let kind = entity.kind();
        let values: BTreeMap<_, _> = kind
            .fields()
            .iter()
            .map(|f| (f.name, entity.field_value(f.name).unwrap_or_default()))
            .collect();
        Self {
            kind,
            mode: FormMode::Edit,
            initial: values.clone(),
            values,
            errors: BTreeMap::new(),
            notice: None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Fields the user sees in this mode, in schema order.
    pub fn visible_fields(&self) -> Vec<&'static FieldSpec> {
        self.kind
            .fields()
            .iter()
            .filter(|f| f.presence(self.mode) != Presence::Hidden)
            .collect()
    }

    /// Sets a field from user input. CPF input is reduced to digits. Returns
    /// false for names outside the schema.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        let Some(spec) = self.kind.field(name) else {
            tracing::warn!(field = name, kind = %self.kind, "ignoring unknown form field");
            return false;
        };
        let stored = match spec.input {
            InputKind::Cpf => cpf_digits(value),
            _ => value.to_string(),
        };
        self.values.insert(spec.name, stored);
        self.errors.remove(spec.name);
        true
    }

    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// What an input box shows: CPF masked, everything else as stored.
    pub fn display_value(&self, name: &str) -> String {
        match self.kind.field(name).map(|f| f.input) {
            Some(InputKind::Cpf) => mask_cpf(self.value(name)),
            _ => self.value(name).to_string(),
        }
    }

    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.values != self.initial
    }

    /// validate
    ///
    /// Runs the schema rules and replaces the per-field error slots. Never
    /// touches the notice, so a success banner from an earlier submission stays.
    pub fn validate(&mut self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for spec in self.kind.fields() {
            let presence = spec.presence(self.mode);
            if presence == Presence::Hidden {
                continue;
            }
            let raw = self.value(spec.name);
            let blank = raw.trim().is_empty();
            let required = presence == Presence::Required;

            match spec.input {
                InputKind::Password => {
                    if (blank && required) || (!raw.is_empty() && !is_strong_password(raw)) {
                        errors.add(spec.name, PASSWORD_MESSAGE);
                    }
                }
                InputKind::Date => {
                    if (blank && required) || (!blank && !is_valid_date(raw.trim())) {
                        errors.add(spec.name, DATE_MESSAGE);
                    }
                }
                _ => {
                    if blank && required {
                        errors.add(spec.name, format!("O campo {} é obrigatório.", spec.label));
                    }
                }
            }
        }

        self.errors = errors.fields().clone();
        errors.into_result()
    }

    /// payload
    ///
    /// The JSON body for the backend, keyed by payload field name. A blank
    /// password or reference is left out entirely rather than sent empty.
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        for spec in self.kind.fields() {
            let raw = self.value(spec.name);
            let value = match spec.input {
                InputKind::Password if raw.is_empty() => continue,
                InputKind::Password => Value::from(raw),
                InputKind::Reference(_) => match EntityId::parse(raw) {
                    Some(id) => id.to_json(),
                    None => continue,
                },
                InputKind::Cpf => Value::from(cpf_digits(raw)),
                InputKind::Date | InputKind::Text => Value::from(raw.trim()),
            };
            body.insert(spec.name.to_string(), value);
        }
        Value::Object(body)
    }

    fn record_failure(&mut self, err: &ConsoleError) {
        match err {
            // Slots were filled by `validate`; the banner is left alone.
            ConsoleError::Validation(_) => {}
            ConsoleError::Domain { message, fields, .. } => {
                for (name, text) in fields {
                    if self.kind.field(name).is_some() {
                        self.errors.insert(name.clone(), text.clone());
                    }
                }
                self.notice = Some(Notice::Error(message.clone()));
            }
            other => self.notice = Some(Notice::Error(other.notice())),
        }
    }

    fn reset(&mut self) {
        let blank = Self::blank(self.kind, self.mode);
        self.values = blank.values;
        self.initial = blank.initial;
        self.errors.clear();
    }
}

// --- Create ---

/// One selectable row for a reference field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefOption {
    pub id: EntityId,
    pub label: String,
}

/// CreateForm
///
/// `POST api/<kind>` after local validation. Teacher creation requires a strong
/// password; student creation requires a valid birth date. A failed validation
/// never reaches the network.
#[derive(Debug, Clone)]
pub struct CreateForm {
    state: FormState,
    options: BTreeMap<EntityKind, Vec<RefOption>>,
}

impl CreateForm {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            state: FormState::blank(kind, FormMode::Create),
            options: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn set(&mut self, name: &str, value: &str) -> bool {
        self.state.set(name, value)
    }

    pub fn options(&self, kind: EntityKind) -> &[RefOption] {
        self.options.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// load_options
    ///
    /// Fetches the selectable rows for every reference field (teachers for a
    /// student, schools for a teacher). These are auxiliary: a failure, or a kind
    /// the current role may not see, leaves the option list empty.
    pub async fn load_options(&mut self, api: &ApiGateway) {
        let referenced: Vec<EntityKind> = self
            .state
            .visible_fields()
            .iter()
            .filter_map(|f| match f.input {
                InputKind::Reference(kind) => Some(kind),
                _ => None,
            })
            .collect();

        let visibility = api.session().role().map(RoleVisibility::for_role);
        for kind in referenced {
            if !visibility.as_ref().is_some_and(|v| v.allows(kind)) {
                tracing::debug!(%kind, "reference options not visible to role");
                self.options.insert(kind, Vec::new());
                continue;
            }
            let fetched = match api.get(kind.path()).await {
                Ok(response) => response.into_payload("").map(|payload| payload.data),
                Err(e) => Err(e.into()),
            };
            let options = match fetched {
                Ok(Value::Array(items)) => items
                    .into_iter()
                    .filter_map(|item| Entity::from_value(kind, item).ok())
                    .map(|e| RefOption { id: e.id().clone(), label: e.name().to_string() })
                    .collect(),
                Ok(_) => Vec::new(),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "reference options unavailable");
                    Vec::new()
                }
            };
            self.options.insert(kind, options);
        }
    }

    /// submit
    ///
    /// On success the fields are cleared and a success notice is set; the created
    /// record's payload is returned. On failure the form keeps its values.
    pub async fn submit(
        &mut self,
        api: &ApiGateway,
        gate: &SessionGate,
    ) -> Result<ApiPayload, ConsoleError> {
        let kind = self.state.kind;
        if let Err(errors) = self.state.validate() {
            tracing::info!(kind = %kind, fields = ?errors.fields().keys(), "create blocked by validation");
            return Err(errors.into());
        }

        let result = gate.observe(self.send(api, gate).await);
        match result {
            Ok(payload) => {
                tracing::info!(kind = %kind, "record created");
                self.state.reset();
                self.state.notice = Some(Notice::Success(format!(
                    "Cadastro de {} realizado com sucesso!",
                    kind.slug()
                )));
                Ok(payload)
            }
            Err(e) => {
                tracing::info!(kind = %kind, error = %e, "create failed");
                self.state.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn send(&self, api: &ApiGateway, gate: &SessionGate) -> Result<ApiPayload, ConsoleError> {
        gate.authorize(self.state.kind)?;
        let response = api.post(self.state.kind.path(), self.state.payload()).await?;
        response.into_payload(CREATE_FALLBACK)
    }
}

// --- Edit ---

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// The user declined the save confirmation; nothing was sent.
    Cancelled,
    /// Saved. Carries the updated record when the server echoed one back.
    Saved(Option<Entity>),
}

/// EditForm
///
/// Pre-populated from the entity being edited. The password is optional here:
/// left blank, it is omitted from the `PUT` body.
#[derive(Debug, Clone)]
pub struct EditForm {
    state: FormState,
    original: Entity,
}

impl EditForm {
    pub fn new(entity: &Entity) -> Self {
        Self {
            state: FormState::from_entity(entity),
            original: entity.clone(),
        }
    }

    pub fn id(&self) -> &EntityId {
        self.original.id()
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn set(&mut self, name: &str, value: &str) -> bool {
        self.state.set(name, value)
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    /// submit
    ///
    /// Validate, then ask for confirmation, then `PUT api/<kind>/<id>`.
    pub async fn submit(
        &mut self,
        api: &ApiGateway,
        gate: &SessionGate,
        confirmer: &dyn Confirmer,
    ) -> Result<EditOutcome, ConsoleError> {
        let kind = self.state.kind;
        if let Err(errors) = self.state.validate() {
            tracing::info!(kind = %kind, id = %self.id(), "edit blocked by validation");
            return Err(errors.into());
        }

        if !confirmer.confirm(ConfirmRequest::save_changes()).await {
            tracing::debug!(kind = %kind, id = %self.id(), "save not confirmed");
            return Ok(EditOutcome::Cancelled);
        }

        let result = gate.observe(self.send(api, gate).await);
        match result {
            Ok(payload) => {
                tracing::info!(kind = %kind, id = %self.id(), "record updated");
                let updated = Entity::from_complete_value(kind, payload.data)
                    .filter(|entity| entity.id().matches(self.id()));
                self.state.notice = Some(Notice::Success(
                    payload.message.unwrap_or_else(|| EDIT_SUCCESS.to_string()),
                ));
                self.state.initial = self.state.values.clone();
                Ok(EditOutcome::Saved(updated))
            }
            Err(e) => {
                tracing::info!(kind = %kind, id = %self.id(), error = %e, "edit failed");
                self.state.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn send(&self, api: &ApiGateway, gate: &SessionGate) -> Result<ApiPayload, ConsoleError> {
        gate.authorize(self.state.kind)?;
        let path = self.state.kind.item_path(self.id());
        let response = api.put(&path, self.state.payload()).await?;
        response.into_payload(EDIT_FALLBACK)
    }
}
