use std::sync::Arc;

// --- Module Structure ---

// Configuration, errors and pure helpers.
pub mod config;
pub mod error;
pub mod models;
pub mod validators;

// Backend access and the session it authenticates with.
pub mod api;
pub mod session;
pub mod gate;

// Screen controllers.
pub mod confirm;
pub mod dashboard;
pub mod form;
pub mod list;
pub mod signup;

// --- Public Re-exports ---

pub use api::{ApiGateway, MockTransport, ReqwestTransport, TransportState};
pub use config::{AppConfig, Env};
pub use error::{AuthError, ConsoleError, NetworkError, ValidationErrors};
pub use gate::{Route, SessionGate};
pub use models::{Entity, EntityId, EntityKind, Role};
pub use session::{FileSessionStorage, MemorySessionStorage, PersistenceState, SessionReader, SessionStore};

use form::{CreateForm, EditForm};
use list::EntityListController;
use signup::SignupForm;

/// Console
///
/// Bundles everything a screen needs: the configuration, the single session
/// writer, the gate guarding protected operations and the API gateway. Cheap to
/// clone; clones share one session.
#[derive(Clone)]
pub struct Console {
    /// Configuration: the loaded, immutable settings.
    pub config: AppConfig,
    /// The only writer of the session.
    pub store: Arc<SessionStore>,
    pub gate: SessionGate,
    pub api: ApiGateway,
}

impl Console {
    /// new
    ///
    /// Wires a console from explicit collaborators. The persisted session is
    /// restored immediately.
    pub fn new(config: AppConfig, transport: TransportState, persistence: PersistenceState) -> Self {
        let store = Arc::new(SessionStore::open(persistence));
        let gate = SessionGate::new(store.clone());
        let api = ApiGateway::new(&config, transport, store.reader());
        Self { config, store, gate, api }
    }

    /// The production wiring: reqwest transport and the session file named by
    /// the configuration.
    pub fn from_config(config: AppConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new()) as TransportState;
        let persistence = Arc::new(FileSessionStorage::new(config.session_file.clone())) as PersistenceState;
        Self::new(config, transport, persistence)
    }

    pub fn session(&self) -> SessionReader {
        self.store.reader()
    }

    pub async fn login(&self, cpf: &str, senha: &str) -> Result<session::Session, ConsoleError> {
        self.store.login(&self.api, cpf, senha).await
    }

    pub fn route(&self) -> Route {
        self.gate.route()
    }

    pub async fn register(&self, form: &SignupForm) -> Result<String, ConsoleError> {
        form.register(&self.api).await
    }

    pub async fn dashboard(&self) -> Result<dashboard::DashboardSummary, ConsoleError> {
        dashboard::load_summary(&self.api, &self.gate).await
    }

    pub fn list(&self, kind: EntityKind) -> EntityListController {
        EntityListController::new(kind, self.api.clone(), self.gate.clone())
    }

    pub fn create_form(&self, kind: EntityKind) -> CreateForm {
        CreateForm::new(kind)
    }

    pub fn edit_form(&self, entity: &Entity) -> EditForm {
        EditForm::new(entity)
    }
}
