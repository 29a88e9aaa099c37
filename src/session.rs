use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use jsonwebtoken::dangerous::insecure_decode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;

use crate::{
    api::ApiGateway,
    error::{AuthError, ConsoleError},
    models::{Claims, Role},
    validators::cpf_digits,
};

/// Storage key of the bearer token.
pub const TOKEN_KEY: &str = "token";
/// Storage key of the display name.
pub const NAME_KEY: &str = "nome";

pub const LOGIN_PATH: &str = "api/logar";

const LOGIN_FALLBACK: &str = "Erro ao tentar fazer login. Verifique suas credenciais.";

/// Session
///
/// The token and display name, exactly as persisted. Both are `None` when
/// anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "token", default)]
    pub token: Option<String>,
    #[serde(rename = "nome", default)]
    pub display_name: Option<String>,
}

impl Session {
    pub fn is_anonymous(&self) -> bool {
        self.token.is_none()
    }
}

// --- Token Inspection ---

/// decode_claims
///
/// Reads the token payload without verifying the signature. The console only
/// needs `exp` and `perfil` to decide what to show; the backend verifies the
/// signature on every call.
pub fn decode_claims(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    insecure_decode::<Claims>(token).map(|data| data.claims)
}

/// is_expired
///
/// True when the token's `exp` lies strictly in the past. Undecodable tokens are
/// treated as expired.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now().timestamp())
}

pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.exp < now,
        Err(e) => {
            tracing::debug!(error = %e, "token could not be decoded, treating as expired");
            true
        }
    }
}

// --- Persistence Contract ---

/// SessionPersistence
///
/// Where the session survives restarts. Token and name are always written and
/// cleared together.
pub trait SessionPersistence: Send + Sync {
    fn load(&self) -> io::Result<Session>;
    fn save(&self, session: &Session) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

pub type PersistenceState = Arc<dyn SessionPersistence>;

/// FileSessionStorage
///
/// JSON document `{"token": ..., "nome": ...}` on disk. Saves go through a
/// temporary sibling and a rename, so a reader never sees half a session.
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionPersistence for FileSessionStorage {
    fn load(&self) -> io::Result<Session> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Session::default()),
            Err(e) => Err(e),
        }
    }

    fn save(&self, session: &Session) -> io::Result<()> {
        let text = serde_json::to_string_pretty(session)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// MemorySessionStorage
///
/// In-process persistence for tests and throwaway runs. `failing` makes every
/// write fail, to exercise the storage error paths.
#[derive(Default)]
pub struct MemorySessionStorage {
    stored: Mutex<Session>,
    pub failing: bool,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            stored: Mutex::new(session),
            failing: false,
        }
    }

    pub fn new_failing() -> Self {
        Self {
            stored: Mutex::default(),
            failing: true,
        }
    }

    fn write(&self, session: Session) -> io::Result<()> {
        if self.failing {
            return Err(io::Error::other("memory storage: simulated write failure"));
        }
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| io::Error::other("memory storage poisoned"))?;
        *stored = session;
        Ok(())
    }
}

impl SessionPersistence for MemorySessionStorage {
    fn load(&self) -> io::Result<Session> {
        self.stored
            .lock()
            .map(|s| s.clone())
            .map_err(|_| io::Error::other("memory storage poisoned"))
    }

    fn save(&self, session: &Session) -> io::Result<()> {
        self.write(session.clone())
    }

    fn clear(&self) -> io::Result<()> {
        self.write(Session::default())
    }
}

// --- Store & Reader ---

/// SessionStore
///
/// The only writer of the session. Readers obtain a `SessionReader` and can
/// subscribe to changes; they cannot mutate anything.
///
/// Every mutation persists first and publishes second, under one lock, so the
/// published value always equals what is on storage.
pub struct SessionStore {
    persistence: PersistenceState,
    tx: watch::Sender<Session>,
    write_lock: Mutex<()>,
}

#[derive(Deserialize)]
struct LoginData {
    token: Option<String>,
    nome: Option<String>,
}

impl SessionStore {
    /// Restores whatever session the storage holds. An unreadable store starts
    /// anonymous and is wiped so memory and storage agree.
    pub fn open(persistence: PersistenceState) -> Self {
        let restored = match persistence.load() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "persisted session unreadable, starting anonymous");
                if let Err(e) = persistence.clear() {
                    tracing::warn!(error = %e, "could not clear unreadable session");
                }
                Session::default()
            }
        };

        let (tx, _) = watch::channel(restored);
        Self {
            persistence,
            tx,
            write_lock: Mutex::new(()),
        }
    }

    pub fn reader(&self) -> SessionReader {
        SessionReader { rx: self.tx.subscribe() }
    }

    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// login
    ///
    /// `POST api/logar {cpf, senha}`. On a 2xx carrying a token the new session
    /// replaces any previous one wholesale. Every failure, including transport
    /// failures, is an `AuthError::InvalidCredentials` whose text comes from the
    /// response envelope when there is one.
    pub async fn login(
        &self,
        api: &ApiGateway,
        cpf: &str,
        senha: &str,
    ) -> Result<Session, ConsoleError> {
        let body = json!({ "cpf": cpf_digits(cpf), "senha": senha });

        let response = match api.post(LOGIN_PATH, body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "login transport failure");
                return Err(AuthError::InvalidCredentials(LOGIN_FALLBACK.to_string()).into());
            }
        };

        if !response.is_success() {
            let message = crate::api::ErrorDetail::from_body(&response.body)
                .message
                .unwrap_or_else(|| LOGIN_FALLBACK.to_string());
            tracing::info!(status = response.status, "login rejected");
            return Err(AuthError::InvalidCredentials(message).into());
        }

        let data = response.body.get("data").cloned().unwrap_or(response.body);
        let login: LoginData = serde_json::from_value(data).map_err(|e| {
            tracing::warn!(error = %e, "login response without a usable envelope");
            AuthError::InvalidCredentials("Erro ao tentar fazer login.".to_string())
        })?;
        let Some(token) = login.token.filter(|t| !t.is_empty()) else {
            return Err(AuthError::InvalidCredentials("Erro ao tentar fazer login.".to_string()).into());
        };

        let session = Session {
            token: Some(token),
            display_name: login.nome,
        };
        self.replace(session.clone())?;
        tracing::info!("login succeeded");
        Ok(session)
    }

    /// logout
    ///
    /// Clears storage and memory. Idempotent and infallible. When storage cannot
    /// be cleared, an anonymous session is written over it instead so the next
    /// start does not restore the old token; if that fails too it is logged, and
    /// memory is cleared regardless.
    pub fn logout(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = self.persistence.clear() {
            tracing::warn!(error = %e, "could not clear persisted session, overwriting it");
            if let Err(e) = self.persistence.save(&Session::default()) {
                tracing::error!(error = %e, "persisted session survives logout");
            }
        }
        let was_authenticated = self.tx.send_replace(Session::default()).token.is_some();
        if was_authenticated {
            tracing::info!("session cleared");
        }
    }

    fn replace(&self, session: Session) -> Result<(), ConsoleError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.persistence
            .save(&session)
            .map_err(|e| ConsoleError::Persistence(e.to_string()))?;
        self.tx.send_replace(session);
        Ok(())
    }
}

/// SessionReader
///
/// Read-only capability over the session. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SessionReader {
    rx: watch::Receiver<Session>,
}

impl SessionReader {
    pub fn current(&self) -> Session {
        self.rx.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.rx.borrow().token.clone()
    }

    pub fn display_name(&self) -> Option<String> {
        self.rx.borrow().display_name.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().token.is_some()
    }

    /// Role from the token's `perfil` claim, if the token decodes.
    pub fn role(&self) -> Option<Role> {
        self.token()
            .and_then(|token| decode_claims(&token).ok())
            .map(|claims| claims.perfil)
    }

    /// A receiver that wakes on every session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.rx.clone()
    }
}
