#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use escola_console::{
    AppConfig, Console, MemorySessionStorage, MockTransport, PersistenceState, Role, TransportState,
    models::Claims, session::Session,
};
use jsonwebtoken::{EncodingKey, Header, encode};

// --- Token Helpers ---

/// Mints a token the way the backend would. The secret is irrelevant: the console
/// never verifies signatures.
pub fn token(role: Role, exp: i64) -> String {
    let claims = Claims { exp, perfil: role, sub: None };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"backend-secret")).unwrap()
}

pub fn valid_token(role: Role) -> String {
    token(role, Utc::now().timestamp() + 3600)
}

pub fn expired_token(role: Role) -> String {
    token(role, Utc::now().timestamp() - 60)
}

pub fn session_for(role: Role, name: &str) -> Session {
    Session {
        token: Some(valid_token(role)),
        display_name: Some(name.to_string()),
    }
}

// --- Console Wiring ---

pub struct Harness {
    pub console: Console,
    pub transport: Arc<MockTransport>,
    pub storage: Arc<MemorySessionStorage>,
}

pub fn harness(session: Session) -> Harness {
    let transport = Arc::new(MockTransport::new());
    let storage = Arc::new(MemorySessionStorage::with_session(session));
    let console = Console::new(
        AppConfig::default(),
        transport.clone() as TransportState,
        storage.clone() as PersistenceState,
    );
    Harness { console, transport, storage }
}

pub fn admin() -> Harness {
    harness(session_for(Role::Admin, "Diretora Ana"))
}

pub fn teacher() -> Harness {
    harness(session_for(Role::Teacher, "Prof. Carlos"))
}

pub fn anonymous() -> Harness {
    harness(Session::default())
}
