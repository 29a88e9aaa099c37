use std::env;
use std::path::PathBuf;

/// AppConfig
///
/// Holds the console's entire configuration state. It is loaded once at startup and
/// handed (by clone) to the gateway and the session storage, so every component sees
/// the same base URL and storage location.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Base path prefixed to every API path (e.g. `http://localhost:8000/`).
    pub api_base_url: String,
    // Where the persisted session (token + display name) lives between runs.
    pub session_file: PathBuf,
    // Runtime environment marker. Controls log formatting and fail-fast rules.
    pub env: Env,
}

/// Env
///
/// Defines the runtime context: human-readable logs and a localhost backend in
/// `Local`, JSON logs and a mandatory explicit backend in `Production`.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/";
pub const DEFAULT_SESSION_FILE: &str = ".escola-session.json";

impl Default for AppConfig {
    /// default
    ///
    /// Provides a non-panicking AppConfig for tests and scaffolding, without
    /// touching environment variables.
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            env: Env::Local,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables and implements the
    /// **fail-fast** principle for production.
    ///
    /// # Panics
    /// Panics if `APP_ENV=production` and `API_BASE_URL` is not set. A production
    /// console silently pointed at localhost would look logged-out forever.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()).as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let api_base_url = match env {
            Env::Production => env::var("API_BASE_URL")
                .expect("FATAL: API_BASE_URL must be set in production."),
            Env::Local => {
                env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
            }
        };

        let session_file = env::var("SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE));

        Self {
            api_base_url: normalize_base_url(&api_base_url),
            session_file,
            env,
        }
    }
}

/// Ensures the base URL ends with exactly one `/`, so `api/alunos` joins cleanly.
pub fn normalize_base_url(raw: &str) -> String {
    format!("{}/", raw.trim().trim_end_matches('/'))
}
