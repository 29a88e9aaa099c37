use serde_json::Value;

use crate::{
    api::ApiGateway,
    error::ConsoleError,
    gate::{RoleVisibility, SessionGate},
    models::{EntityKind, Role},
};

const SUMMARY_FAILED: &str = "Não foi possível carregar o resumo.";

/// Totals shown on the dashboard cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counts {
    /// Teachers only ever see their students.
    Students(usize),
    All {
        students: usize,
        teachers: usize,
        schools: usize,
    },
}

impl Counts {
    pub fn get(&self, kind: EntityKind) -> Option<usize> {
        match (self, kind) {
            (Counts::Students(n), EntityKind::Student) => Some(*n),
            (Counts::Students(_), _) => None,
            (Counts::All { students, .. }, EntityKind::Student) => Some(*students),
            (Counts::All { teachers, .. }, EntityKind::Teacher) => Some(*teachers),
            (Counts::All { schools, .. }, EntityKind::School) => Some(*schools),
        }
    }
}

/// DashboardSummary
///
/// Either every count the role can see, or none of them plus an error note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSummary {
    pub role: Role,
    pub display_name: Option<String>,
    pub visibility: RoleVisibility,
    pub counts: Option<Counts>,
    pub error: Option<String>,
}

/// load_summary
///
/// Administrators get three counts fetched concurrently and combined only when all
/// three succeed; teachers get the students count alone. An authorization failure
/// on any fetch ends the session and is returned.
pub async fn load_summary(
    api: &ApiGateway,
    gate: &SessionGate,
) -> Result<DashboardSummary, ConsoleError> {
    let claims = gate.check()?;
    let role = claims.perfil;

    let counts = match role {
        Role::Teacher => count(api, EntityKind::Student).await.map(Counts::Students),
        Role::Admin => {
            let (students, teachers, schools) = tokio::join!(
                count(api, EntityKind::Student),
                count(api, EntityKind::Teacher),
                count(api, EntityKind::School),
            );
            match (students, teachers, schools) {
                (Ok(students), Ok(teachers), Ok(schools)) => Ok(Counts::All {
                    students,
                    teachers,
                    schools,
                }),
                (students, teachers, schools) => {
                    let mut failures: Vec<ConsoleError> =
                        [students.err(), teachers.err(), schools.err()].into_iter().flatten().collect();
                    // An auth failure wins so the session gets ended.
                    let pick = failures.iter().position(ConsoleError::is_auth).unwrap_or(0);
                    Err(if pick < failures.len() {
                        failures.swap_remove(pick)
                    } else {
                        ConsoleError::Domain {
                            status: 0,
                            message: SUMMARY_FAILED.to_string(),
                            fields: Default::default(),
                        }
                    })
                }
            }
        }
    };

    let summary = |counts, error| DashboardSummary {
        role,
        display_name: gate.reader().display_name(),
        visibility: RoleVisibility::for_role(role),
        counts,
        error,
    };

    match gate.observe(counts) {
        Ok(counts) => {
            tracing::info!(?role, ?counts, "dashboard summary loaded");
            Ok(summary(Some(counts), None))
        }
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            tracing::warn!(?role, error = %e, "dashboard summary incomplete, hiding counts");
            Ok(summary(None, Some(SUMMARY_FAILED.to_string())))
        }
    }
}

async fn count(api: &ApiGateway, kind: EntityKind) -> Result<usize, ConsoleError> {
    let payload = api.get(kind.path()).await?.into_payload(SUMMARY_FAILED)?;
    match payload.data {
        Value::Array(items) => Ok(items.len()),
        _ => Err(ConsoleError::Domain {
            status: 200,
            message: format!("Resposta inesperada para {}.", kind.label()),
            fields: Default::default(),
        }),
    }
}
