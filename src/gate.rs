use std::sync::Arc;

use chrono::Utc;

use crate::{
    confirm::{ConfirmRequest, Confirmer},
    error::{AuthError, ConsoleError},
    models::{Claims, EntityKind, Role},
    session::{SessionReader, SessionStore, decode_claims},
};

/// What a menu entry lets the user do with a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    List,
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub kind: EntityKind,
    pub actions: Vec<MenuAction>,
}

/// RoleVisibility
///
/// Menu entries and dashboard cards for a role. Derived only from the token's
/// `perfil`; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleVisibility {
    pub menu: Vec<MenuEntry>,
    pub cards: Vec<EntityKind>,
}

impl RoleVisibility {
    pub fn for_role(role: Role) -> Self {
        let kinds: &[EntityKind] = match role {
            Role::Admin => &EntityKind::ALL,
            Role::Teacher => &[EntityKind::Student],
        };
        Self {
            menu: kinds
                .iter()
                .map(|&kind| MenuEntry {
                    kind,
                    actions: vec![MenuAction::List, MenuAction::Create],
                })
                .collect(),
            cards: kinds.to_vec(),
        }
    }

    pub fn allows(&self, kind: EntityKind) -> bool {
        self.menu.iter().any(|entry| entry.kind == kind)
    }
}

/// Where the console should be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Entry screen: login or registration.
    Login,
    Dashboard {
        role: Role,
        display_name: Option<String>,
        visibility: RoleVisibility,
    },
}

/// SessionGate
///
/// Guards every protected operation. Expiry is checked lazily, at the start of an
/// operation, and any `AuthError` that comes back from the server ends the whole
/// session. The gate asks the `SessionStore` to log out; it never writes the
/// session itself.
#[derive(Clone)]
pub struct SessionGate {
    store: Arc<SessionStore>,
    reader: SessionReader,
}

impl SessionGate {
    pub fn new(store: Arc<SessionStore>) -> Self {
        let reader = store.reader();
        Self { store, reader }
    }

    pub fn reader(&self) -> &SessionReader {
        &self.reader
    }

    /// check
    ///
    /// Returns the current claims, or forces a logout and fails with
    /// `SessionExpired` when the token is missing its `exp`, cannot be decoded or
    /// has expired.
    pub fn check(&self) -> Result<Claims, AuthError> {
        self.check_at(Utc::now().timestamp())
    }

    pub fn check_at(&self, now: i64) -> Result<Claims, AuthError> {
        let Some(token) = self.reader.token() else {
            return Err(AuthError::NotAuthenticated);
        };

        match decode_claims(&token) {
            Ok(claims) if claims.exp >= now => Ok(claims),
            Ok(_) => {
                tracing::info!("session expired, forcing logout");
                self.store.logout();
                Err(AuthError::SessionExpired)
            }
            Err(e) => {
                tracing::warn!(error = %e, "session token undecodable, forcing logout");
                self.store.logout();
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// authorize
    ///
    /// `check`, plus the role's visibility: a kind outside the role's menu is
    /// `Forbidden` and nothing is sent. The session stays intact.
    pub fn authorize(&self, kind: EntityKind) -> Result<Claims, ConsoleError> {
        let claims = self.check()?;
        if !RoleVisibility::for_role(claims.perfil).allows(kind) {
            tracing::warn!(role = ?claims.perfil, %kind, "kind not visible to role");
            return Err(ConsoleError::Forbidden(kind));
        }
        Ok(claims)
    }

    /// Passes a result through, ending the session first if it is an `AuthError`.
    pub fn observe<T>(&self, result: Result<T, ConsoleError>) -> Result<T, ConsoleError> {
        if let Err(ConsoleError::Auth(e)) = &result {
            tracing::warn!(error = %e, "authorization failure, forcing logout");
            self.store.logout();
        }
        result
    }

    /// route
    ///
    /// The screen the console should show now. An expired or broken session lands
    /// on the entry screen (and is cleared on the way).
    pub fn route(&self) -> Route {
        match self.check() {
            Ok(claims) => Route::Dashboard {
                role: claims.perfil,
                display_name: self.reader.display_name(),
                visibility: RoleVisibility::for_role(claims.perfil),
            },
            Err(_) => Route::Login,
        }
    }

    /// User-initiated logout, behind a confirmation. Returns whether it happened.
    pub async fn logout(&self, confirmer: &dyn Confirmer) -> bool {
        if !confirmer.confirm(ConfirmRequest::logout()).await {
            return false;
        }
        self.store.logout();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_sees_everything_teacher_only_students() {
        let admin = RoleVisibility::for_role(Role::Admin);
        assert_eq!(admin.cards, EntityKind::ALL.to_vec());
        assert!(admin.allows(EntityKind::School));

        let teacher = RoleVisibility::for_role(Role::Teacher);
        assert_eq!(teacher.cards, vec![EntityKind::Student]);
        assert_eq!(teacher.menu.len(), 1);
        assert!(!teacher.allows(EntityKind::Teacher));
        assert!(!teacher.allows(EntityKind::School));
    }
}
