use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::{
    api::ApiGateway,
    confirm::{ConfirmRequest, Confirmer},
    error::ConsoleError,
    form::{EditForm, EditOutcome},
    gate::SessionGate,
    models::{Entity, EntityId, EntityKind, FieldSpec},
};

const DELETE_FAILED: &str = "Não foi possível excluir o item.";
const DELETE_DONE: &str = "O item foi excluído com sucesso.";
const LOAD_FAILED: &str = "Não foi possível carregar a listagem.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The response was applied; carries the row count.
    Applied(usize),
    /// A newer load was issued (or the view was closed) before this one finished.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Cancelled,
    Deleted,
}

#[derive(Debug, Default)]
struct ListState {
    entities: Vec<Entity>,
    editing: Option<EntityId>,
    error: Option<String>,
    notice: Option<String>,
    /// Sequence number of the most recently issued load.
    issued: u64,
    /// Token the current rows were loaded with.
    loaded_with: Option<String>,
    unmounted: bool,
}

/// EntityListController
///
/// Owns the rows of one entity kind. Rows are only ever replaced by a fetch or
/// changed after the server confirmed a delete or an edit; nothing is removed
/// optimistically.
///
/// Methods take `&self` so several loads can be in flight at once; each load is
/// numbered and only the most recently issued one may write the rows.
pub struct EntityListController {
    kind: EntityKind,
    api: ApiGateway,
    gate: SessionGate,
    state: Mutex<ListState>,
}

impl EntityListController {
    pub fn new(kind: EntityKind, api: ApiGateway, gate: SessionGate) -> Self {
        Self {
            kind,
            api,
            gate,
            state: Mutex::default(),
        }
    }

    // The guard is never held across an await.
    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn columns(&self) -> Vec<&'static FieldSpec> {
        self.kind.columns()
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.lock().entities.clone()
    }

    /// Rendered cells, one row per entity, following the column policy.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.lock().entities.iter().map(Entity::row).collect()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn notice(&self) -> Option<String> {
        self.lock().notice.clone()
    }

    pub fn editing(&self) -> Option<EntityId> {
        self.lock().editing.clone()
    }

    /// load
    ///
    /// `GET api/<kind>`. A non-array body or a failed request degrades to an empty
    /// list with an error note. Only an authorization failure (after the session
    /// has been ended) or a kind the role may not see is returned as an error.
    pub async fn load(&self) -> Result<LoadOutcome, ConsoleError> {
        let token = self.gate.reader().token();
        if let Err(e) = self.gate.authorize(self.kind) {
            self.lock().entities.clear();
            return Err(e);
        }

        let seq = {
            let mut state = self.lock();
            state.issued += 1;
            state.issued
        };

        let fetched = match self.api.get(self.kind.path()).await {
            Ok(response) => response.into_payload(LOAD_FAILED).map(|payload| payload.data),
            Err(e) => Err(e.into()),
        };
        let fetched = self.gate.observe(fetched);

        let mut state = self.lock();
        if let Err(e @ ConsoleError::Auth(_)) = fetched {
            state.entities.clear();
            state.loaded_with = None;
            return Err(e);
        }
        if state.unmounted || seq != state.issued {
            tracing::debug!(kind = %self.kind, seq, latest = state.issued, "discarding stale list response");
            return Ok(LoadOutcome::Stale);
        }

        state.loaded_with = token;
        match fetched {
            Ok(Value::Array(items)) => {
                let total = items.len();
                state.entities = items
                    .into_iter()
                    .filter_map(|item| match Entity::from_value(self.kind, item) {
                        Ok(entity) => Some(entity),
                        Err(e) => {
                            tracing::warn!(kind = %self.kind, error = %e, "skipping malformed row");
                            None
                        }
                    })
                    .collect();
                state.error = None;
                tracing::info!(kind = %self.kind, rows = state.entities.len(), total, "list loaded");
                Ok(LoadOutcome::Applied(state.entities.len()))
            }
            Ok(_) => {
                tracing::warn!(kind = %self.kind, "list response was not an array");
                state.entities.clear();
                state.error = Some(LOAD_FAILED.to_string());
                Ok(LoadOutcome::Applied(0))
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "list load failed, showing empty table");
                state.entities.clear();
                state.error = Some(LOAD_FAILED.to_string());
                Ok(LoadOutcome::Applied(0))
            }
        }
    }

    /// Loads on first activation and again whenever the session token changed
    /// since the rows were fetched. Returns `None` when nothing needed loading.
    pub async fn ensure_loaded(&self) -> Result<Option<LoadOutcome>, ConsoleError> {
        let current = self.gate.reader().token();
        let fresh = {
            let state = self.lock();
            state.issued > 0 && state.loaded_with.is_some() && state.loaded_with == current
        };
        if fresh {
            return Ok(None);
        }
        self.load().await.map(Some)
    }

    /// request_delete
    ///
    /// Asks for confirmation first; only then `DELETE api/<kind>/<id>`. A confirmed
    /// delete removes exactly that row, without a re-fetch. A failed delete leaves
    /// the rows untouched and sets an error notice.
    pub async fn request_delete(
        &self,
        id: &EntityId,
        confirmer: &dyn Confirmer,
    ) -> Result<DeleteOutcome, ConsoleError> {
        let Some(listed) = self.listed_id(id) else {
            return Err(ConsoleError::UnknownEntity(id.clone()));
        };
        let id = &listed;

        if !confirmer.confirm(ConfirmRequest::delete()).await {
            tracing::debug!(kind = %self.kind, %id, "delete cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }

        let result = self.gate.observe(self.send_delete(id).await);

        let mut state = self.lock();
        match result {
            Ok(()) => {
                tracing::info!(kind = %self.kind, %id, "record deleted");
                if !state.unmounted {
                    state.entities.retain(|e| !e.id().matches(id));
                    state.notice = Some(DELETE_DONE.to_string());
                    state.error = None;
                }
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, %id, error = %e, "delete failed");
                if e.is_auth() {
                    state.entities.clear();
                } else if !state.unmounted {
                    state.error = Some(DELETE_FAILED.to_string());
                }
                Err(e)
            }
        }
    }

    /// The listed row's own id for `id`, however the caller spelled it.
    fn listed_id(&self, id: &EntityId) -> Option<EntityId> {
        self.lock().entities.iter().find(|e| e.id().matches(id)).map(|e| e.id().clone())
    }

    async fn send_delete(&self, id: &EntityId) -> Result<(), ConsoleError> {
        self.gate.authorize(self.kind)?;
        let response = self.api.delete(&self.kind.item_path(id)).await?;
        response.into_payload(DELETE_FAILED).map(|_| ())
    }

    // --- Edit Session ---

    /// open_edit
    ///
    /// Starts editing a listed row. Only one edit may be open at a time.
    pub fn open_edit(&self, id: &EntityId) -> Result<EditForm, ConsoleError> {
        let mut state = self.lock();
        if state.editing.is_some() {
            return Err(ConsoleError::EditInProgress);
        }
        let entity = state
            .entities
            .iter()
            .find(|e| e.id().matches(id))
            .ok_or_else(|| ConsoleError::UnknownEntity(id.clone()))?;
        let form = EditForm::new(entity);
        let listed = entity.id().clone();
        state.editing = Some(listed);
        Ok(form)
    }

    /// close_edit
    ///
    /// Closes the open edit. A dirty form needs the user to confirm discarding
    /// the changes; returns false (edit stays open) if they decline.
    pub async fn close_edit(&self, form: &EditForm, confirmer: &dyn Confirmer) -> bool {
        if form.is_dirty() && !confirmer.confirm(ConfirmRequest::discard_changes()).await {
            return false;
        }
        self.lock().editing = None;
        true
    }

    /// save_edit
    ///
    /// Submits the open edit. When the server echoes the updated record it replaces
    /// the row in place; otherwise the list is fetched again. The edit closes only
    /// on success.
    pub async fn save_edit(
        &self,
        form: &mut EditForm,
        confirmer: &dyn Confirmer,
    ) -> Result<EditOutcome, ConsoleError> {
        let outcome = form.submit(&self.api, &self.gate, confirmer).await?;

        match &outcome {
            EditOutcome::Cancelled => {}
            EditOutcome::Saved(Some(updated)) => {
                let mut state = self.lock();
                state.editing = None;
                if !state.unmounted {
                    if let Some(row) = state.entities.iter_mut().find(|e| e.id().matches(updated.id())) {
                        *row = updated.clone();
                    }
                }
            }
            EditOutcome::Saved(None) => {
                self.lock().editing = None;
                self.load().await?;
            }
        }
        Ok(outcome)
    }

    /// Marks the view as closed; responses arriving afterwards are ignored.
    pub fn unmount(&self) {
        let mut state = self.lock();
        state.unmounted = true;
        state.editing = None;
    }
}
