mod common;

use std::sync::Arc;

use common::{admin, teacher};
use escola_console::{
    AuthError, ConsoleError, EntityId, EntityKind,
    api::HttpMethod,
    confirm::{AutoConfirm, ScriptedConfirmer},
    form::EditOutcome,
    list::{DeleteOutcome, LoadOutcome},
    session::{Session, SessionPersistence},
};
use serde_json::{Value, json};

fn students() -> Value {
    json!({ "data": [
        { "id": 41, "nome": "Bruno", "cpf": "11122233344", "data_nascimento": "2010-05-01", "professor_id": 7 },
        { "id": 42, "nome": "Clara", "cpf": "55566677788", "data_nascimento": "2011-06-02", "professor_id": 7 },
        { "id": 43, "nome": "Davi",  "cpf": "99900011122", "data_nascimento": "2012-07-03", "professor_id": 8 }
    ]})
}

fn ids(list: &escola_console::list::EntityListController) -> Vec<EntityId> {
    list.entities().iter().map(|e| e.id().clone()).collect()
}

// --- Load ---

#[tokio::test]
async fn test_load_renders_masked_rows() {
    let h = teacher();
    h.transport.on(HttpMethod::Get, "api/alunos", 200, students());

    let list = h.console.list(EntityKind::Student);
    assert_eq!(list.load().await.unwrap(), LoadOutcome::Applied(3));

    let columns: Vec<&str> = list.columns().iter().map(|c| c.name).collect();
    assert_eq!(columns, vec!["nome", "cpf", "data_nascimento"]);
    assert_eq!(list.rows()[0], vec!["Bruno", "111.222.333-44", "2010-05-01"]);
    assert_eq!(list.error(), None);
}

#[tokio::test]
async fn test_non_array_response_degrades_to_empty_list() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/escola", 200, json!({ "data": { "oops": true } }));

    let list = h.console.list(EntityKind::School);
    assert_eq!(list.load().await.unwrap(), LoadOutcome::Applied(0));
    assert!(list.entities().is_empty());
    assert!(list.error().is_some());
}

#[tokio::test]
async fn test_server_error_degrades_to_empty_list() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/professores", 500, json!({ "message": "boom" }));

    let list = h.console.list(EntityKind::Teacher);
    assert_eq!(list.load().await.unwrap(), LoadOutcome::Applied(0));
    assert!(list.entities().is_empty());
    assert!(h.console.session().is_authenticated());
}

#[tokio::test]
async fn test_unauthorized_load_ends_session() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/alunos", 401, json!({ "message": "Token inválido" }));

    let list = h.console.list(EntityKind::Student);
    let err = list.load().await.unwrap_err();
    assert!(matches!(err, ConsoleError::Auth(AuthError::Rejected { status: 401 })));
    assert!(!h.console.session().is_authenticated());
    assert_eq!(h.storage.load().unwrap(), Session::default());
}

#[tokio::test]
async fn test_teacher_role_cannot_reach_other_kinds() {
    let h = teacher();

    for kind in [EntityKind::Teacher, EntityKind::School] {
        let err = h.console.list(kind).load().await.unwrap_err();
        assert!(matches!(err, ConsoleError::Forbidden(k) if k == kind));
    }
    assert!(h.transport.requests().is_empty());
    assert!(h.console.session().is_authenticated());
}

#[tokio::test]
async fn test_stale_response_does_not_overwrite_newer_one() {
    let h = admin();
    let slow_gate = h.transport.on_gated(HttpMethod::Get, "api/alunos", 200, students());
    h.transport.on(
        HttpMethod::Get,
        "api/alunos",
        200,
        json!({ "data": [ { "id": 99, "nome": "Nova", "cpf": "12345678901", "data_nascimento": "2013-01-01" } ] }),
    );

    let list = Arc::new(h.console.list(EntityKind::Student));
    let slow = {
        let list = list.clone();
        tokio::spawn(async move { list.load().await })
    };
    while h.transport.requests_to(HttpMethod::Get, "api/alunos").is_empty() {
        tokio::task::yield_now().await;
    }

    assert_eq!(list.load().await.unwrap(), LoadOutcome::Applied(1));
    slow_gate.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), LoadOutcome::Stale);

    assert_eq!(ids(&list), vec![EntityId::Number(99)]);
}

#[tokio::test]
async fn test_unmounted_view_ignores_late_response() {
    let h = admin();
    let gate = h.transport.on_gated(HttpMethod::Get, "api/escola", 200, json!({ "data": [ { "id": 1, "nome": "Escola A", "endereco": "Rua 1" } ] }));

    let list = Arc::new(h.console.list(EntityKind::School));
    let pending = {
        let list = list.clone();
        tokio::spawn(async move { list.load().await })
    };
    while h.transport.requests().is_empty() {
        tokio::task::yield_now().await;
    }

    list.unmount();
    gate.notify_one();
    assert_eq!(pending.await.unwrap().unwrap(), LoadOutcome::Stale);
    assert!(list.entities().is_empty());
}

#[tokio::test]
async fn test_ensure_loaded_refetches_only_when_token_changes() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/alunos", 200, students());

    let list = h.console.list(EntityKind::Student);
    assert!(list.ensure_loaded().await.unwrap().is_some());
    assert!(list.ensure_loaded().await.unwrap().is_none());
    assert_eq!(h.transport.requests_to(HttpMethod::Get, "api/alunos").len(), 1);

    h.transport.on(
        HttpMethod::Post,
        "api/logar",
        200,
        json!({ "data": { "token": common::valid_token(escola_console::Role::Teacher), "nome": "Outro" } }),
    );
    h.console.login("12345678901", "Str0ng!Pass").await.unwrap();
    assert!(list.ensure_loaded().await.unwrap().is_some());
    assert_eq!(h.transport.requests_to(HttpMethod::Get, "api/alunos").len(), 2);
}

// --- Delete ---

#[tokio::test]
async fn test_confirmed_delete_removes_only_that_row() {
    let h = admin();
    h.transport
        .on(HttpMethod::Get, "api/alunos", 200, students())
        .on(HttpMethod::Delete, "api/alunos/42", 200, json!({ "message": "Aluno excluído" }));

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let confirmer = ScriptedConfirmer::new([true]);
    let outcome = list.request_delete(&EntityId::Number(42), &confirmer).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(ids(&list), vec![EntityId::Number(41), EntityId::Number(43)]);
    assert_eq!(confirmer.asked()[0].confirm_label, "Sim, excluir!");
    // No re-fetch after a delete.
    assert_eq!(h.transport.requests_to(HttpMethod::Get, "api/alunos").len(), 1);
    assert_eq!(list.notice().as_deref(), Some("O item foi excluído com sucesso."));
}

#[tokio::test]
async fn test_delete_finds_text_ids_by_their_digits() {
    let h = admin();
    h.transport
        .on(
            HttpMethod::Get,
            "api/escola",
            200,
            json!({ "data": [
                { "id": "5", "nome": "Escola A", "endereco": "Rua 1" },
                { "id": "6", "nome": "Escola B", "endereco": "Rua 2" }
            ]}),
        )
        .on(HttpMethod::Delete, "api/escola/5", 204, Value::Null);

    let list = h.console.list(EntityKind::School);
    list.load().await.unwrap();

    let outcome = list.request_delete(&EntityId::Number(5), &AutoConfirm(true)).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(ids(&list), vec![EntityId::Text("6".into())]);

    let form = list.open_edit(&EntityId::Number(6)).unwrap();
    assert_eq!(form.id(), &EntityId::Text("6".into()));
}

#[tokio::test]
async fn test_cancelled_delete_sends_nothing() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/alunos", 200, students());

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let outcome = list.request_delete(&EntityId::Number(42), &AutoConfirm(false)).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Cancelled);
    assert!(h.transport.requests_to(HttpMethod::Delete, "api/alunos/42").is_empty());
    assert_eq!(list.entities().len(), 3);
}

#[tokio::test]
async fn test_failed_delete_keeps_rows_and_sets_error() {
    let h = admin();
    h.transport
        .on(HttpMethod::Get, "api/alunos", 200, students())
        .on(HttpMethod::Delete, "api/alunos/42", 500, json!({}));

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let err = list.request_delete(&EntityId::Number(42), &AutoConfirm(true)).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Domain { status: 500, .. }));
    assert_eq!(list.entities().len(), 3);
    assert_eq!(list.error().as_deref(), Some("Não foi possível excluir o item."));
}

#[tokio::test]
async fn test_delete_of_unlisted_id_is_rejected() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/alunos", 200, students());

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let confirmer = ScriptedConfirmer::new([true]);
    let err = list.request_delete(&EntityId::Number(7), &confirmer).await.unwrap_err();
    assert!(matches!(err, ConsoleError::UnknownEntity(_)));
    assert!(confirmer.asked().is_empty());
}

// --- Edit ---

#[tokio::test]
async fn test_only_one_edit_at_a_time() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/alunos", 200, students());

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let form = list.open_edit(&EntityId::Number(41)).unwrap();
    assert!(matches!(list.open_edit(&EntityId::Number(42)), Err(ConsoleError::EditInProgress)));

    assert!(list.close_edit(&form, &AutoConfirm(false)).await);
    assert!(list.open_edit(&EntityId::Number(42)).is_ok());
}

#[tokio::test]
async fn test_closing_dirty_edit_asks_to_discard() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/alunos", 200, students());

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let mut form = list.open_edit(&EntityId::Number(41)).unwrap();
    form.set("nome", "Bruno Silva");

    let confirmer = ScriptedConfirmer::new([false, true]);
    assert!(!list.close_edit(&form, &confirmer).await);
    assert_eq!(list.editing(), Some(EntityId::Number(41)));
    assert!(list.close_edit(&form, &confirmer).await);
    assert_eq!(list.editing(), None);
    assert_eq!(confirmer.asked()[0].confirm_label, "Sim, sair!");
}

#[tokio::test]
async fn test_saved_edit_replaces_row_in_place() {
    let h = admin();
    h.transport
        .on(HttpMethod::Get, "api/alunos", 200, students())
        .on(
            HttpMethod::Put,
            "api/alunos/42",
            200,
            json!({
                "message": "Aluno atualizado com sucesso!",
                "data": { "id": 42, "nome": "Clara Souza", "cpf": "55566677788", "data_nascimento": "2011-06-02", "professor_id": 7 }
            }),
        );

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let mut form = list.open_edit(&EntityId::Number(42)).unwrap();
    form.set("nome", "Clara Souza");
    let outcome = list.save_edit(&mut form, &AutoConfirm(true)).await.unwrap();

    assert!(matches!(outcome, EditOutcome::Saved(Some(_))));
    assert_eq!(list.entities()[1].name(), "Clara Souza");
    assert_eq!(list.editing(), None);
    assert_eq!(h.transport.requests_to(HttpMethod::Get, "api/alunos").len(), 1);
}

#[tokio::test]
async fn test_partial_echo_refetches_instead_of_blanking_cells() {
    let h = admin();
    h.transport
        .on(HttpMethod::Get, "api/alunos", 200, students())
        .on(HttpMethod::Put, "api/alunos/42", 200, json!({ "data": { "id": 42, "nome": "Clara Souza" } }));

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let mut form = list.open_edit(&EntityId::Number(42)).unwrap();
    form.set("nome", "Clara Souza");
    let outcome = list.save_edit(&mut form, &AutoConfirm(true)).await.unwrap();

    assert_eq!(outcome, EditOutcome::Saved(None));
    assert_eq!(h.transport.requests_to(HttpMethod::Get, "api/alunos").len(), 2);
    // Rows come from the refetch, never from the partial echo.
    assert_eq!(list.rows()[1], vec!["Clara", "555.666.777-88", "2011-06-02"]);
}

#[tokio::test]
async fn test_saved_edit_without_echo_refetches() {
    let h = admin();
    h.transport
        .on(HttpMethod::Get, "api/alunos", 200, students())
        .on(HttpMethod::Put, "api/alunos/43", 200, json!({ "message": "Atualizado" }));

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let mut form = list.open_edit(&EntityId::Number(43)).unwrap();
    form.set("nome", "Davi Lima");
    assert_eq!(list.save_edit(&mut form, &AutoConfirm(true)).await.unwrap(), EditOutcome::Saved(None));
    assert_eq!(h.transport.requests_to(HttpMethod::Get, "api/alunos").len(), 2);
}

#[tokio::test]
async fn test_declined_save_keeps_edit_open() {
    let h = admin();
    h.transport.on(HttpMethod::Get, "api/alunos", 200, students());

    let list = h.console.list(EntityKind::Student);
    list.load().await.unwrap();

    let mut form = list.open_edit(&EntityId::Number(41)).unwrap();
    form.set("nome", "Bruno B.");
    let outcome = list.save_edit(&mut form, &AutoConfirm(false)).await.unwrap();

    assert_eq!(outcome, EditOutcome::Cancelled);
    assert_eq!(list.editing(), Some(EntityId::Number(41)));
    assert!(h.transport.requests_to(HttpMethod::Put, "api/alunos/41").is_empty());
}
