use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::validators::{cpf_digits, mask_cpf};

// --- Identity & Claims ---

/// Role
///
/// The `perfil` claim carried by the bearer token. Drives everything the
/// console shows (see `gate::RoleVisibility`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RoleRepr", into = "u8")]
pub enum Role {
    Admin = 1,
    Teacher = 2,
}

impl From<Role> for u8 {
    fn from(role: Role) -> u8 {
        role as u8
    }
}

// The backend has been seen sending `perfil` both as a number and as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RoleRepr {
    Number(i64),
    Text(String),
}

impl TryFrom<RoleRepr> for Role {
    type Error = String;

    fn try_from(repr: RoleRepr) -> Result<Self, Self::Error> {
        let code = match repr {
            RoleRepr::Number(n) => n,
            RoleRepr::Text(s) => s.trim().parse().map_err(|_| format!("invalid perfil {s:?}"))?,
        };
        match code {
            1 => Ok(Role::Admin),
            2 => Ok(Role::Teacher),
            other => Err(format!("unknown perfil {other}")),
        }
    }
}

/// Claims
///
/// The subset of the bearer token payload the console consumes. The signature is
/// never checked client-side; the backend remains the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiration time, seconds since the Unix epoch.
    pub exp: i64,
    /// 1 = administrator, 2 = teacher.
    pub perfil: Role,
    /// Subject. Some backends call it `id`.
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub sub: Option<EntityId>,
}

// --- Entities ---

/// EntityId
///
/// Server-assigned identifier. Kept in whichever JSON shape the server used, so it
/// is sent back exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl EntityId {
    /// Parses user input: integers become `Number`, anything else stays text.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(match raw.parse::<i64>() {
            Ok(n) => EntityId::Number(n),
            Err(_) => EntityId::Text(raw.to_string()),
        })
    }

    /// Same record, whatever JSON shape each side used (`42` and `"42"` match).
    pub fn matches(&self, other: &EntityId) -> bool {
        self == other || self.to_string() == other.to_string()
    }

    pub fn to_json(&self) -> Value {
        match self {
            EntityId::Number(n) => Value::from(*n),
            EntityId::Text(s) => Value::from(s.clone()),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Number(n)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

/// EntityKind
///
/// The three manageable record types. The API path segment is fixed per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Student,
    Teacher,
    School,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Student, EntityKind::Teacher, EntityKind::School];

    /// Collection path, relative to the API base (`api/alunos`).
    pub fn path(self) -> &'static str {
        match self {
            EntityKind::Student => "api/alunos",
            EntityKind::Teacher => "api/professores",
            EntityKind::School => "api/escola",
        }
    }

    /// Item path for a given identifier (`api/alunos/42`).
    pub fn item_path(self, id: &EntityId) -> String {
        format!("{}/{}", self.path(), id)
    }

    pub fn slug(self) -> &'static str {
        match self {
            EntityKind::Student => "alunos",
            EntityKind::Teacher => "professores",
            EntityKind::School => "escola",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Student => "Alunos",
            EntityKind::Teacher => "Professores",
            EntityKind::School => "Escolas",
        }
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            EntityKind::Student => STUDENT_FIELDS,
            EntityKind::Teacher => TEACHER_FIELDS,
            EntityKind::School => SCHOOL_FIELDS,
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Static column policy for the list grid.
    pub fn columns(self) -> Vec<&'static FieldSpec> {
        self.fields().iter().filter(|f| f.list_column).collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alunos" | "aluno" | "students" | "student" => Ok(EntityKind::Student),
            "professores" | "professor" | "teachers" | "teacher" => Ok(EntityKind::Teacher),
            "escola" | "escolas" | "schools" | "school" => Ok(EntityKind::School),
            other => Err(format!("unknown entity kind {other:?}")),
        }
    }
}

fn digits_only<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|s| cpf_digits(&s)).unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Student
///
/// A row of `api/alunos`. `cpf` is always digits only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: EntityId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nome: String,
    #[serde(default, deserialize_with = "digits_only")]
    pub cpf: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub data_nascimento: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professor_id: Option<EntityId>,
}

/// Teacher
///
/// A row of `api/professores`. The password is write-only and never part of this
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: EntityId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nome: String,
    #[serde(default, deserialize_with = "digits_only")]
    pub cpf: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub data_nascimento: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escola_id: Option<EntityId>,
}

/// School
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: EntityId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nome: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub endereco: String,
}

/// Entity
///
/// Closed variant over the three record types. Created only from server payloads;
/// the console never invents identifiers.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Student(Student),
    Teacher(Teacher),
    School(School),
}

impl Entity {
    pub fn from_value(kind: EntityKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EntityKind::Student => Entity::Student(serde_json::from_value(value)?),
            EntityKind::Teacher => Entity::Teacher(serde_json::from_value(value)?),
            EntityKind::School => Entity::School(serde_json::from_value(value)?),
        })
    }

    /// from_complete_value
    ///
    /// Like `from_value`, but only for a full record: `id` and every stored
    /// field must be present and non-null. A partial echo yields `None`.
    pub fn from_complete_value(kind: EntityKind, value: Value) -> Option<Self> {
        let object = value.as_object()?;
        let present = |key: &str| object.get(key).is_some_and(|v| !v.is_null());
        let complete = present("id")
            && kind
                .fields()
                .iter()
                .filter(|f| !matches!(f.input, InputKind::Password | InputKind::Reference(_)))
                .all(|f| present(f.name));
        if !complete {
            return None;
        }
        Self::from_value(kind, value).ok()
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Student(_) => EntityKind::Student,
            Entity::Teacher(_) => EntityKind::Teacher,
            Entity::School(_) => EntityKind::School,
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            Entity::Student(s) => &s.id,
            Entity::Teacher(t) => &t.id,
            Entity::School(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Student(s) => &s.nome,
            Entity::Teacher(t) => &t.nome,
            Entity::School(s) => &s.nome,
        }
    }

    /// Raw (stored-form) value of a schema field, used to pre-populate edit forms.
    /// Write-only fields have no stored value.
    pub fn field_value(&self, name: &str) -> Option<String> {
        let id_text = |id: &Option<EntityId>| id.as_ref().map(ToString::to_string);
        match (self, name) {
            (_, "nome") => Some(self.name().to_string()),
            (Entity::Student(s), "cpf") => Some(s.cpf.clone()),
            (Entity::Student(s), "data_nascimento") => Some(s.data_nascimento.clone()),
            (Entity::Student(s), "professor_id") => id_text(&s.professor_id),
            (Entity::Teacher(t), "cpf") => Some(t.cpf.clone()),
            (Entity::Teacher(t), "data_nascimento") => Some(t.data_nascimento.clone()),
            (Entity::Teacher(t), "escola_id") => id_text(&t.escola_id),
            (Entity::School(s), "endereco") => Some(s.endereco.clone()),
            _ => None,
        }
    }

    /// Cells for the list grid, following the kind's column policy. CPF is shown
    /// masked; the mask is never stored.
    pub fn row(&self) -> Vec<String> {
        self.kind()
            .columns()
            .into_iter()
            .map(|column| {
                let value = self.field_value(column.name).unwrap_or_default();
                match column.input {
                    InputKind::Cpf => mask_cpf(&value),
                    _ => value,
                }
            })
            .collect()
    }
}

// --- Field Schema ---

/// How a field is edited and which validator applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Cpf,
    Date,
    Password,
    /// Selection of another entity's identifier.
    Reference(EntityKind),
}

/// Whether a field appears in a given form mode and whether it may be left blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    Hidden,
}

/// FieldSpec
///
/// One entry of a kind's declarative field schema. `name` is the payload key the
/// backend expects; `label` is what the user sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub input: InputKind,
    pub on_create: Presence,
    pub on_edit: Presence,
    pub list_column: bool,
}

const fn field(
    name: &'static str,
    label: &'static str,
    input: InputKind,
    on_create: Presence,
    on_edit: Presence,
    list_column: bool,
) -> FieldSpec {
    FieldSpec { name, label, input, on_create, on_edit, list_column }
}

use InputKind::*;
use Presence::*;

static STUDENT_FIELDS: &[FieldSpec] = &[
    field("nome", "Nome", Text, Optional, Required, true),
    field("cpf", "CPF", Cpf, Optional, Required, true),
    field("data_nascimento", "Data de Nascimento", Date, Required, Required, true),
    field("professor_id", "Professor", Reference(EntityKind::Teacher), Optional, Hidden, false),
];

static TEACHER_FIELDS: &[FieldSpec] = &[
    field("nome", "Nome", Text, Optional, Required, true),
    field("cpf", "CPF", Cpf, Optional, Required, true),
    field("data_nascimento", "Data de Nascimento", Date, Optional, Required, true),
    field("senha", "Senha", Password, Required, Optional, false),
    field("escola_id", "Escola", Reference(EntityKind::School), Optional, Hidden, false),
];

static SCHOOL_FIELDS: &[FieldSpec] = &[
    field("nome", "Nome", Text, Optional, Required, true),
    field("endereco", "Endereço", Text, Optional, Required, true),
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_accepts_number_and_string() {
        let claims: Claims = serde_json::from_value(json!({"exp": 10, "perfil": 1})).unwrap();
        assert_eq!(claims.perfil, Role::Admin);
        let claims: Claims =
            serde_json::from_value(json!({"exp": 10, "perfil": "2", "id": 7})).unwrap();
        assert_eq!(claims.perfil, Role::Teacher);
        assert_eq!(claims.sub, Some(EntityId::Number(7)));
        assert!(serde_json::from_value::<Claims>(json!({"exp": 10, "perfil": 3})).is_err());
    }

    #[test]
    fn column_policy_depends_on_kind() {
        let names = |kind: EntityKind| -> Vec<&str> {
            kind.columns().iter().map(|c| c.label).collect()
        };
        assert_eq!(names(EntityKind::Student), ["Nome", "CPF", "Data de Nascimento"]);
        assert_eq!(names(EntityKind::Teacher), ["Nome", "CPF", "Data de Nascimento"]);
        assert_eq!(names(EntityKind::School), ["Nome", "Endereço"]);
    }

    #[test]
    fn entity_cpf_is_normalized_and_masked_for_display() {
        let student = Entity::from_value(
            EntityKind::Student,
            json!({"id": 42, "nome": "Ana", "cpf": "123.456.789-01", "data_nascimento": "2010-05-01"}),
        )
        .unwrap();
        assert_eq!(student.field_value("cpf").as_deref(), Some("12345678901"));
        assert_eq!(student.row(), ["Ana", "123.456.789-01", "2010-05-01"]);
        assert_eq!(student.id(), &EntityId::Number(42));
    }

    #[test]
    fn entity_tolerates_null_fields() {
        let school = Entity::from_value(
            EntityKind::School,
            json!({"id": "abc", "nome": "Escola A", "endereco": null}),
        )
        .unwrap();
        assert_eq!(school.row(), ["Escola A", ""]);
        assert_eq!(school.id().to_string(), "abc");
    }

    #[test]
    fn kind_paths_and_parsing() {
        assert_eq!(EntityKind::School.item_path(&EntityId::from(3)), "api/escola/3");
        assert_eq!("professores".parse::<EntityKind>(), Ok(EntityKind::Teacher));
        assert!("turmas".parse::<EntityKind>().is_err());
        assert_eq!(EntityId::parse(" 12 "), Some(EntityId::Number(12)));
        assert_eq!(EntityId::parse("a-1"), Some(EntityId::Text("a-1".into())));
        assert_eq!(EntityId::parse(""), None);
    }

    #[test]
    fn ids_match_across_number_and_text() {
        assert!(EntityId::Number(42).matches(&EntityId::Text("42".into())));
        assert!(EntityId::Text("42".into()).matches(&EntityId::Number(42)));
        assert!(!EntityId::Number(42).matches(&EntityId::Text("042".into())));
    }

    #[test]
    fn partial_records_are_not_complete() {
        let partial = json!({"id": 42, "nome": "Clara Souza"});
        assert!(Entity::from_complete_value(EntityKind::Student, partial).is_none());

        let full = json!({"id": 42, "nome": "Clara", "cpf": "55566677788", "data_nascimento": "2011-06-02"});
        assert!(Entity::from_complete_value(EntityKind::Student, full).is_some());
    }
}
