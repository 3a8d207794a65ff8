use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const COMPLETED_STATUS: &str = "completed";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(
        rename = "type",
        default = "default_list_type",
        deserialize_with = "list_type_or_simple"
    )]
    pub list_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: String,
}

fn default_list_type() -> String {
    "simple".to_string()
}

fn list_type_or_simple<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_list_type))
}

/// Explicit `null` decodes like a missing field, so one sparse record does
/// not fail the whole list it arrived in.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<StatusEntry>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: String,
}

/// A checklist or task entry. Children form an arbitrarily deep tree;
/// items have no stable id and are addressed by index path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub children: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Value>,
}

impl Item {
    pub fn is_completed(&self) -> bool {
        self.completed || self.status.as_deref() == Some(COMPLETED_STATUS)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

/// The service reports statuses either as bare ids or as full records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusEntry {
    Id(String),
    Record(TaskStatus),
}

pub type Summary = Map<String, Value>;

#[derive(Debug, Default, Deserialize)]
pub struct SummaryResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: Summary,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: Vec<Note>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChecklistsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub checklists: Vec<Checklist>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TasksResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
}

/// Result of one polling cycle, restricted to entities under the marker tag.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub summary: Summary,
    pub notes: Vec<Note>,
    pub checklists: Vec<Checklist>,
    pub tasks: Vec<Task>,
    pub fetched_at: DateTime<Local>,
}

impl Snapshot {
    pub fn filtered(
        marker: &str,
        summary: Summary,
        notes: Vec<Note>,
        checklists: Vec<Checklist>,
        tasks: Vec<Task>,
    ) -> Self {
        Self {
            summary,
            notes: notes
                .into_iter()
                .filter(|note| belongs_to(&note.category, marker))
                .collect(),
            checklists: checklists
                .into_iter()
                .filter(|list| belongs_to(&list.category, marker))
                .collect(),
            tasks: tasks
                .into_iter()
                .filter(|task| belongs_to(&task.category, marker))
                .collect(),
            fetched_at: Local::now(),
        }
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn checklist(&self, id: &str) -> Option<&Checklist> {
        self.checklists.iter().find(|list| list.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }
}

// Prefix match: sub-categories such as "Home Assistant/Shopping" are included.
pub fn belongs_to(category: &str, marker: &str) -> bool {
    category.starts_with(marker)
}
