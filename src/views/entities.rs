use super::{SensorState, slugify};
use crate::models::{Checklist, Item, Note, Snapshot, StatusEntry, Task, TaskStatus};
use crate::runtime::CoordinatorState;
use crate::tree::{
    completion_rate, count_by_status_recursive, count_completed_recursive, count_items_recursive,
    flatten_items,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const DEFAULT_STATUS_COLOR: &str = "#6b7280";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Note,
    Checklist,
    Task,
}

impl EntityKind {
    fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Note => "note",
            EntityKind::Checklist => "list",
            EntityKind::Task => "task",
        }
    }

    fn attribute_prefix(&self) -> &'static str {
        match self {
            EntityKind::Note => "note",
            EntityKind::Checklist => "checklist",
            EntityKind::Task => "task",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            EntityKind::Note => "Note",
            EntityKind::Checklist => "List",
            EntityKind::Task => "Task",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            EntityKind::Note => "mdi:note-text",
            EntityKind::Checklist => "mdi:format-list-checks",
            EntityKind::Task => "mdi:clipboard-check-outline",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }

    /// Registry key such as `note_<id>` or `list_<id>`.
    pub fn tracking_id(&self) -> String {
        format!("{}_{}", self.kind.prefix(), self.id)
    }

    pub fn is_present(&self, snapshot: &Snapshot) -> bool {
        match self.kind {
            EntityKind::Note => snapshot.note(&self.id).is_some(),
            EntityKind::Checklist => snapshot.checklist(&self.id).is_some(),
            EntityKind::Task => snapshot.task(&self.id).is_some(),
        }
    }
}

/// A per-entity view materialized the first time its id showed up. The
/// title is remembered so the view can still be named once the entity is gone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    pub key: EntityKey,
    pub title: String,
}

impl EntityView {
    pub fn new(key: EntityKey, title: &str) -> Self {
        Self {
            key,
            title: title.to_string(),
        }
    }

    pub fn render(&self, state: &CoordinatorState, marker: &str) -> SensorState {
        let name = format!("Jotty {}: {}", self.key.kind.label(), self.title);
        let mut sensor = SensorState {
            entity_id: format!("sensor.{}", slugify(&name)),
            unique_id: format!("jotty_{}", self.key.tracking_id()),
            name,
            icon: self.key.kind.icon(),
            available: false,
            state: Value::Null,
            attributes: Map::new(),
        };

        let snapshot = state.snapshot.as_deref();
        let rendered = match self.key.kind {
            EntityKind::Note => snapshot
                .and_then(|s| s.note(&self.key.id))
                .map(note_view),
            EntityKind::Checklist => snapshot
                .and_then(|s| s.checklist(&self.key.id))
                .map(checklist_view),
            EntityKind::Task => snapshot
                .and_then(|s| s.task(&self.key.id))
                .map(task_view),
        };

        match rendered {
            Some((value, attributes)) => {
                sensor.available = state.last_update_success;
                sensor.state = value;
                sensor.attributes = attributes;
            }
            None => {
                let (value, attributes) = self.fallback(marker);
                sensor.state = value;
                sensor.attributes = attributes;
            }
        }
        sensor
    }

    fn fallback(&self, marker: &str) -> (Value, Map<String, Value>) {
        let mut attributes = Map::new();
        let id_field = format!("{}_id", self.key.kind.attribute_prefix());
        attributes.insert(id_field, json!(self.key.id));
        attributes.insert("category".into(), json!(marker));
        match self.key.kind {
            EntityKind::Note => {
                attributes.insert("content".into(), json!(""));
                (json!(self.title), attributes)
            }
            EntityKind::Checklist | EntityKind::Task => {
                attributes.insert("title".into(), json!(self.title));
                attributes.insert("items".into(), json!([]));
                (json!("0/0"), attributes)
            }
        }
    }
}

fn note_view(note: &Note) -> (Value, Map<String, Value>) {
    let mut attributes = Map::new();
    attributes.insert("note_id".into(), json!(note.id));
    attributes.insert("content".into(), json!(note.content));
    attributes.insert("category".into(), json!(note.category));
    attributes.insert("updated".into(), json!(note.updated_at));
    attributes.insert("created".into(), json!(note.created_at));
    (json!(note.title), attributes)
}

fn checklist_view(list: &Checklist) -> (Value, Map<String, Value>) {
    let total = count_items_recursive(&list.items);
    let completed = count_completed_recursive(&list.items);

    let mut attributes = Map::new();
    attributes.insert("checklist_id".into(), json!(list.id));
    attributes.insert("title".into(), json!(list.title));
    attributes.insert("category".into(), json!(list.category));
    attributes.insert("type".into(), json!(list.list_type));
    attributes.insert("items".into(), Value::Array(flat_items(&list.items)));
    attributes.insert("completed".into(), json!(completed));
    attributes.insert("total".into(), json!(total));
    attributes.insert("completion_rate".into(), json!(completion_rate(completed, total)));
    attributes.insert("updated".into(), json!(list.updated_at));
    attributes.insert("created".into(), json!(list.created_at));
    (json!(format!("{completed}/{total}")), attributes)
}

fn task_view(task: &Task) -> (Value, Map<String, Value>) {
    let total = count_items_recursive(&task.items);
    let completed = count_completed_recursive(&task.items);
    let statuses = task_statuses(task);

    let mut counts = Map::new();
    for status in &statuses {
        counts.insert(
            status.id.clone(),
            json!(count_by_status_recursive(&task.items, &status.id)),
        );
    }

    let mut attributes = Map::new();
    attributes.insert("task_id".into(), json!(task.id));
    attributes.insert("title".into(), json!(task.title));
    attributes.insert("category".into(), json!(task.category));
    attributes.insert("items".into(), Value::Array(flat_items(&task.items)));
    attributes.insert("statuses".into(), json!(statuses));
    attributes.insert("status_counts".into(), Value::Object(counts));
    attributes.insert("completed".into(), json!(completed));
    attributes.insert("total".into(), json!(total));
    attributes.insert("completion_rate".into(), json!(completion_rate(completed, total)));
    attributes.insert("updated".into(), json!(task.updated_at));
    attributes.insert("created".into(), json!(task.created_at));
    (json!(format!("{completed}/{total}")), attributes)
}

fn flat_items(items: &[Item]) -> Vec<Value> {
    flatten_items(items)
        .map(|flat| {
            let mut entry = Map::new();
            entry.insert("index".into(), json!(flat.path));
            entry.insert("depth".into(), json!(flat.depth));
            entry.insert("text".into(), json!(flat.item.text));
            entry.insert("completed".into(), json!(flat.item.is_completed()));
            if let Some(status) = &flat.item.status {
                entry.insert("status".into(), json!(status));
            }
            Value::Object(entry)
        })
        .collect()
}

pub fn default_statuses() -> Vec<TaskStatus> {
    [
        ("todo", "To Do", "#6b7280"),
        ("in_progress", "In Progress", "#3b82f6"),
        ("completed", "Completed", "#10b981"),
    ]
    .into_iter()
    .enumerate()
    .map(|(order, (id, label, color))| TaskStatus {
        id: id.to_string(),
        label: label.to_string(),
        color: Some(color.to_string()),
        order: Some(order as i64),
    })
    .collect()
}

/// The task's status domain in one shape, falling back to the default
/// three-state domain when the task carries none.
pub fn task_statuses(task: &Task) -> Vec<TaskStatus> {
    match task.statuses.as_deref() {
        Some(entries) if !entries.is_empty() => normalize_statuses(entries),
        _ => default_statuses(),
    }
}

pub fn normalize_statuses(entries: &[StatusEntry]) -> Vec<TaskStatus> {
    let defaults = default_statuses();
    entries
        .iter()
        .enumerate()
        .map(|(position, entry)| match entry {
            StatusEntry::Record(status) => {
                let mut status = status.clone();
                if status.label.is_empty() {
                    status.label = humanize(&status.id);
                }
                status
            }
            StatusEntry::Id(id) => {
                let known = defaults.iter().find(|status| &status.id == id);
                TaskStatus {
                    id: id.clone(),
                    label: known
                        .map(|status| status.label.clone())
                        .unwrap_or_else(|| humanize(id)),
                    color: Some(
                        known
                            .and_then(|status| status.color.clone())
                            .unwrap_or_else(|| DEFAULT_STATUS_COLOR.to_string()),
                    ),
                    order: Some(position as i64),
                }
            }
        })
        .collect()
}

fn humanize(id: &str) -> String {
    id.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
