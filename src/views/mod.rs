//! Read-only views over the latest snapshot.
//!
//! Nothing here caches: every call recomputes from the coordinator state it
//! is handed, so a view is exactly as fresh as the last finished cycle.

mod entities;
mod registry;

pub use entities::{
    EntityKey, EntityKind, EntityView, default_statuses, normalize_statuses, task_statuses,
};
pub use registry::{EntityEvent, EntityRegistry};

use crate::models::Snapshot;
use crate::runtime::CoordinatorState;
use crate::tree::{count_completed_recursive, count_items_recursive, completion_rate};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::OnceLock;

/// One rendered sensor: what the hub shows as state plus its attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SensorState {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    pub available: bool,
    pub state: Value,
    pub attributes: Map<String, Value>,
}

pub fn slugify(text: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));
    re.replace_all(&text.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorKind {
    TotalNotes,
    TotalChecklists,
    TotalTasks,
    TotalItems,
    CompletedItems,
    PendingItems,
    CompletionRate,
    TotalTaskItems,
    CompletedTaskItems,
    Summary,
}

impl SensorKind {
    pub fn all() -> Vec<SensorKind> {
        vec![
            SensorKind::TotalNotes,
            SensorKind::TotalChecklists,
            SensorKind::TotalTasks,
            SensorKind::TotalItems,
            SensorKind::CompletedItems,
            SensorKind::PendingItems,
            SensorKind::CompletionRate,
            SensorKind::TotalTaskItems,
            SensorKind::CompletedTaskItems,
            SensorKind::Summary,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            SensorKind::TotalNotes => "total_notes",
            SensorKind::TotalChecklists => "total_checklists",
            SensorKind::TotalTasks => "total_tasks",
            SensorKind::TotalItems => "total_items",
            SensorKind::CompletedItems => "completed_items",
            SensorKind::PendingItems => "pending_items",
            SensorKind::CompletionRate => "completion_rate",
            SensorKind::TotalTaskItems => "total_task_items",
            SensorKind::CompletedTaskItems => "completed_task_items",
            SensorKind::Summary => "summary",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::TotalNotes => "Total Notes",
            SensorKind::TotalChecklists => "Total Checklists",
            SensorKind::TotalTasks => "Total Tasks",
            SensorKind::TotalItems => "Total Items",
            SensorKind::CompletedItems => "Completed Items",
            SensorKind::PendingItems => "Pending Items",
            SensorKind::CompletionRate => "Completion Rate",
            SensorKind::TotalTaskItems => "Total Task Items",
            SensorKind::CompletedTaskItems => "Completed Task Items",
            SensorKind::Summary => "Summary",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            SensorKind::TotalNotes => "mdi:note-text",
            SensorKind::TotalChecklists => "mdi:format-list-checks",
            SensorKind::TotalTasks => "mdi:clipboard-check-outline",
            SensorKind::TotalItems => "mdi:checkbox-marked",
            SensorKind::CompletedItems => "mdi:check-all",
            SensorKind::PendingItems => "mdi:clock-outline",
            SensorKind::CompletionRate => "mdi:percent",
            SensorKind::TotalTaskItems => "mdi:format-list-bulleted",
            SensorKind::CompletedTaskItems => "mdi:playlist-check",
            SensorKind::Summary => "mdi:information-outline",
        }
    }

    pub fn render(&self, state: &CoordinatorState) -> SensorState {
        let name = format!("Jotty {}", self.label());
        let mut sensor = SensorState {
            entity_id: format!("sensor.{}", slugify(&name)),
            unique_id: format!("jotty_{}", self.key()),
            name,
            icon: self.icon(),
            available: state.last_update_success,
            state: Value::Null,
            attributes: Map::new(),
        };
        let Some(snapshot) = state.snapshot.as_deref() else {
            sensor.available = false;
            return sensor;
        };
        sensor.state = self.value(snapshot);
        sensor.attributes = self.attributes(snapshot);
        sensor
    }

    fn value(&self, snapshot: &Snapshot) -> Value {
        let totals = ItemTotals::checklists(snapshot);
        match self {
            SensorKind::TotalNotes => json!(snapshot.notes.len()),
            SensorKind::TotalChecklists => json!(snapshot.checklists.len()),
            SensorKind::TotalTasks => json!(snapshot.tasks.len()),
            SensorKind::TotalItems => json!(totals.total),
            SensorKind::CompletedItems => json!(totals.completed),
            SensorKind::PendingItems => json!(totals.pending()),
            SensorKind::CompletionRate => json!(completion_rate(totals.completed, totals.total)),
            SensorKind::TotalTaskItems => json!(ItemTotals::tasks(snapshot).total),
            SensorKind::CompletedTaskItems => json!(ItemTotals::tasks(snapshot).completed),
            SensorKind::Summary => json!(snapshot.fetched_at.to_rfc3339()),
        }
    }

    fn attributes(&self, snapshot: &Snapshot) -> Map<String, Value> {
        let mut attributes = Map::new();
        match self {
            SensorKind::TotalNotes => {
                attributes.insert("count".into(), json!(snapshot.notes.len()));
            }
            SensorKind::TotalChecklists => {
                attributes.insert("count".into(), json!(snapshot.checklists.len()));
            }
            SensorKind::TotalTasks => {
                attributes.insert("count".into(), json!(snapshot.tasks.len()));
            }
            SensorKind::Summary => {
                attributes = snapshot.summary.clone();
                attributes.insert("last_update".into(), json!(snapshot.fetched_at.to_rfc3339()));
            }
            _ => {}
        }
        attributes
    }
}

pub fn aggregate_sensors(state: &CoordinatorState) -> Vec<SensorState> {
    SensorKind::all()
        .iter()
        .map(|kind| kind.render(state))
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ItemTotals {
    total: usize,
    completed: usize,
}

impl ItemTotals {
    fn checklists(snapshot: &Snapshot) -> Self {
        snapshot
            .checklists
            .iter()
            .fold(Self::default(), |acc, list| Self {
                total: acc.total + count_items_recursive(&list.items),
                completed: acc.completed + count_completed_recursive(&list.items),
            })
    }

    fn tasks(snapshot: &Snapshot) -> Self {
        snapshot.tasks.iter().fold(Self::default(), |acc, task| Self {
            total: acc.total + count_items_recursive(&task.items),
            completed: acc.completed + count_completed_recursive(&task.items),
        })
    }

    fn pending(&self) -> usize {
        self.total - self.completed
    }
}
