use crate::integrations::jotty::{ApiReply, ClientError, ItemIndex, JottyClient, StatusFields};
use crate::models::TaskStatus;
use crate::runtime::Coordinator;
use crate::views::normalize_statuses;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info};

fn default_list_type() -> String {
    "simple".to_string()
}

fn default_item_status() -> String {
    "todo".to_string()
}

/// Every operation callers can invoke, with its parameters.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Action {
    CreateNote {
        title: String,
        #[serde(default)]
        content: String,
    },
    UpdateNote {
        note_id: String,
        title: Option<String>,
        content: Option<String>,
        category: Option<String>,
    },
    DeleteNote {
        note_id: String,
    },
    CreateChecklist {
        title: String,
        #[serde(rename = "type", default = "default_list_type")]
        list_type: String,
    },
    UpdateChecklist {
        checklist_id: String,
        title: Option<String>,
        category: Option<String>,
    },
    AddChecklistItem {
        checklist_id: String,
        text: String,
        status: Option<String>,
        parent_index: Option<ItemIndex>,
    },
    CheckItem {
        checklist_id: String,
        item_index: ItemIndex,
    },
    UncheckItem {
        checklist_id: String,
        item_index: ItemIndex,
    },
    DeleteChecklist {
        checklist_id: String,
    },
    DeleteChecklistItem {
        checklist_id: String,
        item_index: ItemIndex,
    },
    CreateTask {
        title: String,
    },
    UpdateTask {
        task_id: String,
        title: Option<String>,
        category: Option<String>,
    },
    DeleteTask {
        task_id: String,
    },
    AddTaskItem {
        task_id: String,
        text: String,
        #[serde(default = "default_item_status")]
        status: String,
        parent_index: Option<ItemIndex>,
    },
    UpdateTaskItemStatus {
        task_id: String,
        item_index: ItemIndex,
        status: String,
    },
    DeleteTaskItem {
        task_id: String,
        item_index: ItemIndex,
    },
    GetTaskStatuses {
        task_id: String,
    },
    CreateTaskStatus {
        task_id: String,
        status_id: String,
        label: String,
        color: Option<String>,
        order: Option<i64>,
    },
    UpdateTaskStatus {
        task_id: String,
        status_id: String,
        label: Option<String>,
        color: Option<String>,
        order: Option<i64>,
    },
    DeleteTaskStatus {
        task_id: String,
        status_id: String,
    },
}

impl Action {
    pub const NAMES: [&'static str; 20] = [
        "create_note",
        "update_note",
        "delete_note",
        "create_checklist",
        "update_checklist",
        "add_checklist_item",
        "check_item",
        "uncheck_item",
        "delete_checklist",
        "delete_checklist_item",
        "create_task",
        "update_task",
        "delete_task",
        "add_task_item",
        "update_task_item_status",
        "delete_task_item",
        "get_task_statuses",
        "create_task_status",
        "update_task_status",
        "delete_task_status",
    ];

    /// Parses a named call. Missing params are treated as an empty object so
    /// the error names the missing field rather than the params block.
    pub fn from_call(name: &str, params: Value) -> Result<Self, ActionError> {
        let params = if params.is_null() { json!({}) } else { params };
        serde_json::from_value(json!({ "action": name, "params": params })).map_err(|source| {
            ActionError::InvalidCall {
                name: name.to_string(),
                source,
            }
        })
    }

    /// Everything but the statuses query changes data on the service.
    pub fn mutates(&self) -> bool {
        !matches!(self, Action::GetTaskStatuses { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateNote { .. } => "create_note",
            Action::UpdateNote { .. } => "update_note",
            Action::DeleteNote { .. } => "delete_note",
            Action::CreateChecklist { .. } => "create_checklist",
            Action::UpdateChecklist { .. } => "update_checklist",
            Action::AddChecklistItem { .. } => "add_checklist_item",
            Action::CheckItem { .. } => "check_item",
            Action::UncheckItem { .. } => "uncheck_item",
            Action::DeleteChecklist { .. } => "delete_checklist",
            Action::DeleteChecklistItem { .. } => "delete_checklist_item",
            Action::CreateTask { .. } => "create_task",
            Action::UpdateTask { .. } => "update_task",
            Action::DeleteTask { .. } => "delete_task",
            Action::AddTaskItem { .. } => "add_task_item",
            Action::UpdateTaskItemStatus { .. } => "update_task_item_status",
            Action::DeleteTaskItem { .. } => "delete_task_item",
            Action::GetTaskStatuses { .. } => "get_task_statuses",
            Action::CreateTaskStatus { .. } => "create_task_status",
            Action::UpdateTaskStatus { .. } => "update_task_status",
            Action::DeleteTaskStatus { .. } => "delete_task_status",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid call to {name}: {source}")]
    InvalidCall {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActionOutcome {
    Reply(ApiReply),
    Statuses(Vec<TaskStatus>),
}

impl ActionOutcome {
    pub fn to_value(&self) -> Value {
        match self {
            ActionOutcome::Reply(reply) => reply.to_value(),
            ActionOutcome::Statuses(statuses) => json!({ "statuses": statuses }),
        }
    }
}

/// Turns actions into transport calls and nudges the coordinator after
/// every successful mutation.
pub struct ActionDispatcher {
    client: Arc<JottyClient>,
    coordinator: Arc<Coordinator>,
}

impl ActionDispatcher {
    pub fn new(client: Arc<JottyClient>, coordinator: Arc<Coordinator>) -> Self {
        Self {
            client,
            coordinator,
        }
    }

    pub async fn call(&self, name: &str, params: Value) -> Result<ActionOutcome, ActionError> {
        let action = Action::from_call(name, params)?;
        self.dispatch(action).await
    }

    pub async fn dispatch(&self, action: Action) -> Result<ActionOutcome, ActionError> {
        let name = action.name();
        let refreshes = action.mutates();
        debug!(action = name, "dispatching action");

        match self.execute(action).await {
            Ok(outcome) => {
                if refreshes {
                    info!(action = name, "action succeeded");
                    self.coordinator.request_refresh();
                }
                Ok(outcome)
            }
            Err(err) => {
                error!(action = name, error = %err, "action failed");
                Err(err.into())
            }
        }
    }

    async fn execute(&self, action: Action) -> Result<ActionOutcome, ClientError> {
        let client = &self.client;
        let marker = self.coordinator.marker();
        let reply = match action {
            Action::CreateNote { title, content } => {
                client.create_note(&title, &content, marker).await
            }
            Action::UpdateNote {
                note_id,
                title,
                content,
                category,
            } => {
                client
                    .update_note(
                        &note_id,
                        title.as_deref(),
                        content.as_deref(),
                        category.as_deref(),
                    )
                    .await
            }
            Action::DeleteNote { note_id } => client.delete_note(&note_id).await,
            Action::CreateChecklist { title, list_type } => {
                client.create_checklist(&title, marker, &list_type).await
            }
            Action::UpdateChecklist {
                checklist_id,
                title,
                category,
            } => {
                client
                    .update_checklist(&checklist_id, title.as_deref(), category.as_deref())
                    .await
            }
            Action::AddChecklistItem {
                checklist_id,
                text,
                status,
                parent_index,
            } => {
                client
                    .add_checklist_item(
                        &checklist_id,
                        &text,
                        status.as_deref(),
                        parent_index.as_ref(),
                    )
                    .await
            }
            Action::CheckItem {
                checklist_id,
                item_index,
            } => client.check_item(&checklist_id, &item_index).await,
            Action::UncheckItem {
                checklist_id,
                item_index,
            } => client.uncheck_item(&checklist_id, &item_index).await,
            Action::DeleteChecklist { checklist_id } => {
                client.delete_checklist(&checklist_id).await
            }
            Action::DeleteChecklistItem {
                checklist_id,
                item_index,
            } => {
                client
                    .delete_checklist_item(&checklist_id, &item_index)
                    .await
            }
            Action::CreateTask { title } => client.create_task(&title, marker).await,
            Action::UpdateTask {
                task_id,
                title,
                category,
            } => {
                client
                    .update_task(&task_id, title.as_deref(), category.as_deref())
                    .await
            }
            Action::DeleteTask { task_id } => client.delete_task(&task_id).await,
            Action::AddTaskItem {
                task_id,
                text,
                status,
                parent_index,
            } => {
                client
                    .add_task_item(&task_id, &text, &status, parent_index.as_ref())
                    .await
            }
            Action::UpdateTaskItemStatus {
                task_id,
                item_index,
                status,
            } => {
                client
                    .update_task_item_status(&task_id, &item_index, &status)
                    .await
            }
            Action::DeleteTaskItem {
                task_id,
                item_index,
            } => client.delete_task_item(&task_id, &item_index).await,
            Action::CreateTaskStatus {
                task_id,
                status_id,
                label,
                color,
                order,
            } => {
                let fields = StatusFields {
                    label: None,
                    color,
                    order,
                };
                client
                    .create_task_status(&task_id, &status_id, &label, &fields)
                    .await
            }
            Action::UpdateTaskStatus {
                task_id,
                status_id,
                label,
                color,
                order,
            } => {
                let fields = StatusFields {
                    label,
                    color,
                    order,
                };
                client
                    .update_task_status(&task_id, &status_id, &fields)
                    .await
            }
            Action::DeleteTaskStatus { task_id, status_id } => {
                client.delete_task_status(&task_id, &status_id).await
            }
            Action::GetTaskStatuses { task_id } => {
                let entries = client.get_task_statuses(&task_id).await;
                return Ok(ActionOutcome::Statuses(normalize_statuses(&entries)));
            }
        };
        reply.map(ActionOutcome::Reply)
    }
}
