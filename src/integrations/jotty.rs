use crate::config::TimeoutConfig;
use crate::models::{
    Checklist, ChecklistsResponse, Note, NotesResponse, StatusEntry, Summary, SummaryResponse,
    Task, TasksResponse,
};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, error, info};

const API_KEY_HEADER: &str = "x-api-key";
const LOGGED_BODY_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("health check failed with status {status}")]
    HealthCheck { status: StatusCode },
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("API key is not a valid header value")]
    MalformedApiKey(#[source] reqwest::header::InvalidHeaderValue),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http { status, .. } | ClientError::HealthCheck { status } => Some(*status),
            ClientError::InvalidApiKey => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            error!(url, "request timed out");
            ClientError::Timeout {
                url: url.to_string(),
            }
        } else {
            error!(url, error = %err, "request failed");
            ClientError::Request {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Outcome of a mutation call. The service answers most calls with JSON but
/// some with an empty or plain-text body, which still counts as success.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiReply {
    Json(Value),
    Accepted { raw: Option<String> },
}

impl ApiReply {
    fn from_body(text: String) -> Self {
        if text.is_empty() {
            return ApiReply::Accepted { raw: None };
        }
        match serde_json::from_str(&text) {
            Ok(value) => ApiReply::Json(value),
            Err(_) => {
                debug!("response is not JSON, returning raw text");
                ApiReply::Accepted { raw: Some(text) }
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ApiReply::Json(value) => value.clone(),
            ApiReply::Accepted { raw: None } => json!({ "success": true }),
            ApiReply::Accepted { raw: Some(raw) } => json!({ "success": true, "raw": raw }),
        }
    }
}

/// Item addresses arrive as numbers from some callers and as dotted paths
/// from others. Paths are checked to be dot-separated positions before they
/// can reach a route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemIndex {
    Number(u64),
    Path(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawItemIndex {
    Number(u64),
    Path(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid item index {0:?}, expected positions such as \"2.0.1\"")]
pub struct InvalidItemIndex(pub String);

impl ItemIndex {
    pub fn normalized(&self) -> String {
        match self {
            ItemIndex::Number(n) => n.to_string(),
            ItemIndex::Path(path) => path.clone(),
        }
    }
}

impl fmt::Display for ItemIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl FromStr for ItemIndex {
    type Err = InvalidItemIndex;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        static INDEX_PATH: OnceLock<Regex> = OnceLock::new();
        let re = INDEX_PATH
            .get_or_init(|| Regex::new(r"^[0-9]+(\.[0-9]+)*$").expect("valid index pattern"));
        let trimmed = value.trim();
        if re.is_match(trimmed) {
            Ok(ItemIndex::Path(trimmed.to_string()))
        } else {
            Err(InvalidItemIndex(value.to_string()))
        }
    }
}

impl<'de> Deserialize<'de> for ItemIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawItemIndex::deserialize(deserializer)? {
            RawItemIndex::Number(n) => Ok(ItemIndex::Number(n)),
            RawItemIndex::Path(path) => path.parse().map_err(de::Error::custom),
        }
    }
}

impl From<u64> for ItemIndex {
    fn from(value: u64) -> Self {
        ItemIndex::Number(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusFields {
    pub label: Option<String>,
    pub color: Option<String>,
    pub order: Option<i64>,
}

/// The list fetches the aggregator polls.
#[async_trait]
pub trait NoteSource: Send + Sync {
    async fn get_summary(&self) -> Result<Summary, ClientError>;
    async fn get_notes(&self) -> Result<Vec<Note>, ClientError>;
    async fn get_checklists(&self) -> Result<Vec<Checklist>, ClientError>;
    async fn get_tasks(&self) -> Result<Vec<Task>, ClientError>;
}

#[derive(Clone, Debug)]
pub struct JottyClient {
    http: Client,
    url: String,
    api_key: HeaderValue,
    timeouts: TimeoutConfig,
}

impl JottyClient {
    pub fn new(url: &str, api_key: &str, timeouts: TimeoutConfig) -> Result<Self, ClientError> {
        let http = Client::builder().build().map_err(ClientError::Build)?;
        Self::with_http(http, url, api_key, timeouts)
    }

    pub fn with_http(
        http: Client,
        url: &str,
        api_key: &str,
        timeouts: TimeoutConfig,
    ) -> Result<Self, ClientError> {
        let mut api_key = HeaderValue::from_str(api_key).map_err(ClientError::MalformedApiKey)?;
        api_key.set_sensitive(true);
        Ok(Self {
            http,
            url: url.trim().trim_end_matches('/').to_string(),
            api_key,
            timeouts,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, self.api_key.clone());
        headers
    }

    /// Performs one authenticated call. Non-2xx responses become
    /// `ClientError::Http`; nothing is retried.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        include_content_type: bool,
    ) -> Result<ApiReply, ClientError> {
        let url = self.endpoint(path);
        debug!(%method, url = %url, body = ?body, "making request");

        let mut builder = self
            .http
            .request(method, &url)
            .headers(self.auth_headers())
            .timeout(self.timeouts.request());
        if let Some(body) = body {
            if include_content_type {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| ClientError::from_reqwest(&url, err))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ClientError::from_reqwest(&url, err))?;
        debug!(url = %url, %status, body = truncate_body(&text), "response");

        if !status.is_success() {
            error!(url = %url, %status, body = %text, "HTTP error");
            return Err(ClientError::Http {
                url,
                status,
                body: text,
            });
        }

        Ok(ApiReply::from_body(text))
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.endpoint(path);
        let response = self
            .http
            .get(&url)
            .headers(self.auth_headers())
            .timeout(self.timeouts.fetch())
            .send()
            .await
            .map_err(|err| ClientError::from_reqwest(&url, err))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ClientError::from_reqwest(&url, err))?;
        if !status.is_success() {
            return Err(ClientError::Http {
                url,
                status,
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|source| ClientError::Decode { url, source })
    }

    /// Unauthenticated liveness probe. Only an exact 200 passes.
    pub async fn test_connection(&self) -> Result<Option<Value>, ClientError> {
        let url = self.endpoint("/api/health");
        let response = self
            .http
            .get(&url)
            .timeout(self.timeouts.health())
            .send()
            .await
            .map_err(|err| ClientError::from_reqwest(&url, err))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::HealthCheck { status });
        }
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).ok())
    }

    /// Checks that the key is accepted by an authenticated endpoint.
    pub async fn validate_api_key(&self) -> Result<(), ClientError> {
        let url = self.endpoint("/api/summary");
        let response = self
            .http
            .get(&url)
            .headers(self.auth_headers())
            .timeout(self.timeouts.health())
            .send()
            .await
            .map_err(|err| ClientError::from_reqwest(&url, err))?;
        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidApiKey),
            status => Err(ClientError::Http {
                url,
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task, ClientError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum TaskResponse {
            Wrapped { task: Task },
            Bare(Task),
        }
        let response: TaskResponse = self.fetch(&format!("/api/tasks/{task_id}")).await?;
        Ok(match response {
            TaskResponse::Wrapped { task } | TaskResponse::Bare(task) => task,
        })
    }

    pub async fn create_note(
        &self,
        title: &str,
        content: &str,
        category: &str,
    ) -> Result<ApiReply, ClientError> {
        let data = json!({ "title": title, "content": content, "category": category });
        self.request(Method::POST, "/api/notes", Some(data), true).await
    }

    pub async fn update_note(
        &self,
        note_id: &str,
        title: Option<&str>,
        content: Option<&str>,
        category: Option<&str>,
    ) -> Result<ApiReply, ClientError> {
        let mut data = Map::new();
        insert_non_empty(&mut data, "title", title);
        if let Some(content) = content {
            data.insert("content".into(), content.into());
        }
        insert_non_empty(&mut data, "category", category);
        self.request(
            Method::PUT,
            &format!("/api/notes/{note_id}"),
            Some(Value::Object(data)),
            true,
        )
        .await
    }

    pub async fn delete_note(&self, note_id: &str) -> Result<ApiReply, ClientError> {
        self.request(Method::DELETE, &format!("/api/notes/{note_id}"), None, true)
            .await
    }

    pub async fn create_checklist(
        &self,
        title: &str,
        category: &str,
        list_type: &str,
    ) -> Result<ApiReply, ClientError> {
        let data = json!({ "title": title, "category": category, "type": list_type });
        self.request(Method::POST, "/api/checklists", Some(data), true)
            .await
    }

    pub async fn update_checklist(
        &self,
        checklist_id: &str,
        title: Option<&str>,
        category: Option<&str>,
    ) -> Result<ApiReply, ClientError> {
        let mut data = Map::new();
        insert_non_empty(&mut data, "title", title);
        insert_non_empty(&mut data, "category", category);
        self.request(
            Method::PUT,
            &format!("/api/checklists/{checklist_id}"),
            Some(Value::Object(data)),
            true,
        )
        .await
    }

    pub async fn delete_checklist(&self, checklist_id: &str) -> Result<ApiReply, ClientError> {
        info!(checklist_id, "delete_checklist");
        self.request(
            Method::DELETE,
            &format!("/api/checklists/{checklist_id}"),
            None,
            true,
        )
        .await
    }

    pub async fn add_checklist_item(
        &self,
        checklist_id: &str,
        text: &str,
        status: Option<&str>,
        parent_index: Option<&ItemIndex>,
    ) -> Result<ApiReply, ClientError> {
        let mut data = Map::new();
        data.insert("text".into(), text.into());
        if let Some(status) = status.filter(|s| !s.is_empty()) {
            data.insert("status".into(), status.into());
            data.insert("time".into(), 0.into());
        }
        if let Some(parent) = parent_index {
            data.insert("parentIndex".into(), parent.normalized().into());
        }
        self.request(
            Method::POST,
            &format!("/api/checklists/{checklist_id}/items"),
            Some(Value::Object(data)),
            true,
        )
        .await
    }

    pub async fn check_item(
        &self,
        checklist_id: &str,
        item_index: &ItemIndex,
    ) -> Result<ApiReply, ClientError> {
        let idx = item_index.normalized();
        info!(checklist_id, item_index = %idx, "check_item");
        self.request(
            Method::PUT,
            &format!("/api/checklists/{checklist_id}/items/{idx}/check"),
            None,
            false,
        )
        .await
    }

    pub async fn uncheck_item(
        &self,
        checklist_id: &str,
        item_index: &ItemIndex,
    ) -> Result<ApiReply, ClientError> {
        let idx = item_index.normalized();
        info!(checklist_id, item_index = %idx, "uncheck_item");
        self.request(
            Method::PUT,
            &format!("/api/checklists/{checklist_id}/items/{idx}/uncheck"),
            None,
            false,
        )
        .await
    }

    pub async fn delete_checklist_item(
        &self,
        checklist_id: &str,
        item_index: &ItemIndex,
    ) -> Result<ApiReply, ClientError> {
        let idx = item_index.normalized();
        info!(checklist_id, item_index = %idx, "delete_checklist_item");
        self.request(
            Method::DELETE,
            &format!("/api/checklists/{checklist_id}/items/{idx}"),
            None,
            true,
        )
        .await
    }

    pub async fn create_task(&self, title: &str, category: &str) -> Result<ApiReply, ClientError> {
        let data = json!({ "title": title, "category": category });
        self.request(Method::POST, "/api/tasks", Some(data), true).await
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        title: Option<&str>,
        category: Option<&str>,
    ) -> Result<ApiReply, ClientError> {
        let mut data = Map::new();
        insert_non_empty(&mut data, "title", title);
        insert_non_empty(&mut data, "category", category);
        self.request(
            Method::PUT,
            &format!("/api/tasks/{task_id}"),
            Some(Value::Object(data)),
            true,
        )
        .await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<ApiReply, ClientError> {
        info!(task_id, "delete_task");
        self.request(Method::DELETE, &format!("/api/tasks/{task_id}"), None, true)
            .await
    }

    pub async fn add_task_item(
        &self,
        task_id: &str,
        text: &str,
        status: &str,
        parent_index: Option<&ItemIndex>,
    ) -> Result<ApiReply, ClientError> {
        let mut data = Map::new();
        data.insert("text".into(), text.into());
        data.insert("status".into(), status.into());
        if let Some(parent) = parent_index {
            data.insert("parentIndex".into(), parent.normalized().into());
        }
        self.request(
            Method::POST,
            &format!("/api/tasks/{task_id}/items"),
            Some(Value::Object(data)),
            true,
        )
        .await
    }

    pub async fn update_task_item_status(
        &self,
        task_id: &str,
        item_index: &ItemIndex,
        status: &str,
    ) -> Result<ApiReply, ClientError> {
        let idx = item_index.normalized();
        info!(task_id, item_index = %idx, status, "update_task_item_status");
        self.request(
            Method::PUT,
            &format!("/api/tasks/{task_id}/items/{idx}/status"),
            Some(json!({ "status": status })),
            true,
        )
        .await
    }

    pub async fn delete_task_item(
        &self,
        task_id: &str,
        item_index: &ItemIndex,
    ) -> Result<ApiReply, ClientError> {
        let idx = item_index.normalized();
        info!(task_id, item_index = %idx, "delete_task_item");
        self.request(
            Method::DELETE,
            &format!("/api/tasks/{task_id}/items/{idx}"),
            None,
            true,
        )
        .await
    }

    /// Never fails: any error is logged and reported as no statuses.
    pub async fn get_task_statuses(&self, task_id: &str) -> Vec<StatusEntry> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StatusesResponse {
            Wrapped {
                #[serde(default)]
                statuses: Vec<StatusEntry>,
            },
            Bare(Vec<StatusEntry>),
        }

        match self
            .fetch::<StatusesResponse>(&format!("/api/tasks/{task_id}/statuses"))
            .await
        {
            Ok(StatusesResponse::Wrapped { statuses }) | Ok(StatusesResponse::Bare(statuses)) => {
                statuses
            }
            Err(err) => {
                debug!(task_id, error = %err, "error fetching task statuses");
                Vec::new()
            }
        }
    }

    pub async fn create_task_status(
        &self,
        task_id: &str,
        status_id: &str,
        label: &str,
        fields: &StatusFields,
    ) -> Result<ApiReply, ClientError> {
        let mut data = Map::new();
        data.insert("id".into(), status_id.into());
        data.insert("label".into(), label.into());
        insert_non_empty(&mut data, "color", fields.color.as_deref());
        if let Some(order) = fields.order {
            data.insert("order".into(), order.into());
        }
        self.request(
            Method::POST,
            &format!("/api/tasks/{task_id}/statuses"),
            Some(Value::Object(data)),
            true,
        )
        .await
    }

    pub async fn update_task_status(
        &self,
        task_id: &str,
        status_id: &str,
        fields: &StatusFields,
    ) -> Result<ApiReply, ClientError> {
        let mut data = Map::new();
        insert_non_empty(&mut data, "label", fields.label.as_deref());
        insert_non_empty(&mut data, "color", fields.color.as_deref());
        if let Some(order) = fields.order {
            data.insert("order".into(), order.into());
        }
        self.request(
            Method::PUT,
            &format!("/api/tasks/{task_id}/statuses/{status_id}"),
            Some(Value::Object(data)),
            true,
        )
        .await
    }

    pub async fn delete_task_status(
        &self,
        task_id: &str,
        status_id: &str,
    ) -> Result<ApiReply, ClientError> {
        self.request(
            Method::DELETE,
            &format!("/api/tasks/{task_id}/statuses/{status_id}"),
            None,
            true,
        )
        .await
    }
}

#[async_trait]
impl NoteSource for JottyClient {
    async fn get_summary(&self) -> Result<Summary, ClientError> {
        let response: SummaryResponse = self.fetch("/api/summary").await?;
        Ok(response.summary)
    }

    async fn get_notes(&self) -> Result<Vec<Note>, ClientError> {
        let response: NotesResponse = self.fetch("/api/notes").await?;
        Ok(response.notes)
    }

    async fn get_checklists(&self) -> Result<Vec<Checklist>, ClientError> {
        let response: ChecklistsResponse = self.fetch("/api/checklists").await?;
        Ok(response.checklists)
    }

    async fn get_tasks(&self) -> Result<Vec<Task>, ClientError> {
        let response: TasksResponse = self.fetch("/api/tasks").await?;
        Ok(response.tasks)
    }
}

fn insert_non_empty(data: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        data.insert(key.to_string(), value.into());
    }
}

fn truncate_body(text: &str) -> &str {
    match text.char_indices().nth(LOGGED_BODY_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
