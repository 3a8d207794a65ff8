//! Polling aggregator.
//!
//! Each cycle fetches summary, notes, checklists and tasks concurrently,
//! keeps whatever succeeded, filters to the marker tag and publishes one
//! immutable [`Snapshot`]. Subscribers only ever see complete cycles.

mod debounce;

pub use debounce::RefreshDebouncer;

use crate::integrations::jotty::{ClientError, NoteSource};
use crate::models::Snapshot;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("error communicating with API: {0}")]
    AllSourcesFailed(#[source] ClientError),
}

/// What subscribers observe after every finished cycle.
#[derive(Clone, Debug, Default)]
pub struct CoordinatorState {
    pub snapshot: Option<Arc<Snapshot>>,
    pub last_update_success: bool,
    pub cycles: u64,
}

pub struct Coordinator {
    source: Arc<dyn NoteSource>,
    marker: String,
    state_tx: watch::Sender<CoordinatorState>,
    debouncer: Mutex<RefreshDebouncer>,
    refresh_signal: Notify,
}

impl Coordinator {
    pub fn new(source: Arc<dyn NoteSource>, marker: &str, debounce: Duration) -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::default());
        Self {
            source,
            marker: marker.to_string(),
            state_tx,
            debouncer: Mutex::new(RefreshDebouncer::new(debounce)),
            refresh_signal: Notify::new(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> CoordinatorState {
        self.state_tx.borrow().clone()
    }

    /// Initial fetch during setup; an error here should abort setup.
    pub async fn first_refresh(&self) -> Result<Arc<Snapshot>, UpdateError> {
        self.refresh().await
    }

    pub async fn refresh(&self) -> Result<Arc<Snapshot>, UpdateError> {
        debug!("refreshing Jotty data");
        let (summary, notes, checklists, tasks) = tokio::join!(
            self.source.get_summary(),
            self.source.get_notes(),
            self.source.get_checklists(),
            self.source.get_tasks(),
        );

        let (summary, notes, checklists, tasks) = match (summary, notes, checklists, tasks) {
            (Err(err), Err(_), Err(_), Err(_)) => {
                warn!(error = %err, "all Jotty fetches failed");
                self.state_tx.send_modify(|state| {
                    state.last_update_success = false;
                    state.cycles += 1;
                });
                return Err(UpdateError::AllSourcesFailed(err));
            }
            results => results,
        };

        let snapshot = Arc::new(Snapshot::filtered(
            &self.marker,
            or_default("summary", summary),
            or_default("notes", notes),
            or_default("checklists", checklists),
            or_default("tasks", tasks),
        ));
        debug!(
            notes = snapshot.notes.len(),
            checklists = snapshot.checklists.len(),
            tasks = snapshot.tasks.len(),
            "snapshot ready"
        );

        self.state_tx.send_modify(|state| {
            state.snapshot = Some(Arc::clone(&snapshot));
            state.last_update_success = true;
            state.cycles += 1;
        });
        Ok(snapshot)
    }

    /// Asks the poll loop for an early refresh. Returns false when the
    /// request fell inside the debounce window and was dropped.
    pub fn request_refresh(&self) -> bool {
        let accepted = self
            .debouncer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_accept();
        if accepted {
            self.refresh_signal.notify_one();
        } else {
            debug!("refresh request dropped by debounce");
        }
        accepted
    }

    /// Polls on `interval` and on accepted refresh requests until `shutdown`
    /// fires. A failed cycle is not retried early; the next trigger retries.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; setup already fetched once.
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "polling Jotty");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.refresh_signal.notified() => {}
                _ = &mut shutdown => break,
            }
            if let Err(err) = self.refresh().await {
                warn!(error = %err, "update failed");
            }
        }
        info!("polling stopped");
    }
}

fn or_default<T: Default>(resource: &str, result: Result<T, ClientError>) -> T {
    result.unwrap_or_else(|err| {
        warn!(resource, error = %err, "fetch failed");
        T::default()
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Checklist, Note, Summary, Task};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory source; each resource can be switched to fail.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub notes: Vec<Note>,
        pub checklists: Vec<Checklist>,
        pub tasks: Vec<Task>,
        pub fail_summary: bool,
        pub fail_notes: bool,
        pub fail_checklists: bool,
        pub fail_tasks: bool,
        pub fail_all: AtomicBool,
        pub calls: AtomicUsize,
    }

    fn unavailable() -> ClientError {
        ClientError::Http {
            url: "http://fake/api".to_string(),
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
    }

    impl FakeSource {
        fn result<T>(&self, fail: bool, value: T) -> Result<T, ClientError> {
            if fail || self.fail_all.load(Ordering::SeqCst) {
                Err(unavailable())
            } else {
                Ok(value)
            }
        }
    }

    #[async_trait]
    impl NoteSource for FakeSource {
        async fn get_summary(&self) -> Result<Summary, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut summary = Summary::new();
            summary.insert("totalNotes".to_string(), json!(self.notes.len()));
            self.result(self.fail_summary, summary)
        }

        async fn get_notes(&self) -> Result<Vec<Note>, ClientError> {
            self.result(self.fail_notes, self.notes.clone())
        }

        async fn get_checklists(&self) -> Result<Vec<Checklist>, ClientError> {
            self.result(self.fail_checklists, self.checklists.clone())
        }

        async fn get_tasks(&self) -> Result<Vec<Task>, ClientError> {
            self.result(self.fail_tasks, self.tasks.clone())
        }
    }

    pub(crate) fn note(id: &str, category: &str) -> Note {
        Note {
            id: id.to_string(),
            title: format!("Note {id}"),
            category: category.to_string(),
            ..Note::default()
        }
    }

    pub(crate) fn checklist(id: &str, category: &str) -> Checklist {
        Checklist {
            id: id.to_string(),
            title: format!("List {id}"),
            category: category.to_string(),
            list_type: "simple".to_string(),
            ..Checklist::default()
        }
    }

    pub(crate) fn task(id: &str, category: &str) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            category: category.to_string(),
            ..Task::default()
        }
    }

    fn populated() -> FakeSource {
        FakeSource {
            notes: vec![
                note("n1", "Home Assistant"),
                note("n2", "Home Assistant/Sub"),
                note("n3", "Work"),
            ],
            checklists: vec![checklist("l1", "Home Assistant"), checklist("l2", "Personal")],
            tasks: vec![task("t1", "Home Assistant/Chores")],
            ..FakeSource::default()
        }
    }

    fn coordinator(source: FakeSource) -> Coordinator {
        Coordinator::new(Arc::new(source), "Home Assistant", Duration::from_millis(500))
    }

    #[tokio::test]
    async fn refresh_filters_to_marker() {
        let coordinator = coordinator(populated());
        let snapshot = coordinator.refresh().await.expect("refresh");
        let notes: Vec<&str> = snapshot.notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(notes, vec!["n1", "n2"]);
        assert_eq!(snapshot.checklists.len(), 1);
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.summary.get("totalNotes"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn one_failing_resource_does_not_fail_cycle() {
        let coordinator = coordinator(FakeSource {
            fail_checklists: true,
            ..populated()
        });
        let snapshot = coordinator.refresh().await.expect("refresh");
        assert!(snapshot.checklists.is_empty());
        assert_eq!(snapshot.notes.len(), 2);
        assert_eq!(snapshot.tasks.len(), 1);
        assert!(!snapshot.summary.is_empty());
        assert!(coordinator.current().last_update_success);
    }

    #[tokio::test]
    async fn all_resources_failing_fails_cycle_and_keeps_snapshot() {
        let source = Arc::new(populated());
        let coordinator = Coordinator::new(
            source.clone(),
            "Home Assistant",
            Duration::from_millis(500),
        );
        coordinator.refresh().await.expect("first refresh");

        source.fail_all.store(true, Ordering::SeqCst);
        let err = coordinator.refresh().await.expect_err("all failed");
        assert!(matches!(err, UpdateError::AllSourcesFailed(_)));

        let state = coordinator.current();
        assert!(!state.last_update_success);
        assert_eq!(state.cycles, 2);
        let kept = state.snapshot.expect("previous snapshot kept");
        assert_eq!(kept.notes.len(), 2);
    }

    #[tokio::test]
    async fn subscribers_see_complete_snapshots() {
        let coordinator = coordinator(populated());
        let mut rx = coordinator.subscribe();
        coordinator.refresh().await.expect("refresh");
        assert!(rx.has_changed().expect("sender alive"));
        let state = rx.borrow_and_update().clone();
        let snapshot = state.snapshot.expect("snapshot");
        assert_eq!(snapshot.notes.len(), 2);
        assert_eq!(snapshot.checklists.len(), 1);
    }

    #[tokio::test]
    async fn request_refresh_is_debounced() {
        let coordinator = coordinator(populated());
        assert!(coordinator.request_refresh());
        assert!(!coordinator.request_refresh());
    }

    #[tokio::test]
    async fn accepted_request_wakes_poll_loop() {
        let source = Arc::new(populated());
        let coordinator = Arc::new(Coordinator::new(
            source.clone(),
            "Home Assistant",
            Duration::from_millis(500),
        ));
        let mut rx = coordinator.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(Arc::clone(&coordinator).run(Duration::from_secs(3600), stop_rx));

        assert!(coordinator.request_refresh());
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("refresh within timeout")
            .expect("sender alive");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(rx.borrow().snapshot.is_some());

        let _ = stop_tx.send(());
        handle.await.expect("loop exits");
    }
}
