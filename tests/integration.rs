mod common;

use common::MockJotty;
use jotty_hub::actions::{Action, ActionError, ActionOutcome};
use jotty_hub::app::{Integration, SetupError, ValidationError, validate_config};
use jotty_hub::config::ENTRY_TITLE;
use jotty_hub::integrations::jotty::{ApiReply, ClientError};
use jotty_hub::views::{EntityEvent, SensorState};
use serde_json::{Value, json};
use std::time::Duration;

fn sensor<'a>(sensors: &'a [SensorState], unique_id: &str) -> &'a Value {
    &sensors
        .iter()
        .find(|s| s.unique_id == unique_id)
        .unwrap_or_else(|| panic!("missing sensor {unique_id}"))
        .state
}

async fn setup(mock: &MockJotty) -> Integration {
    Integration::setup(mock.config()).await.expect("setup")
}

#[tokio::test]
async fn setup_publishes_filtered_snapshot() {
    let mock = MockJotty::start().await;
    let mut integration = setup(&mock).await;

    let sensors = integration.sensors();
    assert_eq!(sensor(&sensors, "jotty_total_notes"), &json!(2));
    assert_eq!(sensor(&sensors, "jotty_total_checklists"), &json!(1));
    assert_eq!(sensor(&sensors, "jotty_total_items"), &json!(3));
    assert_eq!(sensor(&sensors, "jotty_completed_items"), &json!(1));
    assert_eq!(sensor(&sensors, "jotty_completed_task_items"), &json!(1));
    assert!(sensors.iter().all(|s| s.available));

    let events = integration.sync_entities();
    let created = events
        .iter()
        .filter(|e| matches!(e, EntityEvent::Created(_)))
        .count();
    assert_eq!(created, 4);
    assert_eq!(integration.entity_views().len(), 4);

    integration.shutdown().await;
}

#[tokio::test]
async fn unhealthy_service_is_not_ready() {
    let mock = MockJotty::start().await;
    mock.respond("GET", "/api/health", 503, "starting");
    let err = Integration::setup(mock.config())
        .await
        .err()
        .expect("setup should fail");
    assert!(matches!(err, SetupError::NotReady(ClientError::HealthCheck { .. })));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn first_refresh_failing_everywhere_aborts_setup() {
    let mock = MockJotty::start().await;
    for path in ["/api/summary", "/api/notes", "/api/checklists", "/api/tasks"] {
        mock.respond("GET", path, 500, "down");
    }
    let err = Integration::setup(mock.config())
        .await
        .err()
        .expect("setup should fail");
    assert!(matches!(err, SetupError::FirstRefresh(_)));
}

#[tokio::test]
async fn one_failing_list_still_sets_up() {
    let mock = MockJotty::start().await;
    mock.respond("GET", "/api/checklists", 502, "bad gateway");
    let integration = setup(&mock).await;
    let sensors = integration.sensors();
    assert_eq!(sensor(&sensors, "jotty_total_checklists"), &json!(0));
    assert_eq!(sensor(&sensors, "jotty_total_notes"), &json!(2));
    integration.shutdown().await;
}

#[tokio::test]
async fn validate_config_maps_failures() {
    let mock = MockJotty::start().await;
    assert_eq!(validate_config(&mock.config()).await.expect("valid"), ENTRY_TITLE);

    mock.respond("GET", "/api/summary", 401, "unauthorized");
    assert!(matches!(
        validate_config(&mock.config()).await,
        Err(ValidationError::InvalidAuth)
    ));

    mock.respond("GET", "/api/health", 500, "down");
    assert!(matches!(
        validate_config(&mock.config()).await,
        Err(ValidationError::CannotConnect(_))
    ));
}

#[tokio::test]
async fn successful_action_triggers_refresh() {
    let mock = MockJotty::start().await;
    mock.respond_json("POST", "/api/notes", 200, json!({ "success": true }));
    let integration = setup(&mock).await;
    let mut updates = integration.subscribe();

    let outcome = integration
        .dispatcher()
        .call("create_note", json!({ "title": "Call plumber" }))
        .await
        .expect("create note");
    assert_eq!(
        outcome,
        ActionOutcome::Reply(ApiReply::Json(json!({ "success": true })))
    );

    let sent = mock.calls_to("POST", "/api/notes");
    assert_eq!(
        sent[0].body,
        Some(json!({ "title": "Call plumber", "content": "", "category": "Home Assistant" }))
    );

    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("refresh within timeout")
        .expect("coordinator alive");
    assert_eq!(mock.calls_to("GET", "/api/notes").len(), 2);

    integration.shutdown().await;
}

#[tokio::test]
async fn failed_action_propagates_without_refresh() {
    let mock = MockJotty::start().await;
    mock.respond("DELETE", "/api/checklists/c1", 500, "locked");
    let integration = setup(&mock).await;

    let err = integration
        .dispatcher()
        .dispatch(Action::DeleteChecklist {
            checklist_id: "c1".to_string(),
        })
        .await
        .expect_err("server error");
    assert!(matches!(err, ActionError::Client(ClientError::Http { .. })));

    // The debounce window is untouched, so a fresh request is accepted.
    assert!(integration.coordinator().request_refresh());
    integration.shutdown().await;
}

#[tokio::test]
async fn update_without_category_leaves_it_out() {
    let mock = MockJotty::start().await;
    mock.respond_json("PUT", "/api/notes/n1", 200, json!({ "success": true }));
    let integration = setup(&mock).await;

    integration
        .dispatcher()
        .call("update_note", json!({ "note_id": "n1", "content": "" }))
        .await
        .expect("update note");
    assert_eq!(
        mock.calls_to("PUT", "/api/notes/n1")[0].body,
        Some(json!({ "content": "" }))
    );
    integration.shutdown().await;
}

#[tokio::test]
async fn task_statuses_query_is_normalized_and_does_not_refresh() {
    let mock = MockJotty::start().await;
    mock.respond_json(
        "GET",
        "/api/tasks/t1/statuses",
        200,
        json!({ "statuses": ["todo", "waiting_on"] }),
    );
    let integration = setup(&mock).await;

    let outcome = integration
        .dispatcher()
        .call("get_task_statuses", json!({ "task_id": "t1" }))
        .await
        .expect("statuses");
    let ActionOutcome::Statuses(statuses) = outcome else {
        panic!("expected statuses, got {outcome:?}");
    };
    let labels: Vec<&str> = statuses.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["To Do", "Waiting On"]);

    let failing = integration
        .dispatcher()
        .call("get_task_statuses", json!({ "task_id": "gone" }))
        .await
        .expect("never fails");
    assert_eq!(failing, ActionOutcome::Statuses(Vec::new()));

    assert!(integration.coordinator().request_refresh());
    integration.shutdown().await;
}

#[tokio::test]
async fn unknown_action_makes_no_request() {
    let mock = MockJotty::start().await;
    let integration = setup(&mock).await;
    let before = mock.requests().len();

    let err = integration
        .dispatcher()
        .call("archive_everything", json!({}))
        .await
        .expect_err("unknown action");
    assert!(matches!(err, ActionError::InvalidCall { .. }));
    assert_eq!(mock.requests().len(), before);
    integration.shutdown().await;
}

#[tokio::test]
async fn instances_sharing_state_dir_keep_separate_views() {
    let first = MockJotty::start().await;
    let second = MockJotty::start().await;
    let state_dir = common::temp_state_dir();

    let mut config_a = first.config();
    config_a.data.state_dir = state_dir.clone();
    let mut config_b = second.config();
    config_b.data.state_dir = state_dir;

    let created = |events: Vec<EntityEvent>| {
        events
            .into_iter()
            .filter(|e| matches!(e, EntityEvent::Created(_)))
            .count()
    };

    let mut a = Integration::setup(config_a.clone()).await.expect("setup a");
    let mut b = Integration::setup(config_b).await.expect("setup b");
    assert_eq!(created(a.sync_entities()), 4);
    assert_eq!(created(b.sync_entities()), 4);
    a.shutdown().await;
    b.shutdown().await;

    // A restarted instance picks up only its own registry.
    let mut again = Integration::setup(config_a).await.expect("setup a again");
    assert_eq!(created(again.sync_entities()), 0);
    assert_eq!(again.entity_views().len(), 4);
    again.shutdown().await;
}
