//! Feedback triage integration tests: filters, detail and bulk status.

mod common;

use common::{create_test_user, create_test_user_with_project, error_code, seed_feedback, TestApp};
use serde_json::{json, Value};
use serial_test::serial;

async fn list(app: &TestApp, token: &str, project_id: uuid::Uuid, query: &str) -> Value {
    let response = app
        .get(
            &format!("/api/dashboard/projects/{project_id}/feedback{query}"),
            token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

fn ids(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
#[serial]
async fn list_feedback_filters_by_rating_tag_and_search() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;

    let slow = seed_feedback(&app, &project, 1, &["Slow"], "Checkout took 100% too long").await;
    let happy = seed_feedback(&app, &project, 5, &["Fast"], "Lovely").await;
    let meh = seed_feedback(&app, &project, 3, &["Slow"], "ok I guess").await;

    let all = list(&app, &owner.token, project.id, "").await;
    assert_eq!(all["pagination"]["total_count"], 3);
    assert_eq!(ids(&all)[0], meh.to_string());

    let exact = list(&app, &owner.token, project.id, "?rating=5").await;
    assert_eq!(ids(&exact), vec![happy.to_string()]);

    let low = list(&app, &owner.token, project.id, "?max_rating=3").await;
    assert_eq!(low["pagination"]["total_count"], 2);

    let tagged = list(&app, &owner.token, project.id, "?tag=Slow").await;
    let tagged = ids(&tagged);
    assert_eq!(tagged.len(), 2);
    assert!(tagged.contains(&slow.to_string()));

    let search = list(&app, &owner.token, project.id, "?search=100%25").await;
    assert_eq!(ids(&search), vec![slow.to_string()]);
}

#[tokio::test]
#[serial]
async fn list_feedback_filters_by_date_range() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;

    let old = seed_feedback(&app, &project, 4, &[], "old").await;
    seed_feedback(&app, &project, 4, &[], "new").await;
    app.backdate_feedback(
        old,
        chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    );

    let january = list(
        &app,
        &owner.token,
        project.id,
        "?from=2024-01-01&to=2024-01-15",
    )
    .await;
    assert_eq!(ids(&january), vec![old.to_string()]);

    let inverted = app
        .get(
            &format!(
                "/api/dashboard/projects/{}/feedback?from=2024-02-01&to=2024-01-01",
                project.id
            ),
            &owner.token,
        )
        .await;
    assert_eq!(inverted.status().as_u16(), 400);
    assert_eq!(error_code(inverted).await, "INVALID_RANGE");
}

#[tokio::test]
#[serial]
async fn list_feedback_rejects_bad_filters_and_paginates() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;
    for rating in 1..=3 {
        seed_feedback(&app, &project, rating, &[], "x").await;
    }

    let bad_status = app
        .get(
            &format!("/api/dashboard/projects/{}/feedback?status=deleted", project.id),
            &owner.token,
        )
        .await;
    assert_eq!(bad_status.status().as_u16(), 400);
    assert_eq!(error_code(bad_status).await, "INVALID_STATUS");

    let page = list(&app, &owner.token, project.id, "?page=2&per_page=2").await;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["pagination"]["page"], 2);
    assert_eq!(page["pagination"]["total_count"], 3);
}

#[tokio::test]
#[serial]
async fn get_feedback_is_scoped_to_the_project() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;
    let other = app
        .create_project(&owner, json!({ "name": "Other", "slug": TestApp::unique_slug() }))
        .await;
    let id = seed_feedback(&app, &other, 2, &[], "elsewhere").await;

    let wrong_project = app
        .get(
            &format!("/api/dashboard/projects/{}/feedback/{}", project.id, id),
            &owner.token,
        )
        .await;
    assert_eq!(wrong_project.status().as_u16(), 404);
    assert_eq!(error_code(wrong_project).await, "FEEDBACK_NOT_FOUND");

    let right = app
        .get(
            &format!("/api/dashboard/projects/{}/feedback/{}", other.id, id),
            &owner.token,
        )
        .await;
    assert_eq!(right.status().as_u16(), 200);
    let body: Value = right.json().await.unwrap();
    assert_eq!(body["data"]["rating"], 2);
}

#[tokio::test]
#[serial]
async fn bulk_status_updates_only_own_rows_and_emits_event() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;
    let (_, foreign_project) = create_test_user_with_project(&app).await;

    let mine = seed_feedback(&app, &project, 4, &[], "mine").await;
    let also_mine = seed_feedback(&app, &project, 2, &[], "also mine").await;
    let foreign = seed_feedback(&app, &foreign_project, 4, &[], "theirs").await;

    let path = format!("/api/dashboard/projects/{}/feedback", project.id);
    let response = app
        .patch(
            &path,
            &owner.token,
            json!({ "ids": [mine, also_mine, foreign], "status": "archived" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["updated"], 2);
    assert_eq!(app.count_outbox_events("feedback.status_changed", mine), 1);
    assert_eq!(app.count_outbox_events("feedback.status_changed", also_mine), 1);
    assert_eq!(app.count_outbox_events("feedback.status_changed", foreign), 0);

    let archived = list(&app, &owner.token, project.id, "?status=archived").await;
    let mut archived_ids = ids(&archived);
    archived_ids.sort();
    let mut expected = vec![mine.to_string(), also_mine.to_string()];
    expected.sort();
    assert_eq!(archived_ids, expected);

    let repeat = app
        .patch(&path, &owner.token, json!({ "ids": [mine], "status": "archived" }))
        .await;
    let repeat: Value = repeat.json().await.unwrap();
    assert_eq!(repeat["data"]["updated"], 0);
    assert_eq!(app.count_outbox_events("feedback.status_changed", mine), 1);
}

#[tokio::test]
#[serial]
async fn bulk_status_validates_payload() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;
    let path = format!("/api/dashboard/projects/{}/feedback", project.id);

    let empty = app
        .patch(&path, &owner.token, json!({ "ids": [], "status": "read" }))
        .await;
    assert_eq!(empty.status().as_u16(), 400);

    let stranger = create_test_user(&app).await;
    let forbidden = app
        .patch(
            &path,
            &stranger.token,
            json!({ "ids": [uuid::Uuid::new_v4()], "status": "read" }),
        )
        .await;
    assert_eq!(forbidden.status().as_u16(), 404);
}
