mod common;

use common::{create_test_user, create_test_user_with_project, error_code, seed_feedback, TestApp};
use serde_json::Value;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn analytics_summarizes_recent_feedback() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;

    seed_feedback(&app, &project, 5, &["Fast"], "").await;
    seed_feedback(&app, &project, 4, &["Fast"], "").await;
    seed_feedback(&app, &project, 3, &[], "").await;
    seed_feedback(&app, &project, 1, &["Slow"], "").await;

    let response = app
        .get(
            &format!("/api/dashboard/projects/{}/analytics", project.id),
            &owner.token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(data["total"], 4);
    assert_eq!(data["average_rating"], 3.3);
    // 2 promoters, 1 detractor out of 4
    assert_eq!(data["nps"], 25);
    assert_eq!(data["distribution"].as_array().unwrap().len(), 5);
    assert_eq!(data["distribution"][0]["count"], 1);
    assert_eq!(data["top_tags"][0]["tag"], "Fast");
    assert_eq!(data["top_tags"][0]["count"], 2);
    assert_eq!(data["status_counts"][0]["status"], "new");
    assert_eq!(data["status_counts"][0]["count"], 4);
    assert_eq!(data["daily"].as_array().unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn analytics_respects_the_date_window() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;

    let old = seed_feedback(&app, &project, 1, &[], "").await;
    seed_feedback(&app, &project, 5, &[], "").await;
    app.backdate_feedback(
        old,
        chrono::Utc::now().naive_utc() - chrono::Duration::days(60),
    );

    let response = app
        .get(
            &format!("/api/dashboard/projects/{}/analytics?days=30", project.id),
            &owner.token,
        )
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["nps"], 100);
}

#[tokio::test]
#[serial]
async fn analytics_of_empty_project_is_zeroed() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;

    let response = app
        .get(
            &format!("/api/dashboard/projects/{}/analytics", project.id),
            &owner.token,
        )
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["average_rating"], 0.0);
    assert_eq!(body["data"]["nps"], 0);
}

#[tokio::test]
#[serial]
async fn analytics_rejects_invalid_ranges_and_strangers() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;
    let path = format!("/api/dashboard/projects/{}/analytics", project.id);

    let too_long = app.get(&format!("{path}?days=1000"), &owner.token).await;
    assert_eq!(too_long.status().as_u16(), 400);
    assert_eq!(error_code(too_long).await, "INVALID_RANGE");

    let inverted = app
        .get(&format!("{path}?from=2024-03-01&to=2024-02-01"), &owner.token)
        .await;
    assert_eq!(inverted.status().as_u16(), 400);

    let stranger = create_test_user(&app).await;
    let hidden = app.get(&path, &stranger.token).await;
    assert_eq!(hidden.status().as_u16(), 404);
}
