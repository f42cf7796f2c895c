//! Dashboard project integration tests: ownership, slugs, widget config,
//! api key rotation and sharing.

mod common;

use common::{create_test_user, create_test_user_with_project, error_code, seed_feedback, TestApp};
use serde_json::{json, Value};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn create_project_normalizes_whitelist_and_applies_defaults() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;
    let slug = TestApp::unique_slug();

    let response = app
        .post(
            "/api/dashboard/projects",
            &user.token,
            json!({
                "name": "Checkout",
                "slug": slug,
                "domain_whitelist": ["https://Shop.Example.com/path", "shop.example.com", "blog.example.com"]
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(data["slug"], slug);
    assert_eq!(data["domain_whitelist"], json!(["shop.example.com", "blog.example.com"]));
    assert!(data["api_key"].as_str().unwrap().starts_with("fl_"));
    assert_eq!(data["widget_config"]["logic"].as_array().unwrap().len(), 3);
    assert_eq!(data["settings"]["show_branding"], true);
    assert_eq!(data["feedback_count"], 0);
}

#[tokio::test]
#[serial]
async fn create_project_rejects_bad_slug_and_duplicates() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;
    let slug = TestApp::unique_slug();

    let bad = app
        .post(
            "/api/dashboard/projects",
            &user.token,
            json!({ "name": "Bad", "slug": "Not A Slug" }),
        )
        .await;
    assert_eq!(bad.status().as_u16(), 400);

    app.create_project(&user, json!({ "name": "One", "slug": slug })).await;

    let other = create_test_user(&app).await;
    let duplicate = app
        .post(
            "/api/dashboard/projects",
            &other.token,
            json!({ "name": "Two", "slug": slug }),
        )
        .await;
    assert_eq!(duplicate.status().as_u16(), 409);
    assert_eq!(error_code(duplicate).await, "SLUG_TAKEN");
}

#[tokio::test]
#[serial]
async fn create_project_rejects_overlapping_logic() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let response = app
        .post(
            "/api/dashboard/projects",
            &user.token,
            json!({
                "name": "Overlap",
                "slug": TestApp::unique_slug(),
                "widget_config": {
                    "logic": [
                        { "rating_group": [1, 2, 3], "title": "Low" },
                        { "rating_group": [3, 4, 5], "title": "High" }
                    ]
                }
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(error_code(response).await, "INVALID_WIDGET_CONFIG");
}

#[tokio::test]
#[serial]
async fn projects_of_other_owners_answer_404() {
    let app = TestApp::spawn().await;
    let (_, project) = create_test_user_with_project(&app).await;
    let stranger = create_test_user(&app).await;

    let path = format!("/api/dashboard/projects/{}", project.id);
    let get = app.get(&path, &stranger.token).await;
    assert_eq!(get.status().as_u16(), 404);
    assert_eq!(error_code(get).await, "PROJECT_NOT_FOUND");

    let delete = app.delete(&path, &stranger.token).await;
    assert_eq!(delete.status().as_u16(), 404);

    let feedback = app
        .get(&format!("{path}/feedback"), &stranger.token)
        .await;
    assert_eq!(feedback.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn list_projects_is_owner_scoped_with_counts() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;
    create_test_user_with_project(&app).await;

    seed_feedback(&app, &project, 5, &[], "great").await;
    seed_feedback(&app, &project, 2, &[], "meh").await;

    let response = app.get("/api/dashboard/projects", &owner.token).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"], project.id.to_string());
    assert_eq!(data[0]["feedback_count"], 2);
    assert_eq!(body["pagination"]["total_count"], 1);
}

#[tokio::test]
#[serial]
async fn update_project_changes_fields_and_validates_settings() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;
    let path = format!("/api/dashboard/projects/{}", project.id);

    let response = app
        .put(
            &path,
            &owner.token,
            json!({
                "name": "Renamed",
                "domain_whitelist": ["app.example.com"],
                "settings": { "show_branding": false, "retention_days": 30 }
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Renamed");
    assert_eq!(body["data"]["domain_whitelist"], json!(["app.example.com"]));
    assert_eq!(body["data"]["settings"]["retention_days"], 30);

    let invalid = app
        .put(
            &path,
            &owner.token,
            json!({ "settings": { "retention_days": 0 } }),
        )
        .await;
    assert_eq!(invalid.status().as_u16(), 400);
    assert_eq!(error_code(invalid).await, "INVALID_SETTINGS");
}

#[tokio::test]
#[serial]
async fn update_widget_replaces_logic() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;

    let response = app
        .put(
            &format!("/api/dashboard/projects/{}/widget", project.id),
            &owner.token,
            json!({
                "theme": { "primary_color": "#000000" },
                "logic": [
                    { "rating_group": [1, 2, 3, 4, 5], "title": "Tell us more", "tags": ["A"] }
                ]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let step = app
        .get_public(&format!("/api/v1/widget/step?project={}&rating=2", project.slug))
        .await;
    let body: Value = step.json().await.unwrap();
    assert_eq!(body["data"]["title"], "Tell us more");
    assert_eq!(body["data"]["fallback"], false);
}

#[tokio::test]
#[serial]
async fn rotate_api_key_invalidates_the_old_key() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;

    let response = app
        .post(
            &format!("/api/dashboard/projects/{}/api-key", project.id),
            &owner.token,
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let new_key = body["data"]["api_key"].as_str().unwrap().to_string();
    assert_ne!(new_key, project.api_key);

    let stale = app
        .client
        .post(app.url("/api/v1/widget/feedback"))
        .header("X-Api-Key", &project.api_key)
        .json(&json!({ "project": project.slug, "rating": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(stale.status().as_u16(), 401);
}

#[tokio::test]
#[serial]
async fn share_returns_link_snippet_and_qr() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;

    let response = app
        .get(
            &format!("/api/dashboard/projects/{}/share", project.id),
            &owner.token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    let data = &body["data"];
    assert!(data["url"]
        .as_str()
        .unwrap()
        .ends_with(&format!("/api/v1/widget/p/{}", project.slug)));
    assert!(data["embed_snippet"].as_str().unwrap().contains(&project.slug));
    assert!(data["qr_svg"].as_str().unwrap().contains("<svg"));
}

#[tokio::test]
#[serial]
async fn delete_project_removes_it() {
    let app = TestApp::spawn().await;
    let (owner, project) = create_test_user_with_project(&app).await;
    let path = format!("/api/dashboard/projects/{}", project.id);

    let response = app.delete(&path, &owner.token).await;
    assert_eq!(response.status().as_u16(), 204);

    let after = app.get(&path, &owner.token).await;
    assert_eq!(after.status().as_u16(), 404);
}
