//! Backoffice integration tests: permission gating, roles, the permission
//! catalog, resources and user administration.

mod common;

use common::{create_admin_user, create_test_user, error_code, TestApp};
use diesel::prelude::*;
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..8])
}

fn role_id(app: &TestApp, name: &str) -> Uuid {
    use feedloop::schema::roles;
    let mut conn = app.db_pool.get().unwrap();
    roles::table
        .filter(roles::name.eq(name))
        .select(roles::id)
        .first(&mut conn)
        .unwrap()
}

fn permission_id(app: &TestApp, slug: &str) -> Uuid {
    use feedloop::schema::permissions;
    let mut conn = app.db_pool.get().unwrap();
    permissions::table
        .filter(permissions::slug.eq(slug))
        .select(permissions::id)
        .first(&mut conn)
        .unwrap()
}

#[tokio::test]
#[serial]
async fn members_are_denied_and_admins_allowed() {
    let app = TestApp::spawn().await;
    let member = create_test_user(&app).await;

    let denied = app.get("/api/admin/users", &member.token).await;
    assert_eq!(denied.status().as_u16(), 403);
    assert_eq!(error_code(denied).await, "PERMISSION_DENIED");

    app.grant_admin(member.id);
    let allowed = app.get("/api/admin/users", &member.token).await;
    assert_eq!(allowed.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn admin_lists_and_searches_users_with_roles() {
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let target = create_test_user(&app).await;

    let response = app
        .get(
            &format!("/api/admin/users?search={}", target.email),
            &admin.token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["pagination"]["total_count"], 1);
    assert_eq!(body["data"][0]["id"], target.id.to_string());
    assert_eq!(body["data"][0]["roles"], json!(["member"]));
    assert!(body["data"][0].get("password_hash").is_none());
}

#[tokio::test]
#[serial]
async fn admin_updates_and_deletes_users() {
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let target = create_test_user(&app).await;
    let path = format!("/api/admin/users/{}", target.id);

    let updated = app
        .put(&path, &admin.token, json!({ "name": "Renamed By Admin" }))
        .await;
    assert_eq!(updated.status().as_u16(), 200);
    let body: Value = updated.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Renamed By Admin");

    let taken = app
        .put(&path, &admin.token, json!({ "email": admin.email }))
        .await;
    assert_eq!(taken.status().as_u16(), 409);

    let self_delete = app
        .delete(&format!("/api/admin/users/{}", admin.id), &admin.token)
        .await;
    assert_eq!(self_delete.status().as_u16(), 400);
    assert_eq!(error_code(self_delete).await, "CANNOT_DELETE_SELF");

    let deleted = app.delete(&path, &admin.token).await;
    assert_eq!(deleted.status().as_u16(), 204);

    let gone = app.get(&path, &admin.token).await;
    assert_eq!(gone.status().as_u16(), 404);
    assert_eq!(error_code(gone).await, "USER_NOT_FOUND");
}

#[tokio::test]
#[serial]
async fn set_user_roles_replaces_the_role_set() {
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let target = create_test_user(&app).await;
    let path = format!("/api/admin/users/{}/roles", target.id);
    let admin_role = role_id(&app, feedloop::rbac::ADMIN_ROLE);

    let response = app
        .put(&path, &admin.token, json!({ "role_ids": [admin_role, admin_role] }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["roles"], json!(["admin"]));

    let promoted = app.get("/api/admin/roles", &target.token).await;
    assert_eq!(promoted.status().as_u16(), 200);

    let unknown = app
        .put(&path, &admin.token, json!({ "role_ids": [Uuid::new_v4()] }))
        .await;
    assert_eq!(unknown.status().as_u16(), 400);
    assert_eq!(error_code(unknown).await, "UNKNOWN_ROLE");
}

#[tokio::test]
#[serial]
async fn role_crud_with_permissions() {
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let name = unique("support");
    let read = permission_id(&app, "feedback.read");
    let write = permission_id(&app, "feedback.write");

    let created = app
        .post(
            "/api/admin/roles",
            &admin.token,
            json!({ "name": name, "description": "Triage", "permission_ids": [read] }),
        )
        .await;
    assert_eq!(created.status().as_u16(), 201);
    let body: Value = created.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["is_system"], false);
    assert_eq!(body["data"]["permissions"][0]["slug"], "feedback.read");

    let duplicate = app
        .post("/api/admin/roles", &admin.token, json!({ "name": name }))
        .await;
    assert_eq!(duplicate.status().as_u16(), 409);
    assert_eq!(error_code(duplicate).await, "ROLE_EXISTS");

    let bad_permission = app
        .post(
            "/api/admin/roles",
            &admin.token,
            json!({ "name": unique("other"), "permission_ids": [Uuid::new_v4()] }),
        )
        .await;
    assert_eq!(bad_permission.status().as_u16(), 400);
    assert_eq!(error_code(bad_permission).await, "UNKNOWN_PERMISSION");

    let updated = app
        .put(
            &format!("/api/admin/roles/{id}"),
            &admin.token,
            json!({ "permission_ids": [read, write] }),
        )
        .await;
    assert_eq!(updated.status().as_u16(), 200);
    let body: Value = updated.json().await.unwrap();
    assert_eq!(body["data"]["permissions"].as_array().unwrap().len(), 2);

    let deleted = app
        .delete(&format!("/api/admin/roles/{id}"), &admin.token)
        .await;
    assert_eq!(deleted.status().as_u16(), 204);

    let gone = app.get(&format!("/api/admin/roles/{id}"), &admin.token).await;
    assert_eq!(gone.status().as_u16(), 404);
    assert_eq!(error_code(gone).await, "ROLE_NOT_FOUND");
}

#[tokio::test]
#[serial]
async fn system_roles_are_immutable() {
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let member_role = role_id(&app, feedloop::rbac::MEMBER_ROLE);
    let path = format!("/api/admin/roles/{member_role}");

    let rename = app.put(&path, &admin.token, json!({ "name": "renamed" })).await;
    assert_eq!(rename.status().as_u16(), 403);
    assert_eq!(error_code(rename).await, "SYSTEM_ROLE_IMMUTABLE");

    let delete = app.delete(&path, &admin.token).await;
    assert_eq!(delete.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn permission_catalog_follows_resources() {
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let resource = unique("exports");

    let unknown_resource = app
        .post(
            "/api/admin/permissions",
            &admin.token,
            json!({ "slug": format!("{resource}.run") }),
        )
        .await;
    assert_eq!(unknown_resource.status().as_u16(), 400);
    assert_eq!(error_code(unknown_resource).await, "UNKNOWN_RESOURCE");

    let bad_identifier = app
        .post(
            "/api/admin/resources",
            &admin.token,
            json!({ "identifier": "Not Valid", "name": "Nope" }),
        )
        .await;
    assert_eq!(bad_identifier.status().as_u16(), 400);
    assert_eq!(error_code(bad_identifier).await, "INVALID_RESOURCE_IDENTIFIER");

    let created_resource = app
        .post(
            "/api/admin/resources",
            &admin.token,
            json!({ "identifier": resource, "name": "Exports" }),
        )
        .await;
    assert_eq!(created_resource.status().as_u16(), 201);
    let body: Value = created_resource.json().await.unwrap();
    let resource_id = body["data"]["id"].as_str().unwrap().to_string();

    let duplicate_resource = app
        .post(
            "/api/admin/resources",
            &admin.token,
            json!({ "identifier": resource, "name": "Exports" }),
        )
        .await;
    assert_eq!(duplicate_resource.status().as_u16(), 409);

    let bad_slug = app
        .post("/api/admin/permissions", &admin.token, json!({ "slug": "no-dot" }))
        .await;
    assert_eq!(bad_slug.status().as_u16(), 400);
    assert_eq!(error_code(bad_slug).await, "INVALID_PERMISSION_SLUG");

    let created_permission = app
        .post(
            "/api/admin/permissions",
            &admin.token,
            json!({ "slug": format!("{resource}.run"), "description": "Run exports" }),
        )
        .await;
    assert_eq!(created_permission.status().as_u16(), 201);
    let body: Value = created_permission.json().await.unwrap();
    let permission_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["resource"], resource);

    let listed = app
        .get(
            &format!("/api/admin/permissions?resource={resource}"),
            &admin.token,
        )
        .await;
    let listed: Value = listed.json().await.unwrap();
    assert_eq!(listed["pagination"]["total_count"], 1);

    let in_use = app
        .delete(&format!("/api/admin/resources/{resource_id}"), &admin.token)
        .await;
    assert_eq!(in_use.status().as_u16(), 409);
    let in_use: Value = in_use.json().await.unwrap();
    assert_eq!(in_use["code"], "RESOURCE_IN_USE");
    assert_eq!(in_use["details"]["permissions"], 1);

    let deleted_permission = app
        .delete(
            &format!("/api/admin/permissions/{permission_id}"),
            &admin.token,
        )
        .await;
    assert_eq!(deleted_permission.status().as_u16(), 204);

    let deleted_resource = app
        .delete(&format!("/api/admin/resources/{resource_id}"), &admin.token)
        .await;
    assert_eq!(deleted_resource.status().as_u16(), 204);
}

#[tokio::test]
#[serial]
async fn wildcard_permission_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let admin = create_admin_user(&app).await;
    let wildcard = permission_id(&app, feedloop::rbac::WILDCARD);

    let response = app
        .delete(&format!("/api/admin/permissions/{wildcard}"), &admin.token)
        .await;
    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(error_code(response).await, "SYSTEM_PERMISSION_IMMUTABLE");

    let missing = app
        .delete(&format!("/api/admin/permissions/{}", Uuid::new_v4()), &admin.token)
        .await;
    assert_eq!(missing.status().as_u16(), 404);
}
