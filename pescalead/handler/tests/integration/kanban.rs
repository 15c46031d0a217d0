//! Board endpoints.

use mockito::Matcher;
use serde_json::json;
use warp::http::StatusCode;
use warp::test::request;

use crate::common::{body_json, send, WORKSPACE_ID};

async fn signed_in(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/auth/v1/user")
        .match_header("authorization", "Bearer user-token")
        .with_status(200)
        .with_body(json!({ "id": "user-1", "email": "ana@example.com" }).to_string())
        .create_async()
        .await
}

#[tokio::test]
async fn members_list_funnels_with_sorted_columns() {
    let mut server = mockito::Server::new_async().await;
    let auth = signed_in(&mut server).await;
    let member = server
        .mock("GET", "/rest/v1/workspace_members")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("workspace_id".into(), format!("eq.{WORKSPACE_ID}")),
            Matcher::UrlEncoded("user_id".into(), "eq.user-1".into()),
        ]))
        .with_status(200)
        .with_body(json!([{ "role": "admin" }]).to_string())
        .create_async()
        .await;
    let funnels = server
        .mock("GET", "/rest/v1/funnels")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!([{
                "id": "funnel-1",
                "name": "Vendas",
                "workspace_id": WORKSPACE_ID,
                "is_active": true,
                "position": 0,
                "funnel_columns": [
                    { "id": "col-2", "title": "Qualificado", "position": 1 },
                    { "id": "col-1", "title": "Novo", "position": 0 }
                ]
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let response = send(
        &server.url(),
        request()
            .method("GET")
            .path(&format!("/kanban-api/workspaces/{WORKSPACE_ID}/funnels"))
            .header("authorization", "Bearer user-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(&response);
    let columns = &body["funnels"][0]["columns"];
    assert_eq!(columns[0]["id"], "col-1");
    assert_eq!(columns[1]["id"], "col-2");
    assert_eq!(columns[1]["funnel_id"], "funnel-1");
    auth.assert_async().await;
    member.assert_async().await;
    funnels.assert_async().await;
}

#[tokio::test]
async fn strangers_are_forbidden() {
    let mut server = mockito::Server::new_async().await;
    signed_in(&mut server).await;
    server
        .mock("GET", "/rest/v1/workspace_members")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let response = send(
        &server.url(),
        request()
            .method("GET")
            .path(&format!("/kanban-api/workspaces/{WORKSPACE_ID}/funnels"))
            .header("authorization", "Bearer user-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(&response)["error"], "Forbidden - No access to workspace");
}

#[tokio::test]
async fn malformed_workspace_ids_are_refused() {
    let mut server = mockito::Server::new_async().await;
    signed_in(&mut server).await;

    let response = send(
        &server.url(),
        request()
            .method("GET")
            .path("/kanban-api/workspaces/not-a-uuid/funnels")
            .header("authorization", "Bearer user-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(&response)["error"], "Invalid Workspace ID format");
}

#[tokio::test]
async fn expired_tokens_are_unauthorized() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/auth/v1/user")
        .with_status(401)
        .with_body(json!({ "message": "JWT expired" }).to_string())
        .create_async()
        .await;

    let response = send(
        &server.url(),
        request()
            .method("GET")
            .path(&format!("/kanban-api/workspaces/{WORKSPACE_ID}/funnels/f1/stats"))
            .header("authorization", "Bearer stale-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
