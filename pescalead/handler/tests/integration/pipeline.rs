//! Webhook receiver and queue worker.

use mockito::Matcher;
use serde_json::json;
use warp::http::StatusCode;
use warp::test::request;

use crate::common::{body_json, send};

#[tokio::test]
async fn conversations_outside_the_agent_are_skipped() {
    let mut server = mockito::Server::new_async().await;
    let handled = server
        .mock("POST", "/rest/v1/rpc/should_ai_handle_conversation")
        .match_body(Matcher::Json(json!({ "p_conversation_id": "conv-1" })))
        .with_status(200)
        .with_body("false")
        .create_async()
        .await;

    let response = send(
        &server.url(),
        request()
            .method("POST")
            .path("/ai-webhook-receiver")
            .json(&json!({
                "event": "messages.upsert",
                "conversation_id": "conv-1",
                "message": { "id": "wamid-1", "type": "text", "content": "Oi, tudo bem?" }
            })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(&response);
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["reason"], "conversation not handled by AI");
    handled.assert_async().await;
}

#[tokio::test]
async fn unreadable_queue_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/rest/v1/rpc/ai_debouncer_to_pgmq")
        .with_status(200)
        .with_body("0")
        .create_async()
        .await;
    server
        .mock("POST", "/rest/v1/rpc/pgmq_read")
        .with_status(500)
        .with_body(json!({ "code": "42P01", "message": "queue does not exist" }).to_string())
        .create_async()
        .await;

    let response = send(&server.url(), request().method("POST").path("/ai-process-queue")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(&response);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "queue does not exist");
}
