//! Route definitions for the AI pipeline endpoints.
use warp::Filter;

use crate::context::PescaleadContext;
use crate::rate_limit;

use super::handlers;

/// Webhook receiver routes, relative to `ai-webhook-receiver`.
pub fn receiver_routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let limiter = context.rate_limiter.clone();
    warp::any()
        .map(move || context.clone())
        .and(warp::path::end())
        .and(warp::post())
        .and(rate_limit::limit(limiter, "ai-webhook-receiver"))
        .and(warp::header::optional::<String>("x-webhook-secret"))
        .and(warp::body::bytes())
        .then(handlers::pipeline::receive_webhook)
}

/// Queue worker routes, relative to `ai-process-queue`.
pub fn queue_routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path::end())
        .and(warp::post())
        .then(handlers::pipeline::process_queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing;
    use mockito::Matcher;
    use warp::http::StatusCode;
    use warp::test::request;

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let server = mockito::Server::new_async().await;
        let api = receiver_routes(testing::context(&server.url()));

        let res = request()
            .method("POST")
            .path("/")
            .json(&serde_json::json!({ "event": "connection.update" }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "ignored");
    }

    #[tokio::test]
    async fn test_wrong_secret_is_unauthorized() {
        let server = mockito::Server::new_async().await;
        let mut settings = testing::settings(&server.url());
        settings.pipeline.webhook_secret = Some("s3cret".to_string());
        let context = PescaleadContext::from_settings(settings).unwrap();
        let api = receiver_routes(context);

        let res = request()
            .method("POST")
            .path("/")
            .header("x-webhook-secret", "guess")
            .json(&serde_json::json!({ "event": "message.received" }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["reason"], "unauthorized");
    }

    #[tokio::test]
    async fn test_message_without_conversation_is_bad_request() {
        let server = mockito::Server::new_async().await;
        let api = receiver_routes(testing::context(&server.url()));

        let res = request()
            .method("POST")
            .path("/")
            .json(&serde_json::json!({
                "event": "message.received",
                "message": { "id": "m1", "type": "text", "content": "oi" }
            }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_accepted_message_reports_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/should_ai_handle_conversation")
            .with_status(200)
            .with_body("true")
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/conversations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!([{ "id": "conv-1", "inbox_id": "inbox-1", "unread_count": 2 }])
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/get_active_agent_for_inbox")
            .with_status(200)
            .with_body("\"agent-1\"")
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/ai_agents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!([{
                    "id": "agent-1",
                    "behavior_config": { "timing": { "debounce_seconds": 8 } }
                }])
                .to_string(),
            )
            .create_async()
            .await;
        let saved = server
            .mock("POST", "/rest/v1/messages")
            .with_status(201)
            .with_body(serde_json::json!([{ "id": "msg-1" }]).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/ai_add_to_debouncer")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "p_message_id": "msg-1",
                "p_debounce_seconds": 8
            })))
            .with_status(200)
            .with_body("\"deb-1\"")
            .create_async()
            .await;
        server
            .mock("PATCH", "/rest/v1/conversations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = receiver_routes(testing::context(&server.url()));

        let res = request()
            .method("POST")
            .path("/")
            .json(&serde_json::json!({
                "event": "message.received",
                "conversation_id": "conv-1",
                "message": { "id": "wamid-1", "type": "text", "content": "oi" }
            }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["message_id"], "msg-1");
        assert_eq!(body["debouncer_id"], "deb-1");
        assert_eq!(body["will_transcribe"], false);
        assert_eq!(body["debounce_seconds"], 8);
        saved.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let mut server = mockito::Server::new_async().await;
        let moved = server
            .mock("POST", "/rest/v1/rpc/ai_debouncer_to_pgmq")
            .with_status(200)
            .with_body("2")
            .create_async()
            .await;
        let read = server
            .mock("POST", "/rest/v1/rpc/pgmq_read")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "queue_name": "ai_message_queue",
                "vt_seconds": 120,
                "qty": 3
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = queue_routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "empty");
        assert_eq!(body["debouncer_moved"], 2);
        moved.assert_async().await;
        read.assert_async().await;
    }
}
