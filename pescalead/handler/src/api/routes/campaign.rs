//! Route definitions for the campaign queue processor.
use warp::Filter;

use crate::context::PescaleadContext;

use super::handlers;

/// Campaign queue routes, relative to `campaign-process-queue`.
pub fn routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .then(handlers::campaign::process_campaign_queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;
    use warp::http::StatusCode;
    use warp::test::request;

    async fn vault_key(server: &mut ServerGuard) {
        server
            .mock("GET", "/rest/v1/decrypted_secrets")
            .match_query(Matcher::UrlEncoded("name".into(), "eq.OPENROUTER_API_KEY".into()))
            .with_status(200)
            .with_body(json!([{ "decrypted_secret": "or-key" }]).to_string())
            .create_async()
            .await;
    }

    async fn locked_message(server: &mut ServerGuard, retry_count: Option<u32>) {
        server
            .mock("POST", "/rest/v1/rpc/get_and_lock_campaign_messages")
            .with_status(200)
            .with_body(
                json!([{
                    "id": "cm-1",
                    "lead_id": "lead-1",
                    "phone_normalized": "5583999990000",
                    "retry_count": retry_count,
                    "campaign_runs": {
                        "id": "run-1",
                        "campaign_configs": {
                            "inbox_id": "inbox-1",
                            "workspace_id": "ws-1",
                            "split_messages": false
                        }
                    }
                }])
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/mark_old_campaign_messages_as_skipped")
            .with_status(200)
            .with_body("0")
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/get_lead_full_context")
            .with_status(200)
            .with_body(json!({ "client_name": "Padaria Pão Bom" }).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/finalize_campaign_run_if_complete")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
    }

    async fn run_status(server: &mut ServerGuard, status: &str) {
        server
            .mock("GET", "/rest/v1/campaign_runs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "status": status }]).to_string())
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_nothing_due() {
        let mut server = Server::new_async().await;
        vault_key(&mut server).await;
        let locked = server
            .mock("POST", "/rest/v1/rpc/get_and_lock_campaign_messages")
            .match_body(Matcher::PartialJson(json!({ "p_batch_size": 20 })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/mark_old_campaign_messages_as_skipped")
            .with_status(200)
            .with_body("3")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request()
            .method("POST")
            .path("/")
            .json(&json!({ "batch_size": 20 }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, json!({ "processed": 0 }));
        locked.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_batch_size_uses_the_default() {
        let mut server = Server::new_async().await;
        vault_key(&mut server).await;
        let locked = server
            .mock("POST", "/rest/v1/rpc/get_and_lock_campaign_messages")
            .match_body(Matcher::PartialJson(json!({ "p_batch_size": 5 })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/mark_old_campaign_messages_as_skipped")
            .with_status(200)
            .with_body("0")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request()
            .method("POST")
            .path("/")
            .json(&json!({ "batch_size": 500 }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        locked.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_key_is_fatal() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/decrypted_secrets")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "OpenRouter API key not configured");
        assert_eq!(body["error_code"], "FATAL_ERROR");
    }

    #[tokio::test]
    async fn test_paused_run_skips_its_messages() {
        let mut server = Server::new_async().await;
        vault_key(&mut server).await;
        locked_message(&mut server, None).await;
        run_status(&mut server, "paused").await;
        let skipped = server
            .mock("PATCH", "/rest/v1/campaign_messages")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.cm-1".into()))
            .match_body(Matcher::Json(json!({
                "status": "skipped",
                "error_message": "Campanha paused - mensagem cancelada antes do envio"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            body,
            json!({ "success": true, "processed": 0, "failed": 0, "paused": 1 })
        );
        skipped.assert_async().await;
    }

    #[tokio::test]
    async fn test_disconnected_instance_pauses_the_run() {
        let mut server = Server::new_async().await;
        vault_key(&mut server).await;
        locked_message(&mut server, None).await;
        run_status(&mut server, "running").await;
        server
            .mock("POST", "/rest/v1/rpc/check_campaign_instance_status")
            .match_body(Matcher::PartialJson(json!({ "p_inbox_id": "inbox-1" })))
            .with_status(200)
            .with_body(
                json!({ "connected": false, "status": "close", "instance_name": "loja" }).to_string(),
            )
            .create_async()
            .await;
        let paused = server
            .mock("PATCH", "/rest/v1/campaign_runs")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({
                "status": "paused",
                "error_message": "Instância desconectada: loja"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let unsent = server
            .mock("PATCH", "/rest/v1/campaign_messages")
            .match_query(Matcher::UrlEncoded(
                "status".into(),
                "in.(pending,queued,generating,sending)".into(),
            ))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["paused"], 1);
        assert_eq!(body["processed"], 0);
        paused.assert_async().await;
        unsent.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_generation_is_retried_later() {
        let mut server = Server::new_async().await;
        vault_key(&mut server).await;
        locked_message(&mut server, None).await;
        run_status(&mut server, "running").await;
        server
            .mock("POST", "/rest/v1/rpc/check_campaign_instance_status")
            .with_status(200)
            .with_body(json!({ "connected": true, "instance_name": "loja" }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/ai_agents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "model": "openai/gpt-4o-mini" }]).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/leads")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "client_name": "Padaria Pão Bom" }]).to_string())
            .create_async()
            .await;
        let generation = server
            .mock("POST", "/api/v1/chat/completions")
            .match_header("authorization", "Bearer or-key")
            .match_body(Matcher::PartialJson(json!({ "model": "openai/gpt-4o-mini" })))
            .with_status(402)
            .with_body("no credits")
            .create_async()
            .await;
        let retried = server
            .mock("PATCH", "/rest/v1/campaign_messages")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "status": "pending",
                "retry_count": 1,
                "error_message": "Retry 1/3: OpenRouter error: 402 - no credits"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            body,
            json!({ "success": true, "processed": 0, "failed": 0, "paused": 0 })
        );
        generation.assert_async().await;
        retried.assert_async().await;
    }

    #[tokio::test]
    async fn test_last_attempt_fails_the_message() {
        let mut server = Server::new_async().await;
        vault_key(&mut server).await;
        locked_message(&mut server, Some(2)).await;
        run_status(&mut server, "running").await;
        server
            .mock("POST", "/rest/v1/rpc/check_campaign_instance_status")
            .with_status(200)
            .with_body(json!({ "connected": true }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/ai_agents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "model": "openai/gpt-4o-mini" }]).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/leads")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "client_name": "Padaria Pão Bom" }]).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/api/v1/chat/completions")
            .with_status(200)
            .with_body(json!({ "choices": [{ "message": { "content": "Oi!" } }] }).to_string())
            .create_async()
            .await;
        let completed = server
            .mock("POST", "/rest/v1/rpc/complete_campaign_message_atomic")
            .match_body(Matcher::PartialJson(json!({
                "p_message_id": "cm-1",
                "p_success": false
            })))
            .with_status(200)
            .with_body(json!({ "success": true }).to_string())
            .create_async()
            .await;
        let failed = server
            .mock("PATCH", "/rest/v1/campaign_messages")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({
                "error_message": "Max retries (3) exceeded: AI generated invalid message (length: 3, min: 10)",
                "retry_count": 3
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["failed"], 1);
        completed.assert_async().await;
        failed.assert_async().await;
    }
}
