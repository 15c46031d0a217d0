//! Route definitions for the follow-up queue processor.
use warp::Filter;

use crate::context::PescaleadContext;

use super::handlers;

/// Follow-up queue routes, relative to `process-follow-up-queue`.
pub fn routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path::end())
        .and(warp::post())
        .then(handlers::follow_up::process_follow_up_queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;
    use warp::http::StatusCode;
    use warp::test::request;

    async fn ready_job(server: &mut ServerGuard, category_id: Option<&str>) {
        server
            .mock("POST", "/rest/v1/rpc/get_ready_follow_up_jobs")
            .match_body(Matcher::Json(json!({ "p_limit": 10 })))
            .with_status(200)
            .with_body(
                json!([{
                    "job_id": "job-1",
                    "conversation_id": "conv-1",
                    "workspace_id": "ws-1",
                    "trigger_message_id": "msg-0",
                    "category_id": category_id,
                    "current_model_index": 0
                }])
                .to_string(),
            )
            .create_async()
            .await;
    }

    async fn valid(server: &mut ServerGuard) {
        server
            .mock("POST", "/rest/v1/rpc/validate_follow_up_execution")
            .match_body(Matcher::Json(json!({ "p_job_id": "job-1" })))
            .with_status(200)
            .with_body(json!({ "valid": true }).to_string())
            .create_async()
            .await;
    }

    async fn body_of(res: warp::http::Response<warp::hyper::body::Bytes>) -> serde_json::Value {
        assert_eq!(res.status(), StatusCode::OK);
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn test_no_jobs_ready() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/get_ready_follow_up_jobs")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        let body = body_of(res).await;
        assert_eq!(body["processed"], 0);
        assert_eq!(body["message"], "No jobs ready");
    }

    #[tokio::test]
    async fn test_unreadable_jobs_are_fatal() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/get_ready_follow_up_jobs")
            .with_status(500)
            .with_body(json!({ "message": "function missing" }).to_string())
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "function missing");
        assert!(body.get("duration_ms").is_some());
    }

    #[tokio::test]
    async fn test_invalid_job_is_skipped() {
        let mut server = Server::new_async().await;
        ready_job(&mut server, Some("cat-1")).await;
        server
            .mock("POST", "/rest/v1/rpc/validate_follow_up_execution")
            .with_status(200)
            .with_body(json!({ "valid": false, "reason": "customer_replied" }).to_string())
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        let body = body_of(res).await;
        assert_eq!(body["processed"], 1);
        assert_eq!(body["skipped"], 1);
        assert_eq!(
            body["results"][0],
            json!({ "job_id": "job-1", "status": "skipped", "reason": "customer_replied" })
        );
    }

    #[tokio::test]
    async fn test_business_hours_category_waits() {
        let mut server = Server::new_async().await;
        ready_job(&mut server, Some("cat-1")).await;
        valid(&mut server).await;
        server
            .mock("GET", "/rest/v1/follow_up_categories")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.cat-1".into()),
                Matcher::UrlEncoded("workspace_id".into(), "eq.ws-1".into()),
            ]))
            .with_status(200)
            .with_body(
                json!([{ "id": "cat-1", "name": "Orçamento", "availability": "business_hours" }])
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/is_business_hours")
            .with_status(200)
            .with_body("false")
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/next_business_hour")
            .with_status(200)
            .with_body("\"2024-05-13T11:00:00+00:00\"")
            .create_async()
            .await;
        let moved = server
            .mock("PATCH", "/rest/v1/follow_up_jobs")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.job-1".into()))
            .match_body(Matcher::PartialJson(json!({
                "next_execution_at": "2024-05-13T11:00:00+00:00"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        let body = body_of(res).await;
        assert_eq!(body["skipped"], 1);
        assert_eq!(body["results"][0]["status"], "rescheduled");
        assert_eq!(body["results"][0]["reason"], "outside_business_hours");
        assert_eq!(body["results"][0]["next_execution"], "2024-05-13T11:00:00+00:00");
        moved.assert_async().await;
    }

    #[tokio::test]
    async fn test_single_category_is_picked_without_a_model() {
        let mut server = Server::new_async().await;
        ready_job(&mut server, None).await;
        valid(&mut server).await;
        server
            .mock("GET", "/rest/v1/ai_follow_up_config")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/follow_up_categories")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!([{ "id": "cat-1", "name": "Orçamento", "availability": "always" }]).to_string(),
            )
            .create_async()
            .await;
        let chosen = server
            .mock("PATCH", "/rest/v1/follow_up_jobs")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "category_id": "cat-1",
                "ai_decision_log": { "skipped": true, "reason": "single_category" }
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/get_next_follow_up_model")
            .match_body(Matcher::PartialJson(json!({
                "p_category_id": "cat-1",
                "p_current_index": 0,
                "p_workspace_id": "ws-1"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let completed = server
            .mock("PATCH", "/rest/v1/follow_up_jobs")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "status": "completed",
                "cancel_reason": "Todos os modelos enviados"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let completions = server
            .mock("POST", "/api/v1/chat/completions")
            .expect(0)
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        let body = body_of(res).await;
        assert_eq!(body["sent"], 1);
        assert_eq!(
            body["results"][0],
            json!({
                "job_id": "job-1",
                "status": "completed",
                "reason": "no_more_models",
                "category": "Orçamento"
            })
        );
        chosen.assert_async().await;
        completed.assert_async().await;
        completions.assert_async().await;
    }

    #[tokio::test]
    async fn test_workspace_without_categories_is_an_error() {
        let mut server = Server::new_async().await;
        ready_job(&mut server, None).await;
        valid(&mut server).await;
        server
            .mock("GET", "/rest/v1/ai_follow_up_config")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/follow_up_categories")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let api = routes(testing::context(&server.url()));

        let res = request().method("POST").path("/").reply(&api).await;

        let body = body_of(res).await;
        assert_eq!(body["errors"], 1);
        assert_eq!(
            body["results"][0],
            json!({
                "job_id": "job-1",
                "status": "error",
                "error": "No category available for this workspace"
            })
        );
    }
}
