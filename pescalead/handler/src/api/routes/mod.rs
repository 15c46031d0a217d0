//! Route definitions for the PescaLead API.
//!
//! Every function is mounted under its own prefix with the CORS policy of
//! its callers: the web app for the kanban and registry endpoints, any
//! origin for the webhook receiver and the queue workers, and the admin
//! origins for the internal sender.

use crate::context::PescaleadContext;
use crate::cors;

use super::handlers;
use warp::Filter;

/// Campaign queue routes.
mod campaign;
/// Company registry routes.
mod cnpj;
/// Follow-up queue routes.
mod follow_up;
/// Kanban routes.
mod kanban;
/// AI message sender routes.
mod messaging;
/// AI pipeline routes.
mod pipeline;

/// This function sets up the Warp filters for handling all requests.
pub fn routes(
    context: PescaleadContext,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let policy = context.settings.cors.clone();
    warp::path("kanban-api")
        .and(kanban::routes(context.clone()).with(cors::authenticated(&policy)))
        .or(warp::path("cnpj-api").and(cnpj::routes(context.clone()).with(cors::authenticated(&policy))))
        .or(warp::path("ai-webhook-receiver")
            .and(pipeline::receiver_routes(context.clone()).with(cors::public())))
        .or(warp::path("ai-process-queue")
            .and(pipeline::queue_routes(context.clone()).with(cors::public())))
        .or(warp::path("campaign-process-queue")
            .and(campaign::routes(context.clone()).with(cors::public())))
        .or(warp::path("process-follow-up-queue")
            .and(follow_up::routes(context.clone()).with(cors::public())))
        .or(warp::path("internal-send-ai-message")
            .and(messaging::routes(context).with(cors::admin(&policy))))
        // Convert reply to tuple to that more routes can be added to the returned filter.
        .map(|reply| (reply,))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing;
    use warp::http::StatusCode;
    use warp::test::request;

    #[tokio::test]
    async fn test_prefixed_health() {
        let api = routes(testing::context("http://127.0.0.1:9")).recover(handlers::handle_rejection);

        let res = request().method("GET").path("/kanban-api/health").reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_function_is_not_found() {
        let api = routes(testing::context("http://127.0.0.1:9")).recover(handlers::handle_rejection);

        let res = request().method("GET").path("/make-coffee").reply(&api).await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Route not found");
    }

    #[tokio::test]
    async fn test_preflight_from_the_web_app() {
        let api = routes(testing::context("http://127.0.0.1:9")).recover(handlers::handle_rejection);

        let res = request()
            .method("OPTIONS")
            .path("/kanban-api/health")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "GET")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn test_preflight_from_unknown_origin_is_forbidden() {
        let api = routes(testing::context("http://127.0.0.1:9")).recover(handlers::handle_rejection);

        let res = request()
            .method("OPTIONS")
            .path("/kanban-api/health")
            .header("origin", "https://evil.example")
            .header("access-control-request-method", "GET")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
