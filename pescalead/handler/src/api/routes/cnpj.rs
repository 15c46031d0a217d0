//! Route definitions for the company registry endpoints.
use std::collections::HashMap;

use warp::filters::BoxedFilter;
use warp::Filter;

use crate::api::handlers::cnpj::Lookup;
use crate::context::PescaleadContext;
use crate::rate_limit;

use super::handlers;

/// Rate limit bucket shared by the registry endpoints.
const RATE_LIMIT_PREFIX: &str = "cnpj-api";

/// Registry routes.
pub fn routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_health(context.clone())
        .or(get_filters(context.clone()))
        .or(get_cnaes(context.clone()))
        .or(search_companies(context.clone()))
        .or(get_stats(context.clone()))
        .or(post_stats(context.clone()))
        .or(get_cnpj(context.clone(), warp::path::end().boxed(), Lookup::Full))
        .or(get_cnpj(context.clone(), warp::path!("basico").boxed(), Lookup::Basic))
        .or(get_cnpj(context.clone(), warp::path!("socios").boxed(), Lookup::Partners))
        .or(get_cnpj(context, warp::path!("simples").boxed(), Lookup::Simples))
}

/// Company lookup endpoint, one per lookup variant.
fn get_cnpj(
    context: PescaleadContext,
    path: BoxedFilter<()>,
    lookup: Lookup,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let limiter = context.rate_limiter.clone();
    warp::any()
        .map(move || context.clone())
        .and(warp::any().map(move || lookup))
        .and(path)
        .and(warp::get())
        .and(rate_limit::limit(limiter, RATE_LIMIT_PREFIX))
        .and(warp::query())
        .then(handlers::cnpj::get_cnpj)
}

/// Registry health endpoint.
fn get_health(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("health"))
        .and(warp::get())
        .then(handlers::cnpj::get_health)
}

/// Filter catalog endpoint.
fn get_filters(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("filters")
        .and(warp::get())
        .and(rate_limit::limit(context.rate_limiter, RATE_LIMIT_PREFIX))
        .then(handlers::cnpj::get_filters)
}

/// CNAE listing endpoint.
fn get_cnaes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let limiter = context.rate_limiter.clone();
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("cnaes"))
        .and(warp::get())
        .and(rate_limit::limit(limiter, RATE_LIMIT_PREFIX))
        .and(warp::query())
        .then(handlers::cnpj::get_cnaes)
}

/// Search endpoint. The body is read raw so authentication runs before
/// the JSON is parsed.
fn search_companies(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let limiter = context.rate_limiter.clone();
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("search"))
        .and(warp::post())
        .and(rate_limit::limit(limiter, RATE_LIMIT_PREFIX))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .then(handlers::cnpj::search_companies)
}

/// Stats preview endpoint with query parameters.
fn get_stats(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let limiter = context.rate_limiter.clone();
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("stats"))
        .and(warp::get())
        .and(rate_limit::limit(limiter, RATE_LIMIT_PREFIX))
        .and(warp::header::headers_cloned())
        .and(warp::query::<HashMap<String, String>>())
        .then(handlers::cnpj::get_stats)
}

/// Stats preview endpoint with a filters body.
fn post_stats(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let limiter = context.rate_limiter.clone();
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("stats"))
        .and(warp::post())
        .and(rate_limit::limit(limiter, RATE_LIMIT_PREFIX))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .then(handlers::cnpj::post_stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::handle_rejection;
    use crate::context::{testing, PescaleadContext};
    use warp::http::StatusCode;
    use warp::test::request;

    #[tokio::test]
    async fn test_health_without_registry_is_unavailable() {
        let api = get_health(testing::context("http://127.0.0.1:9"));

        let res = request().method("GET").path("/health").reply(&api).await;

        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["database"], "disconnected");
    }

    #[tokio::test]
    async fn test_get_filters() {
        let api = get_filters(testing::context("http://127.0.0.1:9"));

        let res = request()
            .method("GET")
            .path("/filters")
            .header("x-forwarded-for", "10.0.0.1")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-ratelimit-remaining"));
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_lookup_without_cnpj_is_bad_request() {
        let api = routes(testing::context("http://127.0.0.1:9"));

        let res = request().method("GET").path("/basico").reply(&api).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "CNPJ is required");
    }

    #[tokio::test]
    async fn test_search_requires_authentication() {
        let api = routes(testing::context("http://127.0.0.1:9"));

        let res = request()
            .method("POST")
            .path("/search")
            .body("{not json")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_internal_search_without_registry_is_unavailable() {
        let api = routes(testing::context("http://127.0.0.1:9"));

        let res = request()
            .method("POST")
            .path("/search")
            .header("apikey", testing::SERVICE_KEY)
            .json(&serde_json::json!({ "filters": { "uf": ["SP"] } }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_over_budget_clients_are_refused() {
        let mut settings = testing::settings("http://127.0.0.1:9");
        settings.rate_limit.max_requests = 1;
        let context = PescaleadContext::from_settings(settings).unwrap();
        let api = get_filters(context).recover(handle_rejection);

        let first = request()
            .method("GET")
            .path("/filters")
            .header("x-forwarded-for", "10.0.0.2")
            .reply(&api)
            .await;
        let second = request()
            .method("GET")
            .path("/filters")
            .header("x-forwarded-for", "10.0.0.2")
            .reply(&api)
            .await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
    }
}
