//! Route definitions for the kanban endpoints.
//!
//! Paths are relative to the `kanban-api` prefix added by the parent module.
use warp::Filter;

use crate::context::PescaleadContext;

use super::handlers;

/// Kanban routes.
pub fn routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_health()
        .or(funnel_routes(context.clone()))
        .or(column_routes(context.clone()))
        .or(lead_routes(context.clone()))
        .or(stats_routes(context))
}

fn funnel_routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_funnels(context.clone())
        .or(get_funnel(context.clone()))
        .or(create_funnel(context.clone()))
        .or(update_funnel(context.clone()))
        .or(delete_funnel(context))
}

fn column_routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_columns(context.clone())
        .or(get_column(context.clone()))
        .or(get_column_leads(context.clone()))
        .or(get_lead_column_page(context))
}

fn lead_routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_funnel_leads(context.clone())
        .or(get_lead(context.clone()))
        .or(create_lead(context.clone()))
        .or(batch_move_leads(context.clone()))
        .or(update_lead(context.clone()))
        .or(move_lead(context.clone()))
        .or(delete_lead(context))
}

fn stats_routes(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_funnel_stats(context.clone()).or(recalculate_funnel_stats(context))
}

/// Health endpoint.
fn get_health() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("health")
        .and(warp::get())
        .then(handlers::health::get_kanban_health)
}

/// Get funnels endpoint.
fn get_funnels(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels"))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::funnel::get_funnels)
}

/// Get funnel endpoint.
fn get_funnel(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::funnel::get_funnel)
}

/// Create funnel endpoint.
fn create_funnel(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels"))
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .then(handlers::funnel::create_funnel)
}

/// Update funnel endpoint.
fn update_funnel(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String))
        .and(warp::put())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .then(handlers::funnel::update_funnel)
}

/// Delete funnel endpoint.
fn delete_funnel(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String))
        .and(warp::delete())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::funnel::delete_funnel)
}

/// Get columns endpoint.
fn get_columns(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String / "columns"))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::column::get_columns)
}

/// Get column endpoint.
fn get_column(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String / "columns" / String))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::column::get_column)
}

/// Get column leads endpoint.
fn get_column_leads(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!(
            "workspaces" / String / "funnels" / String / "columns" / String / "leads"
        ))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::query())
        .then(handlers::lead::get_column_leads)
}

/// Column page endpoint, reachable from the leads collection as well.
fn get_lead_column_page(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!(
            "workspaces" / String / "funnels" / String / "leads" / "columns" / String / "leads"
        ))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::query())
        .then(handlers::lead::get_column_leads)
}

/// Get funnel leads endpoint.
fn get_funnel_leads(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String / "leads"))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::query())
        .then(handlers::lead::get_funnel_leads)
}

/// Get lead endpoint.
fn get_lead(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String / "leads" / String))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::lead::get_lead)
}

/// Create lead endpoint.
fn create_lead(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String / "leads"))
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .then(handlers::lead::create_lead)
}

/// Batch move endpoint.
fn batch_move_leads(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!(
            "workspaces" / String / "funnels" / String / "leads" / "batch-move"
        ))
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .then(handlers::lead::batch_move_leads)
}

/// Update lead endpoint.
fn update_lead(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String / "leads" / String))
        .and(warp::put())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .then(handlers::lead::update_lead)
}

/// Move lead endpoint.
fn move_lead(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!(
            "workspaces" / String / "funnels" / String / "leads" / String / "move"
        ))
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .then(handlers::lead::move_lead)
}

/// Delete lead endpoint.
fn delete_lead(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String / "leads" / String))
        .and(warp::delete())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::lead::delete_lead)
}

/// Get funnel stats endpoint.
fn get_funnel_stats(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("workspaces" / String / "funnels" / String / "stats"))
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::stats::get_funnel_stats)
}

/// Recalculate funnel stats endpoint.
fn recalculate_funnel_stats(
    context: PescaleadContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!(
            "workspaces" / String / "funnels" / String / "stats" / "recalculate"
        ))
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .then(handlers::stats::recalculate_funnel_stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing;
    use warp::http::StatusCode;
    use warp::test::request;

    const WORKSPACE: &str = "3f2b1c4d-5e6f-4a7b-8c9d-0e1f2a3b4c5d";

    #[tokio::test]
    async fn test_get_health() {
        let api = get_health();

        let res = request().method("GET").path("/health").reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["service"], "kanban-api");
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let server = mockito::Server::new_async().await;
        let api = routes(testing::context(&server.url()));

        let res = request()
            .method("GET")
            .path(&format!("/workspaces/{WORKSPACE}/funnels"))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Unauthorized - Missing token");
    }

    #[tokio::test]
    async fn test_move_lead_requires_token() {
        let server = mockito::Server::new_async().await;
        let api = routes(testing::context(&server.url()));

        let res = request()
            .method("POST")
            .path(&format!("/workspaces/{WORKSPACE}/funnels/f1/leads/l1/move"))
            .json(&serde_json::json!({ "toColumnId": "c2", "toPosition": 0 }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_path_is_rejected() {
        let server = mockito::Server::new_async().await;
        let api = routes(testing::context(&server.url()));

        let res = request()
            .method("GET")
            .path(&format!("/workspaces/{WORKSPACE}/boards"))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
