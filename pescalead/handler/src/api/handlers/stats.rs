//! Handlers for funnel statistics endpoints.
use tracing::{debug, info, instrument};
use warp::http::StatusCode;
use warp::reply::{json, with_status, Reply};

use crate::api::models::kanban::responses::FunnelStatsResponse;
use crate::api::models::kanban::FunnelStats;
use crate::auth;
use crate::common::error::Error;
use crate::context::PescaleadContext;
use crate::database::accessors;
use crate::database::entries::kanban::FunnelStatsEntry;
use crate::database::postgrest::PostgrestClient;
use crate::kanban::stats;

/// Get funnel stats handler. Always computed from the active leads.
#[utoipa::path(
    get,
    operation_id = "getFunnelStats",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/stats",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
    ),
    tag = "stats",
    responses(
        (status = 200, description = "Statistics computed successfully", body = FunnelStatsResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn get_funnel_stats(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In get funnel stats");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;
        let (stats, _) = compute_stats(&context.db, &workspace_id, &funnel_id).await?;
        Ok(with_status(
            json(&FunnelStatsResponse { stats }),
            StatusCode::OK,
        ))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Recalculate funnel stats handler. Overwrites the stored counters.
#[utoipa::path(
    post,
    operation_id = "recalculateFunnelStats",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/stats/recalculate",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
    ),
    tag = "stats",
    responses(
        (status = 200, description = "Statistics recalculated successfully", body = FunnelStatsResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn recalculate_funnel_stats(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In recalculate funnel stats");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;
        let db = &context.db;

        let (stats, entry) = compute_stats(db, &workspace_id, &funnel_id).await?;
        accessors::set_funnel_stats_entry(db, &workspace_id, &funnel_id, &entry).await?;
        info!(funnel_id, total_leads = stats.total_leads, "funnel stats recalculated");

        Ok(with_status(
            json(&FunnelStatsResponse { stats }),
            StatusCode::OK,
        ))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

async fn compute_stats(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
) -> Result<(FunnelStats, FunnelStatsEntry), Error> {
    let (columns, leads) = futures::try_join!(
        accessors::get_column_entries(db, funnel_id),
        accessors::get_funnel_lead_values(db, workspace_id, funnel_id),
    )?;
    Ok(stats::compute(&columns, &leads))
}
