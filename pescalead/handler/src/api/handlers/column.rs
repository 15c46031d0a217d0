//! Handlers for column endpoints.
use tracing::{debug, instrument};
use warp::http::StatusCode;
use warp::reply::{json, with_status, Reply};

use crate::api::models::kanban::responses::{ColumnResponse, GetColumnsResponse};
use crate::auth;
use crate::common::error::Error;
use crate::context::PescaleadContext;
use crate::database::accessors;
use crate::kanban::mapper;

/// Get columns handler.
#[utoipa::path(
    get,
    operation_id = "getColumns",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/columns",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
    ),
    tag = "column",
    responses(
        (status = 200, description = "Columns retrieved successfully", body = GetColumnsResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn get_columns(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In get columns");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let columns = accessors::get_column_entries(&context.db, &funnel_id)
            .await?
            .into_iter()
            .map(|column| mapper::map_column(column, &funnel_id))
            .collect();

        Ok(with_status(
            json(&GetColumnsResponse { columns }),
            StatusCode::OK,
        ))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Get column handler.
#[utoipa::path(
    get,
    operation_id = "getColumn",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/columns/{columnId}",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
        ("columnId" = String, Path, description = "Column id."),
    ),
    tag = "column",
    responses(
        (status = 200, description = "Column retrieved successfully", body = ColumnResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 404, description = "Column not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn get_column(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    column_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In get column");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        column_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let column = accessors::get_column_entry(&context.db, &funnel_id, &column_id)
            .await?
            .map(|column| mapper::map_column(column, &funnel_id))
            .ok_or_else(|| Error::NotFound("Column not found".to_string()))?;

        Ok(with_status(json(&ColumnResponse { column }), StatusCode::OK))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, column_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}
