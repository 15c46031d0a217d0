//! Handlers for funnel endpoints.
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};
use warp::http::StatusCode;
use warp::reply::{json, with_status, Reply};

use crate::api::models::kanban::requests::{CreateFunnelRequestBody, UpdateFunnelRequestBody};
use crate::api::models::kanban::responses::{FunnelResponse, GetFunnelsResponse, SuccessResponse};
use crate::auth;
use crate::common::error::Error;
use crate::context::PescaleadContext;
use crate::database::accessors;
use crate::database::entries::kanban::{
    FunnelStatsEntry, NewColumnEntry, NewFunnelEntry, NewFunnelStatsEntry,
};
use crate::database::postgrest::PostgrestClient;
use crate::kanban::columns::ColumnPlan;
use crate::kanban::{mapper, DEFAULT_COLUMNS};

fn funnel_not_found() -> Error {
    Error::NotFound("Funnel not found".to_string())
}

/// Get funnels handler.
#[utoipa::path(
    get,
    operation_id = "getFunnels",
    path = "/kanban-api/workspaces/{workspaceId}/funnels",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
    ),
    tag = "funnel",
    responses(
        (status = 200, description = "Funnels retrieved successfully", body = GetFunnelsResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn get_funnels(
    context: PescaleadContext,
    workspace_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In get funnels");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let funnels = accessors::get_funnel_entries(&context.db, &workspace_id)
            .await?
            .into_iter()
            .map(mapper::map_funnel)
            .collect();

        Ok(with_status(
            json(&GetFunnelsResponse { funnels }),
            StatusCode::OK,
        ))
    }

    // Handle and respond.
    handler(context, workspace_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Get funnel handler.
#[utoipa::path(
    get,
    operation_id = "getFunnel",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
    ),
    tag = "funnel",
    responses(
        (status = 200, description = "Funnel retrieved successfully", body = FunnelResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 404, description = "Funnel not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn get_funnel(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In get funnel");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let funnel = accessors::get_funnel_entry(&context.db, &workspace_id, &funnel_id)
            .await?
            .map(mapper::map_funnel)
            .ok_or_else(funnel_not_found)?;

        Ok(with_status(json(&FunnelResponse { funnel }), StatusCode::OK))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Create funnel handler. New funnels get the default columns and a zeroed
/// stats row.
#[utoipa::path(
    post,
    operation_id = "createFunnel",
    path = "/kanban-api/workspaces/{workspaceId}/funnels",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
    ),
    tag = "funnel",
    request_body = CreateFunnelRequestBody,
    responses(
        (status = 200, description = "Funnel created successfully", body = FunnelResponse),
        (status = 400, description = "Missing name", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn create_funnel(
    context: PescaleadContext,
    workspace_id: String,
    authorization: Option<String>,
    body: CreateFunnelRequestBody,
) -> impl warp::reply::Reply {
    debug!("In create funnel");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        authorization: Option<String>,
        body: CreateFunnelRequestBody,
    ) -> Result<impl warp::reply::Reply, Error> {
        let access =
            auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;
        let name = body
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| Error::BadRequest("name is required".to_string()))?;

        let db = &context.db;
        let position = accessors::next_funnel_position(db, &workspace_id).await?;
        let mut funnel = accessors::add_funnel_entry(
            db,
            &NewFunnelEntry {
                workspace_id: &workspace_id,
                name: &name,
                description: body.description.as_deref(),
                is_active: true,
                position,
                created_by: &access.user.id,
            },
        )
        .await?;

        let columns: Vec<NewColumnEntry> = DEFAULT_COLUMNS
            .iter()
            .zip(0..)
            .map(|(title, position)| NewColumnEntry {
                funnel_id: &funnel.id,
                title,
                position,
            })
            .collect();
        let columns = accessors::add_column_entries(db, &columns).await?;

        accessors::add_funnel_stats_entry(
            db,
            &NewFunnelStatsEntry {
                funnel_id: &funnel.id,
                workspace_id: &workspace_id,
                stats: FunnelStatsEntry::default(),
            },
        )
        .await?;
        info!(funnel_id = funnel.id, "funnel created");

        funnel.funnel_columns = columns;
        let funnel = mapper::map_funnel(funnel);
        Ok(with_status(json(&FunnelResponse { funnel }), StatusCode::OK))
    }

    // Handle and respond.
    handler(context, workspace_id, authorization, body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Update funnel handler. When `columns` is sent it is the full list the
/// funnel should end up with; columns still holding active leads cannot be
/// removed.
#[utoipa::path(
    put,
    operation_id = "updateFunnel",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
    ),
    tag = "funnel",
    request_body = UpdateFunnelRequestBody,
    responses(
        (status = 200, description = "Funnel updated successfully", body = FunnelResponse),
        (status = 400, description = "A removed column still has leads", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 404, description = "Funnel not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn update_funnel(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
    body: UpdateFunnelRequestBody,
) -> impl warp::reply::Reply {
    debug!("In update funnel");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
        body: UpdateFunnelRequestBody,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;
        let db = &context.db;

        let details = funnel_details(&body);
        if !details.is_empty() {
            accessors::set_funnel_details(db, &workspace_id, &funnel_id, &Value::Object(details))
                .await?;
        }

        if let Some(columns) = body.columns.as_deref().filter(|c| !c.is_empty()) {
            sync_columns(db, &funnel_id, columns).await?;
        }

        let funnel = accessors::get_funnel_entry(db, &workspace_id, &funnel_id)
            .await?
            .map(mapper::map_funnel)
            .ok_or_else(funnel_not_found)?;

        Ok(with_status(json(&FunnelResponse { funnel }), StatusCode::OK))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization, body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Delete funnel handler. Funnels are deactivated, not removed.
#[utoipa::path(
    delete,
    operation_id = "deleteFunnel",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
    ),
    tag = "funnel",
    responses(
        (status = 200, description = "Funnel deactivated", body = SuccessResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn delete_funnel(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In delete funnel");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;
        accessors::deactivate_funnel(&context.db, &workspace_id, &funnel_id).await?;
        info!(funnel_id, "funnel deactivated");

        Ok(with_status(
            json(&SuccessResponse { success: true }),
            StatusCode::OK,
        ))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// The non-empty name and description of an update.
fn funnel_details(body: &UpdateFunnelRequestBody) -> Map<String, Value> {
    let mut details = Map::new();
    for (key, value) in [("name", &body.name), ("description", &body.description)] {
        if let Some(value) = value.as_ref().filter(|value| !value.is_empty()) {
            details.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    details
}

/// Bring the columns of a funnel in line with `wanted`. Every removal is
/// checked before anything is written.
async fn sync_columns(
    db: &PostgrestClient,
    funnel_id: &str,
    wanted: &[crate::api::models::kanban::requests::ColumnUpdate],
) -> Result<(), Error> {
    let existing = accessors::get_column_entries(db, funnel_id).await?;
    let plan = ColumnPlan::new(&existing, wanted);

    for column_id in &plan.delete {
        let count = accessors::count_column_leads(db, funnel_id, column_id).await?;
        if count > 0 {
            return Err(Error::BadRequest(format!(
                "Não é possível deletar coluna com {count} lead(s). Mova os leads antes de deletar."
            )));
        }
    }

    if !plan.delete.is_empty() {
        accessors::delete_column_entries(db, &plan.delete).await?;
    }
    for column in &plan.update {
        accessors::set_column_entry(db, funnel_id, &column.id, &column.title, column.position)
            .await?;
    }
    if !plan.insert.is_empty() {
        let inserts: Vec<NewColumnEntry> = plan
            .insert
            .iter()
            .map(|column| NewColumnEntry {
                funnel_id,
                title: &column.title,
                position: column.position,
            })
            .collect();
        accessors::add_column_entries(db, &inserts).await?;
    }

    debug!(
        deleted = plan.delete.len(),
        updated = plan.update.len(),
        inserted = plan.insert.len(),
        "columns synchronized"
    );
    Ok(())
}
