//! Handlers for lead endpoints.
use std::collections::BTreeMap;

use futures::future::try_join_all;
use tracing::{debug, instrument, warn};
use warp::http::StatusCode;
use warp::reply::{json, with_status, Reply};

use crate::api::models::kanban::requests::{
    page_offset, page_size, BatchMoveRequestBody, ColumnLeadsQuery, CreateLeadRequestBody,
    FunnelLeadsQuery, LeadFilters, MoveLeadRequestBody, UpdateLeadRequestBody,
};
use crate::api::models::kanban::responses::{
    BatchMoveResponse, BatchMoveResult, GetFunnelLeadsResponse, GetLeadsResponse, LeadResponse,
    SuccessResponse,
};
use crate::api::models::kanban::Lead;
use crate::auth;
use crate::common::error::Error;
use crate::common::now_rfc3339;
use crate::context::PescaleadContext;
use crate::database::accessors;
use crate::database::entries::kanban::{
    FunnelStatsEntry, LeadEntry, LeadMoveUpdate, LeadUpdate, NewLeadEntry,
};
use crate::database::postgrest::PostgrestClient;
use crate::kanban::{filters, mapper, stats, UNNAMED_CLIENT};

fn lead_not_found() -> Error {
    Error::NotFound("Lead not found".to_string())
}

/// Get the first page of every column of a funnel.
#[utoipa::path(
    get,
    operation_id = "getFunnelLeads",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/leads",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
        ("limit" = Option<u64>, Query, description = "Leads per column, default 10, at most 100."),
        ("hasEmail" = Option<bool>, Query, description = "Only leads with an email."),
        ("hasWhatsapp" = Option<bool>, Query, description = "Only leads with WhatsApp."),
        ("searchQuery" = Option<String>, Query, description = "Client name or company search."),
    ),
    tag = "lead",
    responses(
        (status = 200, description = "Leads retrieved successfully", body = GetFunnelLeadsResponse),
        (status = 400, description = "Invalid filters", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn get_funnel_leads(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
    query: FunnelLeadsQuery,
) -> impl warp::reply::Reply {
    debug!("In get funnel leads");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
        query: FunnelLeadsQuery,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let lead_filters = query.filters();
        filters::validate(&lead_filters)?;
        let limit = page_size(query.limit.as_deref());

        let columns = accessors::get_column_entries(&context.db, &funnel_id).await?;
        let pages = try_join_all(columns.iter().map(|column| {
            load_column_page(
                &context.db,
                &workspace_id,
                &funnel_id,
                &column.id,
                &lead_filters,
                limit,
                0,
            )
        }))
        .await?;

        let columns: BTreeMap<String, GetLeadsResponse> = columns
            .into_iter()
            .map(|column| column.id)
            .zip(pages)
            .collect();
        debug!(columns = columns.len(), "loaded initial leads");

        Ok(with_status(
            json(&GetFunnelLeadsResponse { columns }),
            StatusCode::OK,
        ))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization, query)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Get a page of the leads of one column.
#[utoipa::path(
    get,
    operation_id = "getColumnLeads",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/columns/{columnId}/leads",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
        ("columnId" = String, Path, description = "Column id."),
        ("limit" = Option<u64>, Query, description = "Page size, default 10, at most 100."),
        ("offset" = Option<u64>, Query, description = "Leads to skip."),
        ("hasEmail" = Option<bool>, Query, description = "Only leads with an email."),
        ("hasWhatsapp" = Option<bool>, Query, description = "Only leads with WhatsApp."),
        ("searchQuery" = Option<String>, Query, description = "Client name or company search."),
        ("priority" = Option<String>, Query, description = "high, medium or low."),
        ("assigneeId" = Option<String>, Query, description = "Assigned user."),
        ("tags" = Option<String>, Query, description = "Comma separated tags."),
    ),
    tag = "lead",
    responses(
        (status = 200, description = "Leads retrieved successfully", body = GetLeadsResponse),
        (status = 400, description = "Invalid filters", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn get_column_leads(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    column_id: String,
    authorization: Option<String>,
    query: ColumnLeadsQuery,
) -> impl warp::reply::Reply {
    debug!("In get column leads");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        column_id: String,
        authorization: Option<String>,
        query: ColumnLeadsQuery,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let page = load_column_page(
            &context.db,
            &workspace_id,
            &funnel_id,
            &column_id,
            &query.filters(),
            page_size(query.limit.as_deref()),
            page_offset(query.offset.as_deref()),
        )
        .await?;

        Ok(with_status(json(&page), StatusCode::OK))
    }

    // Handle and respond.
    handler(
        context,
        workspace_id,
        funnel_id,
        column_id,
        authorization,
        query,
    )
    .await
    .map_or_else(Reply::into_response, Reply::into_response)
}

/// Get lead handler.
#[utoipa::path(
    get,
    operation_id = "getLead",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/leads/{leadId}",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
        ("leadId" = String, Path, description = "Lead id."),
    ),
    tag = "lead",
    responses(
        (status = 200, description = "Lead retrieved successfully", body = LeadResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 404, description = "Lead not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn get_lead(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    lead_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In get lead");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        lead_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let entry = accessors::get_lead_entry(&context.db, &workspace_id, &lead_id)
            .await?
            .ok_or_else(lead_not_found)?;
        let lead = map_one(&context.db, entry).await;

        Ok(with_status(json(&LeadResponse { lead }), StatusCode::OK))
    }

    // Handle and respond.
    handler(context, workspace_id, lead_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Create lead handler.
#[utoipa::path(
    post,
    operation_id = "createLead",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/leads",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
    ),
    tag = "lead",
    request_body = CreateLeadRequestBody,
    responses(
        (status = 200, description = "Lead created successfully", body = LeadResponse),
        (status = 400, description = "Missing client name or column", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization, body))]
pub async fn create_lead(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
    body: CreateLeadRequestBody,
) -> impl warp::reply::Reply {
    debug!("In create lead");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
        body: CreateLeadRequestBody,
    ) -> Result<impl warp::reply::Reply, Error> {
        let access =
            auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let has_name = body.client_name.as_deref().is_some_and(|n| !n.is_empty());
        let column_id = match body.column_id.clone().filter(|id| !id.is_empty()) {
            Some(column_id) if has_name => column_id,
            _ => {
                return Err(Error::BadRequest(
                    "clientName and column_id are required".to_string(),
                ))
            }
        };

        let position =
            accessors::next_lead_position(&context.db, &workspace_id, &funnel_id, &column_id)
                .await?;
        let entry = new_lead_entry(
            body,
            &workspace_id,
            &funnel_id,
            column_id,
            position,
            &access.user.id,
        );
        let created = accessors::add_lead_entry(&context.db, &entry).await?;
        debug!(lead_id = created.id, "lead created");

        adjust_stats(&context.db, &workspace_id, &funnel_id, |counters| {
            stats::on_create(
                counters,
                &entry.column_id,
                entry.deal_value,
                Some(&entry.priority),
            )
        })
        .await;

        let lead = map_one(&context.db, created).await;
        Ok(with_status(json(&LeadResponse { lead }), StatusCode::OK))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization, body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Update lead handler.
#[utoipa::path(
    put,
    operation_id = "updateLead",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/leads/{leadId}",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
        ("leadId" = String, Path, description = "Lead id."),
    ),
    tag = "lead",
    request_body = UpdateLeadRequestBody,
    responses(
        (status = 200, description = "Lead updated successfully", body = LeadResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 404, description = "Lead not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization, body))]
pub async fn update_lead(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    lead_id: String,
    authorization: Option<String>,
    body: UpdateLeadRequestBody,
) -> impl warp::reply::Reply {
    debug!("In update lead");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        lead_id: String,
        authorization: Option<String>,
        body: UpdateLeadRequestBody,
    ) -> Result<impl warp::reply::Reply, Error> {
        let access =
            auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let existing = accessors::get_lead_entry(&context.db, &workspace_id, &lead_id)
            .await?
            .ok_or_else(lead_not_found)?;
        let update = lead_update(body, &access.user.id);
        let updated =
            accessors::set_lead_entry(&context.db, &workspace_id, &lead_id, &update).await?;

        let values = (
            existing.deal_value.unwrap_or_default(),
            updated.deal_value.unwrap_or_default(),
        );
        let priorities = (existing.priority.as_deref(), updated.priority.as_deref());
        if values.0 != values.1 || priorities.0 != priorities.1 {
            if let Some(column_id) = updated.column_id.as_deref() {
                let funnel_id = existing.funnel_id.as_deref().unwrap_or(&funnel_id);
                adjust_stats(&context.db, &workspace_id, funnel_id, |counters| {
                    stats::on_update(counters, column_id, values, priorities)
                })
                .await;
            }
        }

        let lead = map_one(&context.db, updated).await;
        Ok(with_status(json(&LeadResponse { lead }), StatusCode::OK))
    }

    // Handle and respond.
    handler(
        context,
        workspace_id,
        funnel_id,
        lead_id,
        authorization,
        body,
    )
    .await
    .map_or_else(Reply::into_response, Reply::into_response)
}

/// Move lead handler.
#[utoipa::path(
    post,
    operation_id = "moveLead",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/leads/{leadId}/move",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
        ("leadId" = String, Path, description = "Lead id."),
    ),
    tag = "lead",
    request_body = MoveLeadRequestBody,
    responses(
        (status = 200, description = "Lead moved successfully", body = LeadResponse),
        (status = 400, description = "Missing target column or position", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 404, description = "Lead not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn move_lead(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    lead_id: String,
    authorization: Option<String>,
    body: MoveLeadRequestBody,
) -> impl warp::reply::Reply {
    debug!("In move lead");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        lead_id: String,
        authorization: Option<String>,
        body: MoveLeadRequestBody,
    ) -> Result<impl warp::reply::Reply, Error> {
        let access =
            auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let (Some(to_column_id), Some(to_position)) = (
            body.to_column_id.filter(|id| !id.is_empty()),
            body.to_position,
        ) else {
            return Err(Error::BadRequest(
                "toColumnId and toPosition are required".to_string(),
            ));
        };

        let lead = move_one(
            &context.db,
            &workspace_id,
            &funnel_id,
            &lead_id,
            &to_column_id,
            to_position,
            &access.user.id,
        )
        .await?;
        Ok(with_status(json(&LeadResponse { lead }), StatusCode::OK))
    }

    // Handle and respond.
    handler(
        context,
        workspace_id,
        funnel_id,
        lead_id,
        authorization,
        body,
    )
    .await
    .map_or_else(Reply::into_response, Reply::into_response)
}

/// Batch move handler. Moves are applied in order and fail independently.
#[utoipa::path(
    post,
    operation_id = "batchMoveLeads",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/leads/batch-move",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
    ),
    tag = "lead",
    request_body = BatchMoveRequestBody,
    responses(
        (status = 200, description = "Moves applied", body = BatchMoveResponse),
        (status = 400, description = "Missing moves", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization, body))]
pub async fn batch_move_leads(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    authorization: Option<String>,
    body: BatchMoveRequestBody,
) -> impl warp::reply::Reply {
    debug!("In batch move leads");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        authorization: Option<String>,
        body: BatchMoveRequestBody,
    ) -> Result<impl warp::reply::Reply, Error> {
        let access =
            auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;
        let moves = body
            .moves
            .ok_or_else(|| Error::BadRequest("moves array is required".to_string()))?;

        let mut results = Vec::with_capacity(moves.len());
        for lead_move in moves {
            let moved = move_one(
                &context.db,
                &workspace_id,
                &funnel_id,
                &lead_move.lead_id,
                &lead_move.to_column_id,
                lead_move.to_position,
                &access.user.id,
            )
            .await;
            results.push(match moved {
                Ok(lead) => BatchMoveResult {
                    success: true,
                    lead_id: lead_move.lead_id,
                    lead: Some(lead),
                    error: None,
                },
                Err(error) => {
                    warn!(lead_id = lead_move.lead_id, %error, "lead move failed");
                    BatchMoveResult {
                        success: false,
                        lead_id: lead_move.lead_id,
                        lead: None,
                        error: Some(error.error_message()),
                    }
                }
            });
        }

        Ok(with_status(
            json(&BatchMoveResponse { results }),
            StatusCode::OK,
        ))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, authorization, body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Delete lead handler. The lead and its dependents are removed for good.
#[utoipa::path(
    delete,
    operation_id = "deleteLead",
    path = "/kanban-api/workspaces/{workspaceId}/funnels/{funnelId}/leads/{leadId}",
    params(
        ("workspaceId" = String, Path, description = "Workspace id."),
        ("funnelId" = String, Path, description = "Funnel id."),
        ("leadId" = String, Path, description = "Lead id."),
    ),
    tag = "lead",
    responses(
        (status = 200, description = "Lead deleted", body = SuccessResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "No access to the workspace", body = ErrorResponse),
        (status = 404, description = "Lead not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(context, authorization))]
pub async fn delete_lead(
    context: PescaleadContext,
    workspace_id: String,
    funnel_id: String,
    lead_id: String,
    authorization: Option<String>,
) -> impl warp::reply::Reply {
    debug!("In delete lead");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        workspace_id: String,
        funnel_id: String,
        lead_id: String,
        authorization: Option<String>,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::authorize_workspace(&context, authorization.as_deref(), &workspace_id).await?;

        let existing = accessors::get_lead_entry(&context.db, &workspace_id, &lead_id)
            .await?
            .ok_or_else(lead_not_found)?;
        accessors::delete_lead_entry(&context.db, &workspace_id, &lead_id).await?;

        let funnel_id = existing.funnel_id.as_deref().unwrap_or(&funnel_id);
        adjust_stats(&context.db, &workspace_id, funnel_id, |counters| {
            stats::on_delete(
                counters,
                existing.column_id.as_deref(),
                existing.deal_value.unwrap_or_default(),
                existing.priority.as_deref(),
            )
        })
        .await;

        Ok(with_status(
            json(&SuccessResponse { success: true }),
            StatusCode::OK,
        ))
    }

    // Handle and respond.
    handler(context, workspace_id, funnel_id, lead_id, authorization)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

// Shared ----------------------------------------------------------------------

/// A filtered page of the active leads of a column, with contacts resolved.
pub(crate) async fn load_column_page(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
    column_id: &str,
    lead_filters: &LeadFilters,
    limit: u64,
    offset: u64,
) -> Result<GetLeadsResponse, Error> {
    filters::validate(lead_filters)?;
    let query = filters::apply(
        accessors::column_leads_query(workspace_id, funnel_id, column_id),
        lead_filters,
    );
    let (entries, total) = accessors::get_lead_page(db, query, limit, offset).await?;
    let leads = map_leads(db, entries).await;

    Ok(GetLeadsResponse {
        leads,
        total,
        has_more: offset.saturating_add(limit) < total,
        limit,
        offset,
    })
}

/// Cards for lead rows. Contacts that cannot be loaded are left empty.
async fn map_leads(db: &PostgrestClient, entries: Vec<LeadEntry>) -> Vec<Lead> {
    if entries.is_empty() {
        return Vec::new();
    }
    let ids: Vec<String> = entries.iter().map(|entry| entry.id.clone()).collect();

    let values = accessors::get_contact_values(db, &ids)
        .await
        .unwrap_or_else(|error| {
            warn!(%error, "failed to load lead contacts");
            Vec::new()
        });
    let instagram = accessors::get_leads_instagram(db, &ids)
        .await
        .unwrap_or_else(|error| {
            warn!(%error, "failed to load lead instagram profiles");
            Vec::new()
        });
    let contacts = mapper::collect_contacts(&values, &instagram);

    entries
        .into_iter()
        .map(|entry| {
            let found = contacts.get(&entry.id);
            mapper::map_lead(entry, found)
        })
        .collect()
}

async fn map_one(db: &PostgrestClient, entry: LeadEntry) -> Lead {
    let fallback = entry.clone();
    map_leads(db, vec![entry])
        .await
        .pop()
        .unwrap_or_else(|| mapper::map_lead(fallback, None))
}

/// Move one lead, keeping the column counters in step.
async fn move_one(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
    lead_id: &str,
    to_column_id: &str,
    to_position: i64,
    user_id: &str,
) -> Result<Lead, Error> {
    let existing = accessors::get_lead_entry(db, workspace_id, lead_id)
        .await?
        .ok_or_else(lead_not_found)?;
    let update = LeadMoveUpdate {
        column_id: to_column_id,
        position: to_position,
        updated_by: user_id,
        last_activity_at: now_rfc3339(),
    };
    let moved = accessors::move_lead_entry(db, workspace_id, lead_id, &update).await?;

    if existing.column_id.as_deref() != Some(to_column_id) {
        let funnel_id = existing.funnel_id.as_deref().unwrap_or(funnel_id);
        adjust_stats(db, workspace_id, funnel_id, |counters| {
            stats::on_move(
                counters,
                existing.column_id.as_deref(),
                to_column_id,
                existing.deal_value.unwrap_or_default(),
            )
        })
        .await;
    }

    Ok(map_one(db, moved).await)
}

/// Apply `change` to the stats row of a funnel. The row is a cache that
/// recalculation rebuilds, so failures are only logged.
async fn adjust_stats<F>(db: &PostgrestClient, workspace_id: &str, funnel_id: &str, change: F)
where
    F: FnOnce(&mut FunnelStatsEntry),
{
    let result: Result<(), Error> = async {
        let Some(mut entry) =
            accessors::get_funnel_stats_entry(db, workspace_id, funnel_id).await?
        else {
            debug!(funnel_id, "funnel has no stats row");
            return Ok(());
        };
        change(&mut entry);
        accessors::set_funnel_stats_entry(db, workspace_id, funnel_id, &entry).await
    }
    .await;

    if let Err(error) = result {
        warn!(funnel_id, %error, "failed to update funnel stats");
    }
}

fn new_lead_entry(
    body: CreateLeadRequestBody,
    workspace_id: &str,
    funnel_id: &str,
    column_id: String,
    position: i64,
    user_id: &str,
) -> NewLeadEntry {
    let assignee = body.assignee.unwrap_or_default();
    NewLeadEntry {
        workspace_id: workspace_id.to_string(),
        funnel_id: funnel_id.to_string(),
        column_id,
        client_name: body
            .client_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNNAMED_CLIENT.to_string()),
        company: body.company.unwrap_or_default(),
        email: body.email,
        phone: body.phone,
        avatar_url: body.avatar,
        deal_value: body.deal_value.unwrap_or_default(),
        priority: body
            .priority
            .filter(|priority| !priority.is_empty())
            .unwrap_or_else(|| "medium".to_string()),
        status: "active".to_string(),
        contact_date: body.contact_date,
        expected_close_date: body.expected_close_date,
        due_date: body.due_date,
        tags: body.tags.unwrap_or_default(),
        notes: body.notes,
        position,
        is_important: body.is_important.unwrap_or_default(),
        assignee_name: assignee.name,
        assignee_avatar: assignee.avatar,
        assigned_to: assignee.id,
        created_by: user_id.to_string(),
        updated_by: user_id.to_string(),
    }
}

fn lead_update(body: UpdateLeadRequestBody, user_id: &str) -> LeadUpdate {
    let assignee = body.assignee;
    LeadUpdate {
        updated_by: user_id.to_string(),
        client_name: body.client_name,
        company: body.company,
        email: body.email,
        phone: body.phone,
        avatar_url: body.avatar,
        deal_value: body.deal_value,
        priority: body.priority.filter(|priority| !priority.is_empty()),
        contact_date: body.contact_date,
        expected_close_date: body.expected_close_date,
        due_date: body.due_date,
        tags: body.tags,
        notes: body.notes,
        is_important: body.is_important,
        assignee_name: assignee.as_ref().map(|a| a.name.clone()),
        assignee_avatar: assignee.as_ref().map(|a| a.avatar.clone()),
        assigned_to: assignee.map(|a| a.id),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::models::kanban::requests::AssigneeInput;
    use crate::context::testing;

    #[test]
    fn new_leads_get_defaults() {
        let body = CreateLeadRequestBody {
            client_name: Some("  ".to_string()),
            column_id: Some("c1".to_string()),
            priority: Some(String::new()),
            ..Default::default()
        };

        let entry = new_lead_entry(body, "w1", "f1", "c1".to_string(), 4, "u1");
        assert_eq!(entry.client_name, UNNAMED_CLIENT);
        assert_eq!(entry.priority, "medium");
        assert_eq!(entry.status, "active");
        assert_eq!(entry.company, "");
        assert_eq!(entry.position, 4);
        assert_eq!(entry.created_by, "u1");
        assert!(entry.tags.is_empty());
    }

    #[test]
    fn updates_map_avatar_and_assignee() {
        let body: UpdateLeadRequestBody = serde_json::from_value(json!({
            "avatar": null,
            "priority": "",
            "assignee": {"id": "u2", "name": "Ana"}
        }))
        .unwrap();

        let update = lead_update(body, "u1");
        assert_eq!(update.avatar_url, Some(None));
        assert_eq!(update.priority, None);
        assert_eq!(update.assigned_to, Some(Some("u2".to_string())));
        assert_eq!(update.assignee_name, Some(Some("Ana".to_string())));
        assert_eq!(update.assignee_avatar, Some(None));
        assert_eq!(update.client_name, None);
    }

    #[test]
    fn updates_without_assignee_leave_it_alone() {
        let body = UpdateLeadRequestBody {
            assignee: None,
            tags: Some(vec!["vip".to_string()]),
            ..Default::default()
        };
        let update = lead_update(body, "u1");
        assert_eq!(update.assigned_to, None);
        assert_eq!(update.tags, Some(vec!["vip".to_string()]));

        let explicit = lead_update(
            UpdateLeadRequestBody {
                assignee: Some(AssigneeInput::default()),
                ..Default::default()
            },
            "u1",
        );
        assert_eq!(explicit.assigned_to, Some(None));
    }

    #[tokio::test]
    async fn pages_past_the_end_have_no_more() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", "/rest/v1/leads")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-range", "*/5")
            .with_body("[]")
            .create_async()
            .await;
        let context = testing::context(&server.url());

        let response = load_column_page(
            &context.db,
            "w1",
            "f1",
            "c1",
            &LeadFilters::default(),
            10,
            u64::MAX,
        )
        .await
        .unwrap();

        assert!(response.leads.is_empty());
        assert_eq!(response.total, 5);
        assert!(!response.has_more);
        assert_eq!(response.offset, u64::MAX);
        page.assert_async().await;
    }
}
