//! Accessors.
//!
//! Every accessor takes the client it should act with: the service client
//! for handler logic, the user client where row level security must apply.

use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::warn;

use crate::common::error::Error;

use super::entries::campaign::{
    AgentModelEntry, CampaignMessageEntry, CampaignMessageStatus, CampaignMessageUpdate,
    CampaignRunStatus, CampaignRunUpdate, CompletionResultEntry, FinalizedRunEntry,
    InstanceStatusEntry, LeadNameEntry, NewConversationEntry, RunStatusEntry, SecretEntry,
    SplitterConfigEntry, UNSENT_STATUSES,
};
use super::entries::follow_up::{
    CategoryEntry, FollowUpAiConfigEntry, FollowUpJobEntry, FollowUpJobUpdate,
    FollowUpModelEntry, NewFollowUpHistoryEntry, TranscriptEntry, ValidationEntry,
};
use super::entries::kanban::{
    ColumnEntry, CustomValueEntry, FunnelEntry, FunnelStatsEntry, IdEntry, InstagramEntry,
    LeadEntry, LeadMoveUpdate, LeadUpdate, MemberEntry, NewColumnEntry, NewFunnelEntry,
    NewFunnelStatsEntry, NewLeadEntry, PositionEntry, WorkspaceOwnerEntry, CUSTOM_VALUE_COLUMNS,
    FUNNEL_COLUMNS, LEAD_PAGE_COLUMNS,
};
use super::entries::messaging::{
    ConversationEntry, ConversationPreviewUpdate, InboxInstanceEntry, InstanceEntry,
    NewLeadActivityEntry, NewMessageEntry,
};
use super::entries::pipeline::{AgentEntry, DebouncerStatusUpdate, QueueMessageEntry};
use super::postgrest::{PostgrestClient, Query};

const LEAD_CHILD_TABLES: [&str; 4] = [
    "lead_activities",
    "lead_attachments",
    "campaign_logs",
    "campaign_messages",
];

// Workspace -------------------------------------------------------------------

/// Membership of a user in a workspace.
pub async fn get_workspace_member(
    db: &PostgrestClient,
    workspace_id: &str,
    user_id: &str,
) -> Result<Option<MemberEntry>, Error> {
    let query = Query::new()
        .select("role,permissions")
        .eq("workspace_id", workspace_id)
        .eq("user_id", user_id)
        .limit(1);
    db.maybe_single("workspace_members", &query).await
}

/// Owner of a workspace.
pub async fn get_workspace_owner(
    db: &PostgrestClient,
    workspace_id: &str,
) -> Result<Option<WorkspaceOwnerEntry>, Error> {
    let query = Query::new()
        .select("owner_id")
        .eq("id", workspace_id)
        .limit(1);
    db.maybe_single("workspaces", &query).await
}

// Funnels ---------------------------------------------------------------------

/// Active funnels of a workspace, by position, with their columns.
pub async fn get_funnel_entries(
    db: &PostgrestClient,
    workspace_id: &str,
) -> Result<Vec<FunnelEntry>, Error> {
    let query = Query::new()
        .select(FUNNEL_COLUMNS)
        .eq("workspace_id", workspace_id)
        .eq("is_active", true)
        .order("position", true);
    db.select("funnels", &query).await
}

/// A funnel of a workspace with its columns.
pub async fn get_funnel_entry(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
) -> Result<Option<FunnelEntry>, Error> {
    let query = Query::new()
        .select(FUNNEL_COLUMNS)
        .eq("id", funnel_id)
        .eq("workspace_id", workspace_id)
        .limit(1);
    db.maybe_single("funnels", &query).await
}

/// Position after the last funnel of a workspace.
pub async fn next_funnel_position(db: &PostgrestClient, workspace_id: &str) -> Result<i64, Error> {
    let query = Query::new()
        .select("position")
        .eq("workspace_id", workspace_id)
        .order("position", false)
        .limit(1);
    let last: Option<PositionEntry> = db.maybe_single("funnels", &query).await?;
    Ok(last.map_or(0, |entry| entry.position + 1))
}

/// Insert a funnel.
pub async fn add_funnel_entry(
    db: &PostgrestClient,
    entry: &NewFunnelEntry<'_>,
) -> Result<FunnelEntry, Error> {
    let rows: Vec<FunnelEntry> = db.insert("funnels", entry).await?;
    rows.into_iter().next().ok_or(Error::InvalidApiResponse)
}

/// Change the name or the description of a funnel.
pub async fn set_funnel_details(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
    details: &Value,
) -> Result<(), Error> {
    let query = Query::new().eq("id", funnel_id).eq("workspace_id", workspace_id);
    let _: Vec<IdEntry> = db.update("funnels", &query, details).await?;
    Ok(())
}

/// Soft delete a funnel.
pub async fn deactivate_funnel(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
) -> Result<(), Error> {
    set_funnel_details(db, workspace_id, funnel_id, &json!({ "is_active": false })).await
}

// Columns ---------------------------------------------------------------------

/// Columns of a funnel by position.
pub async fn get_column_entries(
    db: &PostgrestClient,
    funnel_id: &str,
) -> Result<Vec<ColumnEntry>, Error> {
    let query = Query::new()
        .select("*")
        .eq("funnel_id", funnel_id)
        .order("position", true);
    db.select("funnel_columns", &query).await
}

/// A column of a funnel.
pub async fn get_column_entry(
    db: &PostgrestClient,
    funnel_id: &str,
    column_id: &str,
) -> Result<Option<ColumnEntry>, Error> {
    let query = Query::new()
        .select("*")
        .eq("id", column_id)
        .eq("funnel_id", funnel_id)
        .limit(1);
    db.maybe_single("funnel_columns", &query).await
}

/// Insert columns and return them.
pub async fn add_column_entries(
    db: &PostgrestClient,
    entries: &[NewColumnEntry<'_>],
) -> Result<Vec<ColumnEntry>, Error> {
    db.insert("funnel_columns", entries).await
}

/// Retitle and reposition a column.
pub async fn set_column_entry(
    db: &PostgrestClient,
    funnel_id: &str,
    column_id: &str,
    title: &str,
    position: i64,
) -> Result<(), Error> {
    let query = Query::new().eq("id", column_id).eq("funnel_id", funnel_id);
    let body = json!({ "title": title, "position": position });
    let _: Vec<IdEntry> = db.update("funnel_columns", &query, &body).await?;
    Ok(())
}

/// Delete columns by id.
pub async fn delete_column_entries(db: &PostgrestClient, column_ids: &[String]) -> Result<(), Error> {
    let query = Query::new().in_list("id", column_ids);
    let _: Vec<IdEntry> = db.delete("funnel_columns", &query).await?;
    Ok(())
}

// Leads -----------------------------------------------------------------------

/// Base query of the active leads of a column.
pub fn column_leads_query(workspace_id: &str, funnel_id: &str, column_id: &str) -> Query {
    Query::new()
        .select(LEAD_PAGE_COLUMNS)
        .eq("workspace_id", workspace_id)
        .eq("funnel_id", funnel_id)
        .eq("column_id", column_id)
        .eq("status", "active")
}

/// A page of leads and the number of leads matching the query.
pub async fn get_lead_page(
    db: &PostgrestClient,
    query: Query,
    limit: u64,
    offset: u64,
) -> Result<(Vec<LeadEntry>, u64), Error> {
    let query = query.order("position", true).limit(limit).offset(offset);
    db.select_with_count("leads", &query).await
}

/// Number of active leads in a column.
pub async fn count_column_leads(
    db: &PostgrestClient,
    funnel_id: &str,
    column_id: &str,
) -> Result<u64, Error> {
    let query = Query::new()
        .eq("funnel_id", funnel_id)
        .eq("column_id", column_id)
        .eq("status", "active");
    db.count("leads", &query).await
}

/// A lead of a workspace, every column.
pub async fn get_lead_entry(
    db: &PostgrestClient,
    workspace_id: &str,
    lead_id: &str,
) -> Result<Option<LeadEntry>, Error> {
    let query = Query::new()
        .select("*")
        .eq("id", lead_id)
        .eq("workspace_id", workspace_id)
        .limit(1);
    db.maybe_single("leads", &query).await
}

/// Active leads of a funnel, for statistics.
pub async fn get_funnel_lead_values(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
) -> Result<Vec<LeadEntry>, Error> {
    let query = Query::new()
        .select("deal_value,priority,column_id")
        .eq("workspace_id", workspace_id)
        .eq("funnel_id", funnel_id)
        .eq("status", "active");
    db.select("leads", &query).await
}

/// Position after the last active lead of a column.
pub async fn next_lead_position(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
    column_id: &str,
) -> Result<i64, Error> {
    let query = Query::new()
        .select("position")
        .eq("workspace_id", workspace_id)
        .eq("funnel_id", funnel_id)
        .eq("column_id", column_id)
        .eq("status", "active")
        .order("position", false)
        .limit(1);
    let last: Option<PositionEntry> = db.maybe_single("leads", &query).await?;
    Ok(last.map_or(0, |entry| entry.position + 1))
}

/// Insert a lead.
pub async fn add_lead_entry(db: &PostgrestClient, entry: &NewLeadEntry) -> Result<LeadEntry, Error> {
    let rows: Vec<LeadEntry> = db.insert("leads", entry).await?;
    rows.into_iter().next().ok_or(Error::InvalidApiResponse)
}

async fn update_lead<B: serde::Serialize + ?Sized>(
    db: &PostgrestClient,
    workspace_id: &str,
    lead_id: &str,
    body: &B,
) -> Result<LeadEntry, Error> {
    let query = Query::new().eq("id", lead_id).eq("workspace_id", workspace_id);
    let rows: Vec<LeadEntry> = db.update("leads", &query, body).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::NotFound("Lead not found".to_string()))
}

/// Apply changes to a lead.
pub async fn set_lead_entry(
    db: &PostgrestClient,
    workspace_id: &str,
    lead_id: &str,
    update: &LeadUpdate,
) -> Result<LeadEntry, Error> {
    update_lead(db, workspace_id, lead_id, update).await
}

/// Move a lead.
pub async fn move_lead_entry(
    db: &PostgrestClient,
    workspace_id: &str,
    lead_id: &str,
    update: &LeadMoveUpdate<'_>,
) -> Result<LeadEntry, Error> {
    update_lead(db, workspace_id, lead_id, update).await
}

/// Delete a lead and everything hanging off it. Custom values must go;
/// the other child tables are best effort. Conversations are unlinked.
pub async fn delete_lead_entry(
    db: &PostgrestClient,
    workspace_id: &str,
    lead_id: &str,
) -> Result<(), Error> {
    let by_lead = Query::new().eq("lead_id", lead_id);
    let _: Vec<Value> = db.delete("lead_custom_values", &by_lead).await?;

    for table in LEAD_CHILD_TABLES {
        if let Err(error) = db.delete::<Value>(table, &by_lead).await {
            warn!(table, %error, "failed to delete lead dependents");
        }
    }
    let unlink: Result<Vec<Value>, Error> = db
        .update("conversations", &by_lead, &json!({ "lead_id": null }))
        .await;
    if let Err(error) = unlink {
        warn!(%error, "failed to unlink conversations from lead");
    }

    let query = Query::new()
        .eq("id", lead_id)
        .eq("workspace_id", workspace_id)
        .select("id");
    let deleted: Vec<IdEntry> = db.delete("leads", &query).await?;
    if deleted.is_empty() {
        return Err(Error::HttpRequest(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Lead não foi deletado. Verifique se o lead existe.".to_string(),
        ));
    }
    Ok(())
}

/// Email and phone custom values of some leads.
pub async fn get_contact_values(
    db: &PostgrestClient,
    lead_ids: &[String],
) -> Result<Vec<CustomValueEntry>, Error> {
    let query = Query::new()
        .select(CUSTOM_VALUE_COLUMNS)
        .in_list("lead_id", lead_ids)
        .in_list("custom_fields.field_type", &["email", "phone"]);
    db.select("lead_custom_values", &query).await
}

/// Instagram profiles found in any custom field of some leads.
pub async fn get_leads_instagram(
    db: &PostgrestClient,
    lead_ids: &[String],
) -> Result<Vec<InstagramEntry>, Error> {
    let rows: Option<Vec<InstagramEntry>> = db
        .rpc("get_leads_instagram", &json!({ "p_lead_ids": lead_ids }))
        .await?;
    Ok(rows.unwrap_or_default())
}

// Funnel stats ----------------------------------------------------------------

/// The denormalized stats row of a funnel.
pub async fn get_funnel_stats_entry(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
) -> Result<Option<FunnelStatsEntry>, Error> {
    let query = Query::new()
        .select("*")
        .eq("funnel_id", funnel_id)
        .eq("workspace_id", workspace_id)
        .limit(1);
    db.maybe_single("funnel_stats", &query).await
}

/// Insert the stats row of a new funnel.
pub async fn add_funnel_stats_entry(
    db: &PostgrestClient,
    entry: &NewFunnelStatsEntry<'_>,
) -> Result<(), Error> {
    let _: Vec<Value> = db.insert("funnel_stats", entry).await?;
    Ok(())
}

/// Overwrite the stats row of a funnel.
pub async fn set_funnel_stats_entry(
    db: &PostgrestClient,
    workspace_id: &str,
    funnel_id: &str,
    entry: &FunnelStatsEntry,
) -> Result<(), Error> {
    let query = Query::new()
        .eq("funnel_id", funnel_id)
        .eq("workspace_id", workspace_id);
    let _: Vec<Value> = db.update("funnel_stats", &query, entry).await?;
    Ok(())
}

// Messaging -------------------------------------------------------------------

/// A conversation.
pub async fn get_conversation_entry(
    db: &PostgrestClient,
    conversation_id: &str,
) -> Result<Option<ConversationEntry>, Error> {
    let query = Query::new()
        .select("id,contact_phone,workspace_id,inbox_id,lead_id,unread_count")
        .eq("id", conversation_id)
        .limit(1);
    db.maybe_single("conversations", &query).await
}

/// Instance serving an inbox.
pub async fn get_inbox_instance_id(
    db: &PostgrestClient,
    inbox_id: &str,
) -> Result<Option<String>, Error> {
    let query = Query::new()
        .select("instance_id")
        .eq("inbox_id", inbox_id)
        .limit(1);
    let entry: Option<InboxInstanceEntry> = db.maybe_single("inbox_instances", &query).await?;
    Ok(entry.map(|entry| entry.instance_id))
}

/// Any connected instance of a workspace.
pub async fn get_connected_instance_id(
    db: &PostgrestClient,
    workspace_id: &str,
) -> Result<Option<String>, Error> {
    let query = Query::new()
        .select("id")
        .eq("workspace_id", workspace_id)
        .eq("status", "connected")
        .limit(1);
    let entry: Option<IdEntry> = db.maybe_single("instances", &query).await?;
    Ok(entry.map(|entry| entry.id))
}

/// A WhatsApp instance.
pub async fn get_instance_entry(
    db: &PostgrestClient,
    instance_id: &str,
) -> Result<Option<InstanceEntry>, Error> {
    let query = Query::new()
        .select("id,name,status")
        .eq("id", instance_id)
        .limit(1);
    db.maybe_single("instances", &query).await
}

/// Store a message and return its id.
pub async fn add_message_entry(
    db: &PostgrestClient,
    entry: &NewMessageEntry<'_>,
) -> Result<String, Error> {
    let rows: Vec<IdEntry> = db.insert("messages", entry).await?;
    rows.into_iter()
        .next()
        .map(|row| row.id)
        .ok_or(Error::InvalidApiResponse)
}

/// Refresh the preview of a conversation.
pub async fn set_conversation_preview(
    db: &PostgrestClient,
    conversation_id: &str,
    update: &ConversationPreviewUpdate<'_>,
) -> Result<(), Error> {
    let query = Query::new().eq("id", conversation_id);
    let _: Vec<Value> = db.update("conversations", &query, update).await?;
    Ok(())
}

/// Add a lead timeline entry.
pub async fn add_lead_activity(
    db: &PostgrestClient,
    entry: &NewLeadActivityEntry<'_>,
) -> Result<(), Error> {
    let _: Vec<Value> = db.insert("lead_activities", entry).await?;
    Ok(())
}

// Pipeline --------------------------------------------------------------------

/// Whether the AI answers a conversation.
pub async fn should_ai_handle_conversation(
    db: &PostgrestClient,
    conversation_id: &str,
) -> Result<bool, Error> {
    let handled: Option<bool> = db
        .rpc(
            "should_ai_handle_conversation",
            &json!({ "p_conversation_id": conversation_id }),
        )
        .await?;
    Ok(handled.unwrap_or_default())
}

/// Active agent of an inbox, if any.
pub async fn get_active_agent_for_inbox(
    db: &PostgrestClient,
    inbox_id: Option<&str>,
) -> Result<Option<String>, Error> {
    let agent: Option<Value> = db
        .rpc("get_active_agent_for_inbox", &json!({ "p_inbox_id": inbox_id }))
        .await?;
    Ok(match agent {
        Some(Value::String(id)) if !id.is_empty() => Some(id),
        _ => None,
    })
}

/// Settings of an agent.
pub async fn get_agent_entry(
    db: &PostgrestClient,
    agent_id: &str,
) -> Result<Option<AgentEntry>, Error> {
    let query = Query::new()
        .select("id,behavior_config")
        .eq("id", agent_id)
        .limit(1);
    db.maybe_single("ai_agents", &query).await
}

/// Queue the transcription or description of a media message.
pub async fn queue_transcription(
    db: &PostgrestClient,
    message_id: &str,
    media_url: &str,
    kind: &str,
) -> Result<(), Error> {
    let _: Value = db
        .rpc(
            "ai_queue_transcription",
            &json!({
                "p_message_id": message_id,
                "p_media_url": media_url,
                "p_content_type": kind,
            }),
        )
        .await?;
    Ok(())
}

/// Add a message to the debouncer and return the debouncer entry.
pub async fn add_to_debouncer(
    db: &PostgrestClient,
    conversation_id: &str,
    message_id: &str,
    agent_id: &str,
    debounce_seconds: i64,
) -> Result<Value, Error> {
    db.rpc(
        "ai_add_to_debouncer",
        &json!({
            "p_conversation_id": conversation_id,
            "p_message_id": message_id,
            "p_agent_id": agent_id,
            "p_debounce_seconds": debounce_seconds,
        }),
    )
    .await
}

/// Move debouncer entries whose quiet period elapsed into the queue.
pub async fn debouncer_to_queue(db: &PostgrestClient) -> Result<i64, Error> {
    let moved: Option<i64> = db.rpc("ai_debouncer_to_pgmq", &json!({})).await?;
    Ok(moved.unwrap_or_default())
}

/// Read up to `qty` messages, hiding them for `vt_seconds`.
pub async fn read_queue(
    db: &PostgrestClient,
    queue_name: &str,
    vt_seconds: u64,
    qty: u64,
) -> Result<Vec<QueueMessageEntry>, Error> {
    let messages: Option<Vec<QueueMessageEntry>> = db
        .rpc(
            "pgmq_read",
            &json!({ "queue_name": queue_name, "vt_seconds": vt_seconds, "qty": qty }),
        )
        .await?;
    Ok(messages.unwrap_or_default())
}

/// Delete a processed message.
pub async fn delete_queue_message(
    db: &PostgrestClient,
    queue_name: &str,
    msg_id: i64,
) -> Result<(), Error> {
    let _: Value = db
        .rpc("pgmq_delete", &json!({ "queue_name": queue_name, "msg_id": msg_id }))
        .await?;
    Ok(())
}

/// Move a message that keeps failing to the archive.
pub async fn archive_queue_message(
    db: &PostgrestClient,
    queue_name: &str,
    msg_id: i64,
) -> Result<(), Error> {
    let _: Value = db
        .rpc(
            "pgmq_archive",
            &json!({ "p_queue_name": queue_name, "p_msg_id": msg_id }),
        )
        .await?;
    Ok(())
}

/// Change the status of a debouncer entry.
pub async fn set_debouncer_status(
    db: &PostgrestClient,
    debouncer_id: &Value,
    update: &DebouncerStatusUpdate<'_>,
) -> Result<(), Error> {
    let id = match debouncer_id {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    };
    let query = Query::new().eq("id", id);
    let _: Vec<Value> = db.update("ai_debouncer_queue", &query, update).await?;
    Ok(())
}

// Secrets ---------------------------------------------------------------------

/// A secret from the database vault.
pub async fn get_vault_secret(db: &PostgrestClient, name: &str) -> Result<Option<String>, Error> {
    let query = Query::new()
        .select("decrypted_secret")
        .eq("name", name)
        .limit(1);
    let entry: Option<SecretEntry> = db.maybe_single("decrypted_secrets", &query).await?;
    Ok(entry
        .and_then(|entry| entry.decrypted_secret)
        .filter(|secret| !secret.is_empty()))
}

/// A secret through the `get_secret` procedure.
pub async fn get_secret(db: &PostgrestClient, name: &str) -> Result<Option<String>, Error> {
    let secret: Option<String> = db.rpc("get_secret", &json!({ "secret_name": name })).await?;
    Ok(secret.filter(|secret| !secret.is_empty()))
}

// Campaigns -------------------------------------------------------------------

/// Lock up to `batch_size` due campaign messages scheduled after
/// `stale_before`.
pub async fn lock_campaign_messages(
    db: &PostgrestClient,
    batch_size: u32,
    stale_before: &str,
) -> Result<Vec<CampaignMessageEntry>, Error> {
    let messages: Option<Vec<CampaignMessageEntry>> = db
        .rpc(
            "get_and_lock_campaign_messages",
            &json!({ "p_batch_size": batch_size, "p_one_hour_ago": stale_before }),
        )
        .await?;
    Ok(messages.unwrap_or_default())
}

/// Skip the messages still pending from before `stale_before`; returns how
/// many were skipped.
pub async fn skip_stale_campaign_messages(
    db: &PostgrestClient,
    stale_before: &str,
) -> Result<i64, Error> {
    let skipped: Option<i64> = db
        .rpc(
            "mark_old_campaign_messages_as_skipped",
            &json!({ "p_one_hour_ago": stale_before }),
        )
        .await?;
    Ok(skipped.unwrap_or_default())
}

/// Current status of a run.
pub async fn get_campaign_run_status(
    db: &PostgrestClient,
    run_id: &str,
) -> Result<Option<String>, Error> {
    let query = Query::new().select("status").eq("id", run_id).limit(1);
    let entry: Option<RunStatusEntry> = db.maybe_single("campaign_runs", &query).await?;
    Ok(entry.and_then(|entry| entry.status))
}

/// Apply changes to a campaign message.
pub async fn set_campaign_message(
    db: &PostgrestClient,
    message_id: &str,
    update: &CampaignMessageUpdate<'_>,
) -> Result<(), Error> {
    let query = Query::new().eq("id", message_id);
    let _: Vec<Value> = db.update("campaign_messages", &query, update).await?;
    Ok(())
}

/// Pause a run and skip its unsent messages.
pub async fn pause_campaign_run(db: &PostgrestClient, run_id: &str, reason: &str) -> Result<(), Error> {
    let update = CampaignRunUpdate {
        status: CampaignRunStatus::Paused,
        error_message: reason,
    };
    let _: Vec<Value> = db
        .update("campaign_runs", &Query::new().eq("id", run_id), &update)
        .await?;

    let unsent = Query::new()
        .eq("run_id", run_id)
        .in_list("status", &UNSENT_STATUSES);
    let skip = CampaignMessageUpdate {
        status: Some(CampaignMessageStatus::Skipped),
        error_message: Some(reason),
        ..Default::default()
    };
    let _: Vec<Value> = db.update("campaign_messages", &unsent, &skip).await?;
    Ok(())
}

/// Whether the instance behind an inbox can send.
pub async fn check_campaign_instance(
    db: &PostgrestClient,
    inbox_id: &str,
) -> Result<InstanceStatusEntry, Error> {
    let status: Option<InstanceStatusEntry> = db
        .rpc("check_campaign_instance_status", &json!({ "p_inbox_id": inbox_id }))
        .await?;
    Ok(status.unwrap_or_default())
}

/// Model of the agent of a workspace.
pub async fn get_workspace_ai_model(
    db: &PostgrestClient,
    workspace_id: &str,
) -> Result<Option<String>, Error> {
    let query = Query::new()
        .select("model")
        .eq("workspace_id", workspace_id)
        .limit(1);
    let entry: Option<AgentModelEntry> = db.maybe_single("ai_agents", &query).await?;
    Ok(entry
        .and_then(|entry| entry.model)
        .filter(|model| !model.is_empty()))
}

/// Count processed messages on a run.
pub async fn increment_campaign_run_metrics(
    db: &PostgrestClient,
    run_id: &str,
    success: u32,
    failed: u32,
    skipped: u32,
) -> Result<(), Error> {
    let _: Value = db
        .rpc(
            "increment_campaign_run_metrics",
            &json!({
                "p_run_id": run_id,
                "p_success": success,
                "p_failed": failed,
                "p_skipped": skipped,
            }),
        )
        .await?;
    Ok(())
}

/// Name of a lead, when the lead still exists.
pub async fn get_lead_name(
    db: &PostgrestClient,
    lead_id: &str,
) -> Result<Option<LeadNameEntry>, Error> {
    let query = Query::new().select("client_name").eq("id", lead_id).limit(1);
    db.maybe_single("leads", &query).await
}

/// Everything known about a lead, for prompts.
pub async fn get_lead_full_context(
    db: &PostgrestClient,
    lead_id: &str,
) -> Result<Option<Value>, Error> {
    let context: Option<Value> = db
        .rpc("get_lead_full_context", &json!({ "p_lead_id": lead_id }))
        .await?;
    Ok(context.filter(|context| !context.is_null()))
}

/// Active splitter settings.
pub async fn get_splitter_config(db: &PostgrestClient) -> Result<Option<SplitterConfigEntry>, Error> {
    let query = Query::new()
        .select("min_chars_to_split,delay_between_messages,temperature,max_tokens")
        .eq("is_active", true)
        .limit(1);
    db.maybe_single("ai_message_splitter_config", &query).await
}

/// Conversation linked to a lead.
pub async fn get_lead_conversation_id(
    db: &PostgrestClient,
    lead_id: &str,
) -> Result<Option<String>, Error> {
    let query = Query::new().select("id").eq("lead_id", lead_id).limit(1);
    let entry: Option<IdEntry> = db.maybe_single("conversations", &query).await?;
    Ok(entry.map(|entry| entry.id))
}

/// Conversation of a workspace with a phone number.
pub async fn get_phone_conversation_id(
    db: &PostgrestClient,
    workspace_id: &str,
    phone: &str,
) -> Result<Option<String>, Error> {
    let query = Query::new()
        .select("id")
        .eq("workspace_id", workspace_id)
        .eq("contact_phone", phone)
        .limit(1);
    let entry: Option<IdEntry> = db.maybe_single("conversations", &query).await?;
    Ok(entry.map(|entry| entry.id))
}

/// Link a conversation to a lead.
pub async fn link_conversation_lead(
    db: &PostgrestClient,
    conversation_id: &str,
    lead_id: &str,
) -> Result<(), Error> {
    let query = Query::new().eq("id", conversation_id);
    let _: Vec<Value> = db
        .update("conversations", &query, &json!({ "lead_id": lead_id }))
        .await?;
    Ok(())
}

/// Open a conversation and return its id.
pub async fn add_conversation_entry(
    db: &PostgrestClient,
    entry: &NewConversationEntry<'_>,
) -> Result<String, Error> {
    let rows: Vec<IdEntry> = db.insert("conversations", entry).await?;
    rows.into_iter()
        .next()
        .map(|row| row.id)
        .ok_or(Error::InvalidApiResponse)
}

/// Outcome of a campaign message, written at once with the run counters,
/// the lead move and the conversation link.
#[derive(Debug, Clone, Copy)]
pub struct CampaignCompletion<'a> {
    /// Campaign message.
    pub message_id: &'a str,
    /// Its run.
    pub run_id: &'a str,
    /// Its lead.
    pub lead_id: &'a str,
    /// Column the lead moves to.
    pub target_column_id: Option<&'a str>,
    /// Conversation the opener went to.
    pub conversation_id: Option<&'a str>,
    /// Provider id of the last part sent.
    pub provider_message_id: Option<&'a str>,
    /// Whether the opener was delivered.
    pub success: bool,
}

/// Record the outcome of a campaign message.
pub async fn complete_campaign_message(
    db: &PostgrestClient,
    completion: &CampaignCompletion<'_>,
) -> Result<CompletionResultEntry, Error> {
    let result: Option<CompletionResultEntry> = db
        .rpc(
            "complete_campaign_message_atomic",
            &json!({
                "p_message_id": completion.message_id,
                "p_run_id": completion.run_id,
                "p_lead_id": completion.lead_id,
                "p_target_column_id": completion.target_column_id,
                "p_conversation_id": completion.conversation_id,
                "p_provider_message_id": completion.provider_message_id,
                "p_success": completion.success,
            }),
        )
        .await?;
    Ok(result.unwrap_or_default())
}

/// Complete a run whose leads were all processed.
pub async fn finalize_campaign_run(
    db: &PostgrestClient,
    run_id: &str,
) -> Result<Option<FinalizedRunEntry>, Error> {
    let rows: Option<Vec<FinalizedRunEntry>> = db
        .rpc("finalize_campaign_run_if_complete", &json!({ "p_run_id": run_id }))
        .await?;
    Ok(rows.and_then(|rows| rows.into_iter().next()))
}

/// Add a step to the run log.
pub async fn log_campaign_step(
    db: &PostgrestClient,
    run_id: &str,
    step: &str,
    level: &str,
    message: &str,
    details: &Value,
) -> Result<(), Error> {
    let _: Value = db
        .rpc(
            "log_campaign_step",
            &json!({
                "p_run_id": run_id,
                "p_step_name": step,
                "p_level": level,
                "p_message": message,
                "p_details": details,
                "p_lead_id": null,
                "p_message_id": null,
            }),
        )
        .await?;
    Ok(())
}

// Follow-ups ------------------------------------------------------------------

/// Jobs whose wait elapsed.
pub async fn get_ready_follow_up_jobs(
    db: &PostgrestClient,
    limit: u32,
) -> Result<Vec<FollowUpJobEntry>, Error> {
    let jobs: Option<Vec<FollowUpJobEntry>> = db
        .rpc("get_ready_follow_up_jobs", &json!({ "p_limit": limit }))
        .await?;
    Ok(jobs.unwrap_or_default())
}

/// Whether a job should still run, e.g. the contact has not answered.
pub async fn validate_follow_up_execution(
    db: &PostgrestClient,
    job_id: &str,
) -> Result<ValidationEntry, Error> {
    let validation: Option<ValidationEntry> = db
        .rpc("validate_follow_up_execution", &json!({ "p_job_id": job_id }))
        .await?;
    Ok(validation.unwrap_or_default())
}

/// Active category picker settings.
pub async fn get_follow_up_ai_config(
    db: &PostgrestClient,
) -> Result<Option<FollowUpAiConfigEntry>, Error> {
    let query = Query::new()
        .select("model,temperature,max_tokens,system_prompt,prompt_template")
        .eq("is_active", true)
        .eq("name", "default")
        .limit(1);
    db.maybe_single("ai_follow_up_config", &query).await
}

/// Latest messages of a conversation, newest first.
pub async fn get_recent_messages(
    db: &PostgrestClient,
    conversation_id: &str,
    limit: u64,
) -> Result<Vec<TranscriptEntry>, Error> {
    let query = Query::new()
        .select("text_content,message_type,created_at")
        .eq("conversation_id", conversation_id)
        .is_null("deleted_at")
        .order("created_at", false)
        .limit(limit);
    db.select("messages", &query).await
}

/// Published categories of a workspace.
pub async fn get_published_categories(
    db: &PostgrestClient,
    workspace_id: &str,
) -> Result<Vec<CategoryEntry>, Error> {
    let query = Query::new()
        .select("id,name,ai_instructions,availability")
        .eq("workspace_id", workspace_id)
        .eq("is_published", true);
    db.select("follow_up_categories", &query).await
}

/// A category of a workspace.
pub async fn get_category_entry(
    db: &PostgrestClient,
    category_id: &str,
    workspace_id: &str,
) -> Result<Option<CategoryEntry>, Error> {
    let query = Query::new()
        .select("id,name,availability")
        .eq("id", category_id)
        .eq("workspace_id", workspace_id)
        .limit(1);
    db.maybe_single("follow_up_categories", &query).await
}

/// Apply changes to a follow-up job.
pub async fn set_follow_up_job(
    db: &PostgrestClient,
    job_id: &str,
    update: &FollowUpJobUpdate<'_>,
) -> Result<(), Error> {
    let query = Query::new().eq("id", job_id);
    let _: Vec<Value> = db.update("follow_up_jobs", &query, update).await?;
    Ok(())
}

/// Whether it is business hours now.
pub async fn is_business_hours(db: &PostgrestClient) -> Result<bool, Error> {
    let open: Option<bool> = db.rpc("is_business_hours", &json!({})).await?;
    Ok(open.unwrap_or_default())
}

/// Start of the next business hour, as the database formats it.
pub async fn next_business_hour(db: &PostgrestClient) -> Result<Value, Error> {
    db.rpc("next_business_hour", &json!({})).await
}

/// Template after `current_index` in a category.
pub async fn get_next_follow_up_model(
    db: &PostgrestClient,
    category_id: &str,
    current_index: i64,
    workspace_id: &str,
) -> Result<Option<FollowUpModelEntry>, Error> {
    let rows: Option<Vec<FollowUpModelEntry>> = db
        .rpc(
            "get_next_follow_up_model",
            &json!({
                "p_category_id": category_id,
                "p_current_index": current_index,
                "p_workspace_id": workspace_id,
            }),
        )
        .await?;
    Ok(rows.and_then(|rows| rows.into_iter().next()))
}

/// Record a sent follow-up.
pub async fn add_follow_up_history(
    db: &PostgrestClient,
    entry: &NewFollowUpHistoryEntry<'_>,
) -> Result<(), Error> {
    let _: Vec<Value> = db.insert("follow_up_history", entry).await?;
    Ok(())
}

/// Advance a job past the template just sent.
pub async fn record_follow_up_send(
    db: &PostgrestClient,
    job_id: &str,
    message_id: &str,
    model: &FollowUpModelEntry,
) -> Result<(), Error> {
    let next_wait = (!model.is_last).then_some(model.wait_seconds);
    let _: Value = db
        .rpc(
            "update_follow_up_job_after_send",
            &json!({
                "p_job_id": job_id,
                "p_message_id": message_id,
                "p_next_model_index": model.next_index,
                "p_next_wait_seconds": next_wait,
                "p_is_completed": model.is_last,
            }),
        )
        .await?;
    Ok(())
}
