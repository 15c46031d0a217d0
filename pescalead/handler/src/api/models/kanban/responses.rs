//! Response structures for the kanban endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Column, Funnel, FunnelStats, Lead};

/// Funnels of a workspace.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GetFunnelsResponse {
    /// Active funnels by position.
    pub funnels: Vec<Funnel>,
}

/// A single funnel.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FunnelResponse {
    /// The funnel.
    pub funnel: Funnel,
}

/// Columns of a funnel.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GetColumnsResponse {
    /// Columns by position.
    pub columns: Vec<Column>,
}

/// A single column.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ColumnResponse {
    /// The column.
    pub column: Column,
}

/// A page of leads of one column.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetLeadsResponse {
    /// Leads by position.
    pub leads: Vec<Lead>,
    /// Leads matching the filters.
    pub total: u64,
    /// Whether another page exists.
    pub has_more: bool,
    /// Page size used.
    pub limit: u64,
    /// Offset used.
    pub offset: u64,
}

/// First page of every column of a funnel.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GetFunnelLeadsResponse {
    /// Pages keyed by column id.
    pub columns: BTreeMap<String, GetLeadsResponse>,
}

/// A single lead.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeadResponse {
    /// The lead.
    pub lead: Lead,
}

/// Outcome of one move of a batch.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchMoveResult {
    /// Whether the move was applied.
    pub success: bool,
    /// The lead.
    pub lead_id: String,
    /// The moved lead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead: Option<Lead>,
    /// Why the move failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a batch move.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchMoveResponse {
    /// One result per move, in order.
    pub results: Vec<BatchMoveResult>,
}

/// Acknowledgement of a delete.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    /// Always true.
    pub success: bool,
}

/// Funnel statistics.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FunnelStatsResponse {
    /// The statistics.
    pub stats: FunnelStats,
}
