//! Kanban rows: funnels, their columns, leads and the denormalized stats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{null_as_default, numeric, numeric_or_zero};

/// Columns selected for a funnel, with its columns embedded.
pub const FUNNEL_COLUMNS: &str = "id,name,description,is_active,position,workspace_id,created_by,\
created_at,updated_at,funnel_columns(id,title,position,color,created_at,updated_at)";

/// Columns selected for a page of leads. Instagram is resolved separately.
pub const LEAD_PAGE_COLUMNS: &str = "id,workspace_id,funnel_id,column_id,position,client_name,\
company,avatar_url,deal_value,priority,status,contact_date,expected_close_date,due_date,tags,\
notes,is_important,assigned_to,assignee_name,assignee_avatar,created_by,updated_by,created_at,\
updated_at,emails_count,calls_count,whatsapp_valid,whatsapp_jid,whatsapp_name";

/// Columns selected to resolve lead emails and phones.
pub const CUSTOM_VALUE_COLUMNS: &str = "lead_id,value,custom_fields!inner(name,field_type)";

/// A column of a funnel.
#[derive(Clone, Default, Debug, PartialEq, Deserialize, Serialize)]
pub struct ColumnEntry {
    /// Column id.
    pub id: String,
    /// Column title.
    #[serde(default)]
    pub title: String,
    /// Position within the funnel, starting at zero.
    #[serde(default)]
    pub position: i64,
    /// Display color.
    #[serde(default)]
    pub color: Option<String>,
    /// Owning funnel; absent when embedded in a funnel row.
    #[serde(default)]
    pub funnel_id: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A funnel row.
#[derive(Clone, Default, Debug, PartialEq, Deserialize, Serialize)]
pub struct FunnelEntry {
    /// Funnel id.
    pub id: String,
    /// Funnel name.
    #[serde(default)]
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// False once soft deleted.
    #[serde(default)]
    pub is_active: bool,
    /// Position among the workspace funnels.
    #[serde(default)]
    pub position: i64,
    /// Owning workspace.
    #[serde(default)]
    pub workspace_id: String,
    /// Creator.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Embedded columns, in no particular order.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing)]
    pub funnel_columns: Vec<ColumnEntry>,
}

/// Funnel columns for insertion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewColumnEntry<'a> {
    /// Owning funnel.
    pub funnel_id: &'a str,
    /// Title.
    pub title: &'a str,
    /// Position.
    pub position: i64,
}

/// A funnel for insertion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewFunnelEntry<'a> {
    /// Owning workspace.
    pub workspace_id: &'a str,
    /// Name.
    pub name: &'a str,
    /// Description.
    pub description: Option<&'a str>,
    /// Always true on creation.
    pub is_active: bool,
    /// Position after the last funnel.
    pub position: i64,
    /// Creator.
    pub created_by: &'a str,
}

/// Just a position.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct PositionEntry {
    /// Position.
    #[serde(default)]
    pub position: i64,
}

/// Just an id.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct IdEntry {
    /// Id.
    pub id: String,
}

/// A lead row. Every column is optional so that partial selects decode.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LeadEntry {
    /// Lead id.
    pub id: String,
    /// Owning workspace.
    pub workspace_id: Option<String>,
    /// Owning funnel.
    pub funnel_id: Option<String>,
    /// Current column.
    pub column_id: Option<String>,
    /// Position within the column.
    pub position: Option<i64>,
    /// Contact name; `Sem nome` marks a missing one.
    pub client_name: Option<String>,
    /// Company name.
    pub company: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Deal value.
    #[serde(deserialize_with = "numeric")]
    pub deal_value: Option<f64>,
    /// `high`, `medium` or `low`.
    pub priority: Option<String>,
    /// `active`, `archived` or `deleted`.
    pub status: Option<String>,
    /// First contact date.
    pub contact_date: Option<String>,
    /// Expected close date.
    pub expected_close_date: Option<String>,
    /// Due date.
    pub due_date: Option<String>,
    /// Tags.
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// Free notes.
    pub notes: Option<String>,
    /// Starred.
    pub is_important: Option<bool>,
    /// Assigned user id.
    pub assigned_to: Option<String>,
    /// Assigned user name.
    pub assignee_name: Option<String>,
    /// Assigned user avatar.
    pub assignee_avatar: Option<String>,
    /// Creator.
    pub created_by: Option<String>,
    /// Last editor.
    pub updated_by: Option<String>,
    /// Creation time.
    pub created_at: Option<String>,
    /// Last update time.
    pub updated_at: Option<String>,
    /// Comments on the lead.
    pub comments_count: Option<i64>,
    /// Attachments on the lead.
    pub attachments_count: Option<i64>,
    /// Logged calls.
    pub calls_count: Option<i64>,
    /// Known emails.
    pub emails_count: Option<i64>,
    /// Whether the phone is a valid WhatsApp number.
    pub whatsapp_valid: Option<bool>,
}

/// A lead for insertion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewLeadEntry {
    /// Owning workspace.
    pub workspace_id: String,
    /// Owning funnel.
    pub funnel_id: String,
    /// Column.
    pub column_id: String,
    /// Contact name.
    pub client_name: String,
    /// Company, empty when unknown.
    pub company: String,
    /// Email.
    pub email: Option<String>,
    /// Phone.
    pub phone: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Deal value.
    pub deal_value: f64,
    /// Priority, `medium` by default.
    pub priority: String,
    /// Always `active` on creation.
    pub status: String,
    /// First contact date.
    pub contact_date: Option<String>,
    /// Expected close date.
    pub expected_close_date: Option<String>,
    /// Due date.
    pub due_date: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Notes.
    pub notes: Option<String>,
    /// Position after the last lead of the column.
    pub position: i64,
    /// Starred.
    pub is_important: bool,
    /// Assigned user name.
    pub assignee_name: Option<String>,
    /// Assigned user avatar.
    pub assignee_avatar: Option<String>,
    /// Assigned user id.
    pub assigned_to: Option<String>,
    /// Creator.
    pub created_by: String,
    /// Last editor.
    pub updated_by: String,
}

/// Changes to a lead. Outer `None` leaves a column alone, `Some(None)`
/// clears it.
#[derive(Clone, Default, Debug, PartialEq, Serialize)]
pub struct LeadUpdate {
    /// Editor.
    pub updated_by: String,
    /// New `client_name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<Option<String>>,
    /// New `company`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<Option<String>>,
    /// New `email`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Option<String>>,
    /// New `phone`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    /// New `avatar_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
    /// New `deal_value`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_value: Option<Option<f64>>,
    /// New `priority`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// New `contact_date`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_date: Option<Option<String>>,
    /// New `expected_close_date`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_close_date: Option<Option<String>>,
    /// New `due_date`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<String>>,
    /// New `tags`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New `notes`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    /// New `is_important`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_important: Option<Option<bool>>,
    /// New `assignee_name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_name: Option<Option<String>>,
    /// New `assignee_avatar`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_avatar: Option<Option<String>>,
    /// New `assigned_to`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<String>>,
}

/// Changes applied when a lead is dragged.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeadMoveUpdate<'a> {
    /// Target column.
    pub column_id: &'a str,
    /// Target position.
    pub position: i64,
    /// Editor.
    pub updated_by: &'a str,
    /// Move time, RFC 3339.
    pub last_activity_at: String,
}

/// Per column counters kept in `funnel_stats.column_stats`.
#[derive(Clone, Copy, Default, Debug, PartialEq, Deserialize, Serialize)]
pub struct ColumnStatsEntry {
    /// Active leads in the column.
    #[serde(default)]
    pub count: i64,
    /// Sum of their deal values.
    #[serde(default, deserialize_with = "numeric_or_zero")]
    pub total_value: f64,
}

/// Denormalized counters of a funnel.
#[derive(Clone, Default, Debug, PartialEq, Deserialize, Serialize)]
pub struct FunnelStatsEntry {
    /// Active leads.
    #[serde(default)]
    pub total_leads: i64,
    /// Sum of deal values.
    #[serde(default, deserialize_with = "numeric_or_zero")]
    pub total_value: f64,
    /// Leads with priority `high`.
    #[serde(default)]
    pub high_priority_count: i64,
    /// Counters per column id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub column_stats: BTreeMap<String, ColumnStatsEntry>,
}

/// A fresh stats row for a new funnel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewFunnelStatsEntry<'a> {
    /// Funnel.
    pub funnel_id: &'a str,
    /// Workspace.
    pub workspace_id: &'a str,
    /// Counters, all zero.
    #[serde(flatten)]
    pub stats: FunnelStatsEntry,
}

/// Name and type of the custom field a value belongs to.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct CustomFieldRef {
    /// Field name, e.g. `Email Principal`.
    #[serde(default)]
    pub name: Option<String>,
    /// Field type, e.g. `email` or `phone`.
    #[serde(default)]
    pub field_type: Option<String>,
}

/// A custom field value of a lead.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
pub struct CustomValueEntry {
    /// Lead.
    pub lead_id: String,
    /// Stored value, usually a string.
    #[serde(default)]
    pub value: Option<Value>,
    /// The field.
    #[serde(default)]
    pub custom_fields: Option<CustomFieldRef>,
}

/// A row of `get_leads_instagram`.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct InstagramEntry {
    /// Lead.
    pub lead_id: String,
    /// Profile URL.
    #[serde(default)]
    pub instagram_url: Option<String>,
}

/// A membership row.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
pub struct MemberEntry {
    /// `owner`, `admin`, `member`, ...
    #[serde(default)]
    pub role: Option<String>,
    /// Extra permissions.
    #[serde(default)]
    pub permissions: Option<Value>,
}

/// The owner of a workspace.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct WorkspaceOwnerEntry {
    /// Owner user id.
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn funnel_rows_embed_columns() {
        let funnel: FunnelEntry = serde_json::from_value(json!({
            "id": "f1",
            "name": "Vendas",
            "description": null,
            "is_active": true,
            "position": 0,
            "workspace_id": "w1",
            "funnel_columns": [
                {"id": "c2", "title": "B", "position": 1, "color": null},
                {"id": "c1", "title": "A", "position": 0, "color": "#fff"}
            ]
        }))
        .unwrap();

        assert_eq!(funnel.funnel_columns.len(), 2);
        assert_eq!(funnel.funnel_columns[1].color.as_deref(), Some("#fff"));
    }

    #[test]
    fn stats_rows_accept_string_numerics() {
        let stats: FunnelStatsEntry = serde_json::from_value(json!({
            "total_leads": 3,
            "total_value": "1500.50",
            "high_priority_count": 1,
            "column_stats": {"c1": {"count": 3, "total_value": 1500.5}}
        }))
        .unwrap();

        assert_eq!(stats.total_value, 1500.5);
        assert_eq!(stats.column_stats["c1"].count, 3);
    }

    #[test]
    fn lead_updates_only_send_present_fields() {
        let update = LeadUpdate {
            updated_by: "u1".to_string(),
            email: Some(None),
            priority: Some("high".to_string()),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"updated_by": "u1", "email": null, "priority": "high"})
        );
    }

    #[test]
    fn new_stats_rows_flatten_the_counters() {
        let row = NewFunnelStatsEntry {
            funnel_id: "f1",
            workspace_id: "w1",
            stats: FunnelStatsEntry::default(),
        };

        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({
                "funnel_id": "f1",
                "workspace_id": "w1",
                "total_leads": 0,
                "total_value": 0.0,
                "high_priority_count": 0,
                "column_stats": {}
            })
        );
    }
}
