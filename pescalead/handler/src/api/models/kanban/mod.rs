//! Kanban board resources: funnels, columns, leads and funnel statistics.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Requests.
pub mod requests;
/// Responses.
pub mod responses;

/// A column of a funnel.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Column {
    /// Column id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Position within the funnel.
    pub position: i64,
    /// Display color.
    pub color: Option<String>,
    /// Owning funnel.
    pub funnel_id: String,
    /// Creation time.
    pub created_at: Option<String>,
    /// Last update time.
    pub updated_at: Option<String>,
}

/// A sales funnel with its columns sorted by position.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Funnel {
    /// Funnel id.
    pub id: String,
    /// Name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Owning workspace.
    pub workspace_id: String,
    /// False once deleted.
    pub is_active: bool,
    /// Position among the workspace funnels.
    pub position: i64,
    /// Creator.
    pub created_by: Option<String>,
    /// Creation time.
    pub created_at: Option<String>,
    /// Last update time.
    pub updated_at: Option<String>,
    /// Columns, by position.
    pub columns: Vec<Column>,
}

/// User a lead is assigned to.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Assignee {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Avatar URL, empty when unknown.
    pub avatar: String,
}

/// A lead card.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Lead {
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
    /// Contact name; empty when unknown.
    #[serde(rename = "clientName")]
    pub client_name: String,
    /// Company; empty when unknown.
    pub company: String,
    /// Main email; empty when unknown.
    pub email: String,
    /// Main phone; empty when unknown.
    pub phone: String,
    /// Instagram profile, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    /// Avatar URL; empty when unknown.
    pub avatar: String,
    /// Deal value.
    #[serde(rename = "dealValue")]
    pub deal_value: f64,
    /// `high`, `medium` or `low`.
    pub priority: String,
    /// `active`, `archived` or `deleted`.
    pub status: String,
    /// First contact date.
    #[serde(rename = "contactDate", skip_serializing_if = "Option::is_none")]
    pub contact_date: Option<String>,
    /// Expected close date.
    #[serde(rename = "expectedCloseDate", skip_serializing_if = "Option::is_none")]
    pub expected_close_date: Option<String>,
    /// Due date.
    #[serde(rename = "dueDate", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Notes; empty when none.
    pub notes: String,
    /// Starred.
    #[serde(rename = "isImportant")]
    pub is_important: bool,
    /// Assigned user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
    /// Comments.
    #[serde(rename = "commentsCount")]
    pub comments_count: i64,
    /// Attachments.
    #[serde(rename = "attachmentsCount")]
    pub attachments_count: i64,
    /// Logged calls.
    #[serde(rename = "callsCount")]
    pub calls_count: i64,
    /// Known emails.
    #[serde(rename = "emailsCount")]
    pub emails_count: i64,
    /// Creator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Last editor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    /// Creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last update time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Count and value of the leads in one column.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStats {
    /// Column id.
    pub column_id: String,
    /// Column title.
    pub column_title: String,
    /// Active leads.
    pub count: i64,
    /// Sum of their deal values.
    pub value: f64,
}

/// Statistics of a funnel over its active leads.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStats {
    /// Active leads.
    pub total_leads: i64,
    /// Sum of deal values.
    pub total_value: f64,
    /// Leads with priority `high`.
    pub high_priority_count: i64,
    /// Same as `total_leads`.
    pub active_leads: i64,
    /// Share of leads in the last column, in percent with two decimals.
    pub conversion_rate: f64,
    /// Per column breakdown, by position.
    pub leads_by_column: Vec<ColumnStats>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn leads_use_the_board_field_names() {
        let lead = Lead {
            id: "l1".to_string(),
            client_name: "Maria".to_string(),
            deal_value: 10.0,
            priority: "medium".to_string(),
            status: "active".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&lead).unwrap();
        assert_eq!(value["clientName"], "Maria");
        assert_eq!(value["dealValue"], 10.0);
        assert_eq!(value["isImportant"], false);
        assert_eq!(value["commentsCount"], 0);
        assert!(value.get("assignee").is_none());
        assert!(value.get("instagram").is_none());
        assert!(value.get("contactDate").is_none());
    }

    #[test]
    fn stats_are_camel_case() {
        let stats = FunnelStats {
            total_leads: 2,
            leads_by_column: vec![ColumnStats {
                column_id: "c1".to_string(),
                column_title: "Novo Lead".to_string(),
                count: 2,
                value: 0.0,
            }],
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({
                "totalLeads": 2,
                "totalValue": 0.0,
                "highPriorityCount": 0,
                "activeLeads": 0,
                "conversionRate": 0.0,
                "leadsByColumn": [
                    {"columnId": "c1", "columnTitle": "Novo Lead", "count": 2, "value": 0.0}
                ]
            })
        );
    }
}
