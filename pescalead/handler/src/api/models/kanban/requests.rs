//! Request structures for the kanban endpoints.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Leads returned per column when the caller does not say.
pub const DEFAULT_PAGE_SIZE: u64 = 10;
/// Most leads returned per column.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Absent keys are `None`, explicit nulls `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Page size from a query value: positive integers up to 100, else 10.
pub fn page_size(limit: Option<&str>) -> u64 {
    match limit.and_then(|limit| limit.trim().parse::<i64>().ok()) {
        Some(limit) if limit > 0 => (limit as u64).min(MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Largest offset the database accepts, a Postgres `bigint`.
pub const MAX_PAGE_OFFSET: u64 = i64::MAX as u64;

/// Offset from a query value: non-negative integers up to a `bigint`, else 0.
pub fn page_offset(offset: Option<&str>) -> u64 {
    offset
        .and_then(|offset| offset.trim().parse::<u64>().ok())
        .map_or(0, |offset| offset.min(MAX_PAGE_OFFSET))
}

/// Filters for the leads of a column.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadFilters {
    /// Only leads with at least one email.
    pub has_email: bool,
    /// Only leads with a valid WhatsApp number.
    pub has_whatsapp: bool,
    /// Matched against the client name and the company.
    pub search_query: Option<String>,
    /// Exact priority.
    pub priority: Option<String>,
    /// Leads carrying every tag.
    pub tags: Vec<String>,
    /// Assigned user.
    pub assignee_id: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|value| !value.is_empty()).cloned()
}

/// Query of the column leads page.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLeadsQuery {
    /// Page size, default 10, at most 100.
    pub limit: Option<String>,
    /// Rows to skip.
    pub offset: Option<String>,
    /// `true` to keep only leads with an email.
    pub has_email: Option<String>,
    /// `true` to keep only leads with WhatsApp.
    pub has_whatsapp: Option<String>,
    /// Text search, at most 100 characters.
    pub search_query: Option<String>,
    /// `high`, `medium` or `low`.
    pub priority: Option<String>,
    /// Assigned user id.
    pub assignee_id: Option<String>,
    /// Comma separated tags, at most 10.
    pub tags: Option<String>,
}

impl ColumnLeadsQuery {
    /// The filters carried by the query.
    pub fn filters(&self) -> LeadFilters {
        LeadFilters {
            has_email: self.has_email.as_deref() == Some("true"),
            has_whatsapp: self.has_whatsapp.as_deref() == Some("true"),
            search_query: non_empty(&self.search_query),
            priority: non_empty(&self.priority),
            tags: non_empty(&self.tags)
                .map(|tags| tags.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            assignee_id: non_empty(&self.assignee_id),
        }
    }
}

/// Query of the first page of every column.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelLeadsQuery {
    /// Page size per column, default 10, at most 100.
    pub limit: Option<String>,
    /// `true` to keep only leads with an email.
    pub has_email: Option<String>,
    /// `true` to keep only leads with WhatsApp.
    pub has_whatsapp: Option<String>,
    /// Text search.
    pub search_query: Option<String>,
}

impl FunnelLeadsQuery {
    /// The filters carried by the query.
    pub fn filters(&self) -> LeadFilters {
        LeadFilters {
            has_email: self.has_email.as_deref() == Some("true"),
            has_whatsapp: self.has_whatsapp.as_deref() == Some("true"),
            search_query: non_empty(&self.search_query),
            ..Default::default()
        }
    }
}

/// Body of the funnel creation.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateFunnelRequestBody {
    /// Required.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A column as sent by the board editor. Columns whose id is unknown are
/// created.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ColumnUpdate {
    /// Id of an existing column, or a placeholder for a new one.
    #[serde(default)]
    pub id: Option<String>,
    /// Title.
    pub title: String,
    /// Wanted position; moved forward while taken.
    pub position: i64,
}

/// Body of the funnel update.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpdateFunnelRequestBody {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// The full list of columns the funnel should have.
    #[serde(default)]
    pub columns: Option<Vec<ColumnUpdate>>,
}

/// Assignee fields of a lead body.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssigneeInput {
    /// User id.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Body of the lead creation.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateLeadRequestBody {
    /// Required contact name.
    pub client_name: Option<String>,
    /// Required target column.
    #[serde(rename = "column_id")]
    pub column_id: Option<String>,
    /// Company.
    pub company: Option<String>,
    /// Email.
    pub email: Option<String>,
    /// Phone.
    pub phone: Option<String>,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Deal value.
    pub deal_value: Option<f64>,
    /// `high`, `medium` or `low`.
    pub priority: Option<String>,
    /// First contact date.
    pub contact_date: Option<String>,
    /// Expected close date.
    pub expected_close_date: Option<String>,
    /// Due date.
    pub due_date: Option<String>,
    /// Tags.
    pub tags: Option<Vec<String>>,
    /// Notes.
    pub notes: Option<String>,
    /// Starred.
    pub is_important: Option<bool>,
    /// Assigned user.
    pub assignee: Option<AssigneeInput>,
}

/// Body of the lead update. Absent fields are left alone; nulls clear.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateLeadRequestBody {
    /// Contact name.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub client_name: Option<Option<String>>,
    /// Company.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub company: Option<Option<String>>,
    /// Email.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    /// Phone.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    /// Avatar URL.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub avatar: Option<Option<String>>,
    /// Deal value.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<f64>)]
    pub deal_value: Option<Option<f64>>,
    /// Priority; empty values are ignored.
    pub priority: Option<String>,
    /// First contact date.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub contact_date: Option<Option<String>>,
    /// Expected close date.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub expected_close_date: Option<Option<String>>,
    /// Due date.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub due_date: Option<Option<String>>,
    /// Tags; null is ignored.
    pub tags: Option<Vec<String>>,
    /// Notes.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub notes: Option<Option<String>>,
    /// Starred.
    #[serde(deserialize_with = "present")]
    #[schema(value_type = Option<bool>)]
    pub is_important: Option<Option<bool>>,
    /// Assigned user; null is ignored.
    pub assignee: Option<AssigneeInput>,
}

/// Body of a single move.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveLeadRequestBody {
    /// Target column.
    #[serde(default)]
    pub to_column_id: Option<String>,
    /// Target position.
    #[serde(default)]
    pub to_position: Option<i64>,
}

/// One move of a batch.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadMove {
    /// Lead to move.
    pub lead_id: String,
    /// Target column.
    pub to_column_id: String,
    /// Target position.
    pub to_position: i64,
}

/// Body of the batch move.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchMoveRequestBody {
    /// Moves, applied in order.
    #[serde(default)]
    pub moves: Option<Vec<LeadMove>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case(None, 10; "missing")]
    #[test_case(Some("25"), 25; "given")]
    #[test_case(Some("500"), 100; "capped")]
    #[test_case(Some("0"), 10; "zero")]
    #[test_case(Some("-3"), 10; "negative")]
    #[test_case(Some("abc"), 10; "garbage")]
    fn page_sizes(limit: Option<&str>, expected: u64) {
        assert_eq!(page_size(limit), expected);
    }

    #[test]
    fn offsets_default_to_zero() {
        assert_eq!(page_offset(Some("20")), 20);
        assert_eq!(page_offset(Some("-1")), 0);
        assert_eq!(page_offset(None), 0);
        assert_eq!(page_offset(Some(&u64::MAX.to_string())), MAX_PAGE_OFFSET);
    }

    #[test]
    fn column_query_filters() {
        let query = ColumnLeadsQuery {
            has_email: Some("true".to_string()),
            has_whatsapp: Some("1".to_string()),
            search_query: Some(String::new()),
            tags: Some("vip,quente".to_string()),
            priority: Some("high".to_string()),
            ..Default::default()
        };

        let filters = query.filters();
        assert!(filters.has_email);
        assert!(!filters.has_whatsapp);
        assert_eq!(filters.search_query, None);
        assert_eq!(filters.tags, vec!["vip".to_string(), "quente".to_string()]);
        assert_eq!(filters.priority.as_deref(), Some("high"));
    }

    #[test]
    fn update_body_tells_null_from_absent() {
        let body: UpdateLeadRequestBody = serde_json::from_value(json!({
            "email": null,
            "dealValue": 1200.0,
            "priority": "high"
        }))
        .unwrap();

        assert_eq!(body.email, Some(None));
        assert_eq!(body.deal_value, Some(Some(1200.0)));
        assert_eq!(body.phone, None);
        assert_eq!(body.priority.as_deref(), Some("high"));
    }

    #[test]
    fn create_body_reads_the_snake_case_column() {
        let body: CreateLeadRequestBody = serde_json::from_value(json!({
            "clientName": "Maria",
            "column_id": "c1",
            "isImportant": true
        }))
        .unwrap();

        assert_eq!(body.client_name.as_deref(), Some("Maria"));
        assert_eq!(body.column_id.as_deref(), Some("c1"));
        assert_eq!(body.is_important, Some(true));
    }
}
