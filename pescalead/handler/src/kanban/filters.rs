//! Lead filters of the column pages.

use crate::api::models::kanban::requests::LeadFilters;
use crate::common::error::Error;
use crate::database::postgrest::{sanitize_pattern, Query};

/// Longest accepted search text.
pub const MAX_SEARCH_LENGTH: usize = 100;
/// Most tags a filter may carry.
pub const MAX_TAGS: usize = 10;

/// Rejects filters too large to send to the database.
pub fn validate(filters: &LeadFilters) -> Result<(), Error> {
    if filters
        .search_query
        .as_deref()
        .is_some_and(|query| query.chars().count() > MAX_SEARCH_LENGTH)
    {
        return Err(Error::BadRequest(
            "Search query too long (max 100 characters)".to_string(),
        ));
    }
    if filters.tags.len() > MAX_TAGS {
        return Err(Error::BadRequest("Too many tags (max 10)".to_string()));
    }
    Ok(())
}

/// Adds the filters to a lead query.
pub fn apply(mut query: Query, filters: &LeadFilters) -> Query {
    if filters.has_email {
        query = query.gt("emails_count", 0);
    }
    if filters.has_whatsapp {
        query = query.eq("whatsapp_valid", true);
    }
    if let Some(search) = filters
        .search_query
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty())
    {
        let search = sanitize_pattern(search);
        query = query.or(&format!(
            "client_name.ilike.*{search}*,company.ilike.*{search}*"
        ));
    }
    if let Some(priority) = &filters.priority {
        query = query.eq("priority", priority);
    }
    if !filters.tags.is_empty() {
        query = query.contains("tags", &filters.tags);
    }
    if let Some(assignee) = &filters.assignee_id {
        query = query.eq("assigned_to", assignee);
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(query: &'a Query, key: &str) -> Option<&'a str> {
        query
            .params()
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn empty_filters_add_nothing() {
        let query = apply(Query::new(), &LeadFilters::default());
        assert!(query.params().is_empty());
    }

    #[test]
    fn every_filter_maps_to_a_condition() {
        let filters = LeadFilters {
            has_email: true,
            has_whatsapp: true,
            search_query: Some("  acme ".to_string()),
            priority: Some("high".to_string()),
            tags: vec!["vip".to_string()],
            assignee_id: Some("u1".to_string()),
        };

        let query = apply(Query::new(), &filters);
        assert_eq!(param(&query, "emails_count"), Some("gt.0"));
        assert_eq!(param(&query, "whatsapp_valid"), Some("eq.true"));
        assert_eq!(
            param(&query, "or"),
            Some("(client_name.ilike.*acme*,company.ilike.*acme*)")
        );
        assert_eq!(param(&query, "priority"), Some("eq.high"));
        assert_eq!(param(&query, "assigned_to"), Some("eq.u1"));
        assert!(param(&query, "tags").is_some());
    }

    #[test]
    fn blank_search_is_ignored() {
        let filters = LeadFilters {
            search_query: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(apply(Query::new(), &filters).params().is_empty());
    }

    #[test]
    fn oversized_filters_are_rejected() {
        let long = LeadFilters {
            search_query: Some("a".repeat(101)),
            ..Default::default()
        };
        assert_eq!(
            validate(&long).unwrap_err().error_message(),
            "Search query too long (max 100 characters)"
        );

        let tags = LeadFilters {
            tags: (0..11).map(|tag| tag.to_string()).collect(),
            ..Default::default()
        };
        assert_eq!(validate(&tags).unwrap_err().error_message(), "Too many tags (max 10)");

        assert!(validate(&LeadFilters::default()).is_ok());
    }
}
