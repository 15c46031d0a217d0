//! Turns lead rows into board cards.

use std::collections::HashMap;

use serde_json::Value;

use crate::api::models::kanban::{Assignee, Column, Funnel, Lead};
use crate::database::entries::kanban::{
    ColumnEntry, CustomValueEntry, FunnelEntry, InstagramEntry, LeadEntry,
};

use super::UNNAMED_CLIENT;

/// Contact details resolved from custom field values.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct LeadContacts {
    /// Main email.
    pub email: Option<String>,
    /// Main phone.
    pub phone: Option<String>,
    /// Instagram profile URL.
    pub instagram: Option<String>,
}

/// Picks one email and one phone per lead. A field whose name contains
/// `principal` wins over the others; otherwise the first value is kept.
pub fn collect_contacts(
    values: &[CustomValueEntry],
    instagram: &[InstagramEntry],
) -> HashMap<String, LeadContacts> {
    let mut contacts: HashMap<String, LeadContacts> = HashMap::new();

    for entry in values {
        let Some(Value::String(value)) = &entry.value else {
            continue;
        };
        let field_type = entry
            .custom_fields
            .as_ref()
            .and_then(|field| field.field_type.as_deref())
            .unwrap_or_default();
        let name = entry
            .custom_fields
            .as_ref()
            .and_then(|field| field.name.as_deref())
            .unwrap_or_default()
            .to_lowercase();
        let principal = name.contains("principal");
        let lead = contacts.entry(entry.lead_id.clone()).or_default();

        if field_type == "email" || name.contains("email") {
            if value.contains('@') && (principal || lead.email.is_none()) {
                lead.email = Some(value.trim().to_string());
            }
        } else if (field_type == "phone" || name.contains("telefone") || name.contains("phone"))
            && (principal || lead.phone.is_none())
        {
            lead.phone = Some(value.trim().to_string());
        }
    }

    for entry in instagram {
        contacts.entry(entry.lead_id.clone()).or_default().instagram = entry.instagram_url.clone();
    }

    contacts
}

/// Board card of a lead row.
pub fn map_lead(entry: LeadEntry, contacts: Option<&LeadContacts>) -> Lead {
    let contacts = contacts.cloned().unwrap_or_default();
    let assignee = entry.assigned_to.map(|id| Assignee {
        id,
        name: entry
            .assignee_name
            .unwrap_or_else(|| "Não atribuído".to_string()),
        avatar: entry.assignee_avatar.unwrap_or_default(),
    });

    Lead {
        id: entry.id,
        workspace_id: entry.workspace_id,
        funnel_id: entry.funnel_id,
        column_id: entry.column_id,
        position: entry.position,
        client_name: entry
            .client_name
            .filter(|name| name != UNNAMED_CLIENT)
            .unwrap_or_default(),
        company: entry.company.unwrap_or_default(),
        email: contacts.email.unwrap_or_default(),
        phone: contacts.phone.unwrap_or_default(),
        instagram: contacts.instagram,
        avatar: entry.avatar_url.unwrap_or_default(),
        deal_value: entry.deal_value.unwrap_or_default(),
        priority: entry.priority.unwrap_or_else(|| "medium".to_string()),
        status: entry.status.unwrap_or_else(|| "active".to_string()),
        contact_date: entry.contact_date,
        expected_close_date: entry.expected_close_date,
        due_date: entry.due_date,
        tags: entry.tags,
        notes: entry.notes.unwrap_or_default(),
        is_important: entry.is_important.unwrap_or_default(),
        assignee,
        comments_count: entry.comments_count.unwrap_or_default(),
        attachments_count: entry.attachments_count.unwrap_or_default(),
        calls_count: entry.calls_count.unwrap_or_default(),
        emails_count: entry.emails_count.unwrap_or_default(),
        created_by: entry.created_by,
        updated_by: entry.updated_by,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    }
}

/// Column of a funnel row.
pub fn map_column(entry: ColumnEntry, funnel_id: &str) -> Column {
    Column {
        id: entry.id,
        title: entry.title,
        position: entry.position,
        color: entry.color,
        funnel_id: entry.funnel_id.unwrap_or_else(|| funnel_id.to_string()),
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    }
}

/// Funnel with its embedded columns sorted by position.
pub fn map_funnel(mut entry: FunnelEntry) -> Funnel {
    let mut columns = std::mem::take(&mut entry.funnel_columns);
    columns.sort_by_key(|column| column.position);
    let columns = columns
        .into_iter()
        .map(|column| map_column(column, &entry.id))
        .collect();

    Funnel {
        id: entry.id,
        name: entry.name,
        description: entry.description,
        workspace_id: entry.workspace_id,
        is_active: entry.is_active,
        position: entry.position,
        created_by: entry.created_by,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
        columns,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::database::entries::kanban::CustomFieldRef;

    fn value(lead: &str, name: &str, field_type: &str, value: Value) -> CustomValueEntry {
        CustomValueEntry {
            lead_id: lead.to_string(),
            value: Some(value),
            custom_fields: Some(CustomFieldRef {
                name: Some(name.to_string()),
                field_type: Some(field_type.to_string()),
            }),
        }
    }

    #[test]
    fn principal_fields_win() {
        let values = vec![
            value("l1", "WHOIS Email", "email", json!("whois@acme.com")),
            value("l1", "Email Principal", "email", json!(" main@acme.com ")),
            value("l1", "Outro email", "email", json!("other@acme.com")),
            value("l1", "Telefone", "phone", json!("11 99999-0000")),
            value("l1", "Telefone 2", "phone", json!("11 88888-0000")),
        ];

        let contacts = collect_contacts(&values, &[]);
        assert_eq!(contacts["l1"].email.as_deref(), Some("main@acme.com"));
        assert_eq!(contacts["l1"].phone.as_deref(), Some("11 99999-0000"));
    }

    #[test]
    fn invalid_values_are_skipped() {
        let values = vec![
            value("l1", "Email", "email", json!("not an email")),
            value("l1", "Telefone", "phone", json!(5511999990000u64)),
        ];

        let contacts = collect_contacts(&values, &[]);
        assert_eq!(contacts["l1"].email, None);
        assert_eq!(contacts["l1"].phone, None);
    }

    #[test]
    fn instagram_is_attached() {
        let instagram = vec![InstagramEntry {
            lead_id: "l2".to_string(),
            instagram_url: Some("https://instagram.com/acme".to_string()),
        }];

        let contacts = collect_contacts(&[], &instagram);
        assert_eq!(
            contacts["l2"].instagram.as_deref(),
            Some("https://instagram.com/acme")
        );
    }

    #[test]
    fn lead_defaults() {
        let lead = map_lead(
            LeadEntry {
                id: "l1".to_string(),
                client_name: Some(UNNAMED_CLIENT.to_string()),
                ..Default::default()
            },
            None,
        );

        assert_eq!(lead.client_name, "");
        assert_eq!(lead.company, "");
        assert_eq!(lead.priority, "medium");
        assert_eq!(lead.status, "active");
        assert_eq!(lead.deal_value, 0.0);
        assert!(lead.tags.is_empty());
        assert!(!lead.is_important);
        assert_eq!(lead.assignee, None);
    }

    #[test]
    fn assignee_only_when_assigned() {
        let lead = map_lead(
            LeadEntry {
                id: "l1".to_string(),
                assigned_to: Some("u1".to_string()),
                ..Default::default()
            },
            Some(&LeadContacts {
                email: Some("a@b.com".to_string()),
                ..Default::default()
            }),
        );

        assert_eq!(
            lead.assignee,
            Some(Assignee {
                id: "u1".to_string(),
                name: "Não atribuído".to_string(),
                avatar: String::new(),
            })
        );
        assert_eq!(lead.email, "a@b.com");
    }

    #[test]
    fn funnel_columns_are_sorted() {
        let funnel = map_funnel(FunnelEntry {
            id: "f1".to_string(),
            funnel_columns: vec![
                ColumnEntry {
                    id: "c2".to_string(),
                    position: 1,
                    ..Default::default()
                },
                ColumnEntry {
                    id: "c1".to_string(),
                    position: 0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        let ids: Vec<_> = funnel.columns.iter().map(|column| column.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2"]);
        assert!(funnel.columns.iter().all(|column| column.funnel_id == "f1"));
    }
}
