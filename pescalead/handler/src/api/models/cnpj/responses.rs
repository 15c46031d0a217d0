//! Response structures for the CNPJ endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::requests::SearchFilters;
use super::{CnpjRecord, FilterOption, SearchResultItem, Simples, Socio};

/// Payload of a single company lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CnpjData {
    /// Full or basic record.
    Record(Box<CnpjRecord>),
    /// Partners only.
    Socios {
        /// Partners, newest first.
        socios: Vec<Socio>,
    },
    /// Tax regime only.
    Simples {
        /// Tax regime.
        simples: Simples,
    },
}

/// Response of the single company lookups, successful or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CnpjLookupResponse {
    /// Whether the company was found.
    pub success: bool,
    /// Data source, always `banco_local`.
    pub provider: String,
    /// The data, when found.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<CnpjData>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the data came from a cache; lookups always hit the database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    /// Handling time.
    pub response_time_ms: u64,
}

/// Response of a prospecting search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    /// Always true; failures use the error body.
    pub success: bool,
    /// Rows matching the filters.
    pub total: i64,
    /// Rows in this page.
    pub returned: usize,
    /// One based page number.
    pub page: i64,
    /// Number of pages of `limit` rows.
    pub total_pages: i64,
    /// The filters as received.
    pub filters_applied: SearchFilters,
    /// The page.
    pub data: Vec<SearchResultItem>,
    /// Handling time.
    pub response_time_ms: u64,
}

/// Counts for a set of filters.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatsPreview {
    /// Establishments matching the filters.
    pub total_matches: i64,
    /// Of those, how many have an email.
    pub com_email: i64,
    /// Of those, how many have a phone.
    pub com_telefone: i64,
    /// Of those, how many have both.
    pub com_email_e_telefone: i64,
}

/// Response of the stats preview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    /// Always true; failures use the error body.
    pub success: bool,
    /// The counts.
    pub preview: StatsPreview,
    /// Handling time.
    pub response_time_ms: u64,
}

/// Kind of control a filter is rendered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Pick any number of options.
    SelectMultiple,
    /// Yes or no.
    Boolean,
    /// Numeric range.
    Range,
    /// Free text.
    Text,
}

/// A named range shortcut.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RangePreset {
    /// Label shown to the user.
    pub label: String,
    /// Lower bound, if any.
    pub min: Option<f64>,
    /// Upper bound, if any.
    pub max: Option<f64>,
}

/// How one filter is presented.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FilterDefinition {
    /// Control kind.
    #[serde(rename = "type")]
    pub kind: FilterKind,
    /// Options of a select.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FilterOption>>,
    /// Lowest accepted value of a range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Highest accepted value of a range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Shortcuts of a range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets: Option<Vec<RangePreset>>,
}

/// Every filter the search accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FilterCatalog {
    /// Name search.
    pub termo: FilterDefinition,
    /// States.
    pub uf: FilterDefinition,
    /// City codes, loaded by the client per state.
    pub municipio: FilterDefinition,
    /// Postal code prefix.
    pub cep_prefixo: FilterDefinition,
    /// Area codes.
    pub ddd: FilterDefinition,
    /// CNAE divisions.
    pub cnae_divisao: FilterDefinition,
    /// CNAE codes, loaded by the client per division.
    pub cnae: FilterDefinition,
    /// Company size.
    pub porte: FilterDefinition,
    /// Registration status.
    pub situacao: FilterDefinition,
    /// Headquarters or branch.
    pub tipo: FilterDefinition,
    /// Legal nature.
    pub natureza_juridica: FilterDefinition,
    /// Share capital.
    pub capital_social: FilterDefinition,
    /// Simples Nacional.
    pub simples: FilterDefinition,
    /// MEI.
    pub mei: FilterDefinition,
    /// Has email.
    pub com_email: FilterDefinition,
    /// Has phone.
    pub com_telefone: FilterDefinition,
    /// Opening date.
    pub data_abertura: FilterDefinition,
    /// Company age in days.
    pub idade_empresa: FilterDefinition,
}

/// Response of the filter catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FiltersResponse {
    /// Always true.
    pub success: bool,
    /// The catalog.
    pub filters: FilterCatalog,
    /// Handling time.
    pub response_time_ms: u64,
}

/// Response of the CNAE lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CnaesResponse {
    /// Always true; failures use the error body.
    pub success: bool,
    /// Codes labelled `"{code} - {description}"`.
    pub cnaes: Vec<FilterOption>,
    /// Number of codes returned.
    pub total: usize,
    /// Handling time.
    pub response_time_ms: u64,
}

/// Response of the CNPJ database health check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CnpjHealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Data source, always `banco_local`.
    pub provider: String,
    /// `connected` or `disconnected`.
    pub database: String,
    /// Database clock, when connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Failure reason, when disconnected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Handling time.
    pub response_time_ms: u64,
}
