//! Request structures for the CNPJ endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Query of the single company lookups.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnpjQuery {
    /// CNPJ, formatted or digits only.
    pub cnpj: Option<String>,
}

/// Query of the CNAE catalog lookup.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnaesQuery {
    /// Text matched against the description or the code.
    pub q: Option<String>,
    /// Two digit division the codes must start with.
    pub divisao: Option<String>,
    /// Maximum number of codes; defaults to 100, capped at 500.
    pub limit: Option<String>,
}

/// Sort direction of a search.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderDir {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

/// Prospecting filters. Every filter is optional; present filters are
/// combined with `AND`.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SearchFilters {
    /// Matched against the trade name or the legal name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termo: Option<String>,
    /// Free-text location, e.g. `"Joao Pessoa, Paraiba, Brasil"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localizacao: Option<String>,
    /// State codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uf: Option<Vec<String>>,
    /// City codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipio: Option<Vec<String>>,
    /// Part of the city name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipio_nome: Option<String>,
    /// Leading digits of the postal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cep_prefixo: Option<String>,
    /// Area codes of the first phone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ddd: Option<Vec<String>>,
    /// Two digit CNAE divisions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnae_divisao: Option<Vec<String>>,
    /// Full CNAE codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnae: Option<Vec<String>>,
    /// Company size codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub porte: Option<Vec<String>>,
    /// Minimum share capital in BRL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capital_social_min: Option<f64>,
    /// Maximum share capital in BRL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capital_social_max: Option<f64>,
    /// Registration status codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub situacao: Option<Vec<String>>,
    /// `1` for headquarters, `2` for branches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo: Option<Vec<String>>,
    /// Legal nature codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natureza_juridica: Option<Vec<String>>,
    /// Simples Nacional membership.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simples: Option<bool>,
    /// MEI registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mei: Option<bool>,
    /// Only companies with an email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub com_email: Option<bool>,
    /// Only companies with a phone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub com_telefone: Option<bool>,
    /// Opened on or after, `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_abertura_min: Option<String>,
    /// Opened on or before, `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_abertura_max: Option<String>,
    /// Opened at most this many days ago.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idade_max_dias: Option<i64>,
    /// Opened at least this many days ago.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idade_min_dias: Option<i64>,
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn non_empty_list(value: &Option<Vec<String>>) -> bool {
    value.as_ref().is_some_and(|v| !v.is_empty())
}

impl SearchFilters {
    /// Whether at least one filter constrains the search. Booleans and
    /// numbers count as soon as they are present.
    pub fn has_any(&self) -> bool {
        [
            &self.termo,
            &self.localizacao,
            &self.municipio_nome,
            &self.cep_prefixo,
            &self.data_abertura_min,
            &self.data_abertura_max,
        ]
        .into_iter()
        .any(non_empty)
            || [
                &self.uf,
                &self.municipio,
                &self.ddd,
                &self.cnae_divisao,
                &self.cnae,
                &self.porte,
                &self.situacao,
                &self.tipo,
                &self.natureza_juridica,
            ]
            .into_iter()
            .any(non_empty_list)
            || [self.simples, self.mei, self.com_email, self.com_telefone]
                .iter()
                .any(Option::is_some)
            || self.capital_social_min.is_some()
            || self.capital_social_max.is_some()
            || self.idade_max_dias.is_some()
            || self.idade_min_dias.is_some()
    }

    /// Filters from query parameters. Lists are comma separated and booleans
    /// are true only when spelled `true`; unparsable numbers are ignored.
    pub fn from_query_params(params: &HashMap<String, String>) -> Self {
        let text = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();
        let list = |key: &str| -> Option<Vec<String>> {
            text(key).map(|v| v.split(',').map(str::to_string).collect())
        };
        let flag = |key: &str| params.get(key).map(|v| v == "true");

        SearchFilters {
            termo: text("termo"),
            localizacao: text("localizacao"),
            uf: list("uf"),
            municipio: list("municipio"),
            municipio_nome: text("municipio_nome"),
            cep_prefixo: text("cep_prefixo"),
            ddd: list("ddd"),
            cnae_divisao: list("cnae_divisao"),
            cnae: list("cnae"),
            porte: list("porte"),
            capital_social_min: text("capital_social_min").and_then(|v| v.parse().ok()),
            capital_social_max: text("capital_social_max").and_then(|v| v.parse().ok()),
            situacao: list("situacao"),
            tipo: list("tipo"),
            natureza_juridica: list("natureza_juridica"),
            simples: flag("simples"),
            mei: flag("mei"),
            com_email: flag("com_email"),
            com_telefone: flag("com_telefone"),
            data_abertura_min: text("data_abertura_min"),
            data_abertura_max: text("data_abertura_max"),
            idade_max_dias: text("idade_max_dias").and_then(|v| v.parse().ok()),
            idade_min_dias: text("idade_min_dias").and_then(|v| v.parse().ok()),
        }
    }
}

/// A validated search request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// Filters to apply.
    pub filters: SearchFilters,
    /// Whitelisted sort field; `data_abertura` when unknown.
    pub order_by: String,
    /// Sort direction.
    pub order_dir: OrderDir,
    /// Page size.
    pub limit: i64,
    /// Rows to skip.
    pub offset: i64,
}

/// Body of the stats preview when sent with `POST`.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatsRequestBody {
    /// Filters to count; no filter counts every establishment.
    #[serde(default)]
    pub filters: SearchFilters,
}
