//! Validation and SQL construction of the prospecting search.
//!
//! Every filter value is bound as a parameter. Only whitelisted column
//! names are ever written into the SQL text.

use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use time::Date;

use crate::api::models::cnpj::requests::{OrderDir, SearchFilters, SearchRequest};
use crate::cnpj::location::parse_location;
use crate::common::error::Error;

/// Largest page a search may ask for.
pub const MAX_LIMIT: i64 = 10_000;
/// Page size when none is given.
pub const DEFAULT_LIMIT: i64 = 100;
/// Sort field when none or an unknown one is given.
pub const DEFAULT_ORDER_BY: &str = "data_abertura";
/// Page size of the CNAE lookup when none is given.
pub const DEFAULT_CNAE_LIMIT: i64 = 100;
/// Largest page of the CNAE lookup.
pub const MAX_CNAE_LIMIT: i64 = 500;

const MAX_AGE_DAYS: i64 = 1_000_000;

const JOIN_EMPRESA: &str = " LEFT JOIN empresa emp ON est.cnpj_basico = emp.cnpj_basico";
const JOIN_SIMPLES: &str = " LEFT JOIN simples sim ON est.cnpj_basico = sim.cnpj_basico";
const JOIN_CNAE: &str = " LEFT JOIN cnae cn ON est.cnae_fiscal_principal = cn.codigo";
const JOIN_MUNIC: &str = " LEFT JOIN munic mun ON est.municipio = mun.codigo";

const HAS_EMAIL: &str = "est.correio_eletronico IS NOT NULL AND est.correio_eletronico != '' \
                         AND est.correio_eletronico LIKE '%@%'";
const HAS_PHONE: &str = "est.telefone_1 IS NOT NULL AND est.telefone_1 != ''";

const SEARCH_COLUMNS: &str = "SELECT \
    CONCAT(est.cnpj_basico, est.cnpj_ordem, est.cnpj_dv) AS cnpj, \
    emp.razao_social::text AS razao_social, \
    est.nome_fantasia::text AS nome_fantasia, \
    est.correio_eletronico::text AS email, \
    CONCAT(est.ddd_1, est.telefone_1) AS telefone, \
    est.uf::text AS uf, \
    mun.descricao::text AS municipio, \
    est.cnae_fiscal_principal::text AS cnae, \
    cn.descricao::text AS cnae_descricao, \
    emp.porte_empresa::text AS porte, \
    emp.capital_social::text AS capital_social, \
    est.situacao_cadastral::text AS situacao, \
    est.data_inicio_atividade::text AS data_abertura, \
    est.identificador_matriz_filial::text AS tipo";

/// Column a sort field maps to.
pub fn order_column(order_by: &str) -> Option<&'static str> {
    let column = match order_by {
        "razao_social" => "emp.razao_social",
        "nome_fantasia" => "est.nome_fantasia",
        "capital_social" => "emp.capital_social",
        "data_abertura" => "est.data_inicio_atividade",
        "uf" => "est.uf",
        "municipio" => "mun.descricao",
        "cnae" => "est.cnae_fiscal_principal",
        _ => return None,
    };
    Some(column)
}

fn bad_request(message: &str) -> Error {
    Error::BadRequest(message.to_string())
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
            .map(|n| n as i64)
    })
}

/// Validate a search body and fill in defaults.
///
/// `limit` must be a positive integer of at most [`MAX_LIMIT`] and `offset`
/// a non-negative integer. Unknown sort fields fall back to
/// [`DEFAULT_ORDER_BY`], and any direction other than `asc` sorts
/// descending. At least one filter must be set so that a search never scans
/// the whole registry.
pub fn validate_search_request(body: Option<&Value>) -> Result<SearchRequest, Error> {
    let Some(body) = body.and_then(Value::as_object) else {
        return Err(bad_request("Request body is required"));
    };

    let filters = match body.get("filters") {
        Some(filters @ Value::Object(_)) => serde_json::from_value::<SearchFilters>(filters.clone())
            .map_err(|error| Error::BadRequest(format!("Invalid filters: {error}")))?,
        _ => return Err(bad_request("filters object is required")),
    };

    let limit = match body.get("limit") {
        None => DEFAULT_LIMIT,
        Some(value) => integer(value)
            .filter(|limit| *limit >= 1)
            .ok_or_else(|| bad_request("limit must be a positive integer"))?,
    };
    if limit > MAX_LIMIT {
        return Err(Error::BadRequest(format!("limit cannot exceed {MAX_LIMIT}")));
    }

    let offset = match body.get("offset") {
        None => 0,
        Some(value) => integer(value)
            .filter(|offset| *offset >= 0)
            .ok_or_else(|| bad_request("offset must be a non-negative integer"))?,
    };

    let order_dir = match body.get("order_dir").and_then(Value::as_str) {
        Some("asc") => OrderDir::Asc,
        _ => OrderDir::Desc,
    };

    let order_by = body
        .get("order_by")
        .and_then(Value::as_str)
        .filter(|field| order_column(field).is_some())
        .unwrap_or(DEFAULT_ORDER_BY)
        .to_string();

    if !filters.has_any() {
        return Err(bad_request("At least one filter is required"));
    }

    Ok(SearchRequest { filters, order_by, order_dir, limit, offset })
}

fn needs_simples(filters: &SearchFilters) -> bool {
    filters.simples.is_some() || filters.mei.is_some()
}

fn needs_munic(filters: &SearchFilters) -> bool {
    let named = |v: &Option<String>| v.as_deref().is_some_and(|v| !v.is_empty());
    named(&filters.municipio_nome)
        || filters
            .localizacao
            .as_deref()
            .is_some_and(|l| parse_location(l).city.is_some())
}

/// `YYYYMMDD`, the format of the registry date columns.
fn registry_date(date: Date) -> String {
    format!("{:04}{:02}{:02}", date.year(), u8::from(date.month()), date.day())
}

fn days_before(today: Date, days: i64) -> Option<String> {
    // Keeps the duration itself from overflowing; the date check does the rest.
    let days = days.clamp(-MAX_AGE_DAYS, MAX_AGE_DAYS);
    today
        .checked_sub(time::Duration::days(days))
        .map(registry_date)
}

/// Appends `WHERE` before the first condition and `AND` before the others.
struct Conditions<'a, 'args> {
    query: &'a mut QueryBuilder<'args, Postgres>,
    any: bool,
}

impl<'a, 'args> Conditions<'a, 'args> {
    fn new(query: &'a mut QueryBuilder<'args, Postgres>) -> Self {
        Self { query, any: false }
    }

    fn next(&mut self) -> &mut QueryBuilder<'args, Postgres> {
        self.query.push(if self.any { " AND " } else { " WHERE " });
        self.any = true;
        &mut *self.query
    }

    fn text(&mut self, sql: &str) {
        self.next().push(sql);
    }

    fn compare(&mut self, column: &str, op: &str, value: String) {
        self.next()
            .push(column)
            .push(" ")
            .push(op)
            .push(" ")
            .push_bind(value);
    }

    fn any_of(&mut self, column: &str, values: &Option<Vec<String>>) {
        let Some(values) = values.as_ref().filter(|v| !v.is_empty()) else {
            return;
        };
        let query = self.next();
        query.push(column).push(" IN (");
        let mut list = query.separated(", ");
        for value in values {
            list.push_bind(value.clone());
        }
        list.push_unseparated(")");
    }
}

/// Append the `WHERE` clause for `filters`. `today` anchors the company age
/// filters.
pub fn push_filter_conditions(
    query: &mut QueryBuilder<'_, Postgres>,
    filters: &SearchFilters,
    today: Date,
) {
    let mut conditions = Conditions::new(query);
    let text = |v: &Option<String>| v.clone().filter(|v| !v.is_empty());

    if let Some(termo) = text(&filters.termo) {
        let pattern = format!("%{}%", termo.to_uppercase());
        conditions
            .next()
            .push("(est.nome_fantasia ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR emp.razao_social ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(localizacao) = text(&filters.localizacao) {
        let location = parse_location(&localizacao);
        tracing::debug!(%localizacao, uf = ?location.uf, city = ?location.city, "parsed location");
        if let Some(uf) = location.uf {
            conditions.compare("est.uf", "=", uf);
        }
        if let Some(city) = location.city {
            conditions.compare("mun.descricao", "ILIKE", format!("%{city}%"));
        }
    }

    conditions.any_of("est.uf", &filters.uf);
    conditions.any_of("est.municipio", &filters.municipio);

    if let Some(name) = text(&filters.municipio_nome) {
        conditions.compare("mun.descricao", "ILIKE", format!("%{name}%"));
    }
    if let Some(prefix) = text(&filters.cep_prefixo) {
        conditions.compare("est.cep", "LIKE", format!("{prefix}%"));
    }

    conditions.any_of("est.ddd_1", &filters.ddd);

    if let Some(divisions) = filters.cnae_divisao.as_ref().filter(|d| !d.is_empty()) {
        let query = conditions.next();
        query.push("(");
        let mut any = query.separated(" OR ");
        for division in divisions {
            any.push("est.cnae_fiscal_principal LIKE ")
                .push_bind_unseparated(format!("{division}%"));
        }
        any.push_unseparated(")");
    }

    conditions.any_of("est.cnae_fiscal_principal", &filters.cnae);
    conditions.any_of("emp.porte_empresa", &filters.porte);

    // Share capital is compared in cents, with the decimal point removed.
    for (bound, op) in [(filters.capital_social_min, ">="), (filters.capital_social_max, "<=")] {
        if let Some(bound) = bound {
            conditions
                .next()
                .push("CAST(REPLACE(emp.capital_social::text, '.', '') AS BIGINT) ")
                .push(op)
                .push(" ")
                .push_bind((bound * 100.0).round() as i64);
        }
    }

    conditions.any_of("est.situacao_cadastral", &filters.situacao);
    conditions.any_of("est.identificador_matriz_filial", &filters.tipo);
    conditions.any_of("emp.natureza_juridica", &filters.natureza_juridica);

    let flag = |value: bool| String::from(if value { "S" } else { "N" });
    if let Some(simples) = filters.simples {
        conditions.compare("sim.opcao_pelo_simples", "=", flag(simples));
    }
    if let Some(mei) = filters.mei {
        conditions.compare("sim.opcao_mei", "=", flag(mei));
    }

    if filters.com_email == Some(true) {
        conditions.text(HAS_EMAIL);
    }
    if filters.com_telefone == Some(true) {
        conditions.text(HAS_PHONE);
    }

    if let Some(min) = text(&filters.data_abertura_min) {
        conditions.compare("est.data_inicio_atividade", ">=", min.replace('-', ""));
    }
    if let Some(max) = text(&filters.data_abertura_max) {
        conditions.compare("est.data_inicio_atividade", "<=", max.replace('-', ""));
    }

    let age = |days: Option<i64>| days.filter(|d| *d != 0).and_then(|d| days_before(today, d));
    if let Some(opened_after) = age(filters.idade_max_dias) {
        conditions.compare("est.data_inicio_atividade", ">=", opened_after);
    }
    if let Some(opened_before) = age(filters.idade_min_dias) {
        conditions.compare("est.data_inicio_atividade", "<=", opened_before);
    }
}

/// Page and count queries of a validated search.
pub fn build_search_queries(
    request: &SearchRequest,
    today: Date,
) -> (QueryBuilder<'static, Postgres>, QueryBuilder<'static, Postgres>) {
    let filters = &request.filters;
    let simples = needs_simples(filters);

    let mut rows = QueryBuilder::new(SEARCH_COLUMNS);
    if simples {
        rows.push(", sim.opcao_pelo_simples::text AS simples, sim.opcao_mei::text AS mei");
    } else {
        rows.push(", NULL::text AS simples, NULL::text AS mei");
    }
    rows.push(" FROM estabelecimento est")
        .push(JOIN_EMPRESA)
        .push(JOIN_CNAE)
        .push(JOIN_MUNIC);
    if simples {
        rows.push(JOIN_SIMPLES);
    }
    push_filter_conditions(&mut rows, filters, today);

    let column = order_column(&request.order_by)
        .or_else(|| order_column(DEFAULT_ORDER_BY))
        .unwrap_or("est.data_inicio_atividade");
    let direction = match request.order_dir {
        OrderDir::Asc => "ASC",
        OrderDir::Desc => "DESC",
    };
    rows.push(format_args!(" ORDER BY {column} {direction} NULLS LAST"))
        .push(" LIMIT ")
        .push_bind(request.limit)
        .push(" OFFSET ")
        .push_bind(request.offset);

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM estabelecimento est");
    push_joins_for_filters(&mut count, filters);
    push_filter_conditions(&mut count, filters, today);

    (rows, count)
}

fn push_joins_for_filters(query: &mut QueryBuilder<'_, Postgres>, filters: &SearchFilters) {
    query.push(JOIN_EMPRESA);
    if needs_simples(filters) {
        query.push(JOIN_SIMPLES);
    }
    if needs_munic(filters) {
        query.push(JOIN_MUNIC);
    }
}

/// Contact coverage counts for `filters`. No filter counts every
/// establishment.
pub fn build_stats_query(filters: &SearchFilters, today: Date) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("SELECT COUNT(*) AS total");
    query
        .push(format_args!(
            ", COUNT(CASE WHEN {HAS_EMAIL} THEN 1 END) AS com_email"
        ))
        .push(format_args!(
            ", COUNT(CASE WHEN {HAS_PHONE} THEN 1 END) AS com_telefone"
        ))
        .push(format_args!(
            ", COUNT(CASE WHEN {HAS_EMAIL} AND {HAS_PHONE} THEN 1 END) AS com_email_e_telefone"
        ))
        .push(" FROM estabelecimento est");
    push_joins_for_filters(&mut query, filters);
    push_filter_conditions(&mut query, filters, today);
    query
}

/// Page size of the CNAE lookup: [`DEFAULT_CNAE_LIMIT`] when missing or not
/// a positive number, at most [`MAX_CNAE_LIMIT`].
pub fn cnae_limit(limit: Option<&str>) -> i64 {
    limit
        .and_then(|l| l.trim().parse::<i64>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_CNAE_LIMIT)
        .min(MAX_CNAE_LIMIT)
}

/// CNAE codes matching a text and a division, ordered by code.
pub fn build_cnaes_query(
    q: Option<&str>,
    divisao: Option<&str>,
    limit: i64,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(
        "SELECT codigo::text AS codigo, descricao::text AS descricao FROM cnae \
         WHERE codigo IS NOT NULL AND codigo != ''",
    );

    if let Some(divisao) = divisao.filter(|d| !d.is_empty()) {
        query
            .push(" AND codigo LIKE ")
            .push_bind(format!("{divisao}%"));
    }
    if let Some(q) = q.filter(|q| !q.is_empty()) {
        let pattern = format!("%{q}%");
        query
            .push(" AND (descricao ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR codigo LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    query.push(" ORDER BY codigo LIMIT ").push_bind(limit);
    query
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;
    use time::macros::date;

    use super::*;

    const TODAY: Date = date!(2024 - 03 - 15);

    fn request(filters: SearchFilters) -> SearchRequest {
        SearchRequest {
            filters,
            order_by: DEFAULT_ORDER_BY.to_string(),
            order_dir: OrderDir::Desc,
            limit: 100,
            offset: 0,
        }
    }

    fn error_message(result: Result<SearchRequest, Error>) -> String {
        match result {
            Err(Error::BadRequest(message)) => message,
            other => panic!("expected a bad request, got {other:?}"),
        }
    }

    #[test_case(None, "Request body is required"; "no body")]
    #[test_case(Some(json!([1, 2])), "Request body is required"; "array body")]
    #[test_case(Some(json!({})), "filters object is required"; "no filters")]
    #[test_case(Some(json!({"filters": "uf=PB"})), "filters object is required"; "string filters")]
    #[test_case(Some(json!({"filters": {"uf": ["PB"]}, "limit": 0})), "limit must be a positive integer"; "zero limit")]
    #[test_case(Some(json!({"filters": {"uf": ["PB"]}, "limit": 2.5})), "limit must be a positive integer"; "fractional limit")]
    #[test_case(Some(json!({"filters": {"uf": ["PB"]}, "limit": "10"})), "limit must be a positive integer"; "string limit")]
    #[test_case(Some(json!({"filters": {"uf": ["PB"]}, "limit": null})), "limit must be a positive integer"; "null limit")]
    #[test_case(Some(json!({"filters": {"uf": ["PB"]}, "limit": 10001})), "limit cannot exceed 10000"; "limit too large")]
    #[test_case(Some(json!({"filters": {"uf": ["PB"]}, "offset": -1})), "offset must be a non-negative integer"; "negative offset")]
    #[test_case(Some(json!({"filters": {"uf": ["PB"]}, "offset": null})), "offset must be a non-negative integer"; "null offset")]
    #[test_case(Some(json!({"filters": {}})), "At least one filter is required"; "empty filters")]
    #[test_case(Some(json!({"filters": {"uf": [], "termo": ""}})), "At least one filter is required"; "blank filters")]
    fn rejects_invalid_requests(body: Option<Value>, expected: &str) {
        assert_eq!(error_message(validate_search_request(body.as_ref())), expected);
    }

    #[test]
    fn fills_defaults() {
        let body = json!({"filters": {"com_email": false}, "order_by": "DROP TABLE", "order_dir": "ASC"});
        let request = validate_search_request(Some(&body)).expect("valid request");
        assert_eq!(request.limit, DEFAULT_LIMIT);
        assert_eq!(request.offset, 0);
        assert_eq!(request.order_by, DEFAULT_ORDER_BY);
        assert_eq!(request.order_dir, OrderDir::Desc);
    }

    #[test]
    fn keeps_whitelisted_order() {
        let body = json!({"filters": {"uf": ["PB"]}, "order_by": "razao_social", "order_dir": "asc", "limit": 50, "offset": 100});
        let request = validate_search_request(Some(&body)).expect("valid request");
        assert_eq!(request.order_by, "razao_social");
        assert_eq!(request.order_dir, OrderDir::Asc);
        assert_eq!((request.limit, request.offset), (50, 100));
    }

    #[test]
    fn search_binds_every_value() {
        let filters = SearchFilters {
            termo: Some("pescados".to_string()),
            uf: Some(vec!["PB".to_string(), "PE".to_string()]),
            cnae_divisao: Some(vec!["03".to_string(), "10".to_string()]),
            com_email: Some(true),
            ..Default::default()
        };
        let (rows, count) = build_search_queries(&request(filters), TODAY);
        let sql = rows.sql();

        assert!(sql.contains("(est.nome_fantasia ILIKE $1 OR emp.razao_social ILIKE $2)"));
        assert!(sql.contains(" AND est.uf IN ($3, $4)"));
        assert!(sql.contains(
            " AND (est.cnae_fiscal_principal LIKE $5 OR est.cnae_fiscal_principal LIKE $6)"
        ));
        assert!(sql.contains("est.correio_eletronico LIKE '%@%'"));
        assert!(sql.contains("ORDER BY est.data_inicio_atividade DESC NULLS LAST LIMIT $7 OFFSET $8"));
        assert!(sql.contains("NULL::text AS simples"));
        assert!(!sql.contains("pescados"));
        assert!(!sql.contains("JOIN simples"));

        let count_sql = count.sql();
        assert!(count_sql.starts_with("SELECT COUNT(*) FROM estabelecimento est"));
        assert!(count_sql.contains(" WHERE (est.nome_fantasia ILIKE $1"));
        assert!(!count_sql.contains("LIMIT"));
        assert!(!count_sql.contains("JOIN munic"));
    }

    #[test]
    fn tax_regime_filters_join_simples() {
        let filters = SearchFilters {
            mei: Some(false),
            ..Default::default()
        };
        let (rows, count) = build_search_queries(&request(filters), TODAY);
        assert!(rows.sql().contains("JOIN simples sim"));
        assert!(rows.sql().contains("sim.opcao_pelo_simples::text AS simples"));
        assert!(rows.sql().contains("WHERE sim.opcao_mei = $1"));
        assert!(count.sql().contains("JOIN simples sim"));
    }

    #[test]
    fn location_filters_use_city_names() {
        let filters = SearchFilters {
            localizacao: Some("João Pessoa, Paraíba, Brasil".to_string()),
            ..Default::default()
        };
        let query = build_stats_query(&filters, TODAY);
        let sql = query.sql();
        assert!(sql.contains("JOIN munic mun"));
        assert!(sql.contains("WHERE est.uf = $1 AND mun.descricao ILIKE $2"));
    }

    #[test]
    fn ages_and_capital_are_bound() {
        let filters = SearchFilters {
            idade_max_dias: Some(30),
            idade_min_dias: Some(0),
            capital_social_min: Some(1000.0),
            ..Default::default()
        };
        let (rows, _) = build_search_queries(&request(filters), TODAY);
        let sql = rows.sql();
        assert!(sql.contains("CAST(REPLACE(emp.capital_social::text, '.', '') AS BIGINT) >= $1"));
        assert!(sql.contains("est.data_inicio_atividade >= $2"));
        assert!(!sql.contains("est.data_inicio_atividade <= "));
    }

    #[test]
    fn unknown_order_falls_back() {
        let mut search = request(SearchFilters {
            uf: Some(vec!["SP".to_string()]),
            ..Default::default()
        });
        search.order_by = "municipio".to_string();
        search.order_dir = OrderDir::Asc;
        let (rows, _) = build_search_queries(&search, TODAY);
        assert!(rows.sql().contains("ORDER BY mun.descricao ASC NULLS LAST"));
    }

    #[test]
    fn registry_dates_are_compact() {
        assert_eq!(days_before(TODAY, 30).as_deref(), Some("20240214"));
        assert_eq!(registry_date(date!(2001 - 01 - 05)), "20010105");
    }

    #[test]
    fn stats_without_filters_counts_everything() {
        let query = build_stats_query(&SearchFilters::default(), TODAY);
        let sql = query.sql();
        assert!(sql.contains("AS com_email_e_telefone FROM estabelecimento est"));
        assert!(!sql.contains("WHERE"));
    }

    #[test_case(None, 100; "default")]
    #[test_case(Some("20"), 20; "given")]
    #[test_case(Some("9999"), 500; "capped")]
    #[test_case(Some("0"), 100; "zero")]
    #[test_case(Some("abc"), 100; "garbage")]
    fn cnae_limits(input: Option<&str>, expected: i64) {
        assert_eq!(cnae_limit(input), expected);
    }

    #[test]
    fn cnae_query_filters_division_and_text() {
        let query = build_cnaes_query(Some("pesca"), Some("03"), 20);
        let sql = query.sql();
        assert!(sql.contains("AND codigo LIKE $1"));
        assert!(sql.contains("AND (descricao ILIKE $2 OR codigo LIKE $3)"));
        assert!(sql.ends_with("ORDER BY codigo LIMIT $4"));
    }
}
