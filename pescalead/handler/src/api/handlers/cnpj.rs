//! Handlers for the company registry endpoints.
use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use warp::http::{HeaderMap, HeaderValue, StatusCode};
use warp::hyper::body::Bytes;
use warp::reply::{json, with_status, Reply, Response};

use crate::api::models::cnpj::requests::{CnaesQuery, CnpjQuery, SearchFilters, StatsRequestBody};
use crate::api::models::cnpj::responses::{
    CnaesResponse, CnpjData, CnpjHealthResponse, CnpjLookupResponse, FiltersResponse,
    SearchResponse, StatsPreview, StatsResponse,
};
use crate::api::models::cnpj::{FilterOption, PROVIDER};
use crate::auth;
use crate::cnpj::normalizer::{
    is_valid_cnpj, normalize_cnpj, normalize_partner, normalize_record, normalize_search_row,
    normalize_simples, parse_cnpj,
};
use crate::cnpj::{filters, search};
use crate::common::error::Error;
use crate::context::PescaleadContext;
use crate::database::cnpj::{CnpjParts, CnpjStore};
use crate::rate_limit::RateLimitDecision;

/// Which part of a company a lookup returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Establishment, company, tax regime and partners.
    Full,
    /// Establishment and company only.
    Basic,
    /// Partners only.
    Partners,
    /// Tax regime only.
    Simples,
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn registry(context: &PescaleadContext) -> Result<&CnpjStore, Error> {
    context
        .cnpj
        .as_ref()
        .ok_or_else(|| Error::ServiceUnavailable("CNPJ database not configured".to_string()))
}

fn with_headers(reply: impl Reply, headers: &[(&'static str, String)]) -> Response {
    let mut response = reply.into_response();
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            response.headers_mut().insert(*name, value);
        }
    }
    response
}

/// Validate and split the `cnpj` query parameter.
pub fn requested_cnpj(query: &CnpjQuery) -> Result<(String, CnpjParts), Error> {
    let raw = query
        .cnpj
        .as_deref()
        .filter(|cnpj| !cnpj.is_empty())
        .ok_or_else(|| Error::BadRequest("CNPJ is required".to_string()))?;
    if !is_valid_cnpj(raw) {
        return Err(Error::BadRequest("Invalid CNPJ format".to_string()));
    }
    let cnpj = normalize_cnpj(raw);
    let parts = parse_cnpj(&cnpj);
    Ok((cnpj, parts))
}

/// Payload of a lookup, or the reason it found nothing.
async fn fetch(
    store: &CnpjStore,
    lookup: Lookup,
    parts: &CnpjParts,
) -> Result<Result<CnpjData, &'static str>, Error> {
    let data = match lookup {
        Lookup::Full => match store.get_company(parts).await? {
            Some(company) => {
                let partners = store.get_partners(&parts.basico).await?;
                let record = normalize_record(&company, Some(&partners));
                Ok(CnpjData::Record(Box::new(record)))
            }
            None => Err("CNPJ nao encontrado"),
        },
        Lookup::Basic => match store.get_company_basic(parts).await? {
            Some(company) => Ok(CnpjData::Record(Box::new(normalize_record(&company, None)))),
            None => Err("CNPJ nao encontrado"),
        },
        Lookup::Partners => {
            let partners = store.get_partners(&parts.basico).await?;
            if partners.is_empty() {
                Err("Socios nao encontrados para este CNPJ")
            } else {
                let socios = partners.iter().map(normalize_partner).collect();
                Ok(CnpjData::Socios { socios })
            }
        }
        Lookup::Simples => match store.get_simples(&parts.basico).await? {
            Some(simples) => Ok(CnpjData::Simples { simples: normalize_simples(&simples) }),
            None => Err("Dados do Simples nao encontrados para este CNPJ"),
        },
    };
    Ok(data)
}

/// Get company handler. `lookup` selects the variant served by the route.
#[utoipa::path(
    get,
    operation_id = "getCnpj",
    path = "/cnpj-api",
    params(
        ("cnpj" = String, Query, description = "CNPJ, formatted or 14 digits."),
    ),
    tag = "cnpj",
    responses(
        (status = 200, description = "Company found", body = CnpjLookupResponse),
        (status = 400, description = "Missing or malformed CNPJ", body = ErrorResponse),
        (status = 404, description = "Company not found", body = CnpjLookupResponse),
        (status = 429, description = "Too many requests"),
        (status = 503, description = "Registry unavailable", body = ErrorResponse)
    )
)]
#[instrument(skip(context, decision))]
pub async fn get_cnpj(
    context: PescaleadContext,
    lookup: Lookup,
    decision: RateLimitDecision,
    query: CnpjQuery,
) -> impl warp::reply::Reply {
    debug!("In get cnpj");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        lookup: Lookup,
        query: CnpjQuery,
    ) -> Result<impl warp::reply::Reply, Error> {
        let started = Instant::now();
        let (cnpj, parts) = requested_cnpj(&query)?;
        let store = registry(&context)?;

        let (status, response) = match fetch(store, lookup, &parts).await? {
            Ok(data) => (
                StatusCode::OK,
                CnpjLookupResponse {
                    success: true,
                    provider: PROVIDER.to_string(),
                    data: Some(data),
                    error: None,
                    cached: Some(false),
                    response_time_ms: elapsed_ms(started),
                },
            ),
            Err(reason) => (
                StatusCode::NOT_FOUND,
                CnpjLookupResponse {
                    success: false,
                    provider: PROVIDER.to_string(),
                    data: None,
                    error: Some(reason.to_string()),
                    cached: None,
                    response_time_ms: elapsed_ms(started),
                },
            ),
        };
        info!(
            cnpj,
            ?lookup,
            found = response.success,
            elapsed_ms = response.response_time_ms,
            "cnpj lookup"
        );

        let timing = format!("{}ms", response.response_time_ms);
        Ok(with_headers(
            with_status(json(&response), status),
            &[("X-Provider", PROVIDER.to_string()), ("X-Response-Time", timing)],
        ))
    }

    // Handle and respond.
    let reply = handler(context, lookup, query)
        .await
        .map_or_else(Reply::into_response, Reply::into_response);
    decision.apply(reply)
}

/// Registry health handler.
#[utoipa::path(
    get,
    operation_id = "checkCnpjHealth",
    path = "/cnpj-api/health",
    tag = "cnpj",
    responses(
        (status = 200, description = "Registry reachable", body = CnpjHealthResponse),
        (status = 503, description = "Registry unreachable", body = CnpjHealthResponse)
    )
)]
#[instrument(skip(context))]
pub async fn get_health(context: PescaleadContext) -> impl warp::reply::Reply {
    debug!("In get cnpj health");
    let started = Instant::now();
    let checked = match registry(&context) {
        Ok(store) => store.now().await,
        Err(error) => Err(error),
    };

    let (status, response) = match checked {
        Ok(timestamp) => (
            StatusCode::OK,
            CnpjHealthResponse {
                status: "healthy".to_string(),
                provider: PROVIDER.to_string(),
                database: "connected".to_string(),
                timestamp: Some(timestamp),
                error: None,
                response_time_ms: elapsed_ms(started),
            },
        ),
        Err(error) => {
            warn!(%error, "registry health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                CnpjHealthResponse {
                    status: "unhealthy".to_string(),
                    provider: PROVIDER.to_string(),
                    database: "disconnected".to_string(),
                    timestamp: None,
                    error: Some(error.error_message()),
                    response_time_ms: elapsed_ms(started),
                },
            )
        }
    };
    with_status(json(&response), status)
}

/// Filter catalog handler.
#[utoipa::path(
    get,
    operation_id = "getCnpjFilters",
    path = "/cnpj-api/filters",
    tag = "cnpj",
    responses(
        (status = 200, description = "The filter catalog", body = FiltersResponse),
    )
)]
pub async fn get_filters(decision: RateLimitDecision) -> impl warp::reply::Reply {
    let started = Instant::now();
    let response = FiltersResponse {
        success: true,
        filters: filters::catalog(),
        response_time_ms: elapsed_ms(started),
    };
    decision.apply(with_status(json(&response), StatusCode::OK))
}

/// CNAE lookup handler.
#[utoipa::path(
    get,
    operation_id = "getCnaes",
    path = "/cnpj-api/cnaes",
    params(
        ("q" = Option<String>, Query, description = "Text matched against the description or the code."),
        ("divisao" = Option<String>, Query, description = "Two digit division."),
        ("limit" = Option<u32>, Query, description = "At most 500, default 100."),
    ),
    tag = "cnpj",
    responses(
        (status = 200, description = "Matching codes", body = CnaesResponse),
        (status = 500, description = "Lookup failed", body = ErrorResponse),
        (status = 503, description = "Registry unavailable", body = ErrorResponse)
    )
)]
#[instrument(skip(context, decision))]
pub async fn get_cnaes(
    context: PescaleadContext,
    decision: RateLimitDecision,
    query: CnaesQuery,
) -> impl warp::reply::Reply {
    debug!("In get cnaes");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        query: CnaesQuery,
    ) -> Result<impl warp::reply::Reply, Error> {
        let started = Instant::now();
        let store = registry(&context)?;
        let limit = search::cnae_limit(query.limit.as_deref());
        let sql = search::build_cnaes_query(query.q.as_deref(), query.divisao.as_deref(), limit);

        let rows = store.cnaes(sql).await.map_err(|error| {
            warn!(%error, "cnae lookup failed");
            Error::HttpRequest(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch CNAEs".to_string(),
            )
        })?;
        let cnaes: Vec<FilterOption> = rows
            .into_iter()
            .map(|row| {
                let descricao = row
                    .descricao
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .unwrap_or("Sem descrição");
                FilterOption {
                    label: format!("{} - {descricao}", row.codigo),
                    value: row.codigo,
                }
            })
            .collect();

        let response = CnaesResponse {
            success: true,
            total: cnaes.len(),
            cnaes,
            response_time_ms: elapsed_ms(started),
        };
        Ok(with_status(json(&response), StatusCode::OK))
    }

    // Handle and respond.
    let reply = handler(context, query)
        .await
        .map_or_else(Reply::into_response, Reply::into_response);
    decision.apply(reply)
}

/// Prospecting search handler.
#[utoipa::path(
    post,
    operation_id = "searchCompanies",
    path = "/cnpj-api/search",
    tag = "cnpj",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "A page of matching companies", body = SearchResponse),
        (status = 400, description = "Invalid search", body = ErrorResponse),
        (status = 401, description = "Caller not authenticated", body = ErrorResponse),
        (status = 503, description = "Registry unavailable", body = ErrorResponse)
    )
)]
#[instrument(skip(context, decision, headers, body))]
pub async fn search_companies(
    context: PescaleadContext,
    decision: RateLimitDecision,
    headers: HeaderMap,
    body: Bytes,
) -> impl warp::reply::Reply {
    debug!("In search companies");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<impl warp::reply::Reply, Error> {
        let started = Instant::now();
        auth::verify_internal_or_user(&context, &headers).await?;
        let body = parse_json_body(&body)?;
        let request = search::validate_search_request(Some(&body))?;
        let store = registry(&context)?;

        let today = OffsetDateTime::now_utc().date();
        let (rows, count) = search::build_search_queries(&request, today);
        let (rows, total) = store.search(rows, count).await?;
        let data: Vec<_> = rows.iter().map(normalize_search_row).collect();

        let response = SearchResponse {
            success: true,
            total,
            returned: data.len(),
            page: request.offset / request.limit + 1,
            total_pages: total_pages(total, request.limit),
            filters_applied: request.filters,
            data,
            response_time_ms: elapsed_ms(started),
        };
        info!(total, elapsed_ms = response.response_time_ms, "search finished");

        let timing = format!("{}ms", response.response_time_ms);
        Ok(with_headers(
            with_status(json(&response), StatusCode::OK),
            &[("X-Total-Count", total.to_string()), ("X-Response-Time", timing)],
        ))
    }

    // Handle and respond.
    let reply = handler(context, headers, body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response);
    decision.apply(reply)
}

/// Stats preview handler for filters sent as query parameters.
#[utoipa::path(
    get,
    operation_id = "getSearchStats",
    path = "/cnpj-api/stats",
    tag = "cnpj",
    responses(
        (status = 200, description = "Contact coverage of the filters", body = StatsResponse),
        (status = 401, description = "Caller not authenticated", body = ErrorResponse),
        (status = 503, description = "Registry unavailable", body = ErrorResponse)
    )
)]
#[instrument(skip(context, decision, headers))]
pub async fn get_stats(
    context: PescaleadContext,
    decision: RateLimitDecision,
    headers: HeaderMap,
    params: HashMap<String, String>,
) -> impl warp::reply::Reply {
    debug!("In get search stats");
    let filters = SearchFilters::from_query_params(&params);
    let reply = stats(context, headers, Ok(filters))
        .await
        .map_or_else(Reply::into_response, Reply::into_response);
    decision.apply(reply)
}

/// Stats preview handler for filters sent in the body.
#[utoipa::path(
    post,
    operation_id = "postSearchStats",
    path = "/cnpj-api/stats",
    tag = "cnpj",
    request_body = StatsRequestBody,
    responses(
        (status = 200, description = "Contact coverage of the filters", body = StatsResponse),
        (status = 400, description = "Invalid JSON body", body = ErrorResponse),
        (status = 401, description = "Caller not authenticated", body = ErrorResponse),
        (status = 503, description = "Registry unavailable", body = ErrorResponse)
    )
)]
#[instrument(skip(context, decision, headers, body))]
pub async fn post_stats(
    context: PescaleadContext,
    decision: RateLimitDecision,
    headers: HeaderMap,
    body: Bytes,
) -> impl warp::reply::Reply {
    debug!("In post search stats");
    let filters = parse_json_body(&body)
        .and_then(|body| serde_json::from_value::<StatsRequestBody>(body).map_err(Error::from))
        .map(|body| body.filters)
        .map_err(|_| Error::BadRequest("Invalid JSON body".to_string()));
    let reply = stats(context, headers, filters)
        .await
        .map_or_else(Reply::into_response, Reply::into_response);
    decision.apply(reply)
}

async fn stats(
    context: PescaleadContext,
    headers: HeaderMap,
    filters: Result<SearchFilters, Error>,
) -> Result<impl warp::reply::Reply, Error> {
    let started = Instant::now();
    auth::verify_internal_or_user(&context, &headers).await?;
    let filters = filters?;
    let store = registry(&context)?;

    let today = OffsetDateTime::now_utc().date();
    let row = store.stats(search::build_stats_query(&filters, today)).await?;
    let response = StatsResponse {
        success: true,
        preview: StatsPreview {
            total_matches: row.total,
            com_email: row.com_email,
            com_telefone: row.com_telefone,
            com_email_e_telefone: row.com_email_e_telefone,
        },
        response_time_ms: elapsed_ms(started),
    };
    Ok(with_status(json(&response), StatusCode::OK))
}

fn parse_json_body(body: &[u8]) -> Result<Value, Error> {
    serde_json::from_slice(body).map_err(|_| Error::BadRequest("Invalid JSON body".to_string()))
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}
