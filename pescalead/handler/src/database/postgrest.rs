//! Minimal client for the managed database REST surface.
//!
//! Tables are reached under `/rest/v1/{table}`, stored procedures under
//! `/rest/v1/rpc/{name}` and the auth service under `/auth/v1`. Filters use
//! the PostgREST operator syntax (`column=eq.value`).

use std::fmt::Display;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::common::error::Error;
use crate::config::SupabaseConfig;

/// PostgREST code for "no rows" on single object requests.
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Postgres `insufficient_privilege`, raised by row level security.
pub const INSUFFICIENT_PRIVILEGE_CODE: &str = "42501";

/// Error body returned by PostgREST and the auth service.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ApiErrorBody {
    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(code)) => Some(code.clone()),
            Some(serde_json::Value::Number(code)) => Some(code.to_string()),
            _ => None,
        }
    }

    fn message(self, status: StatusCode) -> String {
        self.message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)
            .unwrap_or_else(|| format!("Request failed with status {status}"))
    }
}

/// An authenticated user as returned by `/auth/v1/user`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthUser {
    /// User id.
    pub id: String,
    /// User email, if any.
    #[serde(default)]
    pub email: Option<String>,
}

/// Filters, ordering and paging for a table request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    /// Empty query.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Columns to return, PostgREST select syntax.
    pub fn select(self, columns: &str) -> Self {
        self.push("select", columns)
    }

    /// `column = value`
    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.push(column, format!("eq.{value}"))
    }

    /// `column > value`
    pub fn gt(self, column: &str, value: impl Display) -> Self {
        self.push(column, format!("gt.{value}"))
    }

    /// Case insensitive `LIKE`; `*` works as the wildcard.
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.push(column, format!("ilike.{pattern}"))
    }

    /// `column IN (values)`
    pub fn in_list<T: Display>(self, column: &str, values: &[T]) -> Self {
        let list = values
            .iter()
            .map(|value| quote(&value.to_string()))
            .collect::<Vec<_>>()
            .join(",");
        self.push(column, format!("in.({list})"))
    }

    /// Array column contains every value.
    pub fn contains<T: Display>(self, column: &str, values: &[T]) -> Self {
        let list = values
            .iter()
            .map(|value| quote(&value.to_string()))
            .collect::<Vec<_>>()
            .join(",");
        self.push(column, format!("cs.{{{list}}}"))
    }

    /// `column IS NULL`
    pub fn is_null(self, column: &str) -> Self {
        self.push(column, "is.null")
    }

    /// Disjunction of raw PostgREST filters, e.g. `a.eq.1,b.eq.2`.
    pub fn or(self, filters: &str) -> Self {
        self.push("or", format!("({filters})"))
    }

    /// Order by a column; nulls go last.
    pub fn order(self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.push("order", format!("{column}.{direction}.nullslast"))
    }

    /// Maximum number of rows.
    pub fn limit(self, limit: u64) -> Self {
        self.push("limit", limit.to_string())
    }

    /// Rows to skip.
    pub fn offset(self, offset: u64) -> Self {
        self.push("offset", offset.to_string())
    }

    /// The query string pairs.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Values with reserved characters are double quoted in list filters.
fn quote(value: &str) -> String {
    if value.contains([',', '(', ')', '{', '}', '"', ' ']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Escape `%`, `_` and `*` before embedding user text in an ilike pattern,
/// and drop characters that would break an `or=(...)` group.
pub fn sanitize_pattern(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')'))
        .flat_map(|c| match c {
            '%' | '_' | '*' | '\\' => vec!['\\', c],
            c => vec![c],
        })
        .collect()
}

/// REST client bound to one set of credentials.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: Client,
    base_url: Url,
    api_key: String,
    bearer: String,
}

impl PostgrestClient {
    /// Client acting with the service role; bypasses row level security.
    pub fn service(http: Client, config: &SupabaseConfig) -> Self {
        Self {
            http,
            base_url: config.url.clone(),
            api_key: config.service_role_key.clone(),
            bearer: config.service_role_key.clone(),
        }
    }

    /// Client acting as the user owning `access_token`, so that row level
    /// security applies.
    pub fn for_user(http: Client, config: &SupabaseConfig, access_token: &str) -> Self {
        let api_key = config
            .anon_key
            .clone()
            .unwrap_or_else(|| config.service_role_key.clone());
        Self {
            http,
            base_url: config.url.clone(),
            api_key,
            bearer: access_token.to_string(),
        }
    }

    /// Base URL of the project.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|err| Error::InvalidEndpoint(format!("{path}: {err}")))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder, Error> {
        Ok(self
            .http
            .request(method, self.endpoint(path)?)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer))
    }

    fn table(&self, method: reqwest::Method, table: &str, query: &Query) -> Result<RequestBuilder, Error> {
        Ok(self
            .request(method, &format!("rest/v1/{table}"))?
            .query(query.params()))
    }

    /// Select rows.
    pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, Error> {
        debug!(table, "select");
        let response = self.table(reqwest::Method::GET, table, query)?.send().await?;
        decode(check_response(response).await?).await
    }

    /// Select rows and the exact number of rows matching the filters,
    /// ignoring paging.
    pub async fn select_with_count<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<(Vec<T>, u64), Error> {
        debug!(table, "select with count");
        let response = self
            .table(reqwest::Method::GET, table, query)?
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check_response(response).await?;
        let total = content_range_total(&response);
        let rows: Vec<T> = decode(response).await?;
        let total = total.unwrap_or(rows.len() as u64);
        Ok((rows, total))
    }

    /// Exact number of rows matching the filters.
    pub async fn count(&self, table: &str, query: &Query) -> Result<u64, Error> {
        debug!(table, "count");
        let response = self
            .table(reqwest::Method::HEAD, table, query)?
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check_response(response).await?;
        content_range_total(&response).ok_or(Error::InvalidApiResponse)
    }

    /// First row matching the filters, if any.
    pub async fn maybe_single<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Option<T>, Error> {
        let rows: Vec<T> = self.select(table, query).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row or an array of rows and return what was stored.
    pub async fn insert<B, T>(&self, table: &str, body: &B) -> Result<Vec<T>, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(table, "insert");
        let response = self
            .table(reqwest::Method::POST, table, &Query::new())?
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        decode(check_response(response).await?).await
    }

    /// Update the rows matching the filters and return them.
    pub async fn update<B, T>(&self, table: &str, query: &Query, body: &B) -> Result<Vec<T>, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(table, "update");
        let response = self
            .table(reqwest::Method::PATCH, table, query)?
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        decode(check_response(response).await?).await
    }

    /// Delete the rows matching the filters and return them.
    pub async fn delete<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, Error> {
        debug!(table, "delete");
        let response = self
            .table(reqwest::Method::DELETE, table, query)?
            .header("Prefer", "return=representation")
            .send()
            .await?;
        decode(check_response(response).await?).await
    }

    /// Call a stored procedure.
    pub async fn rpc<P, T>(&self, function: &str, params: &P) -> Result<T, Error>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(function, "rpc");
        let response = self
            .request(reqwest::Method::POST, &format!("rest/v1/rpc/{function}"))?
            .json(params)
            .send()
            .await?;
        let response = check_response(response).await?;
        // Void functions answer with an empty body.
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return serde_json::from_value(serde_json::Value::Null).map_err(Error::upstream_decode);
        }
        serde_json::from_slice(&bytes).map_err(Error::upstream_decode)
    }

    /// Resolve the user owning an access token.
    pub async fn auth_user(&self, access_token: &str) -> Result<AuthUser, Error> {
        let response = self
            .http
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => response.json::<AuthUser>().await.map_err(|err| {
                warn!(%err, "unexpected auth user payload");
                Error::InvalidApiResponse
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Unauthorized("Unauthorized - Invalid token".to_string()))
            }
            _ => Err(check_response(response).await.err().unwrap_or(Error::InvalidApiResponse)),
        }
    }
}

/// Total from a `Content-Range: 0-9/42` header.
fn content_range_total(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("content-range")?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .parse()
        .ok()
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(Error::upstream_decode)
}

/// Maps failed responses onto [`Error::Database`], keeping the database
/// error code so callers can branch on it.
async fn check_response(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: ApiErrorBody = response.json().await.unwrap_or_default();
    let code = body.code();
    let message = body.message(status);
    warn!(%status, ?code, message, "database request failed");

    Err(Error::Database { code, message })
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    use super::*;

    fn config(server: &ServerGuard) -> SupabaseConfig {
        SupabaseConfig {
            url: server.url().parse().unwrap(),
            service_role_key: "service-key".to_string(),
            anon_key: Some("anon-key".to_string()),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: String,
    }

    #[test]
    fn query_renders_postgrest_operators() {
        let query = Query::new()
            .select("id,title")
            .eq("funnel_id", "f1")
            .in_list("id", &["a", "b c"])
            .contains("tags", &["vip", "hot"])
            .order("position", true)
            .limit(10)
            .offset(20);

        assert_eq!(
            query.params(),
            &[
                ("select".to_string(), "id,title".to_string()),
                ("funnel_id".to_string(), "eq.f1".to_string()),
                ("id".to_string(), "in.(a,\"b c\")".to_string()),
                ("tags".to_string(), "cs.{vip,hot}".to_string()),
                ("order".to_string(), "position.asc.nullslast".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("offset".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn patterns_are_escaped() {
        assert_eq!(sanitize_pattern("50% (off), a_b"), "50\\% off a\\_b");
    }

    #[tokio::test]
    async fn select_sends_keys_and_filters() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/funnels")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("workspace_id".into(), "eq.w1".into()),
                Matcher::UrlEncoded("select".into(), "id".into()),
            ]))
            .match_header("apikey", "service-key")
            .match_header("authorization", "Bearer service-key")
            .with_status(200)
            .with_body(r#"[{"id": "f1"}, {"id": "f2"}]"#)
            .expect(1)
            .create_async()
            .await;

        let client = PostgrestClient::service(Client::new(), &config(&server));
        let rows: Vec<Row> = client
            .select("funnels", &Query::new().eq("workspace_id", "w1").select("id"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn select_with_count_reads_content_range() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/leads")
            .match_query(Matcher::Any)
            .match_header("prefer", "count=exact")
            .with_status(206)
            .with_header("content-range", "0-0/42")
            .with_body(r#"[{"id": "l1"}]"#)
            .create_async()
            .await;

        let client = PostgrestClient::service(Client::new(), &config(&server));
        let (rows, total): (Vec<Row>, u64) = client
            .select_with_count("leads", &Query::new().limit(1))
            .await
            .unwrap();

        assert_eq!(rows, vec![Row { id: "l1".to_string() }]);
        assert_eq!(total, 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn undecodable_rows_are_upstream_failures() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/funnels")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = PostgrestClient::service(Client::new(), &config(&server));
        let err = client
            .select::<Row>("funnels", &Query::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UpstreamDecode(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn errors_keep_the_database_code() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/workspace_members")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"code": "42501", "message": "permission denied for table"}"#)
            .create_async()
            .await;

        let client = PostgrestClient::for_user(Client::new(), &config(&server), "user-jwt");
        let result: Result<Vec<Row>, Error> =
            client.select("workspace_members", &Query::new()).await;

        match result {
            Err(err) => {
                assert_eq!(err.database_code(), Some(INSUFFICIENT_PRIVILEGE_CODE));
                assert_eq!(err.error_message(), "permission denied for table");
            }
            Ok(rows) => panic!("expected an error, got {rows:?}"),
        }
    }

    #[tokio::test]
    async fn rpc_posts_params_and_accepts_empty_bodies() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/rpc/ai_debouncer_to_pgmq")
            .match_body(Matcher::Json(json!({})))
            .with_status(204)
            .create_async()
            .await;

        let client = PostgrestClient::service(Client::new(), &config(&server));
        let result: Option<i64> = client.rpc("ai_debouncer_to_pgmq", &json!({})).await.unwrap();

        assert_eq!(result, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn user_client_uses_the_anon_key_and_user_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer user-jwt")
            .with_status(200)
            .with_body(r#"{"id": "u1", "email": "a@b.com", "aud": "authenticated"}"#)
            .create_async()
            .await;

        let client = PostgrestClient::for_user(Client::new(), &config(&server), "user-jwt");
        let user = client.auth_user("user-jwt").await.unwrap();

        assert_eq!(user.id, "u1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invalid_tokens_are_unauthorized() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .with_body(r#"{"msg": "invalid JWT"}"#)
            .create_async()
            .await;

        let client = PostgrestClient::service(Client::new(), &config(&server));
        let result = client.auth_user("bad").await;

        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }
}
