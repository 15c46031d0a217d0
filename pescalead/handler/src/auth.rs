//! Caller authentication.
//!
//! Three kinds of callers reach the handlers: signed-in users carrying an
//! access token, other backend functions carrying the service key, and
//! webhooks carrying a shared secret.

use tracing::{debug, warn};
use warp::http::HeaderMap;

use crate::common::error::Error;
use crate::context::PescaleadContext;
use crate::database::accessors;
use crate::database::postgrest::{AuthUser, INSUFFICIENT_PRIVILEGE_CODE};
use crate::kanban::is_uuid;

/// Headers set by the platform on calls between backend functions.
const INTERNAL_CALL_HEADERS: [&str; 2] = ["x-supabase-function-name", "x-supabase-egress-source"];

/// A user allowed into a workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceAccess {
    /// The user.
    pub user: AuthUser,
    /// Role in the workspace; `owner` when found through ownership.
    pub role: String,
}

/// Token of a `Bearer` authorization value.
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    authorization?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Whether the request comes from another backend function: a platform
/// header is present, or the service key is sent as `apikey` or bearer.
pub fn is_internal_call(headers: &HeaderMap, service_key: &str) -> bool {
    if INTERNAL_CALL_HEADERS
        .iter()
        .any(|name| header(headers, name).is_some_and(|value| !value.is_empty()))
    {
        return true;
    }
    if service_key.is_empty() {
        return false;
    }
    header(headers, "apikey") == Some(service_key)
        || bearer_token(header(headers, "authorization")) == Some(service_key)
}

/// Admits internal callers and signed-in users.
pub async fn verify_internal_or_user(
    context: &PescaleadContext,
    headers: &HeaderMap,
) -> Result<(), Error> {
    if is_internal_call(headers, &context.settings.supabase.service_role_key) {
        debug!("internal call");
        return Ok(());
    }
    let token = bearer_token(header(headers, "authorization"))
        .ok_or_else(|| Error::Unauthorized("Authorization header required".to_string()))?;
    match context.db.auth_user(token).await {
        Ok(user) => {
            debug!(user_id = user.id, "user call");
            Ok(())
        }
        Err(Error::Unauthorized(_)) => {
            Err(Error::Unauthorized("Invalid or expired token".to_string()))
        }
        Err(error) => {
            warn!(%error, "token verification failed");
            Err(Error::Unauthorized("Authentication failed".to_string()))
        }
    }
}

/// The user owning the bearer token, and the token.
pub async fn authenticate<'a>(
    context: &PescaleadContext,
    authorization: Option<&'a str>,
) -> Result<(AuthUser, &'a str), Error> {
    let token = bearer_token(authorization)
        .ok_or_else(|| Error::Unauthorized("Unauthorized - Missing token".to_string()))?;
    match context.db.auth_user(token).await {
        Ok(user) => Ok((user, token)),
        Err(Error::Unauthorized(message)) => Err(Error::Unauthorized(message)),
        Err(error) => {
            warn!(%error, "token verification failed");
            Err(Error::Unauthorized("Unauthorized - Auth error".to_string()))
        }
    }
}

/// Authenticates the caller and checks that they belong to the workspace.
///
/// Membership is read with the caller's own token. When row level security
/// refuses the membership read, ownership of the workspace is accepted
/// instead.
pub async fn authorize_workspace(
    context: &PescaleadContext,
    authorization: Option<&str>,
    workspace_id: &str,
) -> Result<WorkspaceAccess, Error> {
    let (user, token) = authenticate(context, authorization).await?;
    if !is_uuid(workspace_id) {
        return Err(Error::BadRequest("Invalid Workspace ID format".to_string()));
    }

    let user_db = context.user_db(token);
    let check_failed = || {
        Error::HttpRequest(
            warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Authorization check failed".to_string(),
        )
    };

    match accessors::get_workspace_member(&user_db, workspace_id, &user.id).await {
        Ok(Some(member)) => Ok(WorkspaceAccess {
            role: member.role.unwrap_or_else(|| "member".to_string()),
            user,
        }),
        Ok(None) => {
            warn!(user_id = user.id, workspace_id, "no access to workspace");
            Err(Error::Forbidden("Forbidden - No access to workspace".to_string()))
        }
        Err(error) if error.database_code() == Some(INSUFFICIENT_PRIVILEGE_CODE) => {
            debug!("membership read refused, checking ownership");
            let owner = accessors::get_workspace_owner(&user_db, workspace_id)
                .await
                .ok()
                .flatten()
                .and_then(|workspace| workspace.owner_id);
            if owner.as_deref() == Some(user.id.as_str()) {
                Ok(WorkspaceAccess {
                    user,
                    role: "owner".to_string(),
                })
            } else {
                Err(check_failed())
            }
        }
        Err(error) => {
            warn!(%error, "workspace membership check failed");
            Err(check_failed())
        }
    }
}

/// Admits callers presenting the service key in `X-Service-Role-Key`.
pub fn verify_service_key(context: &PescaleadContext, presented: Option<&str>) -> Result<(), Error> {
    let expected = context.settings.supabase.service_role_key.as_str();
    match presented {
        Some(key) if !expected.is_empty() && key == expected => Ok(()),
        _ => Err(Error::Unauthorized("Unauthorized".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;
    use test_case::test_case;
    use warp::http::HeaderValue;

    use super::*;
    use crate::context::testing::{context, SERVICE_KEY};

    const WORKSPACE: &str = "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d";

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test_case(Some("Bearer abc"), Some("abc"); "bearer")]
    #[test_case(Some("Bearer  "), None; "blank")]
    #[test_case(Some("Basic abc"), None; "other scheme")]
    #[test_case(None, None; "missing")]
    fn bearer_tokens(authorization: Option<&str>, expected: Option<&str>) {
        assert_eq!(bearer_token(authorization), expected);
    }

    #[test_case(&[("x-supabase-function-name", "cnpj")], true; "platform header")]
    #[test_case(&[("apikey", "service-key")], true; "apikey")]
    #[test_case(&[("authorization", "Bearer service-key")], true; "bearer service key")]
    #[test_case(&[("apikey", "anon-key")], false; "anon key")]
    #[test_case(&[], false; "nothing")]
    fn internal_calls(pairs: &[(&'static str, &'static str)], expected: bool) {
        assert_eq!(is_internal_call(&headers(pairs), SERVICE_KEY), expected);
    }

    #[test]
    fn service_key_header() {
        let context = context("http://localhost:1");
        assert!(verify_service_key(&context, Some(SERVICE_KEY)).is_ok());
        assert!(verify_service_key(&context, Some("other")).is_err());
        assert!(verify_service_key(&context, None).is_err());
    }

    #[tokio::test]
    async fn members_are_admitted() {
        let mut server = Server::new_async().await;
        let _user = server
            .mock("GET", "/auth/v1/user")
            .with_body(json!({"id": "u1", "email": "a@b.com"}).to_string())
            .create_async()
            .await;
        let _member = server
            .mock("GET", "/rest/v1/workspace_members")
            .match_query(Matcher::UrlEncoded("user_id".into(), "eq.u1".into()))
            .match_header("authorization", "Bearer user-token")
            .with_body(json!([{"role": "admin", "permissions": null}]).to_string())
            .create_async()
            .await;

        let context = context(&server.url());
        let access = authorize_workspace(&context, Some("Bearer user-token"), WORKSPACE)
            .await
            .unwrap();
        assert_eq!(access.user.id, "u1");
        assert_eq!(access.role, "admin");
    }

    #[tokio::test]
    async fn owners_are_admitted_when_membership_is_hidden() {
        let mut server = Server::new_async().await;
        let _user = server
            .mock("GET", "/auth/v1/user")
            .with_body(json!({"id": "u1"}).to_string())
            .create_async()
            .await;
        let _member = server
            .mock("GET", "/rest/v1/workspace_members")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(json!({"code": "42501", "message": "permission denied"}).to_string())
            .create_async()
            .await;
        let _owner = server
            .mock("GET", "/rest/v1/workspaces")
            .match_query(Matcher::Any)
            .with_body(json!([{"owner_id": "u1"}]).to_string())
            .create_async()
            .await;

        let context = context(&server.url());
        let access = authorize_workspace(&context, Some("Bearer user-token"), WORKSPACE)
            .await
            .unwrap();
        assert_eq!(access.role, "owner");
    }

    #[tokio::test]
    async fn strangers_are_forbidden() {
        let mut server = Server::new_async().await;
        let _user = server
            .mock("GET", "/auth/v1/user")
            .with_body(json!({"id": "u1"}).to_string())
            .create_async()
            .await;
        let _member = server
            .mock("GET", "/rest/v1/workspace_members")
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;

        let context = context(&server.url());
        let error = authorize_workspace(&context, Some("Bearer user-token"), WORKSPACE)
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), warp::http::StatusCode::FORBIDDEN);
        assert_eq!(error.error_message(), "Forbidden - No access to workspace");
    }

    #[tokio::test]
    async fn malformed_workspace_ids_are_rejected() {
        let mut server = Server::new_async().await;
        let _user = server
            .mock("GET", "/auth/v1/user")
            .with_body(json!({"id": "u1"}).to_string())
            .create_async()
            .await;

        let context = context(&server.url());
        let error = authorize_workspace(&context, Some("Bearer t"), "not-a-uuid")
            .await
            .unwrap_err();
        assert_eq!(error.error_message(), "Invalid Workspace ID format");
    }

    #[tokio::test]
    async fn missing_tokens_are_rejected() {
        let context = context("http://localhost:1");
        let error = authorize_workspace(&context, None, WORKSPACE).await.unwrap_err();
        assert_eq!(error.error_message(), "Unauthorized - Missing token");
    }
}
