//! CORS policies.
//!
//! Origins are validated when the settings load; warp refuses malformed
//! origins at route construction.

use std::time::Duration;

use warp::cors::Builder;

use crate::config::CorsConfig;

const ALLOWED_HEADERS: [&str; 6] = [
    "authorization",
    "x-client-info",
    "apikey",
    "content-type",
    "x-webhook-secret",
    "x-service-role-key",
];

const EXPOSED_HEADERS: [&str; 6] = [
    "x-provider",
    "x-response-time",
    "x-total-count",
    "x-ratelimit-remaining",
    "x-ratelimit-reset",
    "retry-after",
];

/// Endpoints called from the web app: whitelisted origins only.
pub fn authenticated(config: &CorsConfig) -> Builder {
    warp::cors()
        .allow_origins(config.allowed_origins.iter().map(String::as_str))
        .allow_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allow_headers(ALLOWED_HEADERS)
        .expose_headers(EXPOSED_HEADERS)
        .allow_credentials(true)
        .max_age(Duration::from_secs(86_400))
}

/// Webhooks and schedulers: any origin.
pub fn public() -> Builder {
    warp::cors()
        .allow_any_origin()
        .allow_methods(["GET", "POST", "OPTIONS"])
        .allow_headers(ALLOWED_HEADERS)
        .max_age(Duration::from_secs(86_400))
}

/// Service-to-service endpoints: admin origins, POST only.
pub fn admin(config: &CorsConfig) -> Builder {
    warp::cors()
        .allow_origins(config.admin_origins.iter().map(String::as_str))
        .allow_methods(["POST", "OPTIONS"])
        .allow_headers(ALLOWED_HEADERS)
        .max_age(Duration::from_secs(86_400))
}

#[cfg(test)]
mod tests {
    use warp::http::StatusCode;
    use warp::Filter;

    use super::*;

    fn config() -> CorsConfig {
        CorsConfig {
            allowed_origins: vec!["https://hub.pescalead.com.br".to_string()],
            admin_origins: vec!["https://hub.pescalead.com.br".to_string()],
        }
    }

    fn preflight(origin: &str, method: &str) -> warp::test::RequestBuilder {
        warp::test::request()
            .method("OPTIONS")
            .path("/")
            .header("origin", origin)
            .header("access-control-request-method", method)
    }

    #[tokio::test]
    async fn whitelisted_origins_pass_the_preflight() {
        let route = warp::any().map(warp::reply).with(authenticated(&config()));

        let allowed = preflight("https://hub.pescalead.com.br", "POST")
            .reply(&route)
            .await;
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed.headers()["access-control-allow-origin"],
            "https://hub.pescalead.com.br"
        );

        let denied = preflight("https://evil.example", "POST").reply(&route).await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn public_policy_accepts_any_origin() {
        let route = warp::any().map(warp::reply).with(public());
        let response = preflight("https://anything.example", "POST")
            .reply(&route)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_policy_only_allows_post() {
        let route = warp::any().map(warp::reply).with(admin(&config()));
        let response = preflight("https://hub.pescalead.com.br", "GET")
            .reply(&route)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
