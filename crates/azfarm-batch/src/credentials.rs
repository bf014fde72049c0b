//! Service-principal authentication against Azure AD.
//!
//! Tokens come from the v1 client-credentials endpoint
//! (`{authority}/oauth2/token`) for the Batch resource and are cached until
//! shortly before they expire.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{BatchError, BatchResult};

/// Resource identifier for the Batch data plane.
pub const BATCH_RESOURCE: &str = "https://batch.core.windows.net/";

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Fallback lifetime when the token response carries none.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds; the v1 endpoint sends this as a string.
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Client-credentials identity (tenant, application id, secret).
pub struct ServicePrincipalCredentials {
    app_id: String,
    secret: String,
    authority_uri: String,
    resource: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServicePrincipalCredentials {
    /// `authority_uri` already includes the tenant, e.g.
    /// `https://login.microsoftonline.com/{tenant}`.
    pub fn new(app_id: &str, secret: &str, authority_uri: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            secret: secret.to_string(),
            authority_uri: authority_uri.trim_end_matches('/').to_string(),
            resource: BATCH_RESOURCE.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/token", self.authority_uri)
    }

    /// A bearer token for the Batch resource, fetched if none is cached or
    /// the cached one is about to expire.
    pub fn token(&self, http: &Client) -> BatchResult<String> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| BatchError::Auth("token cache lock poisoned".to_string()))?;

        if let Some(token) = cached.as_ref()
            && Instant::now() + EXPIRY_MARGIN < token.expires_at
        {
            return Ok(token.value.clone());
        }

        let token = self.fetch(http)?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn fetch(&self, http: &Client) -> BatchResult<CachedToken> {
        let endpoint = self.token_endpoint();
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.secret.as_str()),
            ("resource", self.resource.as_str()),
        ];

        let resp = http
            .post(&endpoint)
            .form(&form)
            .send()
            .map_err(|e| BatchError::Auth(format!("token request to {endpoint} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(BatchError::Auth(format!(
                "token endpoint responded with {status}: {body}"
            )));
        }

        let parsed: TokenResponse = resp
            .json()
            .map_err(|e| BatchError::Auth(format!("invalid token response: {e}")))?;

        let lifetime = parsed
            .expires_in
            .as_ref()
            .and_then(lifetime_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LIFETIME);

        debug!(lifetime_secs = lifetime.as_secs(), "acquired batch access token");

        Ok(CachedToken {
            value: parsed.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}

fn lifetime_secs(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubServer, token_reply};

    fn credentials_for(server: &StubServer) -> ServicePrincipalCredentials {
        ServicePrincipalCredentials::new("app-1", "s3cret", &format!("{}/tenant", server.base()))
    }

    #[test]
    fn token_endpoint_includes_tenant() {
        let creds = ServicePrincipalCredentials::new(
            "app",
            "secret",
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/",
        );
        assert_eq!(
            creds.token_endpoint(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/token"
        );
    }

    #[test]
    fn lifetime_accepts_string_or_number() {
        assert_eq!(lifetime_secs(&serde_json::json!("3599")), Some(3599));
        assert_eq!(lifetime_secs(&serde_json::json!(3600)), Some(3600));
        assert_eq!(lifetime_secs(&serde_json::json!("soon")), None);
    }

    #[test]
    fn token_response_without_expiry() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc", "token_type": "Bearer"}"#).unwrap();
        assert_eq!(parsed.access_token, "abc");
        assert!(parsed.expires_in.is_none());
    }

    #[test]
    fn token_is_cached_until_near_expiry() {
        let server = StubServer::start(|_, _| token_reply("tok-1", 3600));
        let creds = credentials_for(&server);
        let http = Client::new();

        assert_eq!(creds.token(&http).unwrap(), "tok-1");
        assert_eq!(creds.token(&http).unwrap(), "tok-1");
        assert_eq!(server.hits("/tenant/oauth2/token"), 1);

        let request = &server.requests()[0];
        assert_eq!(request.method, "POST");
        assert!(request.body.contains("grant_type=client_credentials"));
        assert!(request.body.contains("client_id=app-1"));
        assert!(request.body.contains("resource=https%3A%2F%2Fbatch.core.windows.net%2F"));
    }

    #[test]
    fn short_lived_token_is_refetched() {
        let server = StubServer::start(|_, _| token_reply("tok-short", 30));
        let creds = credentials_for(&server);
        let http = Client::new();

        creds.token(&http).unwrap();
        creds.token(&http).unwrap();
        assert_eq!(server.hits("/tenant/oauth2/token"), 2);
    }

    #[test]
    fn rejected_credentials_are_auth_errors() {
        let server = StubServer::start(|_, _| {
            (401, r#"{"error": "invalid_client"}"#.to_string())
        });
        let err = credentials_for(&server).token(&Client::new()).unwrap_err();
        match err {
            BatchError::Auth(message) => assert!(message.contains("invalid_client")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
