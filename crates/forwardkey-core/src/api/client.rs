//! API client for the openai-forward management API.
//!
//! `ApiClient` is built once per application and shared by reference. It
//! owns the resolved base address, the HTTP connection pool and the
//! request interceptor chain; the session store and navigator are shared
//! with the rest of the application.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Request, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::envelope;
use super::interceptor::{BearerAuth, RequestInterceptor};
use super::ClientError;
use crate::config::ClientConfig;
use crate::navigation::Navigator;
use crate::session::{SessionInfo, SessionStore};

// ============================================================================
// Paths
// ============================================================================

const AUTH_PATH: &str = "/auth";
const AUTH_CALLBACK_PATH: &str = "/auth/callback";
const AZURE_MODELS_PATH: &str = "/azure/models";
const OPENAI_MODELS_PATH: &str = "/openai/models";

/// `data` payload of a successful auth callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthGrant {
    pub key: String,
    pub expire_at: String,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    root_url: String,
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    clear_session_on_unauthorized: bool,
}

impl ApiClient {
    /// Create a client with the default interceptor chain (bearer auth).
    pub fn new(
        config: &ClientConfig,
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        let (base_url, root_url) = resolve_urls(&config.origin, &config.api_endpoint)?;

        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let bearer: Arc<dyn RequestInterceptor> = Arc::new(BearerAuth::new(session.clone()));
        debug!(base_url = %base_url, "API client created");

        Ok(Self {
            client,
            base_url,
            root_url,
            interceptors: vec![bearer],
            session,
            navigator,
            clear_session_on_unauthorized: config.clear_session_on_unauthorized,
        })
    }

    /// Append an interceptor; it runs after the ones already registered.
    pub fn with_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    // ===== Auth =====

    /// URL of the backend's authorization entry point for a given return target.
    pub fn auth_url(&self, current_location: &str) -> String {
        format!(
            "{}{}?redirect={}",
            self.base_url,
            AUTH_PATH,
            urlencoding::encode(current_location)
        )
    }

    /// Send the user to the authorization entry point. The backend
    /// redirects back to `current_location` with a `code` parameter.
    pub fn begin_auth(&self, current_location: &str) -> String {
        let url = self.auth_url(current_location);
        self.navigator.navigate(&url);
        url
    }

    /// Exchange an authorization code for a credential, persist it and go
    /// back to the application root. On failure, including a store that
    /// cannot be written, no navigation happens.
    pub async fn complete_auth(&self, code: &str) -> Result<(), ClientError> {
        let data = self.get(AUTH_CALLBACK_PATH, &[("code", code)]).await?;
        let grant: AuthGrant = serde_json::from_value(data)?;

        self.session
            .try_set(&grant.key, &grant.expire_at)
            .map_err(|e| ClientError::Storage(format!("{:#}", e)))?;
        info!(expires_at = %grant.expire_at, "Authenticated");

        self.navigator.navigate(&self.root_url);
        Ok(())
    }

    /// Raw contents of the session store, unvalidated.
    pub fn current_session(&self) -> SessionInfo {
        self.session.info()
    }

    // ===== Model listings =====

    pub async fn list_azure_models(&self) -> Result<Value, ClientError> {
        self.get(AZURE_MODELS_PATH, &[]).await
    }

    pub async fn list_openai_models(&self) -> Result<Value, ClientError> {
        self.get(OPENAI_MODELS_PATH, &[]).await
    }

    // ===== Pipeline =====

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.get(&url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        self.execute(builder.build()?).await
    }

    async fn execute(&self, mut request: Request) -> Result<Value, ClientError> {
        for interceptor in &self.interceptors {
            interceptor.intercept(&mut request);
        }

        debug!(method = %request.method(), path = request.url().path(), "Sending request");

        let response = self.client.execute(request).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.on_unauthorized();
            return Err(ClientError::Unauthorized);
        }

        let body = response.bytes().await?;
        let result = envelope::normalize(status, &body);
        if let Err(ref e) = result {
            debug!(status = status.as_u16(), error = %e, "Request rejected");
        }
        result
    }

    fn on_unauthorized(&self) {
        if self.clear_session_on_unauthorized {
            warn!("Unauthorized response, clearing stored session");
            self.session.clear();
        } else {
            warn!("Unauthorized response, stored token kept");
        }
    }
}

/// Resolve the API base (no trailing slash) and the application root.
/// A relative endpoint hangs off `origin`; an absolute one is used as is.
fn resolve_urls(origin: &str, api_endpoint: &str) -> Result<(String, String), ClientError> {
    let origin = Url::parse(origin)
        .map_err(|e| ClientError::InvalidUrl(format!("origin {:?}: {}", origin, e)))?;
    let base = origin
        .join(api_endpoint)
        .map_err(|e| ClientError::InvalidUrl(format!("endpoint {:?}: {}", api_endpoint, e)))?;
    let root = origin
        .join("/")
        .map_err(|e| ClientError::InvalidUrl(format!("origin root: {}", e)))?;

    Ok((
        base.as_str().trim_end_matches('/').to_string(),
        root.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::RecordingNavigator;

    fn client_with(config: ClientConfig) -> (ApiClient, Arc<RecordingNavigator>) {
        let navigator = Arc::new(RecordingNavigator::new());
        let client = ApiClient::new(
            &config,
            Arc::new(SessionStore::in_memory()),
            navigator.clone(),
        )
        .expect("client should build");
        (client, navigator)
    }

    #[test]
    fn test_resolve_relative_endpoint() {
        let (base, root) = resolve_urls("http://localhost:8080", "/api/v1").unwrap();
        assert_eq!(base, "http://localhost:8080/api/v1");
        assert_eq!(root, "http://localhost:8080/");
    }

    #[test]
    fn test_resolve_absolute_endpoint() {
        let (base, root) =
            resolve_urls("http://localhost:8080/app/", "https://proxy.example.com/api/v1/")
                .unwrap();
        assert_eq!(base, "https://proxy.example.com/api/v1");
        assert_eq!(root, "http://localhost:8080/");
    }

    #[test]
    fn test_resolve_rejects_bad_origin() {
        assert!(matches!(
            resolve_urls("not a url", "/api/v1"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_begin_auth_navigates_with_encoded_redirect() {
        let (client, navigator) = client_with(ClientConfig::default());

        let url = client.begin_auth("http://localhost:8080/?tab=azure&x=1");

        assert_eq!(
            url,
            "http://localhost:8080/api/v1/auth?redirect=http%3A%2F%2Flocalhost%3A8080%2F%3Ftab%3Dazure%26x%3D1"
        );
        assert_eq!(navigator.visited(), vec![url]);
    }

    #[test]
    fn test_current_session_reads_raw_values() {
        let (client, _) = client_with(ClientConfig::default());
        assert_eq!(client.current_session(), SessionInfo::default());

        client.session().set("abc", "whenever");
        let info = client.current_session();
        assert_eq!(info.token.as_deref(), Some("abc"));
        assert_eq!(info.token_expires_at.as_deref(), Some("whenever"));
    }

    #[test]
    fn test_auth_grant_shape() {
        let grant: AuthGrant =
            serde_json::from_str(r#"{"key":"abc123","expire_at":"2025-01-01T00:00:00Z"}"#)
                .expect("grant should parse");
        assert_eq!(grant.key, "abc123");
        assert_eq!(grant.expire_at, "2025-01-01T00:00:00Z");
    }
}
