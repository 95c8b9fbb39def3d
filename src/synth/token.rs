//! Google Cloud credentials and OAuth2 token management.
//!
//! Credentials can come from three sources, selected by the shape of a single
//! configuration string: empty selects Application Default Credentials, a
//! leading `{` means inline service-account JSON, anything else is a path to
//! a credentials file.
//!
//! Workers share one [`TokenHandle`]. A worker that hits an auth-expiry
//! failure asks the handle to refresh; concurrent refresh requests collapse
//! into a single in-flight refresh so an expiring token never causes a
//! stampede against the token endpoint.

use std::path::Path;
use std::sync::Arc;

use google_cloud_auth::credentials::{Builder as CredentialsBuilder, Credentials};
use http::Extensions;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};

use crate::error::{SynthesisError, SynthesisResult};

/// OAuth2 scope required for the Text-to-Speech API.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Source of Google Cloud credentials.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    /// Application Default Credentials (`GOOGLE_APPLICATION_CREDENTIALS`,
    /// the GCP default service account, or `gcloud auth application-default
    /// login`).
    ApplicationDefault,
    /// Service account JSON provided inline.
    JsonContent(String),
    /// Path to a service account or user credentials file.
    FilePath(String),
}

impl CredentialSource {
    /// Determines the credential source from a configuration string.
    pub fn from_api_key(api_key: &str) -> Self {
        if api_key.is_empty() {
            CredentialSource::ApplicationDefault
        } else if api_key.trim_start().starts_with('{') {
            CredentialSource::JsonContent(api_key.to_string())
        } else {
            CredentialSource::FilePath(api_key.to_string())
        }
    }

    /// Validates the source for common configuration mistakes, catching them
    /// before the first API call instead of during it.
    pub fn validate(&self) -> SynthesisResult<()> {
        match self {
            CredentialSource::ApplicationDefault => Ok(()),
            CredentialSource::JsonContent(json) => {
                if !json.trim_start().starts_with('{') || !json.trim_end().ends_with('}') {
                    return Err(SynthesisError::InvalidConfiguration(
                        "invalid credential JSON: must be a JSON object".to_string(),
                    ));
                }
                serde_json::from_str::<serde_json::Value>(json).map_err(|e| {
                    SynthesisError::InvalidConfiguration(format!("invalid credential JSON: {e}"))
                })?;
                Ok(())
            }
            CredentialSource::FilePath(path) => {
                if path.contains("..") {
                    return Err(SynthesisError::InvalidConfiguration(
                        "invalid credential file path: path traversal not allowed".to_string(),
                    ));
                }
                if !Path::new(path).exists() {
                    return Err(SynthesisError::InvalidConfiguration(format!(
                        "credential file not found: {path}"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Provides OAuth2 access tokens for the synthesis API.
///
/// Abstracting token retrieval keeps the orchestrator testable with mock
/// providers and keeps credential mechanics out of the request path.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Retrieves a valid access token, fetching a fresh one if needed.
    async fn get_token(&self) -> SynthesisResult<String>;
}

/// Production token provider backed by `google-cloud-auth`.
pub struct GoogleTokenProvider {
    credentials: Credentials,
}

impl std::fmt::Debug for GoogleTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleTokenProvider")
            .field("credentials", &"<credentials>")
            .finish()
    }
}

impl GoogleTokenProvider {
    /// Builds a provider for the given credential source and scopes.
    pub fn new<S: AsRef<str>>(
        source: CredentialSource,
        scopes: &[S],
    ) -> SynthesisResult<Self> {
        source.validate()?;
        let scope_strings: Vec<String> = scopes.iter().map(|s| s.as_ref().to_string()).collect();

        let credentials = match source {
            CredentialSource::ApplicationDefault => CredentialsBuilder::default()
                .with_scopes(scope_strings)
                .build()
                .map_err(|e| {
                    error!(error = %e, "failed to initialize Application Default Credentials");
                    SynthesisError::AuthenticationFailed(format!(
                        "failed to initialize Application Default Credentials: {e}. \
                         Set GOOGLE_APPLICATION_CREDENTIALS or run \
                         'gcloud auth application-default login'"
                    ))
                })?,
            CredentialSource::JsonContent(ref json) => {
                Self::service_account_credentials(json, scope_strings, "<inline>")?
            }
            CredentialSource::FilePath(ref path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    SynthesisError::InvalidConfiguration(format!(
                        "failed to read credentials file '{path}': {e}"
                    ))
                })?;
                Self::credentials_from_json(&content, scope_strings, path)?
            }
        };

        debug!("Google Cloud token provider initialized");
        Ok(Self { credentials })
    }

    fn credentials_from_json(
        json: &str,
        scopes: Vec<String>,
        origin: &str,
    ) -> SynthesisResult<Credentials> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            SynthesisError::InvalidConfiguration(format!(
                "failed to parse credentials from '{origin}': {e}"
            ))
        })?;

        let cred_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        match cred_type {
            "service_account" => Self::service_account_credentials(json, scopes, origin),
            "authorized_user" => {
                use google_cloud_auth::credentials::user_account;
                user_account::Builder::new(value)
                    .with_scopes(scopes)
                    .build()
                    .map_err(|e| {
                        error!(error = %e, origin, "failed to load user account credentials");
                        SynthesisError::AuthenticationFailed(format!(
                            "failed to load user account credentials from '{origin}': {e}"
                        ))
                    })
            }
            _ => Err(SynthesisError::InvalidConfiguration(format!(
                "unsupported credential type '{cred_type}' in '{origin}', \
                 expected 'service_account' or 'authorized_user'"
            ))),
        }
    }

    fn service_account_credentials(
        json: &str,
        scopes: Vec<String>,
        origin: &str,
    ) -> SynthesisResult<Credentials> {
        use google_cloud_auth::credentials::service_account;

        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            SynthesisError::InvalidConfiguration(format!(
                "invalid service account JSON from '{origin}': {e}"
            ))
        })?;

        service_account::Builder::new(value)
            .with_access_specifier(service_account::AccessSpecifier::from_scopes(scopes))
            .build()
            .map_err(|e| {
                error!(error = %e, origin, "failed to load service account credentials");
                SynthesisError::AuthenticationFailed(format!(
                    "failed to load service account credentials from '{origin}': {e}"
                ))
            })
    }

    fn extract_bearer(
        headers: google_cloud_auth::credentials::CacheableResource<http::HeaderMap>,
    ) -> SynthesisResult<String> {
        use google_cloud_auth::credentials::CacheableResource;

        let header_map = match headers {
            CacheableResource::New { data, .. } => data,
            CacheableResource::NotModified => {
                return Err(SynthesisError::AuthenticationFailed(
                    "credentials returned NotModified without a cached token".to_string(),
                ));
            }
        };

        let auth_value = header_map.get(http::header::AUTHORIZATION).ok_or_else(|| {
            SynthesisError::AuthenticationFailed(
                "no Authorization header in credentials response".to_string(),
            )
        })?;
        let auth_str = auth_value.to_str().map_err(|e| {
            SynthesisError::AuthenticationFailed(format!("invalid Authorization header: {e}"))
        })?;

        auth_str
            .strip_prefix("Bearer ")
            .map(|token| token.to_string())
            .ok_or_else(|| {
                SynthesisError::AuthenticationFailed(
                    "Authorization header is not a Bearer token".to_string(),
                )
            })
    }
}

#[async_trait::async_trait]
impl TokenProvider for GoogleTokenProvider {
    async fn get_token(&self) -> SynthesisResult<String> {
        let headers = self
            .credentials
            .headers(Extensions::new())
            .await
            .map_err(|e| {
                error!(error = %e, "failed to fetch access token");
                SynthesisError::AuthenticationFailed(format!("failed to fetch access token: {e}"))
            })?;
        Self::extract_bearer(headers)
    }
}

/// Thread-safe credential handle shared by all workers of a request.
///
/// The cached token is served until a caller reports it stale. Refreshes are
/// single-flight: whoever wins the gate fetches, everyone else waiting on the
/// gate receives the token that refresh produced.
pub struct TokenHandle {
    provider: Arc<dyn TokenProvider>,
    cached: RwLock<Option<String>>,
    refresh_gate: Mutex<()>,
}

impl TokenHandle {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cached: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Current cached token, if any.
    pub async fn cached(&self) -> Option<String> {
        self.cached.read().await.clone()
    }

    /// Returns the cached token, fetching one on first use.
    pub async fn current(&self) -> SynthesisResult<String> {
        if let Some(token) = self.cached.read().await.clone() {
            return Ok(token);
        }
        self.refresh(None).await
    }

    /// Replaces the cached token, collapsing concurrent refreshes.
    ///
    /// `stale` is the token the caller observed failing. If another caller
    /// already refreshed past it, the fresh cached token is returned without
    /// touching the provider again.
    pub async fn refresh(&self, stale: Option<&str>) -> SynthesisResult<String> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.cached.read().await.clone() {
            if stale != Some(current.as_str()) {
                return Ok(current);
            }
        }

        debug!("refreshing synthesis access token");
        let fresh = self.provider.get_token().await?;
        *self.cached.write().await = Some(fresh.clone());
        Ok(fresh)
    }
}

impl std::fmt::Debug for TokenHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Token provider that mints sequentially numbered tokens and counts
    /// how often it was asked.
    pub struct CountingTokenProvider {
        pub fetches: AtomicUsize,
    }

    impl CountingTokenProvider {
        pub fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl TokenProvider for CountingTokenProvider {
        async fn get_token(&self) -> SynthesisResult<String> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    /// Token provider that always fails.
    pub struct FailingTokenProvider;

    #[async_trait::async_trait]
    impl TokenProvider for FailingTokenProvider {
        async fn get_token(&self) -> SynthesisResult<String> {
            Err(SynthesisError::AuthenticationFailed(
                "token endpoint unreachable".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{CountingTokenProvider, FailingTokenProvider};
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn empty_api_key_selects_adc() {
        assert_eq!(
            CredentialSource::from_api_key(""),
            CredentialSource::ApplicationDefault
        );
    }

    #[test]
    fn json_content_detected_by_leading_brace() {
        let json = r#"{"type": "service_account", "project_id": "demo"}"#;
        assert_eq!(
            CredentialSource::from_api_key(json),
            CredentialSource::JsonContent(json.to_string())
        );
    }

    #[test]
    fn other_strings_are_file_paths() {
        assert_eq!(
            CredentialSource::from_api_key("/etc/creds.json"),
            CredentialSource::FilePath("/etc/creds.json".to_string())
        );
    }

    #[test]
    fn validate_rejects_path_traversal() {
        let source = CredentialSource::FilePath("../../etc/passwd".to_string());
        assert!(matches!(
            source.validate(),
            Err(SynthesisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn validate_rejects_missing_file() {
        let source = CredentialSource::FilePath("/nonexistent/creds.json".to_string());
        let err = source.validate().unwrap_err();
        assert!(err.to_string().contains("credential file not found"));
    }

    #[test]
    fn validate_rejects_malformed_json() {
        let source = CredentialSource::JsonContent("not json at all".to_string());
        assert!(source.validate().is_err());

        let source = CredentialSource::JsonContent("{\"unterminated\": ".to_string());
        assert!(source.validate().is_err());
    }

    #[tokio::test]
    async fn current_fetches_once_then_serves_cache() {
        let provider = Arc::new(CountingTokenProvider::new());
        let handle = TokenHandle::new(provider.clone());

        assert_eq!(handle.current().await.unwrap(), "token-1");
        assert_eq!(handle.current().await.unwrap(), "token-1");
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_refreshes_collapse_into_one_fetch() {
        let provider = Arc::new(CountingTokenProvider::new());
        let handle = Arc::new(TokenHandle::new(provider.clone()));

        // Prime the cache with token-1.
        assert_eq!(handle.current().await.unwrap(), "token-1");

        // Five workers simultaneously report token-1 stale.
        let mut tasks = Vec::new();
        for _ in 0..5 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move {
                handle.refresh(Some("token-1")).await.unwrap()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), "token-2");
        }

        // One initial fetch plus exactly one collapsed refresh.
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_with_outdated_stale_token_reuses_cache() {
        let provider = Arc::new(CountingTokenProvider::new());
        let handle = TokenHandle::new(provider.clone());

        handle.current().await.unwrap();
        handle.refresh(Some("token-1")).await.unwrap();

        // A worker still holding token-1 must not trigger a third fetch.
        assert_eq!(handle.refresh(Some("token-1")).await.unwrap(), "token-2");
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let handle = TokenHandle::new(Arc::new(FailingTokenProvider));
        assert!(matches!(
            handle.current().await,
            Err(SynthesisError::AuthenticationFailed(_))
        ));
    }
}
