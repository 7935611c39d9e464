use crate::types::{env_lookup, non_empty, AppraiserError, EnvLookup, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_SECONDS: i64 = 60;
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

/// Source of OAuth bearer tokens for Vertex AI calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn provider_name(&self) -> String;

    async fn access_token(&self) -> Result<String>;
}

/// A token handed over as-is, e.g. from `gcloud auth print-access-token`.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    fn provider_name(&self) -> String {
        "static token".to_string()
    }

    async fn access_token(&self) -> Result<String> {
        if self.token.trim().is_empty() {
            return Err(AppraiserError::MissingAccessToken);
        }
        Ok(self.token.clone())
    }
}

/// Contents of a Google credentials JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl CredentialsFile {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_json(&json)?)
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECONDS) < self.expires_at
    }
}

enum TokenSource {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
    MetadataServer,
}

/// OAuth token exchange with caching until shortly before expiry.
pub struct OAuthTokenProvider {
    client: Client,
    source: TokenSource,
    cache: Arc<RwLock<Option<CachedToken>>>,
}

impl OAuthTokenProvider {
    pub fn from_credentials(client: Client, credentials: CredentialsFile) -> Self {
        let source = match credentials {
            CredentialsFile::ServiceAccount(key) => TokenSource::ServiceAccount(key),
            CredentialsFile::AuthorizedUser(user) => TokenSource::AuthorizedUser(user),
        };
        Self::with_source(client, source)
    }

    pub fn metadata_server(client: Client) -> Self {
        Self::with_source(client, TokenSource::MetadataServer)
    }

    fn with_source(client: Client, source: TokenSource) -> Self {
        Self {
            client,
            source,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn fetch_token(&self) -> Result<TokenResponse> {
        let response = match &self.source {
            TokenSource::ServiceAccount(key) => {
                let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
                let assertion = sign_assertion(key, token_uri, Utc::now())?;
                self.client
                    .post(token_uri)
                    .form(&[
                        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                        ("assertion", assertion.as_str()),
                    ])
                    .send()
                    .await?
            }
            TokenSource::AuthorizedUser(user) => {
                self.client
                    .post(DEFAULT_TOKEN_URI)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", user.client_id.as_str()),
                        ("client_secret", user.client_secret.as_str()),
                        ("refresh_token", user.refresh_token.as_str()),
                    ])
                    .send()
                    .await?
            }
            TokenSource::MetadataServer => {
                self.client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Token exchange failed with HTTP {}: {}", status, body);
            return Err(AppraiserError::MissingAccessToken);
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    fn provider_name(&self) -> String {
        match &self.source {
            TokenSource::ServiceAccount(key) => format!("service account {}", key.client_email),
            TokenSource::AuthorizedUser(_) => "application default user credentials".to_string(),
            TokenSource::MetadataServer => "metadata server".to_string(),
        }
    }

    async fn access_token(&self) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Utc::now())) {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Utc::now())) {
            return Ok(cached.token.clone());
        }

        let response = self.fetch_token().await?;
        let token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AppraiserError::MissingAccessToken)?;
        let expires_at = Utc::now() + Duration::seconds(response.expires_in.unwrap_or(ASSERTION_LIFETIME_SECONDS));

        debug!("Obtained access token from {} (expires {})", self.provider_name(), expires_at);
        *cache = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }
}

/// Sign the JWT bearer assertion for a service account.
pub fn sign_assertion(key: &ServiceAccountKey, audience: &str, now: DateTime<Utc>) -> Result<String> {
    let iat = now.timestamp();
    let claims = JwtClaims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: audience,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECONDS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
}

/// Path of the gcloud application-default credentials file, if it exists.
fn well_known_credentials_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?
        .join("gcloud")
        .join("application_default_credentials.json");
    path.exists().then_some(path)
}

/// Choose a token provider from the environment.
///
/// Order: `GCP_SERVICE_ACCOUNT_KEY` (inline JSON), `GOOGLE_ACCESS_TOKEN`,
/// `GOOGLE_APPLICATION_CREDENTIALS` (file path), the gcloud default
/// credentials file, then the metadata server.
pub async fn provider_from_env(client: Client) -> Result<Arc<dyn TokenProvider>> {
    provider_from_lookup(client, &env_lookup).await
}

pub async fn provider_from_lookup(client: Client, lookup: EnvLookup<'_>) -> Result<Arc<dyn TokenProvider>> {
    let provider: Arc<dyn TokenProvider> = if let Some(key_json) = non_empty(lookup, "GCP_SERVICE_ACCOUNT_KEY") {
        let credentials = CredentialsFile::from_json(&key_json).map_err(AppraiserError::InvalidServiceAccountKey)?;
        Arc::new(OAuthTokenProvider::from_credentials(client, credentials))
    } else if let Some(token) = non_empty(lookup, "GOOGLE_ACCESS_TOKEN") {
        Arc::new(StaticTokenProvider::new(token))
    } else if let Some(path) = non_empty(lookup, "GOOGLE_APPLICATION_CREDENTIALS") {
        let credentials = CredentialsFile::from_path(Path::new(&path)).await?;
        Arc::new(OAuthTokenProvider::from_credentials(client, credentials))
    } else if let Some(path) = well_known_credentials_path() {
        let credentials = CredentialsFile::from_path(&path).await?;
        Arc::new(OAuthTokenProvider::from_credentials(client, credentials))
    } else {
        Arc::new(OAuthTokenProvider::metadata_server(client))
    };

    info!("Using {} for Google authentication", provider.provider_name());
    Ok(provider)
}
