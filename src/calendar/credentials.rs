// Google OAuth2 credentials
// Installed-application flow with PKCE, token persisted as JSON on disk

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    AuthorizationCode, AuthUrl, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    RefreshToken, Scope, TokenResponse, TokenUrl, basic::BasicClient, reqwest::async_http_client,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::utils::logging;

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
pub const ACCESS_TOKEN_ENV: &str = "BDAYCAL_ACCESS_TOKEN";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Source of bearer tokens for the calendar API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> AppResult<String>;
}

/// A fixed, externally managed access token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Reads `BDAYCAL_ACCESS_TOKEN`; unset or blank yields `None`.
    pub fn from_env() -> Option<Self> {
        std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn access_token(&self) -> AppResult<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Expired, or expiring within the next five minutes.
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + Duration::minutes(5) >= expires_at,
            None => false,
        }
    }

    fn from_response<T: TokenResponse<oauth2::basic::BasicTokenType>>(
        token: &T,
        previous_refresh: Option<String>,
    ) -> Self {
        Self {
            access_token: token.access_token().secret().clone(),
            // Google usually omits the refresh token on refresh
            refresh_token: token.refresh_token().map(|t| t.secret().clone()).or(previous_refresh),
            expires_at: token
                .expires_in()
                .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64)),
        }
    }

    pub fn load(path: &Path) -> AppResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let token = serde_json::from_str(&contents)
            .map_err(|e| AppError::auth(format!("unreadable token file {}: {}", path.display(), e)))?;
        Ok(Some(token))
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;

        // Owner-only, the file holds OAuth tokens
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        log::debug!("Stored Google Calendar token to {}", path.display());
        Ok(())
    }
}

/// OAuth client registration, as downloaded from the Google API console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> AppResult<Self> {
        let file: ClientSecretFile = serde_json::from_str(json)
            .map_err(|e| AppError::auth(format!("invalid client secret file: {}", e)))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| AppError::auth("client secret file has neither an 'installed' nor a 'web' section"))
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::auth(format!("cannot read client secret file {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI)
    }

    fn oauth_client(&self) -> AppResult<BasicClient> {
        let auth_url = AuthUrl::new(self.auth_uri.clone())
            .map_err(|e| AppError::auth(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(self.token_uri.clone())
            .map_err(|e| AppError::auth(format!("Invalid token URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(self.redirect_uri().to_string())
            .map_err(|e| AppError::auth(format!("Invalid redirect URL: {}", e)))?;

        Ok(BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url))
    }
}

/// Accepts either the bare authorization code or the whole redirect URL
/// the browser landed on.
pub fn extract_auth_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match url::Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned()),
        Err(_) => Some(input.to_string()),
    }
}

/// Token stored on disk, refreshed when close to expiry, obtained through
/// an interactive browser consent when absent.
pub struct OAuthCredentialProvider {
    client_secret_path: PathBuf,
    token_path: PathBuf,
    interactive: bool,
    cached: Mutex<Option<StoredToken>>,
}

impl OAuthCredentialProvider {
    pub fn new(client_secret_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            client_secret_path: client_secret_path.into(),
            token_path: token_path.into(),
            interactive: true,
            cached: Mutex::new(None),
        }
    }

    /// Fail with `AppError::Auth` instead of prompting when no usable token exists.
    pub fn non_interactive(mut self) -> Self {
        self.interactive = false;
        self
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    async fn refresh(&self, current: &StoredToken) -> AppResult<StoredToken> {
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| AppError::auth("No refresh token available"))?;

        let client = ClientSecrets::load(&self.client_secret_path)?.oauth_client()?;
        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AppError::auth(format!("Failed to refresh token: {}", e)))?;

        let token = StoredToken::from_response(&response, Some(refresh_token));
        token.save(&self.token_path)?;
        logging::log_auth_event("Google Calendar token refreshed", "");
        Ok(token)
    }

    async fn authorize(&self) -> AppResult<StoredToken> {
        let client = ClientSecrets::load(&self.client_secret_path)?.oauth_client()?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, _csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(CALENDAR_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(
                format!(
                    "Open this URL in your browser and grant calendar access:\n\n  {}\n\n\
                     Then paste the code (or the full URL you were redirected to): ",
                    auth_url
                )
                .as_bytes(),
            )
            .await?;
        stderr.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        let code = extract_auth_code(&line)
            .ok_or_else(|| AppError::auth("no authorization code was entered"))?;

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| AppError::auth(format!("Failed to exchange authorization code: {}", e)))?;

        let token = StoredToken::from_response(&response, None);
        token.save(&self.token_path)?;
        logging::log_auth_event("Google Calendar authorized, token stored at", &self.token_path.display().to_string());
        Ok(token)
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentialProvider {
    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| !t.needs_refresh()) {
            return Ok(token.access_token.clone());
        }

        let current = match cached.take() {
            Some(token) => Some(token),
            None => StoredToken::load(&self.token_path)?,
        };

        let token = match current {
            Some(token) if !token.needs_refresh() => token,
            Some(token) if token.refresh_token.is_some() => self.refresh(&token).await?,
            _ if self.interactive => self.authorize().await?,
            _ => {
                return Err(AppError::auth(format!(
                    "no usable token at {}; run interactively to authorize",
                    self.token_path.display()
                )))
            }
        };

        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn token(expires_in_minutes: Option<i64>, refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: "ya29.test".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: expires_in_minutes.map(|m| Utc::now() + Duration::minutes(m)),
        }
    }

    #[test]
    fn test_needs_refresh() {
        assert!(!token(Some(60), None).needs_refresh());
        assert!(token(Some(3), None).needs_refresh());
        assert!(token(Some(-10), None).needs_refresh());
        assert!(!token(None, None).needs_refresh());
    }

    #[test]
    fn test_token_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let stored = token(Some(60), Some("1//refresh"));

        stored.save(&path).unwrap();
        let loaded = StoredToken::load(&path).unwrap().unwrap();
        assert_eq!(loaded, stored);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_missing_token_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(StoredToken::load(&dir.path().join("absent.json")).unwrap(), None);
    }

    #[test]
    fn test_client_secrets_installed_and_web() {
        let installed = r#"{"installed":{"client_id":"id.apps","client_secret":"s3cret","redirect_uris":["http://localhost"]}}"#;
        let secrets = ClientSecrets::from_json(installed).unwrap();
        assert_eq!(secrets.client_id, "id.apps");
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(secrets.redirect_uri(), "http://localhost");

        let web = r#"{"web":{"client_id":"w","client_secret":"x"}}"#;
        assert_eq!(ClientSecrets::from_json(web).unwrap().client_id, "w");

        let neither = r#"{"other":{}}"#;
        assert!(matches!(ClientSecrets::from_json(neither), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_extract_auth_code() {
        assert_eq!(extract_auth_code("  4/0Abc-def \n"), Some("4/0Abc-def".to_string()));
        assert_eq!(
            extract_auth_code("http://localhost/?state=xyz&code=4%2F0Abc&scope=calendar"),
            Some("4/0Abc".to_string())
        );
        assert_eq!(extract_auth_code("http://localhost/?error=access_denied"), None);
        assert_eq!(extract_auth_code("   "), None);
    }

    #[tokio::test]
    async fn test_valid_stored_token_is_used_without_network() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        token(Some(60), None).save(&path).unwrap();

        let provider = OAuthCredentialProvider::new(dir.path().join("missing_secret.json"), &path)
            .non_interactive();
        assert_eq!(provider.access_token().await.unwrap(), "ya29.test");
        // Second call is served from memory even if the file goes away
        std::fs::remove_file(&path).unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn test_non_interactive_without_token_is_auth_error() {
        let dir = TempDir::new().unwrap();
        let provider = OAuthCredentialProvider::new(
            dir.path().join("client_secret.json"),
            dir.path().join("token.json"),
        )
        .non_interactive();

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_expired_token_without_client_secret_is_auth_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        token(Some(-30), Some("1//refresh")).save(&path).unwrap();

        let provider = OAuthCredentialProvider::new(dir.path().join("missing.json"), &path)
            .non_interactive();
        let err = provider.access_token().await.unwrap_err();
        assert!(err.to_string().contains("client secret"));
    }

    #[test]
    #[serial]
    fn test_static_token_from_env() {
        std::env::set_var(ACCESS_TOKEN_ENV, "  ya29.env  ");
        let provider = StaticTokenProvider::from_env().unwrap();
        assert_eq!(provider.token, "ya29.env");

        std::env::set_var(ACCESS_TOKEN_ENV, "   ");
        assert!(StaticTokenProvider::from_env().is_none());

        std::env::remove_var(ACCESS_TOKEN_ENV);
        assert!(StaticTokenProvider::from_env().is_none());
    }
}
