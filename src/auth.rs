//! OAuth2 credential loading and refresh.
//!
//! The token file is produced out of band by an interactive consent flow. This
//! module only reads it and, when the access token has expired, exchanges the
//! refresh token for a new one and rewrites the file in place (owner-only
//! permissions on Unix).

use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config;
use crate::error::{ExtractError, Result};

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Contents of the authorized-user token file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    config::DEFAULT_TOKEN_URI.to_string()
}

impl Credential {
    /// A credential with an access token and no known expiry.
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            refresh_token: None,
            token_uri: default_token_uri(),
            client_id: None,
            client_secret: None,
            scopes: config::SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - TimeDelta::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty()) && !self.is_expired_at(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// The bearer token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Read a token file.
///
/// Fails with [`ExtractError::TokenNotFound`] when the file does not exist.
pub fn load_credential(path: &Path) -> Result<Credential> {
    if !path.exists() {
        return Err(ExtractError::TokenNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path).map_err(|e| {
        ExtractError::CredentialsInvalid(format!("cannot read token file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        ExtractError::CredentialsInvalid(format!("malformed token file {}: {}", path.display(), e))
    })
}

/// Write a token file atomically with owner-only permissions.
pub fn save_credential(path: &Path, credential: &Credential) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, credential)?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// IdentityProvider
// ---------------------------------------------------------------------------

/// Response of a refresh-token grant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token for a fresh access token.
pub trait IdentityProvider {
    fn refresh(&self, credential: &Credential) -> Result<TokenGrant>;
}

/// Refreshes against the credential's `token_uri` over HTTP.
pub struct OAuthRefresher {
    client: Client,
}

impl OAuthRefresher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl IdentityProvider for OAuthRefresher {
    fn refresh(&self, credential: &Credential) -> Result<TokenGrant> {
        let refresh_token = credential.refresh_token.as_deref().unwrap_or_default();
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(id) = credential.client_id.as_deref() {
            form.push(("client_id", id));
        }
        if let Some(secret) = credential.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        debug!(token_uri = %credential.token_uri, "requesting token refresh");
        let resp = self.client.post(&credential.token_uri).form(&form).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            let reason = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => format!("token endpoint returned {}", status),
            };
            return Err(ExtractError::CredentialsInvalid(reason));
        }
        Ok(resp.json()?)
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Token file on disk plus the provider used to refresh it.
pub struct CredentialStore {
    path: PathBuf,
    provider: Box<dyn IdentityProvider>,
}

impl CredentialStore {
    pub fn new<P: AsRef<Path>>(path: P, provider: Box<dyn IdentityProvider>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            provider,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Credential> {
        load_credential(&self.path)
    }

    /// Load the token file and make sure the credential is usable.
    pub fn load_valid(&self) -> Result<Credential> {
        let credential = self.load()?;
        let credential = self.ensure_valid(credential)?;
        info!(path = %self.path.display(), "credentials loaded");
        Ok(credential)
    }

    pub fn ensure_valid(&self, credential: Credential) -> Result<Credential> {
        self.ensure_valid_at(credential, Utc::now())
    }

    /// Return `credential` unchanged if valid at `now`; otherwise refresh it
    /// and persist the result.
    ///
    /// The token file is only rewritten after a successful refresh.
    pub fn ensure_valid_at(&self, credential: Credential, now: DateTime<Utc>) -> Result<Credential> {
        if credential.is_valid_at(now) {
            return Ok(credential);
        }
        if !credential.can_refresh() {
            return Err(ExtractError::CredentialsInvalid(
                "access token expired and no refresh token is available".to_string(),
            ));
        }

        info!("token expired, refreshing");
        let grant = self.provider.refresh(&credential).map_err(|e| match e {
            ExtractError::CredentialsInvalid(_) => e,
            other => ExtractError::CredentialsInvalid(other.to_string()),
        })?;

        let mut refreshed = credential;
        refreshed.token = Some(grant.access_token);
        refreshed.expiry = grant.expires_in.map(|secs| now + TimeDelta::seconds(secs));
        if let Some(rotated) = grant.refresh_token {
            refreshed.refresh_token = Some(rotated);
        }
        if !refreshed.is_valid_at(now) {
            return Err(ExtractError::CredentialsInvalid(
                "refresh returned an unusable token".to_string(),
            ));
        }

        save_credential(&self.path, &refreshed).map_err(|e| {
            ExtractError::CredentialsInvalid(format!(
                "cannot save refreshed token to {}: {}",
                self.path.display(),
                e
            ))
        })?;
        info!(path = %self.path.display(), "refreshed token saved");
        Ok(refreshed)
    }
}

// ---------------------------------------------------------------------------
// TokenSource
// ---------------------------------------------------------------------------

/// The current credential, refreshed through its store whenever it expires.
///
/// API clients ask for a bearer token before every request, so a batch that
/// outlives one access token keeps working.
pub struct TokenSource {
    store: Option<CredentialStore>,
    current: RefCell<Credential>,
}

impl TokenSource {
    pub fn new(store: CredentialStore, credential: Credential) -> Self {
        Self {
            store: Some(store),
            current: RefCell::new(credential),
        }
    }

    /// A token that is never refreshed.
    pub fn fixed(token: &str) -> Self {
        Self {
            store: None,
            current: RefCell::new(Credential::with_token(token)),
        }
    }

    /// Snapshot of the credential currently in use.
    pub fn credential(&self) -> Credential {
        self.current.borrow().clone()
    }

    pub fn access_token(&self) -> Result<String> {
        self.access_token_at(Utc::now())
    }

    /// Bearer token valid at `now`, refreshing first if needed.
    pub fn access_token_at(&self, now: DateTime<Utc>) -> Result<String> {
        let current = self.credential();
        let valid = match &self.store {
            Some(store) => store.ensure_valid_at(current, now)?,
            None if current.is_valid_at(now) => current,
            None => {
                return Err(ExtractError::CredentialsInvalid(
                    "access token expired and cannot be refreshed".to_string(),
                ))
            }
        };
        let token = valid
            .access_token()
            .map(str::to_string)
            .ok_or_else(|| ExtractError::CredentialsInvalid("token file has no access token".to_string()))?;
        *self.current.borrow_mut() = valid;
        Ok(token)
    }
}
