//! Google OAuth2 authorization-code flow for the upload scope.

use crate::error::OAuthError;
use crate::identity::{IdentityRecord, default_token_uri};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use url::Url;

pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";
const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_TIMEOUT_S: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
struct ClientSecretsSection {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecretsSection>,
    web: Option<ClientSecretsSection>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: AUTH_URI.to_string(),
            token_uri: default_token_uri(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Parses a downloaded `client_secrets.json` (`installed` or `web`).
    pub fn from_client_secrets(http: Client, json: &str, redirect_uri: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("Failed to parse client secrets JSON")?;
        let section = file
            .web
            .or(file.installed)
            .context("client secrets: neither `web` nor `installed` section present")?;

        let mut client = Self::new(http, section.client_id, section.client_secret, redirect_uri);
        if let Some(uri) = section.auth_uri {
            client.auth_uri = uri;
        }
        if let Some(uri) = section.token_uri {
            client.token_uri = uri;
        }
        Ok(client)
    }

    pub async fn from_client_secrets_file(http: Client, path: &Path, redirect_uri: &str) -> Result<Self> {
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read client secrets: {}", path.display()))?;
        Self::from_client_secrets(http, &json, redirect_uri)
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    /// Consent page URL. `offline` + `consent` make Google return a
    /// refresh token every time.
    pub fn authorize_url(&self, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.auth_uri).context("Invalid auth URI")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", UPLOAD_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("include_granted_scopes", "true")
            .append_pair("state", state);
        Ok(url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let resp = self
            .http
            .post(&self.token_uri)
            .form(form)
            .timeout(std::time::Duration::from_secs(TOKEN_TIMEOUT_S))
            .send()
            .await
            .context("Token request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(OAuthError::TokenEndpoint {
                status_code: status.as_u16(),
                message: raw.chars().take(400).collect(),
            }
            .into());
        }

        serde_json::from_str(&raw).context("Failed to parse token response")
    }

    fn record_from(&self, token: TokenResponse, previous_refresh: Option<String>) -> IdentityRecord {
        let scopes = token
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| vec![UPLOAD_SCOPE.to_string()]);
        IdentityRecord {
            token: Some(token.access_token),
            refresh_token: token.refresh_token.or(previous_refresh),
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes,
            expiry: token.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        }
    }

    pub async fn exchange_code(&self, code: &str) -> Result<IdentityRecord> {
        let token = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;
        Ok(self.record_from(token, None))
    }

    /// Refreshes `record` using its own client credentials, falling back to
    /// this client's when the record carries none.
    pub async fn refresh(&self, record: &IdentityRecord) -> Result<IdentityRecord> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(OAuthError::MissingRefreshToken)?;
        let client_id = if record.client_id.is_empty() { &self.client_id } else { &record.client_id };
        let client_secret = if record.client_secret.is_empty() {
            &self.client_secret
        } else {
            &record.client_secret
        };

        let token_uri = if record.token_uri.is_empty() { &self.token_uri } else { &record.token_uri };
        let client = self.clone().with_token_uri(token_uri.clone());
        let token = client
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .await?;

        let mut refreshed = client.record_from(token, Some(refresh_token.to_string()));
        refreshed.client_id = client_id.clone();
        refreshed.client_secret = client_secret.clone();
        if refreshed.scopes.is_empty() {
            refreshed.scopes = record.scopes.clone();
        }
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRETS: &str = r#"{"installed":{"client_id":"abc.apps.googleusercontent.com",
        "client_secret":"shh","auth_uri":"https://accounts.google.com/o/oauth2/auth",
        "token_uri":"https://oauth2.googleapis.com/token","redirect_uris":["http://localhost"]}}"#;

    #[test]
    fn reads_installed_client_secrets() {
        let client = OAuthClient::from_client_secrets(Client::new(), SECRETS, "http://localhost:5000/oauth2callback").unwrap();
        assert_eq!(client.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(client.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn rejects_secrets_without_a_section() {
        assert!(OAuthClient::from_client_secrets(Client::new(), r#"{"other":{}}"#, "x").is_err());
    }

    #[test]
    fn authorize_url_carries_scope_state_and_offline_access() {
        let client = OAuthClient::from_client_secrets(Client::new(), SECRETS, "http://localhost:5000/oauth2callback").unwrap();
        let url = client.authorize_url("st4te").unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["scope"], UPLOAD_SCOPE);
        assert_eq!(pairs["state"], "st4te");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["redirect_uri"], "http://localhost:5000/oauth2callback");
        assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/auth?"));
    }

    #[test]
    fn token_response_becomes_identity_record() {
        let client = OAuthClient::new(Client::new(), "id", "secret", "http://cb");
        let token = TokenResponse {
            access_token: "ya29".to_string(),
            refresh_token: None,
            expires_in: Some(3599),
            scope: Some(UPLOAD_SCOPE.to_string()),
        };
        let record = client.record_from(token, Some("old-refresh".to_string()));
        assert_eq!(record.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(record.scopes, vec![UPLOAD_SCOPE.to_string()]);
        assert!(!record.needs_refresh(Utc::now()));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails_fast() {
        let client = OAuthClient::new(Client::new(), "id", "secret", "http://cb");
        let record = IdentityRecord {
            token: None,
            refresh_token: None,
            token_uri: default_token_uri(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: Vec::new(),
            expiry: None,
        };
        let err = client.refresh(&record).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<OAuthError>(), Some(OAuthError::MissingRefreshToken)));
    }
}
