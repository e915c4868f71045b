//! Google OAuth2 client used by the Google Analytics integration: consent
//! URL construction and token exchange.

use serde::Deserialize;
use url::Url;

use super::IntegrationError;
use crate::config;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const ANALYTICS_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl TokenResponse {
    fn error_message(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "token endpoint returned no token".to_string())
    }
}

pub struct GoogleOauthClient {
    http: reqwest::Client,
}

impl Default for GoogleOauthClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleOauthClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Consent URL for connecting a Google Analytics property. `state` is
    /// echoed back on the callback and carries the request's project set.
    pub fn auth_url(&self, state: &str) -> Result<Url, IntegrationError> {
        let google = &config::config().google;
        if google.client_id.is_empty() {
            return Err(IntegrationError::Auth(
                "Google OAuth is not configured for this installation".to_string(),
            ));
        }

        let mut url = Url::parse(AUTH_ENDPOINT)
            .map_err(|e| IntegrationError::Auth(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &google.client_id)
            .append_pair("redirect_uri", &google.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", ANALYTICS_SCOPE)
            .append_pair("state", state);
        Ok(url)
    }

    /// Exchange the authorization code from the consent flow for a durable
    /// refresh token. The update path runs this before storing parameters so
    /// the stored token is always freshly issued.
    pub async fn exchange_for_refresh_token(
        &self,
        code_or_token: &str,
    ) -> Result<String, IntegrationError> {
        let google = &config::config().google;
        let body = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("client_id", google.client_id.as_str()),
                ("client_secret", google.client_secret.as_str()),
                ("redirect_uri", google.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code_or_token),
            ])
            .send()
            .await?
            .json::<TokenResponse>()
            .await?;

        body.refresh_token
            .clone()
            .ok_or_else(|| IntegrationError::Auth(body.error_message()))
    }

    /// Trade a refresh token for a short-lived access token.
    pub async fn access_token(&self, refresh_token: &str) -> Result<String, IntegrationError> {
        let google = &config::config().google;
        let body = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("client_id", google.client_id.as_str()),
                ("client_secret", google.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?
            .json::<TokenResponse>()
            .await?;

        body.access_token
            .clone()
            .ok_or_else(|| IntegrationError::Auth(body.error_message()))
    }
}
