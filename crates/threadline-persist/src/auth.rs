use std::sync::Arc;

use chrono::Utc;
use reqwest::{RequestBuilder, Response, StatusCode};
use threadline_types::token::{is_token_expired, is_token_fresh};
use tokio::sync::Mutex;

use crate::error::{PersistError, Result};
use crate::http::decode;
use crate::models::{AuthResponse, AuthTokens, SignInRequest, SignUpRequest, User};
use crate::tokens::TokenStore;

/// Auth collaborator: sign-in/up/out, token refresh and bearer-authorized
/// requests with a single refresh-then-retry on 401.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    refresh_gate: Mutex<()>,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    /// A token is present and not known to be expired
    pub fn is_authenticated(&self) -> bool {
        self.access_token()
            .map(|token| !is_token_expired(&token, Utc::now()))
            .unwrap_or(false)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthTokens> {
        let request = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self.http.post(self.url("/signin")).json(&request).send().await?;
        let auth: AuthResponse = decode(response).await?;

        let tokens = auth
            .data
            .ok_or_else(|| PersistError::Unauthorized(auth.message.unwrap_or(auth.status)))?;

        self.store.save(tokens.clone());
        tracing::info!("Signed in");
        Ok(tokens)
    }

    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<User> {
        let response = self.http.post(self.url("/signup")).json(request).send().await?;
        decode(response).await
    }

    pub fn sign_out(&self) {
        self.store.clear();
        tracing::info!("Signed out");
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// Any failure clears the stored tokens and yields `SessionExpired`.
    pub async fn refresh_token(&self) -> Result<AuthTokens> {
        let Some(refresh_token) = self.store.refresh_token() else {
            self.store.clear();
            return Err(PersistError::SessionExpired);
        };

        match self.request_refresh(&refresh_token).await {
            Ok(tokens) => {
                self.store.save(tokens.clone());
                tracing::debug!("Access token refreshed");
                Ok(tokens)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh rejected, clearing session");
                self.store.clear();
                Err(PersistError::SessionExpired)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<AuthTokens> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let response = self.http.post(self.url("/refresh")).json(&body).send().await?;
        let auth: AuthResponse = decode(response).await?;
        auth.data
            .ok_or_else(|| PersistError::Unauthorized(auth.message.unwrap_or(auth.status)))
    }

    pub async fn current_user(&self) -> Result<User> {
        let response = self
            .send_authorized(|http| http.get(self.url("/users/me")))
            .await?;
        decode(response).await
    }

    /// Access token valid for at least the refresh buffer, refreshing if needed
    pub async fn ensure_fresh_token(&self) -> Result<String> {
        let token = self.access_token().ok_or(PersistError::AuthRequired)?;
        if is_token_fresh(&token, Utc::now()) {
            return Ok(token);
        }

        let tokens = self.refresh_after(&token).await?;
        Ok(tokens.access_token)
    }

    /// Refresh unless another caller already replaced `rejected`
    async fn refresh_after(&self, rejected: &str) -> Result<AuthTokens> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.store.load() {
            if current.access_token != rejected {
                return Ok(current);
            }
        }

        self.refresh_token().await
    }

    /// Send a bearer-authorized request. On 401 the token is refreshed and the
    /// request rebuilt and retried exactly once.
    pub async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.access_token().ok_or(PersistError::AuthRequired)?;

        let response = build(&self.http).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!("Request unauthorized, refreshing token and retrying once");
        let tokens = self.refresh_after(&token).await?;

        let retried = build(&self.http).bearer_auth(&tokens.access_token).send().await?;
        Ok(retried)
    }
}
