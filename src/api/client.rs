//! HTTP client for the REST backend.
//!
//! Every request goes through [`ApiClient::request`], which attaches
//! `Authorization: Bearer <token>` whenever a token is stored. Login and
//! register store the returned token; logout clears it even when the
//! server call fails.

use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::ErrorResponse;
use crate::error::{Error, Result};
use crate::models::{AuthResponse, LoginRequest, ProfileUpdate, RegisterRequest, User};
use crate::storage::{Storage, StorageKey};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApiClient {
    http: Client,
    base_url: String,
    storage: Storage,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, storage: Storage) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Service(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn token(&self) -> Result<Option<String>> {
        Ok(self.storage.get(&StorageKey::AuthToken)?)
    }

    /// Start a request, attaching the stored bearer token if there is one
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let mut builder = self
            .http
            .request(method, self.url(path))
            .header(ACCEPT, "application/json");
        if let Some(token) = self.token()? {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Service(format!("Request failed: {e}")))?;
        let status = response.status();
        debug!(url = %response.url(), %status, "API response");
        if status.is_success() {
            return Ok(response);
        }
        match response.json::<ErrorResponse>().await {
            Ok(body) => Err(body.error.into()),
            Err(_) => Err(Error::Service(format!("Server responded with {status}"))),
        }
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.execute(builder)
            .await?
            .json()
            .await
            .map_err(|e| Error::Service(format!("Invalid response body: {e}")))
    }

    fn remember(&self, auth: &AuthResponse) -> Result<()> {
        self.storage.set(&StorageKey::AuthToken, &auth.token)?;
        self.storage.set(&StorageKey::CurrentUser, &auth.user)?;
        Ok(())
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let builder = self.request(Method::POST, "/login")?.json(request);
        let auth: AuthResponse = self.json(builder).await?;
        self.remember(&auth)?;
        Ok(auth)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let builder = self.request(Method::POST, "/register")?.json(request);
        let auth: AuthResponse = self.json(builder).await?;
        self.remember(&auth)?;
        Ok(auth)
    }

    pub async fn logout(&self) -> Result<()> {
        if self.token()?.is_some() {
            let builder = self.request(Method::POST, "/logout")?;
            if let Err(e) = self.execute(builder).await {
                warn!(error = %e, "Logout request failed, clearing local token anyway");
            }
        }
        self.storage.remove(&StorageKey::AuthToken)?;
        self.storage.remove(&StorageKey::CurrentUser)?;
        Ok(())
    }

    pub async fn user(&self) -> Result<User> {
        let builder = self.request(Method::GET, "/user")?;
        self.json(builder).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        let builder = self.request(Method::PUT, "/user/profile")?.json(update);
        let user: User = self.json(builder).await?;
        self.storage.set(&StorageKey::CurrentUser, &user)?;
        Ok(user)
    }
}
