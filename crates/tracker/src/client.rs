//! HTTP client for the OffTimes API.
//!
//! Every endpoint answers with the `{code, message, data, success}` envelope;
//! `ApiClient` unwraps it into `data` or a `TrackerError::Api`.

use async_trait::async_trait;
use domain::models::{BackupUploadRequest, BackupUploadResult};
use persistence::repositories::SettingsRepository;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, TrackerError};

#[derive(Debug, Deserialize)]
struct Envelope {
    code: u16,
    message: String,
    #[serde(default)]
    data: Option<Value>,
    success: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedInUser {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignIn {
    pub user: SignedInUser,
    pub tokens: Tokens,
}

/// The part of `/api/purchase/status` the tracker acts on.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    pub is_premium: bool,
    pub has_access: bool,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("offtimes-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn send<T, B>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%method, path, status = status.as_u16(), "API call");

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            // Body rejections from the framework are plain text
            Err(_) if !status.is_success() => {
                return Err(TrackerError::Api {
                    status: status.as_u16(),
                    message: text,
                })
            }
            Err(e) => return Err(e.into()),
        };

        if !envelope.success || !status.is_success() {
            return Err(TrackerError::Api {
                status: if envelope.code == 0 {
                    status.as_u16()
                } else {
                    envelope.code
                },
                message: envelope.message,
            });
        }

        match envelope.data {
            None | Some(Value::Null) => Ok(None),
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
        }
    }

    async fn send_expecting<T, B>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(method, path, token, body)
            .await?
            .ok_or(TrackerError::EmptyResponse)
    }

    /// Password login by phone number or username.
    pub async fn login(&self, account: &str, password: &str) -> Result<SignIn> {
        let body = json!({ "account": account, "password": password });
        self.send_expecting(Method::POST, "/api/auth/login", None, Some(&body))
            .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Tokens> {
        let body = json!({ "refreshToken": refresh_token });
        self.send_expecting(Method::POST, "/api/auth/refresh", None, Some(&body))
            .await
    }

    pub async fn logout(&self, access_token: &str) -> Result<()> {
        self.send::<Value, Value>(Method::POST, "/api/auth/logout", Some(access_token), None)
            .await
            .map(|_| ())
    }

    pub async fn upload_backup(
        &self,
        access_token: &str,
        request: &BackupUploadRequest,
    ) -> Result<BackupUploadResult> {
        self.send_expecting(
            Method::POST,
            "/api/backup/upload",
            Some(access_token),
            Some(request),
        )
        .await
    }

    pub async fn purchase_status(&self, access_token: &str) -> Result<RemoteStatus> {
        self.send_expecting::<_, Value>(
            Method::GET,
            "/api/purchase/status",
            Some(access_token),
            None,
        )
        .await
    }
}

/// Sends backup snapshots somewhere.
#[async_trait]
pub trait BackupUploader: Send + Sync {
    async fn upload(&self, request: &BackupUploadRequest) -> Result<BackupUploadResult>;
}

/// Tells whether the signed-in account holds premium.
#[async_trait]
pub trait PremiumSource: Send + Sync {
    async fn fetch_premium(&self) -> Result<bool>;
}

/// The signed-in account: an `ApiClient` plus the tokens kept in the store.
///
/// Calls that fail with 401 refresh the token pair once and retry.
#[derive(Clone)]
pub struct Account {
    client: ApiClient,
    settings: SettingsRepository,
}

impl Account {
    pub fn new(client: ApiClient, settings: SettingsRepository) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Log in and keep the tokens. Returns the user id.
    pub async fn sign_in(&self, account: &str, password: &str) -> Result<String> {
        let signed_in = self.client.login(account, password).await?;
        self.settings
            .save_tokens(
                &signed_in.user.id,
                &signed_in.tokens.access_token,
                &signed_in.tokens.refresh_token,
            )
            .await?;
        info!(user_id = %signed_in.user.id, "Signed in");
        Ok(signed_in.user.id)
    }

    /// Forget the account locally. The server session is revoked when reachable.
    pub async fn sign_out(&self) -> Result<()> {
        let state = self.settings.account_state().await?;
        if let Some(token) = state.access_token.as_deref() {
            if let Err(e) = self.client.logout(token).await {
                warn!(error = %e, "Server logout failed; clearing local session anyway");
            }
        }
        self.settings.clear_account().await?;
        Ok(())
    }

    async fn authorized<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let state = self.settings.account_state().await?;
        let (Some(user_id), Some(access), Some(refresh)) =
            (state.user_id, state.access_token, state.refresh_token)
        else {
            return Err(TrackerError::NotSignedIn);
        };

        match call(access).await {
            Err(e) if e.is_unauthorized() => {
                debug!("Access token rejected, refreshing");
                let tokens = match self.client.refresh(&refresh).await {
                    Ok(tokens) => tokens,
                    Err(e) if e.is_unauthorized() => {
                        // The refresh token is dead too; the user has to sign in again
                        self.settings.clear_account().await?;
                        return Err(TrackerError::NotSignedIn);
                    }
                    Err(e) => return Err(e),
                };
                self.settings
                    .save_tokens(&user_id, &tokens.access_token, &tokens.refresh_token)
                    .await?;
                call(tokens.access_token).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl BackupUploader for Account {
    async fn upload(&self, request: &BackupUploadRequest) -> Result<BackupUploadResult> {
        self.authorized(|token| async move { self.client.upload_backup(&token, request).await })
            .await
    }
}

#[async_trait]
impl PremiumSource for Account {
    async fn fetch_premium(&self) -> Result<bool> {
        self.authorized(|token| async move { self.client.purchase_status(&token).await })
            .await
            .map(|status| status.is_premium)
    }
}

/// True when an error means the server could not be reached at all.
pub fn is_offline_error(error: &TrackerError) -> bool {
    match error {
        TrackerError::Http(e) => e.is_connect() || e.is_timeout(),
        TrackerError::Api { status, .. } => {
            *status == StatusCode::SERVICE_UNAVAILABLE.as_u16()
                || *status == StatusCode::BAD_GATEWAY.as_u16()
        }
        _ => false,
    }
}
