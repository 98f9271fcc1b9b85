// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hosted backend client: auth over the GoTrue REST API and rows over
//! PostgREST.
//!
//! One client serves both seams so row requests carry the signed-in user's
//! access token, which the row-level security policies key on.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    ProfileRepository, ProviderError, RepositoryError, Session, SessionEvent, SessionStore,
    SessionUser, SignUpOutcome, SESSION_EVENT_CAPACITY,
};
use crate::config::AppConfig;
use crate::models::{NewProfile, NewTransaction, Profile, ProfileUpdate, Transaction};

const PROFILES_TABLE: &str = "profiles";
const TRANSACTIONS_TABLE: &str = "transactions";

#[derive(Debug, Deserialize)]
struct AuthUserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthSessionResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUserResponse,
}

impl From<AuthUserResponse> for SessionUser {
    fn from(user: AuthUserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

#[derive(Clone)]
pub struct SupabaseClient {
    base_url: String,
    anon_key: String,
    http: Client,
    session: Arc<RwLock<Option<Session>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SupabaseClient {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            http,
            session: Arc::new(RwLock::new(None)),
            events,
        })
    }

    /// Client for the configured backend, `None` when it is not configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, ProviderError> {
        match (&config.supabase_url, &config.supabase_anon_key) {
            (Some(url), Some(key)) => Self::new(url, key, config.http_timeout).map(Some),
            _ => Ok(None),
        }
    }

    /// Exchange the refresh token for a new session.
    ///
    /// A rejected refresh token ends the session, as the hosted SDK does.
    pub async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .ok_or_else(|| ProviderError::Rejected("no refresh token".to_string()))?;

        let result = self
            .auth_post(
                "token?grant_type=refresh_token",
                &json!({ "refresh_token": refresh_token }),
                None,
            )
            .await
            .and_then(parse_session);

        match result {
            Ok(session) => {
                *self.session.write().await = Some(session.clone());
                debug!(user_id = %session.user.id, "Session refreshed");
                self.emit(SessionEvent::TokenRefreshed(session.clone()));
                Ok(session)
            }
            Err(ProviderError::Rejected(message)) => {
                warn!(error = %message, "Refresh token rejected, ending session");
                if self.session.write().await.take().is_some() {
                    self.emit(SessionEvent::SignedOut);
                }
                Err(ProviderError::Rejected(message))
            }
            Err(e) => Err(e),
        }
    }

    /// Unix timestamp at which the current access token expires.
    pub async fn session_expires_at(&self) -> Option<i64> {
        self.session.read().await.as_ref().and_then(|s| s.expires_at)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn bearer(&self) -> String {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    async fn auth_post(
        &self,
        path: &str,
        payload: &Value,
        bearer: Option<&str>,
    ) -> Result<Value, ProviderError> {
        let url = format!("{}/auth/v1/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(self.anon_key.as_str()))
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("POST /auth/v1/{path} failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = extract_error_message(&body)
                .unwrap_or_else(|| format!("POST /auth/v1/{path} returned {status}"));
            return Err(if status.is_client_error() {
                ProviderError::Rejected(message)
            } else {
                ProviderError::Request(message)
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::InvalidResponse(format!("POST /auth/v1/{path} invalid JSON: {e}"))
        })
    }

    fn rest_url(&self, table: &str, query: &[(&str, String)]) -> Result<Url, RepositoryError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{table}", self.base_url))
            .map_err(|e| RepositoryError::Request(format!("invalid backend URL: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn rest(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await)
    }

    async fn rest_get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<T, RepositoryError> {
        let url = self.rest_url(table, query)?;
        let response = self
            .rest(self.http.get(url))
            .await
            .send()
            .await
            .map_err(|e| RepositoryError::Request(format!("GET {table} failed: {e}")))?;
        read_rows(table, response).await
    }

    async fn rest_insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T, RepositoryError> {
        let url = self.rest_url(table, &[])?;
        let response = self
            .rest(self.http.post(url))
            .await
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| RepositoryError::Request(format!("POST {table} failed: {e}")))?;
        let mut rows: Vec<T> = read_rows(table, response).await?;
        if rows.is_empty() {
            return Err(RepositoryError::InvalidResponse(format!(
                "insert into {table} returned no row"
            )));
        }
        Ok(rows.swap_remove(0))
    }
}

#[async_trait]
impl SessionStore for SupabaseClient {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        Ok(self.session.read().await.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, ProviderError> {
        let body = self
            .auth_post(
                "signup",
                &json!({ "email": email, "password": password }),
                None,
            )
            .await?;
        let outcome = parse_sign_up(body)?;

        if let Some(session) = &outcome.session {
            *self.session.write().await = Some(session.clone());
            info!(user_id = %session.user.id, "Signed up with active session");
            self.emit(SessionEvent::SignedIn(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let body = self
            .auth_post(
                "token?grant_type=password",
                &json!({ "email": email, "password": password }),
                None,
            )
            .await?;
        let session = parse_session(body)?;

        *self.session.write().await = Some(session.clone());
        info!(user_id = %session.user.id, "Signed in with password");
        self.emit(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        self.emit(SessionEvent::SignedOut);

        match self
            .auth_post("logout", &json!({}), Some(&session.access_token))
            .await
        {
            Ok(_) => Ok(()),
            // The token was already invalid server-side; the local session is gone either way.
            Err(ProviderError::Rejected(message)) => {
                debug!(error = %message, "Remote logout rejected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ProfileRepository for SupabaseClient {
    async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>, RepositoryError> {
        let mut rows: Vec<Profile> = self
            .rest_get(
                PROFILES_TABLE,
                &[("id", format!("eq.{id}")), ("select", "*".to_string())],
            )
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, RepositoryError> {
        self.rest_insert(PROFILES_TABLE, profile).await
    }

    async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<(), RepositoryError> {
        let url = self.rest_url(PROFILES_TABLE, &[("id", format!("eq.{id}"))])?;
        let response = self
            .rest(self.http.patch(url))
            .await
            .header("Prefer", "return=minimal")
            .json(update)
            .send()
            .await
            .map_err(|e| RepositoryError::Request(format!("PATCH profiles failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(repository_error(PROFILES_TABLE, status, &body))
    }

    async fn top_profiles(&self, limit: usize) -> Result<Vec<Profile>, RepositoryError> {
        self.rest_get(
            PROFILES_TABLE,
            &[
                ("select", "*".to_string()),
                ("order", "carelevel_score.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        self.rest_get(
            TRANSACTIONS_TABLE,
            &[
                ("user_id", format!("eq.{user_id}")),
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn insert_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<Transaction, RepositoryError> {
        self.rest_insert(TRANSACTIONS_TABLE, transaction).await
    }
}

async fn read_rows<T: DeserializeOwned>(
    table: &str,
    response: Response,
) -> Result<T, RepositoryError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(repository_error(table, status, &body));
    }
    serde_json::from_str(&body)
        .map_err(|e| RepositoryError::InvalidResponse(format!("{table} rows invalid: {e}")))
}

fn parse_session(body: Value) -> Result<Session, ProviderError> {
    let raw: AuthSessionResponse = serde_json::from_value(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("invalid session: {e}")))?;
    let expires_at = raw
        .expires_at
        .or_else(|| raw.expires_in.map(|secs| Utc::now().timestamp() + secs));

    Ok(Session {
        access_token: raw.access_token,
        refresh_token: raw.refresh_token,
        expires_at,
        user: raw.user.into(),
    })
}

/// A sign-up answers with a session when the account is usable right away,
/// and with the bare user when email confirmation is pending.
fn parse_sign_up(body: Value) -> Result<SignUpOutcome, ProviderError> {
    if body.get("access_token").is_some() {
        let session = parse_session(body)?;
        return Ok(SignUpOutcome {
            user: Some(session.user.clone()),
            session: Some(session),
        });
    }

    let user_value = match body.get("user") {
        Some(user) if !user.is_null() => user.clone(),
        _ => body,
    };
    let user = if user_value.get("id").is_some() {
        let user: AuthUserResponse = serde_json::from_value(user_value)
            .map_err(|e| ProviderError::InvalidResponse(format!("invalid user: {e}")))?;
        Some(user.into())
    } else {
        None
    };

    Ok(SignUpOutcome {
        user,
        session: None,
    })
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Column name from a "Could not find the '<column>' column" schema error.
pub fn parse_missing_column(message: &str) -> Option<String> {
    const MARKER: &str = "Could not find the '";
    let start = message.find(MARKER)? + MARKER.len();
    let rest = &message[start..];
    let end = rest.find("' column")?;
    Some(rest[..end].to_string())
}

fn repository_error(table: &str, status: StatusCode, body: &str) -> RepositoryError {
    let message = extract_error_message(body).unwrap_or_else(|| body.to_string());

    if let Some(column) = parse_missing_column(&message) {
        return RepositoryError::MissingColumn {
            table: table.to_string(),
            column,
        };
    }
    if status == StatusCode::CONFLICT {
        return RepositoryError::Conflict(message);
    }
    RepositoryError::Request(format!("{table} returned {status}: {message}"))
}
