//! Authentication state and sign-in.
//!
//! `AuthState` publishes the signed-in user id on a `watch` channel. A new
//! subscriber sees the current value immediately and every change after
//! that, which is what `SyncStore::follow_auth` consumes.
//!
//! `FirebaseAuth` signs in with email and password against the Identity
//! Toolkit REST API.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Current user id, `None` when signed out.
pub type AuthSnapshot = Option<String>;

/// Publisher side of the auth channel.
#[derive(Debug)]
pub struct AuthState {
    tx: watch::Sender<AuthSnapshot>,
}

impl AuthState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.tx.subscribe()
    }

    pub fn current_user(&self) -> AuthSnapshot {
        self.tx.borrow().clone()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        tracing::info!("User signed in: {}", user_id);
        self.tx.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        tracing::info!("User signed out");
        self.tx.send_replace(None);
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Sign-in rejected: {0}")]
    Rejected(String),

    #[error("Auth request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Result of a successful sign-in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    #[serde(rename = "localId")]
    pub user_id: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Email/password sign-in against Firebase Authentication.
#[derive(Debug, Clone)]
pub struct FirebaseAuth {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: IDENTITY_TOOLKIT_URL.to_string(),
        }
    }

    /// Point at another endpoint (the auth emulator, for instance).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn sign_in_url(&self) -> String {
        format!(
            "{}/accounts:signInWithPassword?key={}",
            self.base_url,
            urlencoding::encode(&self.api_key)
        )
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(self.sign_in_url())
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(AuthError::Rejected(message));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_sees_current_value_and_changes() {
        let state = AuthState::new();
        state.sign_in("u1");

        let mut rx = state.subscribe();
        assert_eq!(rx.borrow_and_update().as_deref(), Some("u1"));

        state.sign_out();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), None);
        assert_eq!(state.current_user(), None);
    }

    #[test]
    fn test_sign_in_url_encodes_key() {
        let auth = FirebaseAuth::new("a key").with_base_url("http://localhost:9099/v1/");
        assert_eq!(
            auth.sign_in_url(),
            "http://localhost:9099/v1/accounts:signInWithPassword?key=a%20key"
        );
    }

    #[test]
    fn test_session_deserializes_rest_response() {
        let session: AuthSession = serde_json::from_str(
            r#"{"localId":"uid1","idToken":"tok","refreshToken":"ref","email":"a@b.c","expiresIn":"3600"}"#,
        )
        .unwrap();
        assert_eq!(session.user_id, "uid1");
        assert_eq!(session.id_token, "tok");
        assert_eq!(session.refresh_token.as_deref(), Some("ref"));
    }
}
