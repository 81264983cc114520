//! Password sign-in and session restore against the GoTrue auth API.

use std::sync::Arc;

use async_trait::async_trait;
use defter_api_types::{AuthUser, PasswordGrant, RefreshGrant, TokenResponse};
use reqwest::Method;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{IdentityProvider, RepoError};
use crate::domain::entities::UserId;
use crate::domain::session::{AuthEvent, Identity};
use crate::infra::session_file::{SessionFile, StoredSession};

use super::{SupabaseClient, decode, send};

const EXPIRY_LEEWAY_SECS: i64 = 30;
const AUTH_EVENT_CAPACITY: usize = 16;

pub struct SupabaseAuth {
    client: Arc<SupabaseClient>,
    sessions: SessionFile,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuth {
    pub fn new(client: Arc<SupabaseClient>, sessions: SessionFile) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            client,
            sessions,
            events,
        }
    }

    /// Exchange email and password for a session and persist it.
    #[instrument(skip(self, password))]
    pub async fn sign_in_password(&self, email: &str, password: &str) -> Result<Identity, RepoError> {
        let mut url = self.client.url("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let request = self
            .client
            .request_with_token(Method::POST, url, self.client.anon_key())
            .json(&PasswordGrant { email, password });
        let grant: TokenResponse = decode(request).await?;

        let stored = self.store_grant(grant)?;
        info!(user_id = %stored.identity.id, "Signed in");
        let _ = self.events.send(AuthEvent::SignedIn(stored.identity.clone()));
        Ok(stored.identity)
    }

    async fn refresh(&self, stored: &StoredSession) -> Result<StoredSession, RepoError> {
        let mut url = self.client.url("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let request = self
            .client
            .request_with_token(Method::POST, url, self.client.anon_key())
            .json(&RefreshGrant {
                refresh_token: &stored.refresh_token,
            });
        let grant: TokenResponse = decode(request).await?;

        let refreshed = self.store_grant(grant)?;
        debug!(user_id = %refreshed.identity.id, "Access token refreshed");
        let _ = self
            .events
            .send(AuthEvent::TokenRefreshed(refreshed.identity.clone()));
        Ok(refreshed)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, RepoError> {
        let url = self.client.url("auth/v1/user")?;
        decode(self.client.request_with_token(Method::GET, url, access_token)).await
    }

    fn store_grant(&self, grant: TokenResponse) -> Result<StoredSession, RepoError> {
        let stored = StoredSession {
            expires_at: grant_expiry(&grant, OffsetDateTime::now_utc()),
            identity: identity_from_user(grant.user),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
        };
        self.sessions
            .save(&stored)
            .map_err(RepoError::from_persistence)?;
        self.client.set_access_token(Some(stored.access_token.clone()));
        Ok(stored)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    /// Restore the stored session, refreshing an expired token, and confirm
    /// it with the auth API.
    #[instrument(skip(self))]
    async fn current_user(&self) -> Result<Option<Identity>, RepoError> {
        let Some(mut stored) = self
            .sessions
            .load()
            .map_err(RepoError::from_persistence)?
        else {
            return Ok(None);
        };

        if stored.is_expired(OffsetDateTime::now_utc(), EXPIRY_LEEWAY_SECS) {
            debug!("Stored access token expired; refreshing");
            stored = self.refresh(&stored).await?;
        }

        let user = self.fetch_user(&stored.access_token).await?;
        self.client.set_access_token(Some(stored.access_token));
        Ok(Some(identity_from_user(user)))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), RepoError> {
        let stored = self.sessions.load().unwrap_or_else(|err| {
            warn!(error = %err, "Unreadable session file; discarding");
            None
        });

        if let Some(stored) = stored {
            let url = self.client.url("auth/v1/logout")?;
            let request = self
                .client
                .request_with_token(Method::POST, url, &stored.access_token);
            // The remote token may already be invalid; local sign-out proceeds regardless.
            if let Err(err) = send(request).await {
                warn!(error = %err, "Remote sign-out failed");
            }
        }

        self.sessions
            .clear()
            .map_err(RepoError::from_persistence)?;
        self.client.set_access_token(None);
        info!("Signed out");
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }
}

fn identity_from_user(user: AuthUser) -> Identity {
    Identity {
        id: UserId::new(user.id),
        email: user.email,
    }
}

fn grant_expiry(grant: &TokenResponse, now: OffsetDateTime) -> Option<OffsetDateTime> {
    if let Some(at) = grant.expires_at {
        return OffsetDateTime::from_unix_timestamp(at).ok();
    }
    grant
        .expires_in
        .map(|secs| now + time::Duration::seconds(secs))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;

    fn grant(expires_in: Option<i64>, expires_at: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_in,
            expires_at,
            user: AuthUser {
                id: Uuid::nil(),
                email: None,
            },
        }
    }

    #[test]
    fn absolute_expiry_wins_over_relative() {
        let now = datetime!(2024-01-01 00:00 UTC);
        let expiry = grant_expiry(&grant(Some(3600), Some(1_704_070_800)), now);
        assert_eq!(expiry, Some(datetime!(2024-01-01 01:00 UTC)));
    }

    #[test]
    fn relative_expiry_is_offset_from_now() {
        let now = datetime!(2024-01-01 00:00 UTC);
        assert_eq!(
            grant_expiry(&grant(Some(60), None), now),
            Some(datetime!(2024-01-01 00:01 UTC))
        );
        assert_eq!(grant_expiry(&grant(None, None), now), None);
    }
}
