//! Process-wide view of the current session.
//!
//! One observer is created at startup and shared with every component that
//! needs the signed-in identity.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::repos::{IdentityProvider, RepoError};
use crate::domain::session::{AuthEvent, Identity, Session};

pub struct SessionObserver {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<Session>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionObserver {
    /// Start resolving the session in the background.
    ///
    /// The observer reports `Session::Unresolved` until the initial check
    /// completes; auth events are applied from then on.
    pub fn start(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(Session::Unresolved);
        let state = Arc::new(state);
        let events = provider.subscribe();
        let listener = tokio::spawn(observe(provider.clone(), events, state.clone()));

        Self {
            provider,
            state,
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_resolved(&self) -> bool {
        self.state.borrow().is_resolved()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Wait until the startup check has settled on an identity or its absence.
    pub async fn wait_resolved(&self) -> Session {
        let mut receiver = self.state.subscribe();
        match receiver.wait_for(Session::is_resolved).await {
            Ok(session) => session.clone(),
            Err(_) => self.session(),
        }
    }

    pub async fn sign_out(&self) -> Result<(), RepoError> {
        self.provider.sign_out().await?;
        self.state.send_replace(Session::Anonymous);
        Ok(())
    }

    /// Stop listening for auth events.
    pub async fn shutdown(&self) {
        let listener = self.take_listener();
        if let Some(listener) = listener {
            listener.abort();
            let _ = listener.await;
        }
    }

    fn take_listener(&self) -> Option<JoinHandle<()>> {
        match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl Drop for SessionObserver {
    fn drop(&mut self) {
        if let Some(listener) = self.take_listener() {
            listener.abort();
        }
    }
}

async fn observe(
    provider: Arc<dyn IdentityProvider>,
    mut events: broadcast::Receiver<AuthEvent>,
    state: Arc<watch::Sender<Session>>,
) {
    let initial = resolve(provider.as_ref()).await;
    info!(
        authenticated = initial.identity().is_some(),
        "Session resolved"
    );
    state.send_replace(initial);

    loop {
        match events.recv().await {
            Ok(event) => {
                info!(event = event_name(&event), "Auth state changed");
                state.send_replace(Session::after(&event));
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth events lagged; re-checking session");
                state.send_replace(resolve(provider.as_ref()).await);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Point-in-time check. A failed check clears the stored session instead of retrying.
async fn resolve(provider: &dyn IdentityProvider) -> Session {
    match provider.current_user().await {
        Ok(Some(identity)) => Session::Authenticated(identity),
        Ok(None) => Session::Anonymous,
        Err(err) => {
            warn!(error = %err, "Session check failed; signing out");
            if let Err(sign_out) = provider.sign_out().await {
                warn!(error = %sign_out, "Failed to clear stale session");
            }
            Session::Anonymous
        }
    }
}

fn event_name(event: &AuthEvent) -> &'static str {
    match event {
        AuthEvent::SignedIn(_) => "signed_in",
        AuthEvent::SignedOut => "signed_out",
        AuthEvent::TokenRefreshed(_) => "token_refreshed",
    }
}
