//! Authentication state as seen by the client.

use serde::{Deserialize, Serialize};

use super::entities::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: Option<String>,
}

impl Identity {
    pub fn display_name(&self) -> String {
        self.email.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// Current session. `Unresolved` lasts until the startup check completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Unresolved,
    Authenticated(Identity),
    Anonymous,
}

impl Session {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Session::Unresolved)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Session::Authenticated(identity) => Some(identity),
            Session::Unresolved | Session::Anonymous => None,
        }
    }

    /// The session an auth state change reported by the identity provider
    /// leads to. Every event fully determines the next state.
    pub fn after(event: &AuthEvent) -> Session {
        match event {
            AuthEvent::SignedIn(identity) | AuthEvent::TokenRefreshed(identity) => {
                Session::Authenticated(identity.clone())
            }
            AuthEvent::SignedOut => Session::Anonymous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
    TokenRefreshed(Identity),
}
