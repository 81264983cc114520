//! Traits describing the remote collaborators: the post collection, its change
//! feed, and the identity provider.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::domain::entities::{NewPost, Post, PostId};
use crate::domain::session::{AuthEvent, Identity};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("request was not authorized: {0}")]
    Unauthorized(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn from_transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Full collection ordered by publish date, newest first.
    async fn list_posts(&self) -> Result<Vec<Post>, RepoError>;

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    /// Insert a post, returning the identity assigned by the remote store.
    async fn insert_post(&self, post: NewPost) -> Result<PostId, RepoError>;

    async fn update_content(&self, id: &PostId, content: &str) -> Result<(), RepoError>;
}

/// Kind of row-level change reported by the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Other,
}

impl ChangeKind {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "INSERT" => ChangeKind::Insert,
            "UPDATE" => ChangeKind::Update,
            "DELETE" => ChangeKind::Delete,
            _ => ChangeKind::Other,
        }
    }
}

/// A change notification. Treated as a pure trigger, never as a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
}

/// Releases the remote subscription when dropped.
pub trait SubscriptionRelease: Send + Sync {
    fn release(&self);
}

/// A live change-feed subscription: a stream of events plus its release hook.
pub struct ChangeSubscription {
    events: mpsc::Receiver<ChangeEvent>,
    release: Option<Box<dyn SubscriptionRelease>>,
}

impl ChangeSubscription {
    pub fn new(
        events: mpsc::Receiver<ChangeEvent>,
        release: impl SubscriptionRelease + 'static,
    ) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Subscription with nothing to release beyond the channel itself.
    pub fn detached(events: mpsc::Receiver<ChangeEvent>) -> Self {
        Self {
            events,
            release: None,
        }
    }

    /// Next change, or `None` once the remote channel is closed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.events.close();
        if let Some(release) = self.release.take() {
            release.release();
        }
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self) -> Result<ChangeSubscription, RepoError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Point-in-time lookup of the signed-in user.
    async fn current_user(&self) -> Result<Option<Identity>, RepoError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_out(&self) -> Result<(), RepoError>;
}
