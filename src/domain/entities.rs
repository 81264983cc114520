//! Domain entities mirrored from the remote collection.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::Category;

/// Maximum number of tags a post (or a tag filter) may carry.
pub const MAX_TAGS: usize = 5;
/// Maximum summary length, counted in characters.
pub const MAX_SUMMARY_CHARS: usize = 150;

/// Opaque post identity assigned by the remote store on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PostId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity of an authenticated user as issued by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new(value: Uuid) -> Self {
        Self(value)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub cover_image: String,
    pub content: String,
    pub publish_date: OffsetDateTime,
    pub tags: Vec<String>,
    /// Rows created outside this client may lack an owner.
    pub owner_id: Option<UserId>,
}

impl Post {
    pub fn has_any_tag(&self, selected: &[String]) -> bool {
        selected.iter().any(|tag| self.tags.contains(tag))
    }

    /// Content split on embedded line breaks, as rendered in the detail view.
    pub fn content_lines(&self) -> impl Iterator<Item = &str> {
        self.content.split('\n')
    }
}

/// A validated post ready for insertion. `id` is assigned remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub cover_image: String,
    pub content: String,
    pub publish_date: OffsetDateTime,
    pub tags: Vec<String>,
    pub owner_id: UserId,
}
