//! Filtering and ordering of the cached post collection.

use std::collections::HashSet;

use time::{format_description::BorrowedFormatItem, macros::format_description};

use super::entities::{MAX_TAGS, Post};
use super::types::{Category, SortOrder};

/// Day-first calendar date used by the list and detail views.
pub const DISPLAY_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day].[month].[year]");

/// Client-local filter state. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub category: Option<Category>,
    pub sort_order: SortOrder,
    tags: Vec<String>,
}

impl FilterCriteria {
    pub fn new(category: Option<Category>, sort_order: SortOrder) -> Self {
        Self {
            category,
            sort_order,
            tags: Vec::new(),
        }
    }

    /// Builder-style tag selection; duplicates collapse and the cap applies.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) && self.tags.len() < MAX_TAGS {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_tag_selected(&self, tag: &str) -> bool {
        self.tags.iter().any(|selected| selected == tag)
    }

    /// Deselect a selected tag, otherwise select it. Selections past the cap are ignored.
    pub fn toggle_tag(&mut self, tag: &str) {
        if let Some(index) = self.tags.iter().position(|selected| selected == tag) {
            self.tags.remove(index);
        } else if self.tags.len() < MAX_TAGS {
            self.tags.push(tag.to_string());
        }
    }

    pub fn matches(&self, post: &Post) -> bool {
        if let Some(category) = self.category
            && post.category != category
        {
            return false;
        }

        self.tags.is_empty() || post.has_any_tag(&self.tags)
    }
}

/// Derive the displayed subset and order from the cached collection.
///
/// Ties on `publish_date` keep the input order.
pub fn derive(posts: &[Post], criteria: &FilterCriteria) -> Vec<Post> {
    let mut visible: Vec<Post> = posts
        .iter()
        .filter(|post| criteria.matches(post))
        .cloned()
        .collect();

    match criteria.sort_order {
        SortOrder::NewestFirst => visible.sort_by(|a, b| b.publish_date.cmp(&a.publish_date)),
        SortOrder::OldestFirst => visible.sort_by(|a, b| a.publish_date.cmp(&b.publish_date)),
    }

    visible
}

/// Every tag used by any post, in first-seen order.
pub fn available_tags(posts: &[Post]) -> Vec<String> {
    let mut seen = HashSet::new();
    posts
        .iter()
        .flat_map(|post| post.tags.iter())
        .filter(|tag| seen.insert(tag.as_str()))
        .cloned()
        .collect()
}

pub fn format_display_date(post: &Post) -> String {
    post.publish_date
        .format(DISPLAY_DATE_FORMAT)
        .unwrap_or_else(|_| post.publish_date.date().to_string())
}
