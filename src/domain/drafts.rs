//! In-progress posts assembled by the create flow.

use time::OffsetDateTime;
use url::Url;

use super::entities::{MAX_SUMMARY_CHARS, MAX_TAGS, NewPost, UserId};
use super::error::DomainError;
use super::types::Category;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub cover_image: String,
    pub content: String,
    tags: Vec<String>,
}

impl PostDraft {
    /// A draft with the given fields and no tags yet.
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        category: Category,
        cover_image: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            category,
            cover_image: cover_image.into(),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Append a tag. Blank, duplicate, and over-cap tags are rejected without
    /// touching the draft.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.len() >= MAX_TAGS || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|existing| existing != tag);
    }

    pub fn summary_len(&self) -> usize {
        self.summary.chars().count()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        ensure_non_blank(&self.title, "title")?;
        ensure_non_blank(&self.summary, "summary")?;
        ensure_non_blank(&self.cover_image, "cover_image")?;
        ensure_non_blank(&self.content, "content")?;

        if self.summary_len() > MAX_SUMMARY_CHARS {
            return Err(DomainError::validation(
                "summary",
                format!("must be at most {MAX_SUMMARY_CHARS} characters"),
            ));
        }

        Url::parse(self.cover_image.trim()).map_err(|err| {
            DomainError::validation("cover_image", format!("not an absolute URL: {err}"))
        })?;

        if self.tags.len() > MAX_TAGS {
            return Err(DomainError::invariant(format!(
                "draft carries {} tags, limit is {MAX_TAGS}",
                self.tags.len()
            )));
        }

        Ok(())
    }

    /// Validate and stamp ownership plus the creation timestamp.
    pub fn into_new_post(
        self,
        owner_id: UserId,
        publish_date: OffsetDateTime,
    ) -> Result<NewPost, DomainError> {
        self.validate()?;
        Ok(NewPost {
            title: self.title.trim().to_string(),
            summary: self.summary.trim().to_string(),
            category: self.category,
            cover_image: self.cover_image.trim().to_string(),
            content: self.content,
            publish_date,
            tags: self.tags,
            owner_id,
        })
    }
}

pub fn ensure_non_blank(value: &str, field: &'static str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;

    fn filled() -> PostDraft {
        PostDraft {
            title: "Sonbahar".to_string(),
            summary: "Kısa bir özet".to_string(),
            category: Category::Siir,
            cover_image: "https://example.com/leaf.jpg".to_string(),
            content: "ilk satır\nikinci satır".to_string(),
            ..PostDraft::default()
        }
    }

    #[test]
    fn sixth_tag_is_a_no_op() {
        let mut draft = filled();
        for tag in ["a", "b", "c", "d", "e"] {
            assert!(draft.add_tag(tag));
        }
        assert!(!draft.add_tag("f"));
        assert_eq!(draft.tags().len(), 5);
        assert!(!draft.tags().iter().any(|tag| tag == "f"));
    }

    #[test]
    fn blank_and_duplicate_tags_are_rejected() {
        let mut draft = filled();
        assert!(draft.add_tag(" doğa "));
        assert!(!draft.add_tag("doğa"));
        assert!(!draft.add_tag("   "));
        assert_eq!(draft.tags(), ["doğa"]);

        draft.remove_tag("doğa");
        assert!(draft.tags().is_empty());
    }

    #[test]
    fn summary_limit_counts_characters() {
        let mut draft = filled();
        draft.summary = "ş".repeat(MAX_SUMMARY_CHARS);
        assert!(draft.validate().is_ok());

        draft.summary.push('ş');
        let err = draft.validate().expect_err("151 characters");
        assert!(matches!(err, DomainError::Validation { field: "summary", .. }));
    }

    #[test]
    fn cover_image_must_be_a_url() {
        let mut draft = filled();
        draft.cover_image = "leaf.jpg".to_string();
        let err = draft.validate().expect_err("relative path");
        assert!(matches!(
            err,
            DomainError::Validation {
                field: "cover_image",
                ..
            }
        ));
    }

    #[test]
    fn blank_content_is_rejected() {
        let mut draft = filled();
        draft.content = "\n  ".to_string();
        let err = draft.validate().expect_err("blank content");
        assert!(matches!(err, DomainError::Validation { field: "content", .. }));
    }

    #[test]
    fn into_new_post_stamps_owner_and_date() {
        let owner = UserId::new(Uuid::nil());
        let stamped = datetime!(2024-02-01 10:00 UTC);
        let mut draft = filled();
        draft.add_tag("güz");

        let post = draft.into_new_post(owner, stamped).expect("valid draft");
        assert_eq!(post.owner_id, owner);
        assert_eq!(post.publish_date, stamped);
        assert_eq!(post.tags, ["güz"]);
        assert_eq!(post.content, "ilk satır\nikinci satır");
    }
}
