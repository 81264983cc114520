//! `blog_posts` table access over PostgREST.

use std::sync::Arc;

use async_trait::async_trait;
use defter_api_types::{BlogPostRow, ContentPatch, InsertedRow, NewBlogPostRow};
use reqwest::Method;
use tracing::{debug, instrument};
use url::Url;

use crate::application::repos::{PostsRepo, PostsWriteRepo, RepoError};
use crate::domain::entities::{NewPost, Post, PostId, UserId};
use crate::domain::types::Category;

use super::{SupabaseClient, decode};

const PREFER_REPRESENTATION: &str = "return=representation";

pub struct SupabasePosts {
    client: Arc<SupabaseClient>,
    table: String,
}

impl SupabasePosts {
    pub fn new(client: Arc<SupabaseClient>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn table_url(&self, query: &[(&str, &str)]) -> Result<Url, RepoError> {
        let mut url = self.client.url(&format!("rest/v1/{}", self.table))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl PostsRepo for SupabasePosts {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn list_posts(&self) -> Result<Vec<Post>, RepoError> {
        let url = self.table_url(&[("select", "*"), ("order", "publish_date.desc")])?;
        let rows: Vec<BlogPostRow> = decode(self.client.request(Method::GET, url)).await?;
        debug!(rows = rows.len(), "Fetched post rows");
        rows.into_iter().map(post_from_row).collect()
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>, RepoError> {
        if id.as_str().trim().is_empty() {
            return Ok(None);
        }

        let filter = format!("eq.{}", id.as_str());
        let url = self.table_url(&[("select", "*"), ("id", filter.as_str()), ("limit", "1")])?;
        let rows: Vec<BlogPostRow> = decode(self.client.request(Method::GET, url)).await?;
        rows.into_iter().next().map(post_from_row).transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for SupabasePosts {
    #[instrument(skip(self, post), fields(table = %self.table))]
    async fn insert_post(&self, post: NewPost) -> Result<PostId, RepoError> {
        let url = self.table_url(&[("select", "id")])?;
        let request = self
            .client
            .request(Method::POST, url)
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&row_from_new_post(post));

        let inserted: Vec<InsertedRow> = decode(request).await?;
        inserted
            .into_iter()
            .next()
            .map(|row| PostId::new(row.id))
            .ok_or_else(|| RepoError::Decode("insert returned no rows".to_string()))
    }

    #[instrument(skip(self, content), fields(table = %self.table, post_id = %id))]
    async fn update_content(&self, id: &PostId, content: &str) -> Result<(), RepoError> {
        let filter = format!("eq.{}", id.as_str());
        let url = self.table_url(&[("id", filter.as_str()), ("select", "id")])?;
        let request = self
            .client
            .request(Method::PATCH, url)
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&ContentPatch {
                content: content.to_string(),
            });

        // Row-level policies filter silently; an empty result means nothing matched.
        let updated: Vec<InsertedRow> = decode(request).await?;
        if updated.is_empty() {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

fn post_from_row(row: BlogPostRow) -> Result<Post, RepoError> {
    let category = row
        .category
        .parse::<Category>()
        .map_err(|err| RepoError::Decode(format!("post {}: {err}", row.id)))?;

    Ok(Post {
        id: PostId::new(row.id),
        title: row.title,
        summary: row.summary,
        category,
        cover_image: row.cover_image,
        content: row.content,
        publish_date: row.publish_date,
        tags: row.tags,
        owner_id: row.user_id.map(UserId::new),
    })
}

fn row_from_new_post(post: NewPost) -> NewBlogPostRow {
    NewBlogPostRow {
        title: post.title,
        summary: post.summary,
        category: post.category.as_str().to_string(),
        content: post.content,
        cover_image: post.cover_image,
        publish_date: post.publish_date,
        tags: post.tags,
        user_id: post.owner_id.as_uuid(),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;

    fn row(category: &str) -> BlogPostRow {
        BlogPostRow {
            id: "42".into(),
            title: "Kış".into(),
            summary: "özet".into(),
            category: category.into(),
            content: "satır".into(),
            cover_image: "https://example.com/k.jpg".into(),
            publish_date: datetime!(2024-02-01 10:00 UTC),
            tags: vec!["kış".into()],
            user_id: Some(Uuid::nil()),
            created_at: None,
        }
    }

    #[test]
    fn row_maps_to_post() {
        let post = post_from_row(row("Şiir")).expect("valid row");
        assert_eq!(post.id.as_str(), "42");
        assert_eq!(post.category, Category::Siir);
        assert_eq!(post.owner_id, Some(UserId::new(Uuid::nil())));
    }

    #[test]
    fn unknown_category_is_a_decode_error() {
        let err = post_from_row(row("Roman")).expect_err("bad category");
        assert!(matches!(err, RepoError::Decode(message) if message.contains("42")));
    }

    #[test]
    fn new_post_carries_owner_and_label() {
        let owner = Uuid::new_v4();
        let encoded = row_from_new_post(NewPost {
            title: "t".into(),
            summary: "s".into(),
            category: Category::Ani,
            cover_image: "https://example.com/c.jpg".into(),
            content: "c".into(),
            publish_date: datetime!(2024-03-01 00:00 UTC),
            tags: vec![],
            owner_id: UserId::new(owner),
        });
        assert_eq!(encoded.category, "Anı");
        assert_eq!(encoded.user_id, owner);
    }
}
