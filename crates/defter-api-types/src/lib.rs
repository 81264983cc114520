//! Request and response shapes exchanged with the hosted blog backend.
//!
//! The backend exposes three surfaces: the PostgREST table API under
//! `/rest/v1`, the GoTrue auth API under `/auth/v1`, and the Phoenix realtime
//! socket under `/realtime/v1/websocket`. Types here mirror their JSON
//! payloads and carry no behaviour beyond (de)serialization.

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A row of the `blog_posts` table as returned by `select=*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPostRow {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub category: String,
    pub content: String,
    pub cover_image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub publish_date: OffsetDateTime,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

/// Insert payload for `blog_posts`; `id` and `created_at` are assigned remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBlogPostRow {
    pub title: String,
    pub summary: String,
    pub category: String,
    pub content: String,
    pub cover_image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub publish_date: OffsetDateTime,
    pub tags: Vec<String>,
    pub user_id: Uuid,
}

/// Partial update restricted to the post body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPatch {
    pub content: String,
}

/// Minimal projection used when only the assigned id is needed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertedRow {
    pub id: String,
}

/// `POST /auth/v1/token?grant_type=password` body.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /auth/v1/token?grant_type=refresh_token` body.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

/// User record returned by `GET /auth/v1/user` and embedded in token responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token grant response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

/// Error body shape shared by the REST and auth endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, alias = "msg", alias = "error_description")]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// A Phoenix channel frame (protocol `vsn=1.0.0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const HEARTBEAT_TOPIC: &str = "phoenix";
pub const POSTGRES_CHANGES: &str = "postgres_changes";

/// `postgres_changes` subscription entry sent in the join payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresChangesFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_tolerates_null_tags() {
        let row: BlogPostRow = serde_json::from_str(
            r#"{"id":"1","title":"t","summary":"s","category":"Yazı","content":"c",
                "cover_image":"https://example.com/a.jpg",
                "publish_date":"2024-01-01T00:00:00Z","tags":null,
                "user_id":null,"created_at":null}"#,
        )
        .expect("row should decode");
        assert!(row.tags.is_empty());
        assert!(row.user_id.is_none());
    }

    #[test]
    fn frame_reference_is_renamed() {
        let frame: PhoenixFrame =
            serde_json::from_str(r#"{"topic":"phoenix","event":"heartbeat","payload":{},"ref":"7"}"#)
                .expect("frame should decode");
        assert_eq!(frame.reference.as_deref(), Some("7"));
        let encoded = serde_json::to_value(&frame).expect("frame should encode");
        assert_eq!(encoded["ref"], "7");
    }
}
