//! Adapters for the hosted backend: table REST, auth, and realtime.

use std::sync::RwLock;

use defter_api_types::ErrorBody;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use crate::application::repos::RepoError;
use crate::config::SupabaseSettings;

use super::error::InfraError;

pub mod auth;
pub mod posts;
pub mod realtime;

pub use auth::SupabaseAuth;
pub use posts::SupabasePosts;
pub use realtime::SupabaseRealtime;

/// Shared HTTP plumbing: base URL, the public API key, and the bearer token
/// of the signed-in user once there is one.
#[derive(Debug)]
pub struct SupabaseClient {
    http: Client,
    base: Url,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl SupabaseClient {
    pub fn new(settings: &SupabaseSettings) -> Result<Self, InfraError> {
        let base = settings
            .url
            .join("/")
            .map_err(|err| InfraError::configuration(format!("invalid backend url: {err}")))?;
        let http = Client::builder().user_agent(Self::user_agent()).build()?;

        Ok(Self {
            http,
            base,
            anon_key: settings.anon_key.clone(),
            access_token: RwLock::new(None),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("defter/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    /// Token of the signed-in user, if any.
    pub fn access_token(&self) -> Option<String> {
        match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn url(&self, path: &str) -> Result<Url, RepoError> {
        self.base
            .join(path)
            .map_err(|err| RepoError::Transport(format!("invalid request path `{path}`: {err}")))
    }

    /// Request carrying the API key and the user's token (or the anon key
    /// when nobody is signed in).
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        self.request_with_token(method, url, &bearer)
    }

    pub fn request_with_token(&self, method: Method, url: Url, token: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }
}

pub(crate) async fn send(request: RequestBuilder) -> Result<Response, RepoError> {
    let response = request.send().await.map_err(RepoError::from_transport)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let bytes = response.bytes().await.unwrap_or_default();
    let message = serde_json::from_slice::<ErrorBody>(&bytes)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());

    warn!(%status, %message, "Backend request failed");
    Err(status_error(status, message))
}

pub(crate) async fn decode<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RepoError> {
    let response = send(request).await?;
    let bytes = response.bytes().await.map_err(RepoError::from_transport)?;
    serde_json::from_slice(&bytes).map_err(|err| RepoError::Decode(err.to_string()))
}

fn status_error(status: StatusCode, message: String) -> RepoError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RepoError::Unauthorized(message),
        StatusCode::NOT_FOUND => RepoError::NotFound,
        _ => RepoError::Persistence(format!("status {status}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> SupabaseSettings {
        SupabaseSettings {
            url: Url::parse(url).expect("url"),
            anon_key: "anon".into(),
            schema: "public".into(),
            table: "blog_posts".into(),
        }
    }

    #[test]
    fn base_is_normalised_to_root() {
        let client = SupabaseClient::new(&settings("https://p.supabase.co/some/path")).expect("client");
        assert_eq!(client.base().as_str(), "https://p.supabase.co/");
        assert_eq!(
            client.url("rest/v1/blog_posts").expect("url").as_str(),
            "https://p.supabase.co/rest/v1/blog_posts"
        );
    }

    #[test]
    fn token_slot_round_trips() {
        let client = SupabaseClient::new(&settings("https://p.supabase.co")).expect("client");
        assert_eq!(client.access_token(), None);
        client.set_access_token(Some("jwt".into()));
        assert_eq!(client.access_token().as_deref(), Some("jwt"));
        client.set_access_token(None);
        assert_eq!(client.access_token(), None);
    }

    #[test]
    fn statuses_map_to_repo_errors() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "jwt expired".into()),
            RepoError::Unauthorized(message) if message == "jwt expired"
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new()),
            RepoError::NotFound
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad".into()),
            RepoError::Persistence(_)
        ));
    }
}
