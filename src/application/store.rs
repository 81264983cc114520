//! Locally cached mirror of the remote post collection.
//!
//! The store owns the only copy of the cache. Reloads replace it wholesale;
//! content edits patch the matching entry in place. Creates leave the cache
//! alone and rely on the change feed to trigger the next reload.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::application::error::StoreError;
use crate::application::repos::{PostsRepo, PostsWriteRepo};
use crate::domain::drafts::{PostDraft, ensure_non_blank};
use crate::domain::entities::{Post, PostId};
use crate::domain::posts::{self, FilterCriteria};
use crate::domain::session::Identity;

pub(crate) const METRIC_RELOAD_TOTAL: &str = "defter_store_reload_total";
pub(crate) const METRIC_RELOAD_FAILED_TOTAL: &str = "defter_store_reload_failed_total";
pub(crate) const METRIC_POSTS: &str = "defter_store_posts";
pub(crate) const METRIC_WRITE_FAILED_TOTAL: &str = "defter_store_write_failed_total";

/// Point-in-time copy of the store state handed to views.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub posts: Vec<Post>,
    pub loading: bool,
    pub last_error: Option<String>,
    pub revision: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    posts: Vec<Post>,
    last_error: Option<String>,
    revision: u64,
}

pub struct PostStore {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    cache: RwLock<CacheState>,
    in_flight: watch::Sender<usize>,
    revision: watch::Sender<u64>,
}

impl PostStore {
    pub fn new(reader: Arc<dyn PostsRepo>, writer: Arc<dyn PostsWriteRepo>) -> Self {
        let (revision, _) = watch::channel(0);
        let (in_flight, _) = watch::channel(0);
        Self {
            reader,
            writer,
            cache: RwLock::new(CacheState::default()),
            in_flight,
            revision,
        }
    }

    /// Replace the cache with a fresh fetch of the whole collection.
    ///
    /// Overlapping calls are not de-duplicated: the last one to complete
    /// writes the cache last. On failure the previous cache is kept and the
    /// error flag is set.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<usize, StoreError> {
        let _loading = LoadingGuard::enter(&self.in_flight);
        counter!(METRIC_RELOAD_TOTAL).increment(1);

        match self.reader.list_posts().await {
            Ok(fetched) => {
                let count = fetched.len();
                let revision = {
                    let mut cache = self.write_cache("load_all");
                    cache.posts = fetched;
                    cache.last_error = None;
                    cache.revision += 1;
                    self.revision.send_replace(cache.revision);
                    cache.revision
                };
                gauge!(METRIC_POSTS).set(count as f64);
                info!(count, revision, "Post cache reloaded");
                Ok(count)
            }
            Err(err) => {
                counter!(METRIC_RELOAD_FAILED_TOTAL).increment(1);
                error!(error = %err, "Failed to load posts");
                let failure = StoreError::Fetch(err);
                self.write_cache("load_all_failed").last_error =
                    Some(failure.user_message());
                Err(failure)
            }
        }
    }

    /// Insert a post built from `draft` on behalf of `author`.
    ///
    /// The cache is not touched; the change feed announces the insert.
    #[instrument(skip(self, draft, author), fields(title = %draft.title))]
    pub async fn create(
        &self,
        draft: PostDraft,
        author: Option<&Identity>,
    ) -> Result<PostId, StoreError> {
        let author = author.ok_or(StoreError::Unauthenticated)?;
        let post = draft.into_new_post(author.id, OffsetDateTime::now_utc())?;

        match self.writer.insert_post(post).await {
            Ok(id) => {
                info!(post_id = %id, owner_id = %author.id, "Post created");
                Ok(id)
            }
            Err(err) => {
                counter!(METRIC_WRITE_FAILED_TOTAL, "op" => "create").increment(1);
                error!(error = %err, "Failed to create post");
                Err(StoreError::Write(err))
            }
        }
    }

    /// Replace the content of post `id`, patching the cached copy on success.
    #[instrument(skip(self, new_content), fields(post_id = %id))]
    pub async fn update_content(&self, id: &PostId, new_content: &str) -> Result<(), StoreError> {
        ensure_non_blank(new_content, "content")?;

        if let Err(err) = self.writer.update_content(id, new_content).await {
            counter!(METRIC_WRITE_FAILED_TOTAL, "op" => "update_content").increment(1);
            error!(error = %err, "Failed to update post content");
            return Err(StoreError::Write(err));
        }

        let patched = {
            let mut guard = self.write_cache("update_content");
            let cache = &mut *guard;
            match cache.posts.iter_mut().find(|post| &post.id == id) {
                Some(post) => {
                    post.content = new_content.to_string();
                    cache.revision += 1;
                    self.revision.send_replace(cache.revision);
                    Some(cache.revision)
                }
                None => None,
            }
        };

        match patched {
            Some(revision) => info!(revision, "Post content updated"),
            None => debug!("Post content updated; entry not cached"),
        }
        Ok(())
    }

    /// Look up a post in the cache, falling back to a single remote fetch.
    pub async fn get_by_id(&self, id: &PostId) -> Result<Post, StoreError> {
        if let Some(post) = self.cached(id) {
            return Ok(post);
        }

        debug!(post_id = %id, "Post not cached; fetching");
        match self.reader.find_by_id(id).await {
            Ok(Some(post)) => Ok(post),
            Ok(None) => Err(StoreError::NotFound(id.to_string())),
            Err(err) => {
                error!(post_id = %id, error = %err, "Failed to fetch post");
                Err(StoreError::Fetch(err))
            }
        }
    }

    pub fn cached(&self, id: &PostId) -> Option<Post> {
        self.read_cache("cached")
            .posts
            .iter()
            .find(|post| &post.id == id)
            .cloned()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.read_cache("posts").posts.clone()
    }

    /// Filtered and ordered view of the current cache.
    pub fn view(&self, criteria: &FilterCriteria) -> Vec<Post> {
        posts::derive(&self.read_cache("view").posts, criteria)
    }

    pub fn available_tags(&self) -> Vec<String> {
        posts::available_tags(&self.read_cache("available_tags").posts)
    }

    pub fn is_loading(&self) -> bool {
        *self.in_flight.borrow() > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.read_cache("last_error").last_error.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let cache = self.read_cache("snapshot");
        StoreSnapshot {
            posts: cache.posts.clone(),
            loading: self.is_loading(),
            last_error: cache.last_error.clone(),
            revision: cache.revision,
        }
    }

    /// Revision updates; fires whenever the cache contents change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Number of reloads in flight; fires when one starts or finishes.
    pub fn subscribe_loading(&self) -> watch::Receiver<usize> {
        self.in_flight.subscribe()
    }

    fn read_cache(&self, op: &'static str) -> RwLockReadGuard<'_, CacheState> {
        self.cache.read().unwrap_or_else(|poisoned| {
            warn!(op, lock_kind = "read", "Recovered from poisoned post cache lock");
            poisoned.into_inner()
        })
    }

    fn write_cache(&self, op: &'static str) -> RwLockWriteGuard<'_, CacheState> {
        self.cache.write().unwrap_or_else(|poisoned| {
            warn!(op, lock_kind = "write", "Recovered from poisoned post cache lock");
            poisoned.into_inner()
        })
    }
}

/// Holds the loading flag up for one `load_all` call, on every exit path.
struct LoadingGuard<'a>(&'a watch::Sender<usize>);

impl<'a> LoadingGuard<'a> {
    fn enter(in_flight: &'a watch::Sender<usize>) -> Self {
        in_flight.send_modify(|count| *count += 1);
        Self(in_flight)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}
