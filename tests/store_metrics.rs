use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use defter::application::repos::{PostsRepo, PostsWriteRepo, RepoError};
use defter::application::store::PostStore;
use defter::domain::entities::{NewPost, Post, PostId};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

#[derive(Default)]
struct FlakyRepo {
    failing: AtomicBool,
}

#[async_trait]
impl PostsRepo for FlakyRepo {
    async fn list_posts(&self) -> Result<Vec<Post>, RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Transport("offline".to_string()));
        }
        Ok(Vec::new())
    }

    async fn find_by_id(&self, _id: &PostId) -> Result<Option<Post>, RepoError> {
        Ok(None)
    }
}

#[async_trait]
impl PostsWriteRepo for FlakyRepo {
    async fn insert_post(&self, _post: NewPost) -> Result<PostId, RepoError> {
        Err(RepoError::Persistence("read only".to_string()))
    }

    async fn update_content(&self, _id: &PostId, _content: &str) -> Result<(), RepoError> {
        Err(RepoError::Persistence("read only".to_string()))
    }
}

#[tokio::test]
async fn store_operations_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let repo = Arc::new(FlakyRepo::default());
    let store = PostStore::new(repo.clone(), repo.clone());

    store.load_all().await.expect("first load");
    repo.failing.store(true, Ordering::SeqCst);
    store.load_all().await.expect_err("second load fails");
    store
        .update_content(&PostId::new("1"), "text")
        .await
        .expect_err("write fails");

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        "defter_store_reload_total",
        "defter_store_reload_failed_total",
        "defter_store_posts",
        "defter_store_write_failed_total",
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }

    let reloads = snapshot
        .iter()
        .find(|(composite_key, _, _, _)| composite_key.key().name() == "defter_store_reload_total")
        .map(|(_, _, _, value)| value.clone());
    assert_eq!(reloads, Some(&DebugValue::Counter(2)));

    let write_labels: Vec<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| {
            composite_key.key().name() == "defter_store_write_failed_total"
        })
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(write_labels, ["op=update_content"]);
}
