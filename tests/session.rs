use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use defter::application::repos::{IdentityProvider, RepoError};
use defter::application::session::SessionObserver;
use defter::domain::entities::UserId;
use defter::domain::session::{AuthEvent, Identity, Session};
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

enum Lookup {
    SignedIn(Identity),
    Anonymous,
    Fails,
}

struct FakeProvider {
    lookup: Mutex<Lookup>,
    events: broadcast::Sender<AuthEvent>,
    lookups: AtomicUsize,
    sign_outs: AtomicUsize,
    hold: Option<Arc<Notify>>,
}

impl FakeProvider {
    fn new(lookup: Lookup) -> Arc<Self> {
        Arc::new(Self::build(lookup, None))
    }

    fn held(lookup: Lookup, hold: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self::build(lookup, Some(hold)))
    }

    fn build(lookup: Lookup, hold: Option<Arc<Notify>>) -> Self {
        let (events, _) = broadcast::channel(4);
        Self {
            lookup: Mutex::new(lookup),
            events,
            lookups: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
            hold,
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn current_user(&self) -> Result<Option<Identity>, RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = self.hold.as_ref() {
            hold.notified().await;
        }
        match &*self.lookup.lock().unwrap() {
            Lookup::SignedIn(identity) => Ok(Some(identity.clone())),
            Lookup::Anonymous => Ok(None),
            Lookup::Fails => Err(RepoError::Unauthorized("jwt expired".to_string())),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), RepoError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.lookup.lock().unwrap() = Lookup::Anonymous;
        Ok(())
    }
}

fn identity(email: &str) -> Identity {
    Identity {
        id: UserId::new(Uuid::new_v4()),
        email: Some(email.to_string()),
    }
}

async fn next_session(receiver: &mut tokio::sync::watch::Receiver<Session>) -> Session {
    tokio::time::timeout(Duration::from_secs(2), receiver.changed())
        .await
        .expect("session change in time")
        .expect("observer alive");
    receiver.borrow_and_update().clone()
}

#[tokio::test]
async fn resolves_stored_identity() {
    let ada = identity("ada@example.com");
    let provider = FakeProvider::new(Lookup::SignedIn(ada.clone()));
    let observer = SessionObserver::start(provider.clone());

    let session = observer.wait_resolved().await;
    assert_eq!(session, Session::Authenticated(ada.clone()));
    assert_eq!(observer.identity(), Some(ada));
    assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
    observer.shutdown().await;
}

#[tokio::test]
async fn reports_unresolved_until_check_completes() {
    let hold = Arc::new(Notify::new());
    let provider = FakeProvider::held(Lookup::Anonymous, hold.clone());
    let observer = SessionObserver::start(provider);

    tokio::task::yield_now().await;
    assert_eq!(observer.session(), Session::Unresolved);
    assert!(!observer.is_resolved());

    hold.notify_one();
    assert_eq!(observer.wait_resolved().await, Session::Anonymous);
    observer.shutdown().await;
}

#[tokio::test]
async fn failed_check_signs_out_and_reports_anonymous() {
    let provider = FakeProvider::new(Lookup::Fails);
    let observer = SessionObserver::start(provider.clone());

    assert_eq!(observer.wait_resolved().await, Session::Anonymous);
    assert_eq!(provider.sign_outs.load(Ordering::SeqCst), 1);
    observer.shutdown().await;
}

#[tokio::test]
async fn auth_events_update_the_session() {
    let provider = FakeProvider::new(Lookup::Anonymous);
    let observer = SessionObserver::start(provider.clone());
    let mut sessions = observer.subscribe();
    assert_eq!(observer.wait_resolved().await, Session::Anonymous);
    sessions.borrow_and_update();

    let grace = identity("grace@example.com");
    provider
        .events
        .send(AuthEvent::SignedIn(grace.clone()))
        .expect("listener subscribed");
    assert_eq!(
        next_session(&mut sessions).await,
        Session::Authenticated(grace.clone())
    );

    let refreshed = Identity {
        email: Some("grace@new.example.com".to_string()),
        ..grace
    };
    provider
        .events
        .send(AuthEvent::TokenRefreshed(refreshed.clone()))
        .expect("listener subscribed");
    assert_eq!(
        next_session(&mut sessions).await,
        Session::Authenticated(refreshed)
    );

    provider
        .events
        .send(AuthEvent::SignedOut)
        .expect("listener subscribed");
    assert_eq!(next_session(&mut sessions).await, Session::Anonymous);
    observer.shutdown().await;
}

#[tokio::test]
async fn sign_out_clears_identity() {
    let provider = FakeProvider::new(Lookup::SignedIn(identity("ada@example.com")));
    let observer = SessionObserver::start(provider.clone());
    assert!(observer.wait_resolved().await.identity().is_some());

    observer.sign_out().await.expect("sign out");

    assert_eq!(observer.session(), Session::Anonymous);
    assert_eq!(provider.sign_outs.load(Ordering::SeqCst), 1);
    observer.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_listening() {
    let provider = FakeProvider::new(Lookup::Anonymous);
    let observer = SessionObserver::start(provider.clone());
    observer.wait_resolved().await;

    observer.shutdown().await;
    assert_eq!(provider.events.receiver_count(), 0);
}
