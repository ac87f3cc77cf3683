//! Sync units
//!
//! A sync unit keeps a local mirror of one slice of remote data fresh:
//!
//! 1. `mount()` opens a realtime channel scoped to the unit's filters and
//!    only then performs the initial load, so no change that lands between
//!    the two is lost.
//! 2. Every matching change event is reconciled. List views patch the
//!    affected record in place; aggregate views reload. A detected gap in
//!    the event stream, or a load that raced with the patch, falls back to
//!    a full reload.
//! 3. Loads are ticketed. A response is applied only when no newer load
//!    has been applied already, and never after `unmount()`.
//! 4. A unit opened for a signed-in user is tied to that session. Signing
//!    out, or signing in as someone else, unmounts it, and its mutations
//!    are refused once the session no longer matches.
//!
//! What is being mirrored is described by a [`SyncSource`]. Feature
//! operations (posting, liking, ...) are inherent methods on the concrete
//! `SyncUnit<Source>` types in the submodules.

pub mod comments;
pub mod feed;
pub mod follows;
pub mod likes;
pub mod messages;
pub mod notifications;
pub mod profile;
pub mod search;

pub use comments::{CommentsSource, CommentsUnit};
pub use feed::{FeedSnapshot, FeedSource, FeedUnit};
pub use follows::{FollowsSource, FollowsUnit};
pub use likes::{LikesSource, LikesUnit};
pub use messages::{MessagesSource, MessagesUnit};
pub use notifications::{NotificationsSource, NotificationsUnit};
pub use profile::{ProfileSource, ProfileUnit};
pub use search::search_posts;

use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::realtime::{ChangeEvent, ChangeFilter, Channel, ChannelError};
use crate::services::{Backend, ServiceError};
use crate::session::{AuthEvent, SessionContext, SessionWatch};
use crate::toast::{Toast, Toaster};

/// Result of reconciling one change event against a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    /// The event produced this new snapshot
    Replace(T),
    /// The event does not affect the snapshot
    Unchanged,
    /// Only a full reload can bring the snapshot up to date
    Reload,
}

/// Describes what a sync unit mirrors and how
#[async_trait]
pub trait SyncSource: Send + Sync + 'static {
    type Snapshot: Clone + Default + Send + Sync + 'static;

    /// Short plural noun for logs and error toasts ("posts")
    fn label(&self) -> &'static str;

    fn channel_name(&self) -> String {
        format!("public:{}", self.label())
    }

    /// Scope of the realtime subscription
    fn filters(&self) -> Vec<ChangeFilter>;

    /// One bulk read; `current` is the snapshot being replaced
    async fn fetch(&self, current: &Self::Snapshot) -> Result<Self::Snapshot, ServiceError>;

    /// Reconcile a change event; aggregates keep the default and reload
    async fn patch(
        &self,
        _snapshot: &Self::Snapshot,
        _event: &ChangeEvent,
    ) -> Result<Patch<Self::Snapshot>, ServiceError> {
        Ok(Patch::Reload)
    }

    /// Toast shown when a load fails
    fn load_failed(&self, err: &ServiceError) -> Toast {
        Toast::destructive(format!("Error fetching {}", self.label()))
            .with_description(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Loading,
    Ready,
    /// The last load failed; the snapshot is the previous one
    Error(String),
    Unmounted,
}

struct UnitState<T> {
    snapshot: T,
    status: SyncState,
    /// Ticket of the newest load whose result was applied
    applied_ticket: u64,
    in_flight: usize,
    /// Bumped on every snapshot replacement
    generation: u64,
}

struct Inner<S: SyncSource> {
    source: S,
    backend: Arc<Backend>,
    toaster: Arc<Toaster>,
    state: Mutex<UnitState<S::Snapshot>>,
    next_ticket: AtomicU64,
    unmounted: AtomicBool,
    version: watch::Sender<u64>,
    /// Session the unit was opened under and the user it belonged to
    session: Option<(Arc<SessionContext>, Option<Uuid>)>,
    listener: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<S: SyncSource> Inner<S> {
    fn lock(&self) -> MutexGuard<'_, UnitState<S::Snapshot>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    fn is_unmounted(&self) -> bool {
        self.unmounted.load(Ordering::SeqCst)
    }

    fn listener(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watcher(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `user` is still the signed-in user this unit was opened for
    fn session_matches(&self, user: Option<Uuid>) -> bool {
        match &self.session {
            None => true,
            Some((context, owner)) => {
                let Ok(current) = context.guard() else {
                    return false;
                };
                *owner == Some(current.user_id) && user.map_or(true, |u| u == current.user_id)
            }
        }
    }

    /// Mark the unit unmounted and abort its listener
    ///
    /// Returns the aborted listener so the caller can wait for it to
    /// release the channel.
    fn stop(&self) -> Option<JoinHandle<()>> {
        self.unmounted.store(true, Ordering::SeqCst);
        let listener = self.listener().take();
        if let Some(handle) = &listener {
            handle.abort();
        }
        self.lock().status = SyncState::Unmounted;
        self.notify();
        listener
    }

    async fn load(&self) -> bool {
        if self.is_unmounted() {
            return false;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let current = {
            let mut state = self.lock();
            state.status = SyncState::Loading;
            state.in_flight += 1;
            state.snapshot.clone()
        };
        self.notify();

        let result = self.source.fetch(&current).await;

        let failure = {
            let mut state = self.lock();
            state.in_flight -= 1;

            if self.is_unmounted() {
                debug!("Ignoring {} load #{} after unmount", self.source.label(), ticket);
                return false;
            }
            if ticket < state.applied_ticket {
                debug!("Ignoring stale {} load #{}", self.source.label(), ticket);
                if state.in_flight == 0 && state.status == SyncState::Loading {
                    state.status = SyncState::Ready;
                    drop(state);
                    self.notify();
                }
                return false;
            }

            state.applied_ticket = ticket;
            match result {
                Ok(snapshot) => {
                    state.snapshot = snapshot;
                    state.generation += 1;
                    state.status = if state.in_flight > 0 {
                        SyncState::Loading
                    } else {
                        SyncState::Ready
                    };
                    None
                }
                Err(err) => {
                    state.status = SyncState::Error(err.to_string());
                    Some(err)
                }
            }
        };
        self.notify();

        match failure {
            Some(err) => {
                self.toaster.push(self.source.load_failed(&err));
                false
            }
            None => true,
        }
    }

    /// Install `snapshot` unless the state moved on since `generation`
    fn replace_if_current(&self, generation: u64, snapshot: S::Snapshot) -> bool {
        let mut state = self.lock();
        if self.is_unmounted() || state.generation != generation || state.in_flight > 0 {
            return false;
        }
        state.snapshot = snapshot;
        state.generation += 1;
        drop(state);
        self.notify();
        true
    }

    async fn reconcile(&self, event: &ChangeEvent) {
        let (snapshot, generation) = {
            let state = self.lock();
            (state.snapshot.clone(), state.generation)
        };

        match self.source.patch(&snapshot, event).await {
            Ok(Patch::Unchanged) => {}
            Ok(Patch::Replace(next)) => {
                if !self.replace_if_current(generation, next) {
                    debug!("{} changed during patch, reloading", self.source.label());
                    self.load().await;
                }
            }
            Ok(Patch::Reload) => {
                self.load().await;
            }
            Err(err) => {
                warn!("Failed to patch {}: {}", self.source.label(), err);
                self.load().await;
            }
        }
    }
}

/// Mirror of one remote data slice; see the module docs
pub struct SyncUnit<S: SyncSource> {
    inner: Arc<Inner<S>>,
}

impl<S: SyncSource> SyncUnit<S> {
    pub fn new(source: S, backend: Arc<Backend>, toaster: Arc<Toaster>) -> Self {
        Self::build(source, backend, toaster, None)
    }

    /// A unit that belongs to the user currently signed in to `session`
    ///
    /// It unmounts itself when that user signs out or another user signs
    /// in, and refuses to mount when nobody is signed in.
    pub fn with_session(
        source: S,
        backend: Arc<Backend>,
        toaster: Arc<Toaster>,
        session: Arc<SessionContext>,
    ) -> Self {
        let owner = session.user_id();
        Self::build(source, backend, toaster, Some((session, owner)))
    }

    fn build(
        source: S,
        backend: Arc<Backend>,
        toaster: Arc<Toaster>,
        session: Option<(Arc<SessionContext>, Option<Uuid>)>,
    ) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                source,
                backend,
                toaster,
                state: Mutex::new(UnitState {
                    snapshot: S::Snapshot::default(),
                    status: SyncState::Uninitialized,
                    applied_ticket: 0,
                    in_flight: 0,
                    generation: 0,
                }),
                next_ticket: AtomicU64::new(0),
                unmounted: AtomicBool::new(false),
                version,
                session,
                listener: Mutex::new(None),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Subscribe, then load
    ///
    /// Mounting twice is a no-op; a unit cannot be remounted after
    /// `unmount()`, nor mounted once its session has ended.
    pub async fn mount(&self) -> bool {
        if self.inner.is_unmounted() {
            return false;
        }

        {
            let mut listener = self.inner.listener();
            if listener.is_some() {
                return true;
            }

            // Subscribe before checking so a sign-out in between is still seen
            let session_watch = self.inner.session.as_ref().map(|(context, _)| context.subscribe());
            if !self.inner.session_matches(None) {
                debug!("Not mounting {} unit without its session", self.inner.source.label());
                return false;
            }

            let channel = self
                .inner
                .backend
                .realtime
                .channel(self.inner.source.channel_name(), self.inner.source.filters());
            *listener = Some(tokio::spawn(listen(Arc::downgrade(&self.inner), channel)));

            if let (Some(session_watch), Some((_, Some(owner)))) = (session_watch, &self.inner.session) {
                let watcher = tokio::spawn(follow_session(
                    Arc::downgrade(&self.inner),
                    session_watch,
                    *owner,
                ));
                *self.inner.watcher() = Some(watcher);
            }
        }

        self.inner.load().await
    }

    /// Refetch the whole snapshot; false if the result was not applied
    pub async fn load(&self) -> bool {
        self.inner.load().await
    }

    /// Release the realtime channel and stop accepting responses
    pub async fn unmount(&self) {
        if let Some(watcher) = self.inner.watcher().take() {
            watcher.abort();
        }
        if let Some(handle) = self.inner.stop() {
            // Wait for the task to drop its channel
            let _ = handle.await;
        }
        debug!("Unmounted {} unit", self.inner.source.label());
    }

    pub fn snapshot(&self) -> S::Snapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn state(&self) -> SyncState {
        self.inner.lock().status.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.listener().is_some() && !self.inner.is_unmounted()
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Receiver bumped on every state or snapshot change
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Wait until the snapshot satisfies `predicate` and return it
    pub async fn wait_for<F>(&self, mut predicate: F) -> S::Snapshot
    where
        F: FnMut(&S::Snapshot) -> bool,
    {
        let mut version = self.watch();
        loop {
            let snapshot = self.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
            if version.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    pub(crate) fn backend(&self) -> &Arc<Backend> {
        &self.inner.backend
    }

    pub(crate) fn toaster(&self) -> &Arc<Toaster> {
        &self.inner.toaster
    }

    /// The acting user for a mutation, if `viewer` may still act
    ///
    /// A unit opened under a session only acts while that session is live
    /// and still belongs to `viewer`.
    pub(crate) fn caller(&self, viewer: Uuid) -> Option<Uuid> {
        if self.inner.session_matches(Some(viewer)) {
            Some(viewer)
        } else {
            debug!("Refusing {} action outside the session it was opened under", self.inner.source.label());
            None
        }
    }

    /// Surface a failed user action as a destructive toast
    pub(crate) fn report(&self, title: &str, err: &ServiceError) {
        self.inner
            .toaster
            .push(Toast::destructive(title).with_description(err.to_string()));
    }

    /// Apply a locally computed snapshot unless the unit moved on
    pub(crate) fn replace_if_current(&self, generation: u64, snapshot: S::Snapshot) -> bool {
        self.inner.replace_if_current(generation, snapshot)
    }

    /// Current snapshot and the generation it belongs to
    pub(crate) fn versioned_snapshot(&self) -> (S::Snapshot, u64) {
        let state = self.inner.lock();
        (state.snapshot.clone(), state.generation)
    }
}

impl<S: SyncSource> Drop for SyncUnit<S> {
    fn drop(&mut self) {
        self.inner.unmounted.store(true, Ordering::SeqCst);
        if let Some(handle) = self.inner.watcher().take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.listener().take() {
            handle.abort();
        }
    }
}

/// Unmount the unit when its owner signs out or is replaced
async fn follow_session<S: SyncSource>(unit: Weak<Inner<S>>, mut session: SessionWatch, owner: Uuid) {
    while let Some(event) = session.next().await {
        let ended = match event {
            AuthEvent::SignedOut => true,
            AuthEvent::SignedIn(current) => current.user_id != owner,
        };
        if !ended {
            continue;
        }
        if let Some(inner) = unit.upgrade() {
            info!("Session ended, unmounting {} unit", inner.source.label());
            inner.stop();
        }
        break;
    }
}

async fn listen<S: SyncSource>(unit: Weak<Inner<S>>, mut channel: Channel) {
    loop {
        let received = channel.recv().await;
        let Some(inner) = unit.upgrade() else {
            break;
        };
        if inner.is_unmounted() {
            break;
        }

        match received {
            Ok(event) => inner.reconcile(&event).await,
            Err(ChannelError::Lagged(missed)) => {
                debug!(
                    "{} missed {} events, reloading",
                    inner.source.label(),
                    missed
                );
                inner.load().await;
            }
            Err(ChannelError::Closed) => break,
        }
    }
}

/// A file picked for upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
            content_type: content_type.into(),
        }
    }
}

/// Records addressable by id inside a list snapshot
pub trait Keyed {
    fn key(&self) -> Uuid;
}

/// Insert or replace `item` keeping `list` sorted by `order`
pub(crate) fn upsert_sorted<T, F>(list: &mut Vec<T>, item: T, order: F)
where
    T: Keyed,
    F: Fn(&T, &T) -> CmpOrdering,
{
    list.retain(|existing| existing.key() != item.key());
    let at = list
        .iter()
        .position(|existing| order(&item, existing) == CmpOrdering::Less)
        .unwrap_or(list.len());
    list.insert(at, item);
}

/// Remove the record with `id`; false if it was not there
pub(crate) fn remove_by_key<T: Keyed>(list: &mut Vec<T>, id: Uuid) -> bool {
    let before = list.len();
    list.retain(|existing| existing.key() != id);
    list.len() != before
}

pub(crate) fn contains_key<T: Keyed>(list: &[T], id: Uuid) -> bool {
    list.iter().any(|existing| existing.key() == id)
}

/// Swallow a duplicate-key failure; any other error passes through
pub(crate) fn ignore_conflict<T>(result: Result<T, ServiceError>) -> Result<Option<T>, ServiceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_conflict() => {
            debug!("Ignoring duplicate insert: {}", err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
