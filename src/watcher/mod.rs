//! Live watcher: polls one blog and reports what changed.
//!
//! Each poll fetches the term snapshot, recently modified posts, unpublished
//! statuses and options concurrently, then merges them into the in-memory
//! state one after the other. Events go out on an unbounded channel.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::{Loader, PostQuery};
use crate::errors::AppError;
use crate::metadata::{diff_options, MetadataStore, Options, OptionsDiff, TermDiff};
use crate::models::{ArchiveYear, Post, PostId, PostStatus, User, UserId};

/// Something the watcher noticed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WatchEvent {
    /// Initial load finished
    Loaded { posts: Vec<Post>, options: Options },
    TermsChanged(TermDiff),
    PostAdded(Post),
    PostUpdated(Post),
    /// Ids of every post added or updated by one poll
    PostsModified(Vec<PostId>),
    PostRemoved(Post),
    ArchiveChanged(Vec<ArchiveYear>),
    OptionsChanged(OptionsDiff),
    Error(String),
}

/// Modification times are stored in whole seconds, so windows start on one.
fn window_start() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Stops a running watcher.
pub struct WatcherHandle {
    abort: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn abort(&self) {
        self.abort.send_replace(true);
    }

    /// Abort and wait for the polling task to exit.
    pub async fn shutdown(self) {
        self.abort();
        if let Err(e) = self.task.await {
            tracing::warn!("Watcher task ended abnormally: {}", e);
        }
    }
}

/// Polling state for one blog.
pub struct Watcher {
    loader: Loader,
    store: MetadataStore,
    options: Options,
    users: HashMap<UserId, User>,
    published: HashMap<PostId, Post>,
    scheduled: BTreeSet<PostId>,
    last_update: DateTime<Utc>,
    events: mpsc::UnboundedSender<WatchEvent>,
}

impl Watcher {
    pub fn new(loader: Loader) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let watcher = Self {
            store: MetadataStore::new(loader.empty_archive()),
            loader,
            options: Options::new(),
            users: HashMap::new(),
            published: HashMap::new(),
            scheduled: BTreeSet::new(),
            last_update: window_start(),
            events,
        };
        (watcher, receiver)
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn published(&self) -> &HashMap<PostId, Post> {
        &self.published
    }

    /// Ids of posts scheduled for future publication.
    pub fn scheduled(&self) -> &BTreeSet<PostId> {
        &self.scheduled
    }

    /// Run the initial load and then poll every `period` until aborted.
    pub fn start(self, period: Duration) -> WatcherHandle {
        let (abort, aborted) = watch::channel(false);
        let task = tokio::spawn(self.run(period, aborted));
        WatcherHandle { abort, task }
    }

    async fn run(mut self, period: Duration, mut aborted: watch::Receiver<bool>) {
        if let Err(e) = self.load_initial().await {
            self.report(e);
        }

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll().await {
                        self.report(e);
                    }
                }
                changed = aborted.changed() => {
                    if changed.is_err() || *aborted.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Watcher for {} stopped", self.loader.prefix());
    }

    /// Replace all state with a full load.
    pub async fn load_initial(&mut self) -> Result<(), AppError> {
        let started = window_start();
        let (loaded, statuses) = tokio::try_join!(
            self.loader.load(),
            self.loader.load_unpublished_posts()
        )?;

        self.store = loaded.store;
        self.options = loaded.options;
        self.users = loaded.users;
        self.published = loaded
            .posts
            .iter()
            .map(|post| (post.id, post.clone()))
            .collect();
        self.scheduled = statuses
            .into_iter()
            .filter(|(_, status)| *status == PostStatus::Future)
            .map(|(id, _)| id)
            .collect();
        self.last_update = started;

        self.emit(WatchEvent::Loaded {
            posts: loaded.posts,
            options: self.options.clone(),
        });
        Ok(())
    }

    /// Fetch and merge everything that changed since the last poll.
    pub async fn poll(&mut self) -> Result<(), AppError> {
        let started = window_start();
        let query = PostQuery::modified_since(
            self.last_update,
            self.scheduled.iter().copied().collect(),
        );

        let (snapshot, mut modified, statuses, options) = tokio::try_join!(
            self.loader.load_terms(),
            self.loader.load_posts(&query),
            self.loader.load_unpublished_posts(),
            self.loader.load_configured_metadata(),
        )?;

        let ids: Vec<PostId> = modified.iter().map(|post| post.id).collect();
        let relationships = self.loader.load_term_relationships(Some(&ids)).await?;

        // Terms
        match self.store.sync(&snapshot) {
            Ok(diff) if diff.is_empty() => {}
            Ok(diff) => {
                if !diff.removed.is_empty() {
                    for post in self.published.values_mut() {
                        post.categories.retain(|id| !diff.removed.contains(id));
                        post.tags.retain(|id| !diff.removed.contains(id));
                    }
                }
                tracing::info!(
                    "Terms changed: {} added, {} changed, {} removed",
                    diff.added.len(),
                    diff.changed.len(),
                    diff.removed.len()
                );
                self.emit(WatchEvent::TermsChanged(diff));
            }
            Err(e) => {
                tracing::warn!("Keeping previous terms: {}", e);
                self.emit(WatchEvent::Error(e.to_string()));
            }
        }

        // Modified posts
        let archive_before = self.store.archive_years().to_vec();
        Loader::attach(&self.store, &mut modified, &relationships, &self.users);
        for post in modified {
            self.scheduled.remove(&post.id);
            match self.published.insert(post.id, post.clone()) {
                None => {
                    self.store.add_post(&post);
                    tracing::debug!("Post {} added", post.id);
                    self.emit(WatchEvent::PostAdded(post));
                }
                Some(previous) => {
                    if previous.date != post.date {
                        self.store.remove_post(&previous);
                        self.store.add_post(&post);
                    }
                    tracing::debug!("Post {} updated", post.id);
                    self.emit(WatchEvent::PostUpdated(post));
                }
            }
        }
        if !ids.is_empty() {
            self.emit(WatchEvent::PostsModified(ids));
        }

        // Unpublished posts
        for (id, status) in statuses {
            if let Some(post) = self.published.remove(&id) {
                self.store.remove_post(&post);
                tracing::debug!("Post {} is now {}", id, status.as_str());
                self.emit(WatchEvent::PostRemoved(post));
            }
            if status == PostStatus::Future {
                self.scheduled.insert(id);
            } else {
                self.scheduled.remove(&id);
            }
        }

        if self.store.archive_years() != archive_before.as_slice() {
            self.emit(WatchEvent::ArchiveChanged(self.store.archive_years().to_vec()));
        }

        // Options
        let diff = diff_options(&self.options, &options);
        if !diff.is_empty() {
            self.options = options;
            self.emit(WatchEvent::OptionsChanged(diff));
        }

        self.last_update = started;
        Ok(())
    }

    /// Move the start of the next poll window.
    pub fn set_last_update(&mut self, since: DateTime<Utc>) {
        self.last_update = since;
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    fn report(&self, error: AppError) {
        tracing::warn!("Poll of {} failed: {}", self.loader.prefix(), error);
        self.emit(WatchEvent::Error(error.to_string()));
    }

    fn emit(&self, event: WatchEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Watch event dropped, no receiver");
        }
    }
}
