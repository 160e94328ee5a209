//! Sync coordinator
//!
//! The `SyncCoordinator` owns the tracker state and keeps it in step with
//! the shared document. Every mutating operation follows the same shape:
//!
//! 1. Take the single-flight lock (bounded wait)
//! 2. Apply the mutation in memory and keep an undo record
//! 3. Persist the whole document
//! 4. On failure, revert the undo record and return the error unchanged
//!
//! Pulls go through the same lock, so a pull can never interleave with a
//! mutation. The periodic pull never waits: it is skipped while the lock is
//! held.
//!
//! ## Usage
//!
//! ```ignore
//! let coordinator = SyncCoordinator::from_config(&config, prompt, notifier)?;
//! if coordinator.load().await? == LoadOutcome::Empty {
//!     coordinator.seed_defaults().await?;
//! }
//! let task = coordinator.add_task("person1", TaskFields::new("Write report")).await?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::MutexGuard as FlightGuard;
use tracing::{debug, info, warn};

use crate::config::{default_users, Config};
use crate::credential::{CredentialCache, CredentialPrompt, CredentialSource, NoPrompt};
use crate::document::RemoteDocument;
use crate::error::{SyncError, SyncResult};
use crate::models::{Task, TaskFields, User};
use crate::notify::{LogNotifier, Notifier, Severity};
use crate::remote::{GistClient, RemoteSnapshot, RemoteStore};
use crate::state::{IntegrityReport, TrackerState, Undo};
use crate::storage::LocalStore;

const DEFAULT_PERSIST_WAIT: Duration = Duration::from_millis(1000);
const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_VERSION: &str = "2.1";

/// Where the tracker is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SyncMode {
    /// Shared remote document
    RemoteEnabled { document_id: String },
    /// Local snapshot (or memory) only
    LocalOnly,
}

/// Result of a load or pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// State replaced from the persisted document
    Loaded { users: usize, tasks: usize },
    /// The persisted document has no users; nothing was fabricated
    Empty,
    /// Periodic pull skipped because another operation was in flight
    Skipped,
}

/// Snapshot of the sync machinery for status displays
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    #[serde(flatten)]
    pub mode: SyncMode,
    pub credential_source: CredentialSource,
    /// Seconds left on the session credential
    pub credential_remaining_secs: Option<u64>,
    pub last_synced: Option<DateTime<Utc>>,
    pub in_flight: bool,
    pub share_url: Option<String>,
}

#[derive(Debug, Default)]
struct SyncMeta {
    last_synced: Option<DateTime<Utc>>,
    share_url: Option<String>,
}

enum Backend {
    Local(LocalStore),
    Remote {
        document_id: String,
        store: Arc<dyn RemoteStore>,
    },
}

/// Owner of the tracker state and its persistence
pub struct SyncCoordinator {
    backend: Backend,
    credentials: Arc<CredentialCache>,
    prompt: Arc<dyn CredentialPrompt>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<TrackerState>,
    meta: Mutex<SyncMeta>,
    /// Single-flight lock for persist and pull
    flight: tokio::sync::Mutex<()>,
    persist_wait: Duration,
    version: String,
    default_users: Vec<User>,
}

impl SyncCoordinator {
    /// Coordinator persisting to a local snapshot
    pub fn local_only(local: LocalStore) -> Self {
        Self::with_backend(
            Backend::Local(local),
            Arc::new(CredentialCache::new(DEFAULT_CREDENTIAL_TTL)),
        )
    }

    /// Coordinator persisting to a remote document
    pub fn remote(
        document_id: impl Into<String>,
        store: Arc<dyn RemoteStore>,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self::with_backend(
            Backend::Remote {
                document_id: document_id.into(),
                store,
            },
            credentials,
        )
    }

    fn with_backend(backend: Backend, credentials: Arc<CredentialCache>) -> Self {
        Self {
            backend,
            credentials,
            prompt: Arc::new(NoPrompt),
            notifier: Arc::new(LogNotifier),
            state: Mutex::new(TrackerState::default()),
            meta: Mutex::new(SyncMeta::default()),
            flight: tokio::sync::Mutex::new(()),
            persist_wait: DEFAULT_PERSIST_WAIT,
            version: DEFAULT_VERSION.to_string(),
            default_users: default_users(),
        }
    }

    /// Build a coordinator from configuration
    ///
    /// Remote sync is used when a document id is configured, otherwise the
    /// local snapshot in the data directory.
    pub fn from_config(
        config: &Config,
        prompt: Arc<dyn CredentialPrompt>,
        notifier: Arc<dyn Notifier>,
    ) -> SyncResult<Self> {
        let credentials = Arc::new(
            CredentialCache::new(config.credential_ttl()).with_static(config.token.clone()),
        );

        let coordinator = match config.document_id.as_deref().map(str::trim) {
            Some(document_id) if !document_id.is_empty() => {
                let client = GistClient::from_config(config)?;
                Self::remote(document_id, Arc::new(client), credentials)
            }
            _ => Self::local_only(LocalStore::new(config.snapshot_path())),
        };

        Ok(coordinator
            .with_prompt(prompt)
            .with_notifier(notifier)
            .with_persist_wait(config.persist_wait())
            .with_version(config.document_version.clone())
            .with_default_users(config.default_users.clone()))
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// How long a caller waits for the single-flight lock
    pub fn with_persist_wait(mut self, wait: Duration) -> Self {
        self.persist_wait = wait;
        self
    }

    /// Version tag written into every document
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Users created by `seed_defaults`
    pub fn with_default_users(mut self, users: Vec<User>) -> Self {
        self.default_users = users;
        self
    }

    pub fn mode(&self) -> SyncMode {
        match &self.backend {
            Backend::Local(_) => SyncMode::LocalOnly,
            Backend::Remote { document_id, .. } => SyncMode::RemoteEnabled {
                document_id: document_id.clone(),
            },
        }
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    // ==================== Loading ====================

    /// Initial load of the persisted document
    pub async fn load(&self) -> SyncResult<LoadOutcome> {
        let _flight = self.enter_flight().await?;
        debug!("Loading tracker state");
        self.pull_locked().await
    }

    /// Re-fetch the persisted document and replace the state wholesale
    ///
    /// On failure the state is left untouched.
    pub async fn sync_pull(&self) -> SyncResult<LoadOutcome> {
        let _flight = self.enter_flight().await?;
        self.pull_locked().await
    }

    /// Periodic pull; skipped rather than queued while anything is in flight
    pub async fn auto_pull(&self) -> SyncResult<LoadOutcome> {
        let Ok(_flight) = self.flight.try_lock() else {
            debug!("Sync in flight, skipping periodic pull");
            return Ok(LoadOutcome::Skipped);
        };
        self.pull_locked().await
    }

    async fn pull_locked(&self) -> SyncResult<LoadOutcome> {
        let snapshot = match &self.backend {
            Backend::Remote { document_id, store } => store.fetch_document(document_id).await?,
            Backend::Local(local) => match local.load()? {
                Some(document) => RemoteSnapshot::new(document),
                None => {
                    debug!("No local snapshot, keeping in-memory state");
                    return Ok(self.current_outcome());
                }
            },
        };

        let RemoteSnapshot {
            document, html_url, ..
        } = snapshot;
        let report = self.lock_state().replace_with(document);
        {
            let mut meta = self.lock_meta();
            meta.last_synced = Some(Utc::now());
            if html_url.is_some() {
                meta.share_url = html_url;
            }
        }

        if !report.is_clean() {
            debug!("Integrity repairs after load: {:?}", report);
        }

        let outcome = self.current_outcome();
        match outcome {
            LoadOutcome::Loaded { users, tasks } => {
                info!("Loaded tracker: {} users, {} tasks", users, tasks)
            }
            _ => self.notifier.notify(
                "The shared document has no users yet",
                Severity::Warning,
            ),
        }
        Ok(outcome)
    }

    fn current_outcome(&self) -> LoadOutcome {
        let state = self.lock_state();
        if state.is_empty() {
            LoadOutcome::Empty
        } else {
            LoadOutcome::Loaded {
                users: state.user_count(),
                tasks: state.all_tasks().count(),
            }
        }
    }

    // ==================== Mutations ====================

    /// Create the configured default users in an empty tracker
    pub async fn seed_defaults(&self) -> SyncResult<()> {
        let defaults = self.default_users.clone();
        self.mutate("seed_defaults", |state| Ok(((), state.seed(&defaults)?)))
            .await
    }

    pub async fn add_user(&self, name: &str) -> SyncResult<User> {
        self.mutate("add_user", |state| state.add_user(name)).await
    }

    /// Delete a user and their tasks; the last user cannot be deleted
    pub async fn delete_user(&self, user_id: &str) -> SyncResult<User> {
        self.mutate("delete_user", |state| state.delete_user(user_id))
            .await
    }

    pub async fn add_task(&self, user_id: &str, fields: TaskFields) -> SyncResult<Task> {
        self.mutate("add_task", |state| state.add_task(user_id, fields))
            .await
    }

    /// Replace a task's editable fields, keeping its id and logged date
    pub async fn edit_task(
        &self,
        user_id: &str,
        task_id: u64,
        fields: TaskFields,
    ) -> SyncResult<Task> {
        self.mutate("edit_task", |state| state.edit_task(user_id, task_id, fields))
            .await
    }

    pub async fn delete_task(&self, user_id: &str, task_id: u64) -> SyncResult<Task> {
        self.mutate("delete_task", |state| state.delete_task(user_id, task_id))
            .await
    }

    /// Merge an exported document into the tracker
    pub async fn import_document(&self, document: RemoteDocument) -> SyncResult<IntegrityReport> {
        self.mutate("import_document", |state| state.merge(document))
            .await
    }

    async fn mutate<T>(
        &self,
        operation: &str,
        apply: impl FnOnce(&mut TrackerState) -> SyncResult<(T, Undo)>,
    ) -> SyncResult<T> {
        let _flight = self.enter_flight().await?;

        let (value, undo) = {
            let mut state = self.lock_state();
            apply(&mut state)?
        };

        if let Err(err) = self.persist_locked().await {
            warn!("{} not persisted, rolling back: {}", operation, err);
            let mut state = self.lock_state();
            undo.revert(&mut state);
            return Err(err);
        }

        debug!("{} persisted", operation);
        Ok(value)
    }

    // ==================== Persistence ====================

    /// Write the current state as a whole document
    pub async fn persist(&self) -> SyncResult<()> {
        let _flight = self.enter_flight().await?;
        self.persist_locked().await
    }

    async fn persist_locked(&self) -> SyncResult<()> {
        match &self.backend {
            Backend::Local(local) => {
                let document = self.export_document();
                local.save(&document)?;
            }
            Backend::Remote { document_id, store } => {
                let document = {
                    let state = self.lock_state();
                    if state.is_empty() {
                        return Err(SyncError::InvalidInput(
                            "refusing to write a document with no users".to_string(),
                        ));
                    }
                    state.to_document(&self.version)
                };

                let had_credential = self.credentials.get().is_some();
                let credential = self
                    .credentials
                    .acquire(self.prompt.as_ref())
                    .await
                    .ok_or(SyncError::CredentialRequired)?;
                if !had_credential && self.credentials.source() == CredentialSource::Session {
                    self.notifier
                        .notify("Token saved for this session", Severity::Success);
                }

                match store.write_document(document_id, &credential, &document).await {
                    Ok(()) => {}
                    Err(SyncError::Unauthorized) => {
                        self.credentials.invalidate();
                        self.notifier
                            .notify("Token rejected and cleared", Severity::Error);
                        return Err(SyncError::Unauthorized);
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        self.lock_meta().last_synced = Some(Utc::now());
        Ok(())
    }

    async fn enter_flight(&self) -> SyncResult<FlightGuard<'_, ()>> {
        tokio::time::timeout(self.persist_wait, self.flight.lock())
            .await
            .map_err(|_| {
                debug!("Timed out after {:?} waiting for sync lock", self.persist_wait);
                SyncError::OperationInProgress
            })
    }

    // ==================== Queries ====================

    /// Read-only copy of the current state
    pub fn state(&self) -> TrackerState {
        self.lock_state().clone()
    }

    /// Change the active user (local only, not persisted)
    pub fn select_user(&self, user_id: &str) -> SyncResult<()> {
        self.lock_state().select(user_id)
    }

    /// The current state as a document with a fresh timestamp
    pub fn export_document(&self) -> RemoteDocument {
        self.lock_state().to_document(&self.version)
    }

    pub fn sync_status(&self) -> SyncStatus {
        let meta = self.lock_meta();
        SyncStatus {
            mode: self.mode(),
            credential_source: self.credentials.source(),
            credential_remaining_secs: self.credentials.remaining().map(|d| d.as_secs()),
            last_synced: meta.last_synced,
            in_flight: self.flight.try_lock().is_err(),
            share_url: meta.share_url.clone(),
        }
    }

    /// Drop the session credential at the user's request
    pub fn forget_credential(&self) {
        self.credentials.clear();
        self.notifier.notify("Token cleared", Severity::Info);
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_meta(&self) -> MutexGuard<'_, SyncMeta> {
        self.meta.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use crate::credential::Credential;
    use crate::models::{Priority, TaskStatus};

    /// In-memory remote that records every call
    #[derive(Default)]
    struct StubStore {
        remote: Mutex<Option<RemoteDocument>>,
        fetch_failure: Mutex<Option<fn() -> SyncError>>,
        write_failure: Mutex<Option<fn() -> SyncError>>,
        write_delay: Duration,
        fetches: AtomicUsize,
        writes: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        credentials_seen: Mutex<Vec<String>>,
    }

    impl StubStore {
        fn with_document(document: RemoteDocument) -> Self {
            Self {
                remote: Mutex::new(Some(document)),
                ..Default::default()
            }
        }

        fn fail_writes(&self, failure: fn() -> SyncError) {
            *self.write_failure.lock().unwrap() = Some(failure);
        }

        fn fail_fetches(&self, failure: fn() -> SyncError) {
            *self.fetch_failure.lock().unwrap() = Some(failure);
        }

        fn remote_document(&self) -> RemoteDocument {
            self.remote.lock().unwrap().clone().unwrap()
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteStore for StubStore {
        async fn fetch_document(&self, document_id: &str) -> SyncResult<RemoteSnapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = *self.fetch_failure.lock().unwrap() {
                return Err(failure());
            }
            let document = self.remote.lock().unwrap().clone();
            match document {
                Some(document) => Ok(RemoteSnapshot {
                    document,
                    envelope_id: Some(document_id.to_string()),
                    html_url: Some(format!("https://gist.example/{}", document_id)),
                }),
                None => Err(SyncError::NotFound {
                    document_id: document_id.to_string(),
                }),
            }
        }

        async fn write_document(
            &self,
            _document_id: &str,
            credential: &Credential,
            document: &RemoteDocument,
        ) -> SyncResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.credentials_seen
                .lock()
                .unwrap()
                .push(credential.expose().to_string());

            if !self.write_delay.is_zero() {
                tokio::time::sleep(self.write_delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.writes.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = *self.write_failure.lock().unwrap() {
                return Err(failure());
            }
            *self.remote.lock().unwrap() = Some(document.clone());
            Ok(())
        }
    }

    struct CountingPrompt {
        answer: Option<String>,
        calls: AtomicUsize,
    }

    impl CountingPrompt {
        fn answering(answer: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialPrompt for CountingPrompt {
        async fn prompt(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<(String, Severity)>>,
    }

    impl RecordingNotifier {
        fn has(&self, severity: Severity) -> bool {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .any(|(_, s)| *s == severity)
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, severity: Severity) {
            self.messages
                .lock()
                .unwrap()
                .push((message.to_string(), severity));
        }
    }

    struct Harness {
        coordinator: Arc<SyncCoordinator>,
        store: Arc<StubStore>,
        prompt: Arc<CountingPrompt>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(store: StubStore) -> Harness {
        harness_with(store, CountingPrompt::answering(Some("secret")), |c| c)
    }

    fn harness_with(
        store: StubStore,
        prompt: Arc<CountingPrompt>,
        configure: impl FnOnce(SyncCoordinator) -> SyncCoordinator,
    ) -> Harness {
        let store = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = SyncCoordinator::remote(
            "doc-1",
            store.clone(),
            Arc::new(CredentialCache::new(DEFAULT_CREDENTIAL_TTL)),
        )
        .with_prompt(prompt.clone())
        .with_notifier(notifier.clone());

        Harness {
            coordinator: Arc::new(configure(coordinator)),
            store,
            prompt,
            notifier,
        }
    }

    fn task_json(id: u64, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "priority": "medium",
            "status": "not-started",
            "deadline": null,
            "update": "",
            "dateLogged": "2024-03-01"
        })
    }

    fn two_user_document() -> RemoteDocument {
        serde_json::from_value(json!({
            "users": {
                "person1": { "id": "person1", "name": "Alex" },
                "person2": { "id": "person2", "name": "Jordan" }
            },
            "tasksData": {
                "person1": [task_json(1, "Draft plan"), task_json(2, "Review")],
                "person2": []
            },
            "nextUserId": 3,
            "currentTaskId": 2,
            "lastUpdated": "2024-03-01T10:00:00Z",
            "version": "2.1"
        }))
        .unwrap()
    }

    fn sole_user_document() -> RemoteDocument {
        serde_json::from_value(json!({
            "users": { "person1": { "id": "person1", "name": "Alex" } },
            "tasksData": { "person1": [task_json(1, "One"), task_json(2, "Two")] },
            "nextUserId": 2,
            "currentTaskId": 2
        }))
        .unwrap()
    }

    fn empty_document() -> RemoteDocument {
        RemoteDocument::from_json("{}").unwrap()
    }

    #[tokio::test]
    async fn test_empty_remote_loads_without_defaults() {
        let h = harness(StubStore::with_document(empty_document()));

        let outcome = h.coordinator.load().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Empty);
        assert!(h.coordinator.state().is_empty());
        assert_eq!(h.store.writes(), 0);
        assert!(h.notifier.has(Severity::Warning));
    }

    #[tokio::test]
    async fn test_add_first_user_to_empty_tracker() {
        let h = harness(StubStore::with_document(empty_document()));
        h.coordinator.load().await.unwrap();
        let next_before = h.coordinator.state().next_user_id();

        let user = h.coordinator.add_user("Alex").await.unwrap();

        let state = h.coordinator.state();
        assert_eq!(state.user_count(), 1);
        assert_eq!(state.user(&user.id).unwrap().name, "Alex");
        assert_eq!(state.next_user_id(), next_before + 1);
        assert!(state.tasks(&user.id).is_empty());
        assert!(state.tasks_data().contains_key(&user.id));

        let written = h.store.remote_document();
        assert_eq!(written.users.len(), 1);
        assert_eq!(written.version, "2.1");
        assert!(written.last_updated.is_some());
        assert_eq!(h.prompt.calls(), 1);
    }

    #[tokio::test]
    async fn test_seed_defaults_after_empty_load() {
        let h = harness(StubStore::with_document(empty_document()));
        h.coordinator.load().await.unwrap();

        h.coordinator.seed_defaults().await.unwrap();

        let state = h.coordinator.state();
        assert_eq!(state.user_count(), 2);
        assert_eq!(state.user("person1").unwrap().name, "Alex");
        assert_eq!(state.user("person2").unwrap().name, "Jordan");
        assert_eq!(state.selection(), Some("person1"));
        assert_eq!(h.store.remote_document().users.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_last_user_is_refused() {
        let h = harness(StubStore::with_document(sole_user_document()));
        h.coordinator.load().await.unwrap();
        let before = h.coordinator.state();

        let err = h.coordinator.delete_user("person1").await.unwrap_err();

        assert!(matches!(err, SyncError::LastUser));
        assert_eq!(h.coordinator.state(), before);
        assert_eq!(h.coordinator.state().tasks("person1").len(), 2);
        assert_eq!(h.store.writes(), 0);
        assert_eq!(h.prompt.calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_rolls_back_and_invalidates_credential() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();
        h.store.fail_writes(|| SyncError::Unauthorized);
        let before = h.coordinator.state();

        let err = h
            .coordinator
            .add_task("person1", TaskFields::new("Ship it"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Unauthorized));
        assert_eq!(h.coordinator.state(), before);
        assert!(h.coordinator.credentials().get().is_none());
        assert!(h.notifier.has(Severity::Error));

        // The next attempt prompts again
        let _ = h
            .coordinator
            .add_task("person1", TaskFields::new("Ship it"))
            .await;
        assert_eq!(h.prompt.calls(), 2);
    }

    #[tokio::test]
    async fn test_every_mutation_rolls_back_on_failure() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();
        h.coordinator.select_user("person2").unwrap();
        h.store
            .fail_writes(|| SyncError::Network("connection reset".to_string()));
        let before = h.coordinator.state();

        let c = &h.coordinator;
        let results = vec![
            c.add_user("Sam").await.map(|_| ()),
            c.delete_user("person2").await.map(|_| ()),
            c.add_task("person1", TaskFields::new("New")).await.map(|_| ()),
            c.edit_task(
                "person1",
                1,
                TaskFields::new("Renamed").with_status(TaskStatus::Completed),
            )
            .await
            .map(|_| ()),
            c.delete_task("person1", 2).await.map(|_| ()),
            c.import_document(sole_user_document_with_new_ids())
                .await
                .map(|_| ()),
        ];

        for result in results {
            assert!(matches!(result, Err(SyncError::Network(_))));
            assert_eq!(c.state(), before);
        }
        assert_eq!(c.state().selection(), Some("person2"));
    }

    fn sole_user_document_with_new_ids() -> RemoteDocument {
        serde_json::from_value(json!({
            "users": { "person9": { "id": "person9", "name": "Riley" } },
            "tasksData": { "person9": [task_json(40, "Imported")] },
            "nextUserId": 10,
            "currentTaskId": 40
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_seed_defaults_rolls_back() {
        let h = harness(StubStore::with_document(empty_document()));
        h.coordinator.load().await.unwrap();
        h.store.fail_writes(|| SyncError::Validation("bad".to_string()));

        let err = h.coordinator.seed_defaults().await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(h.coordinator.state(), TrackerState::default());
    }

    #[tokio::test]
    async fn test_deleting_selected_user_moves_selection() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();
        assert_eq!(h.coordinator.state().selection(), Some("person1"));

        h.coordinator.delete_user("person1").await.unwrap();

        let state = h.coordinator.state();
        assert_eq!(state.selection(), Some("person2"));
        assert!(!state.tasks_data().contains_key("person1"));
        assert!(!h.store.remote_document().users.contains_key("person1"));
    }

    #[tokio::test]
    async fn test_task_ids_stay_monotonic_across_failed_adds() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();

        let first = h
            .coordinator
            .add_task("person2", TaskFields::new("a"))
            .await
            .unwrap();

        h.store.fail_writes(|| SyncError::Network("down".to_string()));
        assert!(h
            .coordinator
            .add_task("person2", TaskFields::new("b"))
            .await
            .is_err());
        *h.store.write_failure.lock().unwrap() = None;

        let second = h
            .coordinator
            .add_task("person2", TaskFields::new("b"))
            .await
            .unwrap();

        assert_eq!(first.id, 3);
        assert!(second.id > first.id);

        let ids: Vec<u64> = h
            .store
            .remote_document()
            .tasks_data
            .values()
            .flatten()
            .map(|t| t.id)
            .collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(ids.len(), unique.len());
        assert!(h.coordinator.state().current_task_id() >= second.id);
    }

    #[tokio::test]
    async fn test_edit_keeps_id_and_restamps_logged_date() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();

        let deadline = NaiveDate::from_ymd_opt(2024, 4, 1);
        let edited = h
            .coordinator
            .edit_task(
                "person1",
                1,
                TaskFields::new("Final plan")
                    .with_priority(Priority::High)
                    .with_status(TaskStatus::InProgress)
                    .with_deadline(deadline)
                    .with_update("halfway"),
            )
            .await
            .unwrap();

        assert_eq!(edited.id, 1);
        assert_eq!(edited.date_logged, chrono::Local::now().date_naive());
        assert_ne!(edited.date_logged, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(edited.deadline, deadline);
        assert_eq!(h.coordinator.state().task("person1", 1), Some(&edited));
    }

    #[tokio::test]
    async fn test_unknown_ids_fail_without_persisting() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();

        assert!(matches!(
            h.coordinator.add_task("ghost", TaskFields::new("x")).await,
            Err(SyncError::UnknownUser(_))
        ));
        assert!(matches!(
            h.coordinator.delete_task("person1", 99).await,
            Err(SyncError::UnknownTask { task_id: 99, .. })
        ));
        assert!(matches!(
            h.coordinator.select_user("ghost"),
            Err(SyncError::UnknownUser(_))
        ));
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_persist_in_flight() {
        let store = StubStore {
            write_delay: Duration::from_millis(200),
            ..StubStore::with_document(two_user_document())
        };
        let h = harness_with(store, CountingPrompt::answering(Some("secret")), |c| {
            c.with_persist_wait(Duration::from_secs(10))
        });
        h.coordinator.load().await.unwrap();

        let c = &h.coordinator;
        let (a, b, d) = tokio::join!(
            c.add_task("person1", TaskFields::new("a")),
            c.add_task("person1", TaskFields::new("b")),
            c.add_task("person2", TaskFields::new("c")),
        );

        assert!(a.is_ok() && b.is_ok() && d.is_ok());
        assert_eq!(h.store.writes(), 3);
        assert_eq!(h.store.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(h.prompt.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_writer_gives_up_after_persist_wait() {
        let store = StubStore {
            write_delay: Duration::from_secs(5),
            ..StubStore::with_document(two_user_document())
        };
        let h = harness_with(store, CountingPrompt::answering(Some("secret")), |c| {
            c.with_persist_wait(Duration::from_secs(1))
        });
        h.coordinator.load().await.unwrap();

        let c = &h.coordinator;
        let (first, second) = tokio::join!(
            c.add_task("person1", TaskFields::new("slow")),
            c.add_task("person1", TaskFields::new("impatient")),
        );

        assert!(first.is_ok());
        assert!(matches!(second, Err(SyncError::OperationInProgress)));
        assert_eq!(c.state().tasks("person1").len(), 3);
        assert_eq!(h.store.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_reused_then_prompted_once_after_expiry() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();

        for name in ["a", "b", "c"] {
            h.coordinator
                .add_task("person1", TaskFields::new(name))
                .await
                .unwrap();
        }
        assert_eq!(h.prompt.calls(), 1);
        assert_eq!(
            h.coordinator.sync_status().credential_source,
            CredentialSource::Session
        );
        assert!(h.notifier.has(Severity::Success));

        tokio::time::advance(DEFAULT_CREDENTIAL_TTL + Duration::from_secs(1)).await;
        assert_eq!(
            h.coordinator.sync_status().credential_source,
            CredentialSource::None
        );

        h.coordinator
            .add_task("person1", TaskFields::new("d"))
            .await
            .unwrap();
        h.coordinator
            .add_task("person1", TaskFields::new("e"))
            .await
            .unwrap();
        assert_eq!(h.prompt.calls(), 2);
        assert!(h
            .store
            .credentials_seen
            .lock()
            .unwrap()
            .iter()
            .all(|c| c == "secret"));
    }

    #[tokio::test]
    async fn test_cancelled_prompt_rolls_back() {
        let h = harness_with(
            StubStore::with_document(two_user_document()),
            CountingPrompt::answering(None),
            |c| c,
        );
        h.coordinator.load().await.unwrap();
        let before = h.coordinator.state();

        let err = h.coordinator.add_user("Sam").await.unwrap_err();

        assert!(matches!(err, SyncError::CredentialRequired));
        assert_eq!(h.coordinator.state(), before);
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_static_credential_never_prompts() {
        let store = Arc::new(StubStore::with_document(two_user_document()));
        let prompt = CountingPrompt::answering(Some("prompted"));
        let coordinator = SyncCoordinator::remote(
            "doc-1",
            store.clone(),
            Arc::new(
                CredentialCache::new(DEFAULT_CREDENTIAL_TTL)
                    .with_static(Some("operator".to_string())),
            ),
        )
        .with_prompt(prompt.clone());
        coordinator.load().await.unwrap();

        coordinator.add_user("Sam").await.unwrap();

        assert_eq!(prompt.calls(), 0);
        assert_eq!(
            store.credentials_seen.lock().unwrap().as_slice(),
            ["operator".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_pull_leaves_state_untouched() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();
        let before = h.coordinator.state();
        h.store
            .fail_fetches(|| SyncError::MalformedResponse("not valid".to_string()));

        let err = h.coordinator.sync_pull().await.unwrap_err();

        assert!(matches!(err, SyncError::MalformedResponse(_)));
        assert_eq!(h.coordinator.state(), before);
    }

    #[tokio::test]
    async fn test_missing_document_fails_load() {
        let h = harness(StubStore::default());
        let err = h.coordinator.load().await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
        assert!(h.coordinator.state().is_empty());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = Arc::new(StubStore::with_document(two_user_document()));
        let first = SyncCoordinator::remote(
            "doc-1",
            store.clone(),
            Arc::new(CredentialCache::new(DEFAULT_CREDENTIAL_TTL)),
        )
        .with_prompt(CountingPrompt::answering(Some("secret")));
        let second = SyncCoordinator::remote(
            "doc-1",
            store.clone(),
            Arc::new(CredentialCache::new(DEFAULT_CREDENTIAL_TTL)),
        )
        .with_prompt(CountingPrompt::answering(Some("secret")));
        first.load().await.unwrap();
        second.load().await.unwrap();

        first
            .add_task("person2", TaskFields::new("from first"))
            .await
            .unwrap();
        second
            .add_task("person2", TaskFields::new("from second"))
            .await
            .unwrap();

        // No version check: the stale writer overwrites the earlier write
        let remote = store.remote_document();
        let names: Vec<&str> = remote.tasks_data["person2"]
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["from second"]);

        first.sync_pull().await.unwrap();
        assert_eq!(first.state().tasks("person2"), second.state().tasks("person2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_pull_skipped_while_write_in_flight() {
        let store = StubStore {
            write_delay: Duration::from_secs(5),
            ..StubStore::with_document(two_user_document())
        };
        let h = harness(store);
        h.coordinator.load().await.unwrap();
        let fetches_before = h.store.fetches.load(Ordering::SeqCst);

        let writer = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .add_task("person1", TaskFields::new("slow"))
                    .await
            })
        };
        while !h.coordinator.sync_status().in_flight {
            tokio::task::yield_now().await;
        }

        let outcome = h.coordinator.auto_pull().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Skipped);
        assert_eq!(h.store.fetches.load(Ordering::SeqCst), fetches_before);

        writer.await.unwrap().unwrap();
        assert!(!h.coordinator.sync_status().in_flight);
        assert!(matches!(
            h.coordinator.auto_pull().await.unwrap(),
            LoadOutcome::Loaded { users: 2, tasks: 3 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_pull_waits_for_write_in_flight() {
        let store = StubStore {
            write_delay: Duration::from_secs(2),
            ..StubStore::with_document(two_user_document())
        };
        let h = harness_with(store, CountingPrompt::answering(Some("secret")), |c| {
            c.with_persist_wait(Duration::from_secs(10))
        });
        h.coordinator.load().await.unwrap();
        let fetches_before = h.store.fetches.load(Ordering::SeqCst);

        let writer = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .add_task("person2", TaskFields::new("committed"))
                    .await
            })
        };
        while !h.coordinator.sync_status().in_flight {
            tokio::task::yield_now().await;
        }

        // The pull queues behind the write and then reads what it committed
        let outcome = h.coordinator.sync_pull().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { users: 2, tasks: 3 });
        assert_eq!(h.store.writes(), 1);
        assert_eq!(h.store.fetches.load(Ordering::SeqCst), fetches_before + 1);
        assert_eq!(h.coordinator.state().tasks("person2")[0].name, "committed");

        writer.await.unwrap().unwrap();
        assert!(!h.coordinator.sync_status().in_flight);
    }

    #[tokio::test]
    async fn test_import_without_tracker_data_is_refused() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();
        let before = h.coordinator.state();

        let unrelated = RemoteDocument::from_json(r#"{"foo": 1}"#).unwrap();
        assert!(matches!(
            h.coordinator.import_document(unrelated).await,
            Err(SyncError::InvalidInput(_))
        ));
        assert_eq!(h.coordinator.state(), before);
        assert_eq!(h.store.writes(), 0);
        assert_eq!(h.prompt.calls(), 0);
    }

    #[tokio::test]
    async fn test_import_merges_and_export_round_trips() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();

        let report = h
            .coordinator
            .import_document(sole_user_document_with_new_ids())
            .await
            .unwrap();
        assert!(report.is_clean());

        let state = h.coordinator.state();
        assert_eq!(state.user_count(), 3);
        assert_eq!(state.current_task_id(), 40);
        assert_eq!(state.next_user_id(), 10);

        let exported = h.coordinator.export_document();
        let json = exported.to_json().unwrap();
        let (restored, _) = TrackerState::from_document(RemoteDocument::from_json(&json).unwrap());
        assert_eq!(restored.users(), state.users());
        assert_eq!(restored.tasks_data(), state.tasks_data());
    }

    #[tokio::test]
    async fn test_sync_status_reports_mode_and_share_url() {
        let h = harness(StubStore::with_document(two_user_document()));
        let status = h.coordinator.sync_status();
        assert!(status.last_synced.is_none());
        assert!(!status.in_flight);

        h.coordinator.load().await.unwrap();
        let status = h.coordinator.sync_status();
        assert_eq!(
            status.mode,
            SyncMode::RemoteEnabled {
                document_id: "doc-1".to_string()
            }
        );
        assert_eq!(status.share_url.as_deref(), Some("https://gist.example/doc-1"));
        assert!(status.last_synced.is_some());
        assert_eq!(status.credential_source, CredentialSource::None);
    }

    #[tokio::test]
    async fn test_forget_credential() {
        let h = harness(StubStore::with_document(two_user_document()));
        h.coordinator.load().await.unwrap();
        h.coordinator.add_user("Sam").await.unwrap();
        assert!(h.coordinator.credentials().get().is_some());

        h.coordinator.forget_credential();
        assert!(h.coordinator.credentials().get().is_none());
        assert!(h.notifier.has(Severity::Info));
    }

    #[tokio::test]
    async fn test_local_snapshot_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tally.json");

        let coordinator = SyncCoordinator::local_only(LocalStore::new(path.clone()));
        assert_eq!(coordinator.load().await.unwrap(), LoadOutcome::Empty);
        coordinator.seed_defaults().await.unwrap();
        coordinator
            .add_task("person2", TaskFields::new("Persisted"))
            .await
            .unwrap();
        assert_eq!(coordinator.mode(), SyncMode::LocalOnly);

        let reopened = SyncCoordinator::local_only(LocalStore::new(path));
        assert_eq!(
            reopened.load().await.unwrap(),
            LoadOutcome::Loaded { users: 2, tasks: 1 }
        );
        assert_eq!(reopened.state().tasks("person2")[0].name, "Persisted");
    }

    #[tokio::test]
    async fn test_in_memory_mode_never_fails_to_persist() {
        let coordinator = SyncCoordinator::local_only(LocalStore::in_memory());
        coordinator.load().await.unwrap();
        let user = coordinator.add_user("Alex").await.unwrap();
        coordinator
            .add_task(&user.id, TaskFields::new("Scratch"))
            .await
            .unwrap();
        assert_eq!(coordinator.state().tasks(&user.id).len(), 1);
    }

    #[tokio::test]
    async fn test_from_config_picks_mode() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let local = SyncCoordinator::from_config(
            &config,
            Arc::new(NoPrompt),
            Arc::new(LogNotifier),
        )
        .unwrap();
        assert_eq!(local.mode(), SyncMode::LocalOnly);

        config.document_id = Some("abc123".to_string());
        config.token = Some("operator".to_string());
        let remote = SyncCoordinator::from_config(
            &config,
            Arc::new(NoPrompt),
            Arc::new(LogNotifier),
        )
        .unwrap();
        assert_eq!(
            remote.mode(),
            SyncMode::RemoteEnabled {
                document_id: "abc123".to_string()
            }
        );
        assert_eq!(
            remote.sync_status().credential_source,
            CredentialSource::Static
        );
    }
}
