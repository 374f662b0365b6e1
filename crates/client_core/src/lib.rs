use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use ledger_integration::{abi::AbiError, IdentityProvider, RawRecord, RecordSource};
use shared::{
    domain::{Account, Creator, Record, RecordIndex},
    error::SyncError,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

pub mod view;
pub use view::{build_view, cards, RecordCard, SortState};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FETCH_CONCURRENCY: usize = 1;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Fallback for stores built without a wallet; every connect attempt fails.
pub struct MissingIdentityProvider;

#[async_trait]
impl IdentityProvider for MissingIdentityProvider {
    async fn request_accounts(&self) -> Result<Vec<Account>> {
        Err(anyhow!("identity provider is unavailable"))
    }
}

/// One committed, immutable copy of the ledger's records keyed by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    version: u64,
    records: BTreeMap<RecordIndex, Record>,
}

impl Snapshot {
    pub fn from_records(version: u64, records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            version,
            records: records
                .into_iter()
                .map(|record| (record.index, record))
                .collect(),
        }
    }

    /// Increases by one on every successful refresh of the owning store.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn records(&self) -> &BTreeMap<RecordIndex, Record> {
        &self.records
    }

    pub fn get(&self, index: RecordIndex) -> Option<&Record> {
        self.records.get(&index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub enum SyncState {
    #[default]
    Unsynced,
    Synced(Arc<Snapshot>),
}

impl SyncState {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Self::Unsynced => None,
            Self::Synced(snapshot) => Some(snapshot),
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    IdentityChanged(Option<Account>),
    SnapshotReplaced { version: u64, record_count: usize },
    RefreshFailed(SyncError),
    ConnectFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(Account),
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Upper bound for every single read against the record source.
    pub read_timeout: Duration,
    /// Record reads kept in flight during one refresh; 1 reads strictly in order.
    pub fetch_concurrency: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

#[async_trait]
pub trait BoardHandle: Send + Sync {
    async fn connect(&self) -> ConnectOutcome;
    async fn disconnect(&self);
    async fn refresh(&self) -> std::result::Result<Arc<Snapshot>, SyncError>;
    async fn sync_state(&self) -> SyncState;
    async fn identity(&self) -> Option<Account>;
    async fn view(&self, sort: SortState) -> Vec<Record>;
    fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent>;
}

struct StoreState {
    identity: Option<Account>,
    sync: SyncState,
    last_version: u64,
}

pub struct TheoremStore {
    source: Arc<dyn RecordSource>,
    identity_provider: Arc<dyn IdentityProvider>,
    options: StoreOptions,
    state: RwLock<StoreState>,
    refresh_gate: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

impl TheoremStore {
    pub fn new(source: Arc<dyn RecordSource>) -> Arc<Self> {
        Self::new_with_dependencies(
            source,
            Arc::new(MissingIdentityProvider),
            StoreOptions::default(),
        )
    }

    pub fn new_with_identity_provider(
        source: Arc<dyn RecordSource>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Arc<Self> {
        Self::new_with_dependencies(source, identity_provider, StoreOptions::default())
    }

    pub fn new_with_dependencies(
        source: Arc<dyn RecordSource>,
        identity_provider: Arc<dyn IdentityProvider>,
        options: StoreOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            source,
            identity_provider,
            options,
            state: RwLock::new(StoreState {
                identity: None,
                sync: SyncState::Unsynced,
                last_version: 0,
            }),
            refresh_gate: Mutex::new(()),
            events,
        })
    }

    pub async fn connect(&self) -> ConnectOutcome {
        let accounts = match self.identity_provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                let message = format!("{err:#}");
                warn!("identity: connect failed error={message}");
                let _ = self.events.send(StoreEvent::ConnectFailed(message.clone()));
                return ConnectOutcome::Failed(message);
            }
        };

        let Some(account) = accounts.first().copied() else {
            info!("identity: connect cancelled, no account returned");
            return ConnectOutcome::Cancelled;
        };

        let previous = {
            let mut guard = self.state.write().await;
            guard.identity.replace(account)
        };
        if previous == Some(account) {
            debug!("identity: account unchanged account={account}");
            return ConnectOutcome::Connected(account);
        }

        info!("identity: connected account={account} switched={}", previous.is_some());
        let _ = self
            .events
            .send(StoreEvent::IdentityChanged(Some(account)));

        // Failures are already logged and broadcast by refresh; identity stays set.
        let _ = self.refresh().await;
        ConnectOutcome::Connected(account)
    }

    pub async fn disconnect(&self) {
        let previous = self.state.write().await.identity.take();
        if let Some(account) = previous {
            info!("identity: disconnected account={account}");
            let _ = self.events.send(StoreEvent::IdentityChanged(None));
        }
    }

    pub async fn refresh(&self) -> std::result::Result<Arc<Snapshot>, SyncError> {
        let _gate = self.refresh_gate.lock().await;

        let records = match self.fetch_all().await {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    "sync: refresh aborted, previous snapshot kept code={:?} error={err}",
                    err.code()
                );
                let _ = self.events.send(StoreEvent::RefreshFailed(err.clone()));
                return Err(err);
            }
        };

        let snapshot = {
            let mut guard = self.state.write().await;
            guard.last_version += 1;
            let snapshot = Arc::new(Snapshot {
                version: guard.last_version,
                records,
            });
            guard.sync = SyncState::Synced(Arc::clone(&snapshot));
            snapshot
        };

        info!(
            "sync: refresh committed version={} records={}",
            snapshot.version,
            snapshot.len()
        );
        let _ = self.events.send(StoreEvent::SnapshotReplaced {
            version: snapshot.version,
            record_count: snapshot.len(),
        });
        Ok(snapshot)
    }

    pub async fn sync_state(&self) -> SyncState {
        self.state.read().await.sync.clone()
    }

    pub async fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.state.read().await.sync.snapshot().cloned()
    }

    pub async fn identity(&self) -> Option<Account> {
        self.state.read().await.identity
    }

    /// Sorted, filtered records of the current snapshot. Never touches the source.
    pub async fn view(&self, sort: SortState) -> Vec<Record> {
        match self.snapshot().await {
            Some(snapshot) => build_view(&snapshot, sort).into_iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn timeout_error(&self, what: String) -> SyncError {
        SyncError::Timeout {
            what,
            after_ms: u64::try_from(self.options.read_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn fetch_all(&self) -> std::result::Result<BTreeMap<RecordIndex, Record>, SyncError> {
        let count = tokio::time::timeout(self.options.read_timeout, self.source.record_count())
            .await
            .map_err(|_| self.timeout_error("record count".to_string()))?
            .map_err(|err| SyncError::CountUnavailable(format!("{err:#}")))?;
        let count =
            u64::try_from(count).map_err(|_| SyncError::CountOutOfRange(count.to_string()))?;

        if count == 0 {
            info!("sync: source reports no records");
            return Ok(BTreeMap::new());
        }

        debug!(
            "sync: fetching records count={count} concurrency={}",
            self.options.fetch_concurrency
        );
        stream::iter((0..count).map(RecordIndex))
            .map(|index| self.fetch_record(index))
            .buffered(self.options.fetch_concurrency.max(1))
            .try_collect()
            .await
    }

    async fn fetch_record(
        &self,
        index: RecordIndex,
    ) -> std::result::Result<(RecordIndex, Record), SyncError> {
        let raw = tokio::time::timeout(self.options.read_timeout, self.source.record_at(index))
            .await
            .map_err(|_| self.timeout_error(format!("record {index}")))?
            .map_err(|err| {
                let reason = format!("{err:#}");
                if err.downcast_ref::<AbiError>().is_some() {
                    SyncError::MalformedRecord { index, reason }
                } else {
                    SyncError::RecordFetch { index, reason }
                }
            })?;
        Ok((index, decode_record(index, raw)))
    }
}

fn decode_record(index: RecordIndex, raw: RawRecord) -> Record {
    Record {
        index,
        id: raw.id,
        creator: Creator::from_address(raw.creator),
        title: raw.title,
        body: raw.body,
        reward: raw.reward,
        expires_at: raw.expires_at,
    }
}

#[async_trait]
impl BoardHandle for Arc<TheoremStore> {
    async fn connect(&self) -> ConnectOutcome {
        TheoremStore::connect(self).await
    }

    async fn disconnect(&self) {
        TheoremStore::disconnect(self).await
    }

    async fn refresh(&self) -> std::result::Result<Arc<Snapshot>, SyncError> {
        TheoremStore::refresh(self).await
    }

    async fn sync_state(&self) -> SyncState {
        TheoremStore::sync_state(self).await
    }

    async fn identity(&self) -> Option<Account> {
        TheoremStore::identity(self).await
    }

    async fn view(&self, sort: SortState) -> Vec<Record> {
        TheoremStore::view(self, sort).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        TheoremStore::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
