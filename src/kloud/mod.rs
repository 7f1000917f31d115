//! The orchestrator routing lifecycle requests to registered providers.
//!
//! [`Kloud`] owns the provider registry, the live eventers, the optional
//! storage and deployer hooks and the per-machine [`IdLock`]. Every mutating
//! operation runs under the lock for its machine id, so at most one
//! Build/Start/Stop/Restart/Destroy is in flight per machine while distinct
//! machines proceed concurrently.

mod error;
mod operation;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::KloudConfig;
use crate::eventer::{DEFAULT_EVENT_CAPACITY, Event, Eventer};
use crate::idlock::IdLock;
use crate::machine_state::MachineState;
use crate::protocol::{Deployer, MachineOptions, Provider, ProviderArtifact, ProviderError, Storage};

pub use error::KloudError;
pub use operation::{Operation, OperationOutcome, ParseOperationError};

type ProviderMap = HashMap<String, Arc<dyn Provider>>;
/// Eventers per id, oldest first. Only the last one can still be live.
type EventerMap = HashMap<String, VecDeque<Arc<Eventer>>>;

/// Seals an eventer when the operation future finishes or is dropped.
struct EventerSeal<'a>(&'a Eventer);

impl Drop for EventerSeal<'_> {
    fn drop(&mut self) {
        self.0.seal();
    }
}

/// Lifecycle orchestrator.
pub struct Kloud {
    providers: RwLock<ProviderMap>,
    eventers: Mutex<EventerMap>,
    storage: Option<Arc<dyn Storage>>,
    deployer: Option<Arc<dyn Deployer>>,
    idlock: IdLock,
    event_capacity: usize,
}

impl Default for Kloud {
    fn default() -> Self {
        Self {
            providers: RwLock::default(),
            eventers: Mutex::default(),
            storage: None,
            deployer: None,
            idlock: IdLock::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl std::fmt::Debug for Kloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kloud")
            .field("providers", &self.provider_names())
            .field("eventers", &self.eventer_ids())
            .field("has_storage", &self.storage.is_some())
            .field("has_deployer", &self.deployer.is_some())
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}

impl Kloud {
    /// Creates an orchestrator with no providers and no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an orchestrator sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`KloudError::Configuration`] when the configuration is
    /// invalid.
    pub fn from_config(config: &KloudConfig) -> Result<Self, KloudError> {
        config.validate()?;
        Ok(Self {
            event_capacity: config.event_capacity,
            ..Self::default()
        })
    }

    /// Persists artifacts and states through `storage`.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Runs `deployer` after every successful Build.
    #[must_use]
    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    fn providers(&self) -> std::sync::RwLockReadGuard<'_, ProviderMap> {
        self.providers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn eventers(&self) -> MutexGuard<'_, EventerMap> {
        self.eventers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `provider` under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`KloudError::DuplicateProvider`] when the name is taken.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) -> Result<(), KloudError> {
        let name = provider.name().to_owned();
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if providers.contains_key(&name) {
            return Err(KloudError::DuplicateProvider { name });
        }
        info!(provider = %name, "registered provider");
        providers.insert(name, provider);
        Ok(())
    }

    /// Looks up a provider by name.
    ///
    /// # Errors
    ///
    /// Returns [`KloudError::ProviderNotFound`] when `name` is unregistered.
    pub fn get_provider(&self, name: &str) -> Result<Arc<dyn Provider>, KloudError> {
        self.providers()
            .get(name)
            .cloned()
            .ok_or_else(|| KloudError::ProviderNotFound {
                name: name.to_owned(),
            })
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers().keys().cloned().collect();
        names.sort();
        names
    }

    /// Id under which the eventer of `operation` on `machine_id` is
    /// registered.
    #[must_use]
    pub fn event_id(operation: Operation, machine_id: &str) -> String {
        format!("{operation}-{machine_id}")
    }

    /// Ids of the eventers currently registered, sorted.
    #[must_use]
    pub fn eventer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.eventers().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The most recent eventer registered under `id`.
    #[must_use]
    pub fn eventer(&self, id: &str) -> Option<Arc<Eventer>> {
        self.eventers().get(id).and_then(VecDeque::back).cloned()
    }

    /// Returns every event pushed so far by the oldest eventer under `id`.
    ///
    /// Once that operation has returned and its eventer is sealed, this call
    /// drains it: the eventer is deregistered and the next call moves on to
    /// the following operation on the same id, or returns `None`.
    #[must_use]
    pub fn events(&self, id: &str) -> Option<Vec<Event>> {
        let mut eventers = self.eventers();
        let queue = eventers.get_mut(id)?;
        let eventer = queue.front()?;
        let events = eventer.events();
        if eventer.is_sealed() {
            debug!(eventer = id, "terminal event drained, removing eventer");
            queue.pop_front();
            if queue.is_empty() {
                eventers.remove(id);
            }
        }
        Some(events)
    }

    /// The latest event of the most recent operation on `id`, without
    /// draining.
    #[must_use]
    pub fn latest_event(&self, id: &str) -> Option<Event> {
        self.eventer(id).and_then(|eventer| eventer.latest())
    }

    /// Subscribes to the latest event of the most recent operation on `id`.
    #[must_use]
    pub fn subscribe(&self, id: &str) -> Option<watch::Receiver<Option<Event>>> {
        self.eventer(id).map(|eventer| eventer.subscribe())
    }

    /// Registers a fresh eventer behind any undrained ones for the same id.
    fn register_eventer(&self, operation: Operation, machine_id: &str) -> Arc<Eventer> {
        let id = Self::event_id(operation, machine_id);
        let eventer = Arc::new(Eventer::with_capacity(id.clone(), self.event_capacity));
        let mut eventers = self.eventers();
        let queue = eventers.entry(id).or_default();
        if !queue.is_empty() {
            debug!(
                eventer = %eventer.id(),
                undrained = queue.len(),
                "keeping undrained eventers"
            );
        }
        queue.push_back(Arc::clone(&eventer));
        eventer
    }

    /// Runs `operation` on the provider registered as `provider_name`.
    ///
    /// Mutating operations wait for the resource lock of
    /// `options.machine_id`, register an eventer under
    /// [`Self::event_id`], push a terminal event and seal it before
    /// returning. The lock is released on every exit path. Info takes no
    /// lock and reports through an unregistered eventer.
    ///
    /// # Errors
    ///
    /// Returns [`KloudError::ProviderNotFound`] for an unknown provider,
    /// [`KloudError::Operation`] when the provider fails and
    /// [`KloudError::Lock`] when the lock table is inconsistent.
    pub async fn execute(
        &self,
        provider_name: &str,
        operation: Operation,
        options: MachineOptions,
    ) -> Result<OperationOutcome, KloudError> {
        let provider = self.get_provider(provider_name)?;
        if !operation.is_mutating() {
            return self.info(provider.as_ref(), options).await;
        }

        let guard = self.idlock.acquire(&options.machine_id).await;
        debug!(machine_id = %options.machine_id, %operation, "resource lock acquired");
        let eventer = self.register_eventer(operation, &options.machine_id);
        let seal = EventerSeal(&eventer);
        let wired = options.with_eventer(Arc::clone(&eventer));

        let result = Self::dispatch(provider.as_ref(), operation, &wired).await;
        if let (Operation::Build, Ok(OperationOutcome::Artifact(artifact))) = (operation, &result) {
            self.deploy(artifact, &wired).await;
        }
        let outcome = Self::finish(&eventer, operation, &wired.machine_id, result);
        drop(seal);

        self.record(operation, &wired.machine_id, &outcome).await;
        guard.release()?;
        outcome
    }

    /// Runs [`Self::execute`] on a new task.
    #[must_use]
    pub fn spawn(
        self: &Arc<Self>,
        provider_name: impl Into<String>,
        operation: Operation,
        options: MachineOptions,
    ) -> JoinHandle<Result<OperationOutcome, KloudError>> {
        let kloud = Arc::clone(self);
        let name = provider_name.into();
        tokio::spawn(async move { kloud.execute(&name, operation, options).await })
    }

    async fn info(
        &self,
        provider: &dyn Provider,
        options: MachineOptions,
    ) -> Result<OperationOutcome, KloudError> {
        let wired = options.with_eventer(Arc::new(Eventer::anonymous(Operation::Info.as_str())));
        let snapshot = provider
            .info(&wired)
            .await
            .map_err(|source| KloudError::Operation {
                operation: Operation::Info,
                machine_id: wired.machine_id.clone(),
                last_state: source.last_state().unwrap_or_default(),
                source,
            })?;
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.update_state(&wired.machine_id, snapshot.state).await {
                warn!(machine_id = %wired.machine_id, error = %err, "storage hook failed");
            }
        }
        Ok(OperationOutcome::Info(snapshot))
    }

    async fn dispatch(
        provider: &dyn Provider,
        operation: Operation,
        options: &MachineOptions,
    ) -> Result<OperationOutcome, ProviderError> {
        match operation {
            Operation::Build => provider.build(options).await.map(OperationOutcome::Artifact),
            Operation::Start => provider.start(options).await.map(OperationOutcome::Artifact),
            Operation::Stop => provider
                .stop(options)
                .await
                .map(|()| OperationOutcome::Completed),
            Operation::Restart => provider
                .restart(options)
                .await
                .map(|()| OperationOutcome::Completed),
            Operation::Destroy => provider
                .destroy(options)
                .await
                .map(|()| OperationOutcome::Completed),
            Operation::Info => provider.info(options).await.map(OperationOutcome::Info),
        }
    }

    async fn deploy(&self, artifact: &ProviderArtifact, options: &MachineOptions) {
        let Some(deployer) = &self.deployer else {
            return;
        };
        let Ok(reporter) = options.reporter() else {
            return;
        };
        if let Err(err) = deployer.deploy(artifact, reporter).await {
            warn!(machine_id = %options.machine_id, error = %err, "deployer hook failed");
        }
    }

    /// Pushes the terminal event and seals the eventer.
    fn finish(
        eventer: &Eventer,
        operation: Operation,
        machine_id: &str,
        result: Result<OperationOutcome, ProviderError>,
    ) -> Result<OperationOutcome, KloudError> {
        let last = eventer.latest();
        let outcome = match result {
            Ok(outcome) => {
                eventer.push(Event::progress(
                    format!("{operation} finished"),
                    100,
                    operation.target_state(),
                ));
                info!(machine_id, %operation, "operation finished");
                Ok(outcome)
            }
            Err(source) => {
                let last_state = source
                    .last_state()
                    .or_else(|| last.as_ref().map(|event| event.status))
                    .unwrap_or_default();
                let percentage = last.as_ref().map_or(0, |event| event.percentage);
                eventer.push(Event::failure(
                    format!("{operation} failed"),
                    percentage,
                    last_state,
                    source.to_string(),
                ));
                warn!(machine_id, %operation, error = %source, "operation failed");
                Err(KloudError::Operation {
                    operation,
                    machine_id: machine_id.to_owned(),
                    last_state,
                    source,
                })
            }
        };
        eventer.seal();
        outcome
    }

    async fn record(
        &self,
        operation: Operation,
        machine_id: &str,
        outcome: &Result<OperationOutcome, KloudError>,
    ) {
        let Some(storage) = &self.storage else {
            return;
        };
        let state = match outcome {
            Ok(OperationOutcome::Artifact(artifact)) => {
                if let Err(err) = storage.update(machine_id, artifact).await {
                    warn!(machine_id, error = %err, "storage hook failed");
                }
                operation.target_state()
            }
            Ok(_) => operation.target_state(),
            Err(err) => match err.last_state() {
                Some(state) if state != MachineState::Unknown => state,
                _ => return,
            },
        };
        if let Err(err) = storage.update_state(machine_id, state).await {
            warn!(machine_id, error = %err, "storage hook failed");
        }
    }
}
