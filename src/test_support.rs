//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::eventer::Reporter;
use crate::machine_state::MachineState;
use crate::openstack::{
    ApiError, ApiFuture, ComputeApi, ComputeConnector, Flavor, Image, KeyPair, NewServer, Server,
};
use crate::protocol::{
    Deployer, HookError, HookFuture, InfoArtifact, MachineOptions, Parameters, Provider,
    ProviderArtifact, ProviderError, ProviderFuture, Storage,
};

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a server looks like on one `server()` call.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Observation {
    Status {
        status: &'static str,
        task_state: Option<&'static str>,
    },
    Gone,
}

impl Observation {
    const fn status(status: &'static str) -> Self {
        Self::Status {
            status,
            task_state: None,
        }
    }

    const fn busy(status: &'static str, task_state: &'static str) -> Self {
        Self::Status {
            status,
            task_state: Some(task_state),
        }
    }
}

#[derive(Debug)]
struct FakeServer {
    server: Server,
    pending: VecDeque<Observation>,
}

#[derive(Debug)]
struct FakeState {
    servers: BTreeMap<String, FakeServer>,
    images: Vec<Image>,
    flavors: Vec<Flavor>,
    key_pairs: BTreeMap<String, KeyPair>,
    failures: HashMap<String, ApiError>,
    calls: Vec<String>,
    connections: Vec<String>,
    next_id: u32,
    build_polls: usize,
    boot_statuses: Vec<&'static str>,
    snapshot_polls: usize,
    vanish_on_snapshot: bool,
    delete_polls: usize,
    reboot_polls: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            servers: BTreeMap::new(),
            images: Vec::new(),
            flavors: Vec::new(),
            key_pairs: BTreeMap::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            connections: Vec::new(),
            next_id: 0,
            build_polls: 1,
            boot_statuses: Vec::new(),
            snapshot_polls: 1,
            vanish_on_snapshot: false,
            delete_polls: 1,
            reboot_polls: 1,
        }
    }
}

impl FakeState {
    fn record(&mut self, action: &str) -> Result<(), ApiError> {
        self.calls.push(action.to_owned());
        self.failures.get(action).cloned().map_or(Ok(()), Err)
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn server_mut(&mut self, id: &str) -> Result<&mut FakeServer, ApiError> {
        self.servers
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("server {id}")))
    }

    fn script(
        count: usize,
        during: &Observation,
        last: Observation,
    ) -> VecDeque<Observation> {
        let mut pending: VecDeque<_> = std::iter::repeat_n(during.clone(), count).collect();
        pending.push_back(last);
        pending
    }
}

/// In-memory compute API that moves servers through scripted Nova states.
///
/// Each `server()` call advances the addressed server by one scripted
/// observation: a new server reports `BUILD` for `build_polls` calls and
/// then `ACTIVE`; a snapshot keeps `image_snapshot` as task state for
/// `snapshot_polls` calls; a deleted server reports `deleting` for
/// `delete_polls` calls and then disappears.
#[derive(Clone, Debug, Default)]
pub struct FakeCompute {
    state: Arc<StdMutex<FakeState>>,
}

impl FakeCompute {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fake knowing the default Rackspace image, flavor `2` and
    /// nothing else.
    #[must_use]
    pub fn rackspace() -> Self {
        Self::new()
            .with_image(crate::config::DEFAULT_IMAGE_ID, "Ubuntu 14.04 LTS")
            .with_flavor(crate::config::DEFAULT_FLAVOR_ID, "512MB Standard Instance")
    }

    /// Adds an image.
    #[must_use]
    pub fn with_image(self, id: &str, name: &str) -> Self {
        lock(&self.state).images.push(Image {
            id: id.to_owned(),
            name: name.to_owned(),
            status: String::from("ACTIVE"),
        });
        self
    }

    /// Adds a flavor.
    #[must_use]
    pub fn with_flavor(self, id: &str, name: &str) -> Self {
        lock(&self.state).flavors.push(Flavor {
            id: id.to_owned(),
            name: name.to_owned(),
        });
        self
    }

    /// Registers a key pair.
    #[must_use]
    pub fn with_key_pair(self, name: &str, public_key: &str) -> Self {
        lock(&self.state).key_pairs.insert(
            name.to_owned(),
            KeyPair {
                name: name.to_owned(),
                public_key: public_key.to_owned(),
            },
        );
        self
    }

    /// Adds an idle server with the given Nova status.
    #[must_use]
    pub fn with_server(self, id: &str, name: &str, status: &str) -> Self {
        lock(&self.state).servers.insert(
            id.to_owned(),
            FakeServer {
                server: Server {
                    id: id.to_owned(),
                    name: name.to_owned(),
                    status: status.to_owned(),
                    task_state: None,
                    access_ipv4: String::from("192.0.2.10"),
                },
                pending: VecDeque::new(),
            },
        );
        self
    }

    /// Number of `server()` calls a new server stays in `BUILD`.
    #[must_use]
    pub fn with_build_polls(self, polls: usize) -> Self {
        lock(&self.state).build_polls = polls;
        self
    }

    /// Statuses a new server reports, one per `server()` call, before
    /// `ACTIVE`. Overrides [`Self::with_build_polls`].
    #[must_use]
    pub fn with_boot_statuses(self, statuses: &[&'static str]) -> Self {
        lock(&self.state).boot_statuses = statuses.to_vec();
        self
    }

    /// Makes a server disappear on the first `server()` call after a
    /// snapshot was requested.
    #[must_use]
    pub fn vanishing_after_snapshot(self) -> Self {
        lock(&self.state).vanish_on_snapshot = true;
        self
    }

    /// Number of `server()` calls a snapshot keeps the server busy.
    #[must_use]
    pub fn with_snapshot_polls(self, polls: usize) -> Self {
        lock(&self.state).snapshot_polls = polls;
        self
    }

    /// Number of `server()` calls a deleted server stays visible.
    #[must_use]
    pub fn with_delete_polls(self, polls: usize) -> Self {
        lock(&self.state).delete_polls = polls;
        self
    }

    /// Number of `server()` calls a rebooting server reports `REBOOT`.
    #[must_use]
    pub fn with_reboot_polls(self, polls: usize) -> Self {
        lock(&self.state).reboot_polls = polls;
        self
    }

    /// Makes every call to `action` fail with `error`.
    #[must_use]
    pub fn failing(self, action: &str, error: ApiError) -> Self {
        lock(&self.state)
            .failures
            .insert(action.to_owned(), error);
        self
    }

    /// Names of the API calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls made to `action`.
    #[must_use]
    pub fn call_count(&self, action: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.as_str() == action)
            .count()
    }

    /// Identity endpoints the connector was asked to authenticate against.
    #[must_use]
    pub fn connections(&self) -> Vec<String> {
        lock(&self.state).connections.clone()
    }

    /// Current server records.
    #[must_use]
    pub fn servers(&self) -> Vec<Server> {
        lock(&self.state)
            .servers
            .values()
            .map(|fake| fake.server.clone())
            .collect()
    }

    /// Current image records.
    #[must_use]
    pub fn images(&self) -> Vec<Image> {
        lock(&self.state).images.clone()
    }

    /// Names of the registered key pairs.
    #[must_use]
    pub fn key_pair_names(&self) -> Vec<String> {
        lock(&self.state).key_pairs.keys().cloned().collect()
    }
}

impl ComputeApi for FakeCompute {
    fn image<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Image> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("image")?;
            state
                .images
                .iter()
                .find(|image| image.id == id)
                .cloned()
                .ok_or_else(|| ApiError::not_found(format!("image {id}")))
        })
    }

    fn images(&self) -> ApiFuture<'_, Vec<Image>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("images")?;
            Ok(state.images.clone())
        })
    }

    fn create_image<'a>(&'a self, server_id: &'a str, name: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("create_image")?;
            let image_id = format!("img-{}", state.next_id());
            let polls = state.snapshot_polls;
            let vanish = state.vanish_on_snapshot;
            let fake = state.server_mut(server_id)?;
            fake.server.task_state = Some(String::from("image_snapshot"));
            fake.pending = if vanish {
                VecDeque::from([Observation::Gone])
            } else {
                FakeState::script(
                    polls,
                    &Observation::busy("ACTIVE", "image_snapshot"),
                    Observation::status("ACTIVE"),
                )
            };
            state.images.push(Image {
                id: image_id.clone(),
                name: name.to_owned(),
                status: String::from("ACTIVE"),
            });
            Ok(image_id)
        })
    }

    fn delete_image<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("delete_image")?;
            let before = state.images.len();
            state.images.retain(|image| image.id != id);
            if state.images.len() == before {
                return Err(ApiError::not_found(format!("image {id}")));
            }
            Ok(())
        })
    }

    fn flavors(&self) -> ApiFuture<'_, Vec<Flavor>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("flavors")?;
            Ok(state.flavors.clone())
        })
    }

    fn key_pair<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Option<KeyPair>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("key_pair")?;
            Ok(state.key_pairs.get(name).cloned())
        })
    }

    fn create_key_pair<'a>(
        &'a self,
        name: &'a str,
        public_key: &'a str,
    ) -> ApiFuture<'a, KeyPair> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("create_key_pair")?;
            let key = KeyPair {
                name: name.to_owned(),
                public_key: public_key.to_owned(),
            };
            state.key_pairs.insert(name.to_owned(), key.clone());
            Ok(key)
        })
    }

    fn delete_key_pair<'a>(&'a self, name: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("delete_key_pair")?;
            state
                .key_pairs
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| ApiError::not_found(format!("key pair {name}")))
        })
    }

    fn create_server<'a>(&'a self, request: &'a NewServer) -> ApiFuture<'a, Server> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("create_server")?;
            let number = state.next_id();
            let server = Server {
                id: format!("srv-{number}"),
                name: request.name.clone(),
                status: String::from("BUILD"),
                task_state: Some(String::from("spawning")),
                access_ipv4: format!("192.0.2.{number}"),
            };
            let pending = if state.boot_statuses.is_empty() {
                FakeState::script(
                    state.build_polls,
                    &Observation::busy("BUILD", "spawning"),
                    Observation::status("ACTIVE"),
                )
            } else {
                state
                    .boot_statuses
                    .iter()
                    .copied()
                    .map(Observation::status)
                    .chain(std::iter::once(Observation::status("ACTIVE")))
                    .collect()
            };
            state.servers.insert(
                server.id.clone(),
                FakeServer {
                    server: server.clone(),
                    pending,
                },
            );
            Ok(server)
        })
    }

    fn server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Server> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("server")?;
            let fake = state.server_mut(id)?;
            match fake.pending.pop_front() {
                Some(Observation::Gone) => {
                    state.servers.remove(id);
                    Err(ApiError::not_found(format!("server {id}")))
                }
                Some(Observation::Status { status, task_state }) => {
                    fake.server.status = status.to_owned();
                    fake.server.task_state = task_state.map(str::to_owned);
                    Ok(fake.server.clone())
                }
                None => Ok(fake.server.clone()),
            }
        })
    }

    fn delete_server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("delete_server")?;
            let polls = state.delete_polls;
            let fake = state.server_mut(id)?;
            fake.server.task_state = Some(String::from("deleting"));
            fake.pending = FakeState::script(
                polls,
                &Observation::busy("ACTIVE", "deleting"),
                Observation::Gone,
            );
            Ok(())
        })
    }

    fn reboot_server<'a>(&'a self, id: &'a str, hard: bool) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(if hard { "hard_reboot_server" } else { "reboot_server" })?;
            let polls = state.reboot_polls;
            let fake = state.server_mut(id)?;
            let rebooting = if hard { "HARD_REBOOT" } else { "REBOOT" };
            fake.server.status = rebooting.to_owned();
            fake.pending = FakeState::script(
                polls,
                &Observation::status(rebooting),
                Observation::status("ACTIVE"),
            );
            Ok(())
        })
    }
}

impl ComputeConnector for FakeCompute {
    fn connect<'a>(
        &'a self,
        auth_url: &'a str,
        _credential: &'a Parameters,
    ) -> ApiFuture<'a, Box<dyn ComputeApi>> {
        Box::pin(async move {
            {
                let mut state = lock(&self.state);
                state.connections.push(auth_url.to_owned());
                state.record("connect")?;
            }
            Ok(Box::new(self.clone()) as Box<dyn ComputeApi>)
        })
    }
}

#[derive(Debug, Default)]
struct StorageState {
    artifacts: BTreeMap<String, ProviderArtifact>,
    states: Vec<(String, MachineState)>,
    failure: Option<String>,
}

/// Storage double keeping machine records in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    state: Arc<StdMutex<StorageState>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail with `message`.
    #[must_use]
    pub fn failing(self, message: &str) -> Self {
        lock(&self.state).failure = Some(message.to_owned());
        self
    }

    /// Artifact stored for `machine_id`.
    #[must_use]
    pub fn artifact(&self, machine_id: &str) -> Option<ProviderArtifact> {
        lock(&self.state).artifacts.get(machine_id).cloned()
    }

    /// Every state update recorded so far, in order.
    #[must_use]
    pub fn state_updates(&self) -> Vec<(String, MachineState)> {
        lock(&self.state).states.clone()
    }

    fn check(state: &StorageState) -> Result<(), HookError> {
        state
            .failure
            .as_ref()
            .map_or(Ok(()), |message| Err(HookError::new("storage", message.clone())))
    }
}

impl Storage for MemoryStorage {
    fn update<'a>(&'a self, machine_id: &'a str, artifact: &'a ProviderArtifact) -> HookFuture<'a> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            Self::check(&state)?;
            state
                .artifacts
                .insert(machine_id.to_owned(), artifact.clone());
            Ok(())
        })
    }

    fn update_state<'a>(&'a self, machine_id: &'a str, machine_state: MachineState) -> HookFuture<'a> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            Self::check(&state)?;
            state.states.push((machine_id.to_owned(), machine_state));
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct DeployerState {
    deployed: Vec<ProviderArtifact>,
    failure: Option<String>,
}

/// Deployer double recording every artifact it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingDeployer {
    state: Arc<StdMutex<DeployerState>>,
}

impl RecordingDeployer {
    /// Creates a deployer that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every deployment fail with `message`.
    #[must_use]
    pub fn failing(self, message: &str) -> Self {
        lock(&self.state).failure = Some(message.to_owned());
        self
    }

    /// Artifacts deployed so far.
    #[must_use]
    pub fn deployed(&self) -> Vec<ProviderArtifact> {
        lock(&self.state).deployed.clone()
    }
}

impl Deployer for RecordingDeployer {
    fn deploy<'a>(&'a self, artifact: &'a ProviderArtifact, reporter: Reporter<'a>) -> HookFuture<'a> {
        Box::pin(async move {
            reporter.push(
                format!("Deploying onto {}", artifact.instance_name),
                90,
                MachineState::Building,
            );
            let mut state = lock(&self.state);
            state.deployed.push(artifact.clone());
            state
                .failure
                .as_ref()
                .map_or(Ok(()), |message| Err(HookError::new("deployer", message.clone())))
        })
    }
}

/// Provider double with scripted outcomes and an in-flight counter.
///
/// Every lifecycle call pushes one progress event, sleeps for the configured
/// delay and then returns the scripted result. The peak number of calls in
/// flight at once is recorded for mutual exclusion checks.
#[derive(Clone, Debug)]
pub struct ScriptedProvider {
    name: String,
    delay: Duration,
    info_state: MachineState,
    failures: Arc<StdMutex<HashMap<&'static str, ProviderError>>>,
    calls: Arc<StdMutex<Vec<(&'static str, String)>>>,
    inside: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    /// Creates a provider registered under `name` that succeeds instantly.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            delay: Duration::ZERO,
            info_state: MachineState::Running,
            failures: Arc::default(),
            calls: Arc::default(),
            inside: Arc::default(),
            peak: Arc::default(),
        }
    }

    /// Makes every call take `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// State reported by `info`.
    #[must_use]
    pub const fn with_info_state(mut self, state: MachineState) -> Self {
        self.info_state = state;
        self
    }

    /// Makes `operation` (`build`, `start`, ...) fail with `error`.
    #[must_use]
    pub fn failing(self, operation: &'static str, error: ProviderError) -> Self {
        lock(&self.failures).insert(operation, error);
        self
    }

    /// `(operation, machine_id)` pairs in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(&'static str, String)> {
        lock(&self.calls).clone()
    }

    /// Highest number of calls observed in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn run(&self, operation: &'static str, options: &MachineOptions) -> Result<(), ProviderError> {
        lock(&self.calls).push((operation, options.machine_id.clone()));
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Ok(reporter) = options.reporter() {
            reporter.push(format!("{operation} in progress"), 50, MachineState::Unknown);
        }
        tokio::time::sleep(self.delay).await;
        self.inside.fetch_sub(1, Ordering::SeqCst);
        lock(&self.failures)
            .get(operation)
            .cloned()
            .map_or(Ok(()), Err)
    }

    fn artifact(&self, options: &MachineOptions) -> ProviderArtifact {
        ProviderArtifact {
            instance_id: format!("{}-{}", self.name, options.machine_id),
            instance_name: options.instance_name.clone(),
            ip_address: String::from("192.0.2.1"),
            username: options.username.clone(),
        }
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn build<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ProviderArtifact> {
        Box::pin(async move {
            self.run("build", options).await?;
            Ok(self.artifact(options))
        })
    }

    fn start<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ProviderArtifact> {
        Box::pin(async move {
            self.run("start", options).await?;
            Ok(self.artifact(options))
        })
    }

    fn stop<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.run("stop", options).await })
    }

    fn restart<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.run("restart", options).await })
    }

    fn destroy<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.run("destroy", options).await })
    }

    fn info<'a>(&'a self, options: &'a MachineOptions) -> ProviderFuture<'a, InfoArtifact> {
        Box::pin(async move {
            self.run("info", options).await?;
            Ok(InfoArtifact {
                state: self.info_state,
                name: options.instance_name.clone(),
            })
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push((key.to_string(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
