//! The context: registration facade, lifecycle and the background loop.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──run()──► Running ──shutdown()──► ShuttingDown ──loop joined──► Stopped
//!                    ▲                                                    │
//!                    └──────────────────────run()─────────────────────────┘
//! ```
//!
//! `run()` emits `:startup` once the loop thread is up. `shutdown()` emits
//! `:shutdown`, lets the loop make one last pass over it, then joins.
//!
//! # Locking
//!
//! All registries and the live spike set sit behind one mutex. Handlers run
//! after the lock is released, so they may read, write and emit freely.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arbiter_config::{ArbiterConfig, ConfigError, Configuration, ContextSettings};
use arbiter_types::{QualifiedName, Signal, SpikeId, StateId};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::constraint::Conjunction;
use crate::error::ContextError;
use crate::handler::StateContext;
use crate::module::{Module, ModuleCatalog};
use crate::property::Property;
use crate::registry::{ActivationInfo, Registry, Removal};
use crate::spike::Spike;
use crate::state::State;

/// Where the context is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

/// Outcome of one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// States whose handlers ran and returned `Ok`.
    pub fired: Vec<QualifiedName>,
    /// States that were ready but lost a write conflict.
    pub suppressed: Vec<QualifiedName>,
    /// States whose handlers returned an error.
    pub failed: Vec<QualifiedName>,
    pub expired_spikes: usize,
}

impl TickReport {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.fired.is_empty() && self.suppressed.is_empty() && self.failed.is_empty()
    }
}

#[derive(Default)]
struct Lifecycle {
    phase: Phase,
    run_task: Option<JoinHandle<()>>,
}

pub(crate) struct Shared {
    registry: Mutex<Registry>,
    catalog: ModuleCatalog,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
    pending: Mutex<bool>,
    wake: Condvar,
    stop: AtomicBool,
    shutting_down: AtomicBool,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().expect("context registry lock poisoned")
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().expect("context lifecycle lock poisoned")
    }

    pub(crate) fn now(&self) -> Duration {
        self.clock.now()
    }

    pub(crate) fn shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Wake the loop for an immediate pass.
    pub(crate) fn notify(&self) {
        let mut pending = self.pending.lock().expect("context wakeup lock poisoned");
        *pending = true;
        self.wake.notify_one();
    }

    fn wait_for_work(&self) {
        let pending = self.pending.lock().expect("context wakeup lock poisoned");
        let (mut pending, _) = self
            .wake
            .wait_timeout_while(pending, self.tick_interval, |pending| {
                !*pending && !self.stop.load(Ordering::Acquire)
            })
            .expect("context wakeup lock poisoned");
        *pending = false;
    }

    fn emit(&self, signal: Signal, payload: Option<Value>, wipe: bool) -> SpikeId {
        let id = self.lock().emit(signal, payload, wipe, self.now());
        self.notify();
        id
    }

    fn tick(&self) -> TickReport {
        let plan = self.lock().plan(self.now());
        let mut report = TickReport {
            suppressed: plan.suppressed,
            expired_spikes: plan.expired,
            ..TickReport::default()
        };
        for firing in plan.firings {
            let id = firing.state.id();
            let handler = Arc::clone(firing.state.handler());
            let mut ctx = StateContext::new(self, &firing.state, &firing.triggers);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut ctx)));
            match outcome {
                Ok(Ok(())) => {
                    tracing::debug!(
                        state = %id,
                        specificity = firing.specificity,
                        emitted = ctx.emitted().len(),
                        "State fired"
                    );
                    report.fired.push(id);
                }
                Ok(Err(err)) => {
                    tracing::warn!(state = %id, error = %err, "State handler failed");
                    report.failed.push(id);
                }
                Err(payload) => {
                    let message = panic_payload_to_string(&payload);
                    tracing::error!(state = %id, panic = %message, "State handler panicked");
                    report.failed.push(id);
                }
            }
        }
        report
    }
}

fn run_loop(shared: &Shared) {
    tracing::debug!("Context loop started");
    loop {
        // Read before the pass so a stop request still gets one final pass.
        let stopping = shared.stop.load(Ordering::Acquire);
        shared.tick();
        if stopping {
            break;
        }
        shared.wait_for_work();
    }
    // A handler that called `shutdown()` left our own handle in place.
    let mut lifecycle = shared.lifecycle();
    let own = lifecycle
        .run_task
        .as_ref()
        .is_some_and(|handle| handle.thread().id() == thread::current().id());
    if own {
        lifecycle.run_task = None;
        lifecycle.phase = Phase::Stopped;
        tracing::info!("Context stopped");
    }
    drop(lifecycle);
    tracing::debug!("Context loop exited");
}

fn panic_payload_to_string(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Assembles a [`Context`].
pub struct ContextBuilder {
    settings: ContextSettings,
    configuration: Configuration,
    clock: Option<Arc<dyn Clock>>,
    catalog: ModuleCatalog,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            settings: ContextSettings::default(),
            configuration: Configuration::new(),
            clock: None,
            catalog: ModuleCatalog::new(),
        }
    }
}

impl ContextBuilder {
    /// Settings and module overrides taken from a loaded config file.
    pub fn from_config(config: &ArbiterConfig) -> Result<Self, ConfigError> {
        Ok(Self::default()
            .settings(config.context)
            .configuration(config.configuration()?))
    }

    #[must_use]
    pub fn settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn build(self) -> Context {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);
        Context {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::new(self.settings, self.configuration)),
                catalog: self.catalog,
                clock,
                tick_interval: self.settings.tick_interval(),
                lifecycle: Mutex::new(Lifecycle::default()),
                pending: Mutex::new(false),
                wake: Condvar::new(),
                stop: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }
}

/// Handle to a behaviour-arbitration context. Clones share the same context.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        ContextBuilder::default().build()
    }

    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the background loop and emit `:startup`.
    pub fn run(&self) -> Result<(), ContextError> {
        let mut lifecycle = self.shared.lifecycle();
        if matches!(lifecycle.phase, Phase::Running | Phase::ShuttingDown) {
            tracing::warn!("Attempt to start context twice!");
            return Err(ContextError::AlreadyRunning);
        }
        self.shared.stop.store(false, Ordering::Release);
        self.shared.shutting_down.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("arbiter-context".to_string())
            .spawn(move || run_loop(&shared))
            .map_err(ContextError::Spawn)?;
        lifecycle.phase = Phase::Running;
        lifecycle.run_task = Some(handle);
        self.shared.emit(Signal::startup(), None, false);
        drop(lifecycle);

        tracing::info!("Context started");
        Ok(())
    }

    /// Emit `:shutdown`, stop the loop and wait for it. A no-op unless running.
    ///
    /// Called from a handler, the loop thread cannot join itself: the call
    /// returns once the stop is requested and the loop finishes the
    /// transition to [`Phase::Stopped`] on its way out.
    pub fn shutdown(&self) -> Result<(), ContextError> {
        let (on_loop, handle) = {
            let mut lifecycle = self.shared.lifecycle();
            if lifecycle.phase != Phase::Running {
                tracing::warn!(phase = ?lifecycle.phase, "Attempt to shut down a context that is not running");
                return Err(ContextError::NotRunning);
            }
            lifecycle.phase = Phase::ShuttingDown;
            let on_loop = lifecycle
                .run_task
                .as_ref()
                .is_some_and(|handle| handle.thread().id() == thread::current().id());
            let handle = if on_loop { None } else { lifecycle.run_task.take() };
            (on_loop, handle)
        };
        self.shared.shutting_down.store(true, Ordering::Release);
        tracing::info!("Context shutting down");

        self.shared.emit(Signal::shutdown(), None, false);
        self.shared.stop.store(true, Ordering::Release);
        self.shared.notify();
        if on_loop {
            return Ok(());
        }
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!("Context loop panicked");
        }

        self.shared.lifecycle().phase = Phase::Stopped;
        tracing::info!("Context stopped");
        Ok(())
    }

    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.shared.shutting_down()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.lifecycle().phase
    }

    /// Run one scheduling pass on the calling thread.
    pub fn tick(&self) -> TickReport {
        self.shared.tick()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a module by name from the catalog, dependencies first.
    /// Adding an already registered module re-runs its registration.
    pub fn add_module(&self, name: &str) -> Result<(), ContextError> {
        self.add_module_inner(name, &mut Vec::new())
    }

    fn add_module_inner(&self, name: &str, loading: &mut Vec<String>) -> Result<(), ContextError> {
        let known = self.shared.lock().module(name).cloned();
        if let Some(module) = known {
            self.register_members(&module);
            return Ok(());
        }
        let Some(module) = self.shared.catalog.load(name) else {
            tracing::warn!(module = name, "Attempt to add unknown module");
            return Err(ContextError::UnknownModule {
                name: name.to_string(),
            });
        };
        loading.push(name.to_string());
        for dependency in module.dependencies() {
            if loading.contains(dependency) || self.shared.lock().has_module(dependency) {
                continue;
            }
            self.add_module_inner(dependency, loading)?;
        }
        loading.pop();
        self.register_module(module);
        Ok(())
    }

    /// Register an explicit module declaration.
    pub fn register_module(&self, module: Module) {
        self.shared.lock().insert_module(module.clone());
        self.register_members(&module);
    }

    fn register_members(&self, module: &Module) {
        for property in module.properties() {
            if let Err(err) = self.add_prop(property.clone()) {
                tracing::warn!(module = module.name(), error = %err, "Failed to add property");
            }
        }
        for state in module.states() {
            if let Err(err) = self.add_state(state.clone()) {
                tracing::warn!(module = module.name(), error = %err, "Failed to add state");
            }
        }
        tracing::info!(
            module = module.name(),
            properties = module.properties().len(),
            states = module.states().len(),
            "Registered module"
        );
    }

    pub fn add_prop(&self, property: Property) -> Result<(), ContextError> {
        self.shared.lock().add_prop(property).map(|_| ())
    }

    /// Remove a property and every state that reads or writes it.
    pub fn rm_prop(&self, property: &QualifiedName) -> Result<Removal, ContextError> {
        self.shared.lock().rm_prop(property)
    }

    pub fn add_state(&self, state: State) -> Result<StateId, ContextError> {
        let name = state.id();
        self.shared.lock().add_state(state).inspect_err(|err| {
            tracing::warn!(state = %name, error = %err, "Rejected state");
        })
    }

    pub fn rm_state(&self, state: &QualifiedName) -> Result<Removal, ContextError> {
        self.shared.lock().rm_state(state)
    }

    // ------------------------------------------------------------------
    // Spikes
    // ------------------------------------------------------------------

    /// Emit a spike on `signal`. With `wipe`, live spikes on that signal
    /// (and everything they adopted) are removed first.
    pub fn emit(&self, signal: Signal, payload: Option<Value>, wipe: bool) -> SpikeId {
        self.shared.emit(signal, payload, wipe)
    }

    pub fn adopt(&self, parent: SpikeId, child: SpikeId) -> Result<(), ContextError> {
        self.shared.lock().adopt(parent, child)
    }

    /// Remove one spike and its adopted descendants. Returns how many went.
    pub fn wipe(&self, spike: SpikeId) -> usize {
        self.shared.lock().wipe(spike)
    }

    #[must_use]
    pub fn spike_count(&self) -> usize {
        self.shared.lock().spike_count()
    }

    #[must_use]
    pub fn live_spikes(&self) -> Vec<Spike> {
        self.shared.lock().live_spikes()
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn get(&self, property: &QualifiedName) -> Result<Value, ContextError> {
        self.shared.lock().read_property(property)
    }

    /// Child values pushed onto a property, oldest first.
    pub fn children(&self, property: &QualifiedName) -> Result<Vec<Value>, ContextError> {
        self.shared.lock().property_children(property)
    }

    /// Write a property. Returns whether a `changed` spike was emitted.
    pub fn set(&self, property: &QualifiedName, value: impl Into<Value>) -> Result<bool, ContextError> {
        let changed = self
            .shared
            .lock()
            .write_property(property, value.into(), self.shared.now())?;
        self.shared.notify();
        Ok(changed)
    }

    pub fn push(&self, property: &QualifiedName, child: impl Into<Value>) -> Result<(), ContextError> {
        self.shared
            .lock()
            .push_property(property, child.into(), self.shared.now())?;
        self.shared.notify();
        Ok(())
    }

    pub fn pop(&self, property: &QualifiedName) -> Result<Value, ContextError> {
        let popped = self.shared.lock().pop_property(property, self.shared.now())?;
        self.shared.notify();
        Ok(popped)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn has_module(&self, name: &str) -> bool {
        self.shared.lock().has_module(name)
    }

    #[must_use]
    pub fn modules(&self) -> Vec<String> {
        self.shared.lock().module_names()
    }

    #[must_use]
    pub fn has_property(&self, property: &QualifiedName) -> bool {
        self.shared.lock().has_property(property)
    }

    #[must_use]
    pub fn has_state(&self, state: &QualifiedName) -> bool {
        self.shared.lock().has_state(state)
    }

    #[must_use]
    pub fn config(&self, module: &str, key: &str) -> Option<Value> {
        self.shared.lock().config_value(module, key)
    }

    /// `1 / k` where `k` states reference `signal`, or 0 if none do.
    #[must_use]
    pub fn signal_specificity(&self, signal: &Signal) -> f64 {
        self.shared.lock().signal_specificity(signal)
    }

    #[must_use]
    pub fn states_for_signal(&self, signal: &Signal) -> Vec<QualifiedName> {
        self.shared.lock().states_for_signal(signal)
    }

    /// States that can emit `signal`.
    #[must_use]
    pub fn signal_causes(&self, signal: &Signal) -> Vec<QualifiedName> {
        self.shared.lock().signal_causes(signal)
    }

    /// Original and completed branches of a state's constraint.
    pub fn conjunctions(&self, state: &QualifiedName) -> Result<Vec<Conjunction>, ContextError> {
        self.shared.lock().conjunctions(state)
    }

    pub fn activations(&self, state: &QualifiedName) -> Result<Vec<ActivationInfo>, ContextError> {
        self.shared.lock().activations_of(state)
    }

    #[must_use]
    pub fn state_count(&self) -> usize {
        self.shared.lock().state_count()
    }

    #[must_use]
    pub fn property_count(&self) -> usize {
        self.shared.lock().property_count()
    }

    #[must_use]
    pub fn activation_count(&self) -> usize {
        self.shared.lock().activation_count()
    }

    #[must_use]
    pub fn causality_edges(&self) -> usize {
        self.shared.lock().causality_edge_count()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("phase", &self.phase())
            .field("catalog", &self.shared.catalog)
            .finish_non_exhaustive()
    }
}
