//! The lifecycle orchestrator - enters units, runs the command, unwinds.

use crate::command::{start_body, Command};
use crate::error::{ResolveError, RunError, TeardownFailure};
use crate::mode::ExecutionModel;
use crate::notifier::{Notifier, NotifierSet};
use crate::plan::{PlanRequest, ResolvedPlan};
use crate::registry::UnitRegistry;
use crate::shutdown::{wait_for_shutdown_signal, TerminationGuard};
use ignite_core::{BoxFuture, Config, Phase, SetupError, Signal, UnitDescriptor, UnitMode, UnitName};
use std::future::{poll_fn, Future};
use std::marker::PhantomData;
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use tracing::{debug, info, info_span, warn, Instrument};

/// How an invocation ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The command body ran and every unit was torn down.
    Completed,
    /// A unit asked to stop initialization; the body never ran.
    Stopped {
        /// Unit that asked to stop
        unit: UnitName,
    },
}

/// How [`Orchestrator::drive`] ended when it did not fail.
#[derive(Debug)]
enum Finished<T> {
    Completed(T),
    Stopped(UnitName),
}

impl<T> Finished<T> {
    fn into_option(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Stopped(_) => None,
        }
    }
}

impl From<Finished<()>> for Outcome {
    fn from(finished: Finished<()>) -> Self {
        match finished {
            Finished::Completed(()) => Self::Completed,
            Finished::Stopped(unit) => Self::Stopped { unit },
        }
    }
}

/// States of one invocation.
///
/// ```text
/// Idle → Entering → SignalingReady → Running → SignalingStopping → Exiting → Done
///           ├────────→ UnwindingOnFailure ───────────────────────────────────┤
///           └────────→ Exiting (shutdown requested) ─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Idle,
    Entering,
    SignalingReady,
    Running,
    SignalingStopping,
    Exiting,
    UnwindingOnFailure,
    Done,
}

/// How the command body ended.
enum BodyOutcome<T> {
    Returned(anyhow::Result<T>),
    Interrupted,
}

/// The code run between `ready` and `stopping`.
trait Body {
    type Output;

    fn start<'a>(self, config: &'a mut Config) -> Phase<'a, anyhow::Result<Self::Output>>
    where
        Self: 'a;
}

/// The body of a registered command.
struct CommandBody<'p>(&'p dyn Command);

impl Body for CommandBody<'_> {
    type Output = ();

    fn start<'a>(self, config: &'a mut Config) -> Phase<'a, anyhow::Result<()>>
    where
        Self: 'a,
    {
        start_body(self.0, config)
    }
}

/// Caller code of [`Orchestrator::scope`].
struct ScopeFn<F, T>(F, PhantomData<fn() -> T>);

impl<F, T> Body for ScopeFn<F, T>
where
    F: FnOnce(&mut Config) -> anyhow::Result<T>,
{
    type Output = T;

    fn start<'a>(self, config: &'a mut Config) -> Phase<'a, anyhow::Result<T>>
    where
        Self: 'a,
    {
        Phase::Ready((self.0)(config))
    }
}

/// Caller code of [`Orchestrator::scope_async`].
struct AsyncScopeFn<F, T>(F, PhantomData<fn() -> T>);

impl<F, T> Body for AsyncScopeFn<F, T>
where
    F: for<'c> FnOnce(&'c mut Config) -> BoxFuture<'c, anyhow::Result<T>>,
{
    type Output = T;

    fn start<'a>(self, config: &'a mut Config) -> Phase<'a, anyhow::Result<T>>
    where
        Self: 'a,
    {
        Phase::Suspended((self.0)(config))
    }
}

/// A shutdown future that can be checked without waiting for it.
struct ShutdownWatch<F> {
    future: Pin<Box<F>>,
    fired: bool,
}

impl<F: Future<Output = ()>> ShutdownWatch<F> {
    fn new(future: F) -> Self {
        Self {
            future: Box::pin(future),
            fired: false,
        }
    }

    /// Whether shutdown was requested by now.
    async fn requested(&mut self) -> bool {
        if !self.fired {
            let mut future = self.future.as_mut();
            self.fired = poll_fn(|cx| Poll::Ready(future.as_mut().poll(cx).is_ready())).await;
        }
        self.fired
    }

    /// Wait until shutdown is requested.
    async fn wait(&mut self) {
        if !self.fired {
            self.future.as_mut().await;
            self.fired = true;
        }
    }
}

/// Runtime state of one invocation, owned by the orchestrator.
struct ExecutionContext<'c> {
    /// Units whose setup succeeded, in entry order
    entered: Vec<Arc<UnitDescriptor>>,
    config: &'c mut Config,
    state: LifecycleState,
}

impl<'c> ExecutionContext<'c> {
    fn new(config: &'c mut Config) -> Self {
        Self {
            entered: Vec::new(),
            config,
            state: LifecycleState::Idle,
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        debug!(from = ?self.state, to = ?next, "Lifecycle transition");
        self.state = next;
    }

    /// Tear down every entered unit, last entered first.
    ///
    /// A failing teardown is recorded and the next one still runs.
    async fn unwind(&mut self) -> Vec<TeardownFailure> {
        let mut failures = Vec::new();
        while let Some(unit) = self.entered.pop() {
            debug!(unit = %unit.name, "Tearing down unit");
            if let Err(error) = unit.behavior.teardown(self.config).finish().await {
                warn!(unit = %unit.name, "Teardown failed: {:#}", error);
                failures.push(TeardownFailure {
                    unit: unit.name.clone(),
                    error,
                });
            }
        }
        failures
    }

    /// Give up entering after a shutdown request.
    async fn abandon(&mut self, command: &str) -> RunError {
        info!("Shutdown requested, abandoning setup");
        self.transition(LifecycleState::Exiting);
        let teardown = self.unwind().await;
        self.transition(LifecycleState::Done);

        RunError::Interrupted {
            command: command.to_string(),
            teardown,
        }
    }
}

/// Waker for futures that are known never to suspend.
struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

/// Completes when the process is asked to terminate.
async fn termination_signal() {
    if let Err(e) = wait_for_shutdown_signal().await {
        warn!("Cannot listen for shutdown signals: {}", e);
        std::future::pending::<()>().await;
    }
}

/// The lifecycle orchestrator.
///
/// Runs one invocation per call:
/// ```text
/// Enter units → ready → Run body → stopping → Exit units (reverse)
/// ```
///
/// Every entry point consumes its plan; plans are never reused.
#[derive(Debug)]
pub struct Orchestrator {
    registry: Arc<UnitRegistry>,
    notifiers: NotifierSet,
}

impl Orchestrator {
    /// Create an orchestrator over `registry`.
    pub fn new(registry: impl Into<Arc<UnitRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            notifiers: NotifierSet::new(),
        }
    }

    /// Add a notifier.
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Get the unit registry.
    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Resolve a fresh plan for `command`.
    pub fn plan(
        &self,
        command: Arc<dyn Command>,
        request: &PlanRequest,
    ) -> Result<ResolvedPlan, ResolveError> {
        ResolvedPlan::resolve(&self.registry, command, request)
    }

    /// Resolve a fresh plan for [`scope`](Self::scope) or
    /// [`scope_async`](Self::scope_async).
    pub fn plan_scope(&self, request: &PlanRequest, mode: UnitMode) -> Result<ResolvedPlan, ResolveError> {
        ResolvedPlan::resolve_scope(&self.registry, request, mode)
    }

    /// Run a synchronous plan to completion on the current thread.
    ///
    /// A termination request cannot cut a synchronous body short. It is
    /// recorded, no further unit is set up, and once the body returns the
    /// invocation goes through `stopping` and teardown and ends with
    /// [`RunError::Interrupted`].
    pub fn run_blocking(&self, plan: ResolvedPlan, config: &mut Config) -> Result<Outcome, RunError> {
        self.run_guarded(&plan, config, CommandBody(plan.command().as_ref()))
            .map(Outcome::from)
    }

    /// Run a plan under the cooperative model until it ends or the process
    /// is asked to terminate.
    pub async fn run(&self, plan: ResolvedPlan, config: &mut Config) -> Result<Outcome, RunError> {
        self.run_until(plan, config, termination_signal()).await
    }

    /// Run a plan under the cooperative model until it ends or `shutdown`
    /// completes.
    ///
    /// Shutdown stops entering further units and interrupts an asynchronous
    /// command body. Entered units are always torn down before this returns.
    pub async fn run_until<F>(
        &self,
        plan: ResolvedPlan,
        config: &mut Config,
        shutdown: F,
    ) -> Result<Outcome, RunError>
    where
        F: Future<Output = ()>,
    {
        let span = info_span!("invocation", id = %plan.id(), command = plan.command().name());
        self.drive(&plan, config, CommandBody(plan.command().as_ref()), shutdown)
            .instrument(span)
            .await
            .map(Outcome::from)
    }

    /// Enter the units of `plan`, run `f` and exit them again.
    ///
    /// Returns `None` when a unit stopped initialization and `f` never ran.
    /// Termination requests are handled as in
    /// [`run_blocking`](Self::run_blocking).
    ///
    /// ```ignore
    /// let plan = orchestrator.plan_scope(&PlanRequest::new().target("db"), UnitMode::Synchronous)?;
    /// let rows = orchestrator.scope(plan, &mut config, |config| count_rows(config))?;
    /// ```
    pub fn scope<T, F>(&self, plan: ResolvedPlan, config: &mut Config, f: F) -> Result<Option<T>, RunError>
    where
        F: FnOnce(&mut Config) -> anyhow::Result<T>,
    {
        self.run_guarded(&plan, config, ScopeFn(f, PhantomData))
            .map(Finished::into_option)
    }

    /// Enter the units of `plan`, run the future built by `f` and exit
    /// them again, under the cooperative model.
    ///
    /// The future is interrupted when the process is asked to terminate.
    pub async fn scope_async<T, F>(
        &self,
        plan: ResolvedPlan,
        config: &mut Config,
        f: F,
    ) -> Result<Option<T>, RunError>
    where
        F: for<'c> FnOnce(&'c mut Config) -> BoxFuture<'c, anyhow::Result<T>>,
    {
        let span = info_span!("invocation", id = %plan.id(), command = plan.command().name());
        self.drive(&plan, config, AsyncScopeFn(f, PhantomData), termination_signal())
            .instrument(span)
            .await
            .map(Finished::into_option)
    }

    /// Run synchronously with a [`TerminationGuard`] installed for the
    /// whole invocation.
    fn run_guarded<B: Body>(
        &self,
        plan: &ResolvedPlan,
        config: &mut Config,
        body: B,
    ) -> Result<Finished<B::Output>, RunError> {
        if plan.model() != ExecutionModel::Synchronous {
            return Err(RunError::RequiresCooperative {
                command: plan.command().name().to_string(),
            });
        }

        let guard = match TerminationGuard::install() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("Cannot listen for termination signals: {}", e);
                None
            }
        };
        let unguarded = AtomicBool::new(false);
        let requested = guard.as_ref().map_or(&unguarded, TerminationGuard::flag);

        self.run_synchronously(plan, config, body, requested)
    }

    /// Drive a synchronous plan, treating `requested` as the shutdown
    /// request.
    fn run_synchronously<B: Body>(
        &self,
        plan: &ResolvedPlan,
        config: &mut Config,
        body: B,
        requested: &AtomicBool,
    ) -> Result<Finished<B::Output>, RunError> {
        let span = info_span!("invocation", id = %plan.id(), command = plan.command().name());
        let _enter = span.enter();

        let shutdown = poll_fn(|_| {
            if requested.load(Ordering::SeqCst) {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        });

        // Every phase of a synchronous plan is `Phase::Ready` and shutdown is
        // only ever checked, never awaited, so a single poll drives the
        // invocation to the end.
        let mut invocation = pin!(self.drive(plan, config, body, shutdown));
        let waker = Waker::from(Arc::new(NoopWake));
        match invocation.as_mut().poll(&mut Context::from_waker(&waker)) {
            Poll::Ready(result) => result,
            Poll::Pending => unreachable!("synchronous plan suspended"),
        }
    }

    /// The state machine, written once for both models.
    async fn drive<B, F>(
        &self,
        plan: &ResolvedPlan,
        config: &mut Config,
        body: B,
        shutdown: F,
    ) -> Result<Finished<B::Output>, RunError>
    where
        B: Body,
        F: Future<Output = ()>,
    {
        let command = plan.command().as_ref();
        if plan.requires_multi_worker() {
            info!(units = ?plan.multi_worker_units(), "Plan requests multi-worker execution");
        }

        let mut shutdown = ShutdownWatch::new(shutdown);
        let mut cx = ExecutionContext::new(config);

        // 1. Enter
        cx.transition(LifecycleState::Entering);
        for step in plan.steps() {
            let unit = &step.unit;
            if step.disabled {
                debug!(unit = %unit.name, "Skipping disabled unit");
                continue;
            }
            if shutdown.requested().await {
                return Err(cx.abandon(command.name()).await);
            }

            debug!(unit = %unit.name, "Setting up unit");
            match unit.behavior.setup(cx.config).finish().await {
                Ok(()) => cx.entered.push(Arc::clone(unit)),
                Err(SetupError::Stop) => {
                    info!(unit = %unit.name, "Initialization stopped");
                    cx.transition(LifecycleState::Exiting);
                    let teardown = cx.unwind().await;
                    cx.transition(LifecycleState::Done);

                    return if teardown.is_empty() {
                        Ok(Finished::Stopped(unit.name.clone()))
                    } else {
                        Err(RunError::Teardown { teardown })
                    };
                }
                Err(SetupError::Failed(source)) => {
                    warn!(unit = %unit.name, "Setup failed: {:#}", source);
                    cx.transition(LifecycleState::UnwindingOnFailure);
                    let teardown = cx.unwind().await;
                    cx.transition(LifecycleState::Done);

                    return Err(RunError::Setup {
                        unit: unit.name.clone(),
                        source,
                        teardown,
                    });
                }
            }
        }
        if shutdown.requested().await {
            return Err(cx.abandon(command.name()).await);
        }

        // 2. Ready
        if command.emits_signals() {
            cx.transition(LifecycleState::SignalingReady);
            self.notifiers.dispatch(Signal::Ready, cx.config);
        }

        // 3. Run
        cx.transition(LifecycleState::Running);
        let outcome = match body.start(cx.config) {
            Phase::Ready(result) => {
                if shutdown.requested().await {
                    if let Err(e) = &result {
                        warn!("Command failed after shutdown was requested: {:#}", e);
                    }
                    info!("Shutdown requested while the command ran");
                    BodyOutcome::Interrupted
                } else {
                    BodyOutcome::Returned(result)
                }
            }
            Phase::Suspended(future) => {
                tokio::select! {
                    result = future => BodyOutcome::Returned(result),
                    () = shutdown.wait() => {
                        info!("Shutdown requested, interrupting command");
                        BodyOutcome::Interrupted
                    }
                }
            }
        };

        // 4. Stopping
        if command.emits_signals() {
            cx.transition(LifecycleState::SignalingStopping);
            self.notifiers.dispatch(Signal::Stopping, cx.config);
        }

        // 5. Exit
        cx.transition(LifecycleState::Exiting);
        let teardown = cx.unwind().await;
        cx.transition(LifecycleState::Done);

        let name = command.name().to_string();
        match outcome {
            BodyOutcome::Returned(Ok(value)) if teardown.is_empty() => {
                info!("Invocation completed");
                Ok(Finished::Completed(value))
            }
            BodyOutcome::Returned(Ok(_)) => Err(RunError::Teardown { teardown }),
            BodyOutcome::Returned(Err(source)) => Err(RunError::Command {
                command: name,
                source,
                teardown,
            }),
            BodyOutcome::Interrupted => Err(RunError::Interrupted {
                command: name,
                teardown,
            }),
        }
    }
}
