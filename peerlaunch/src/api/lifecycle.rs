//! Startup and teardown orchestration.
//!
//! [`ApplicationLifecycle`] owns the session: the instance guard, the
//! listening peer (primary only) and the main window handle once one exists.
//! It moves through a fixed sequence of [`LifecycleState`]s and rejects calls
//! made out of order.

use futures::{FutureExt, select};
use log::{debug, error, info, warn};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::pin;
use tokio::sync::mpsc;

use crate::Result;
use crate::api::command::Command;
use crate::api::models::{Delivery, LaunchConfig, LaunchError, WindowHandle};
use crate::core::guard::{GuardHandle, GuardProvider};
use crate::core::peer_client::PeerClient;
use crate::core::peer_server::{PeerEvent, PeerServer};
use crate::core::router::{CollaboratorSink, CommandRouter};
use crate::platform;

/// Where the lifecycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing held yet.
    Starting,
    /// The guard has been resolved.
    GuardAcquired,
    /// This process is the primary. The listener is bound if one could be.
    PrimaryListening,
    /// Another process is primary; this one forwarded its invocation.
    SecondaryForwarding,
    /// Routing inbound events until shutdown is requested.
    Running,
    ShuttingDown,
    Terminated,
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::GuardAcquired => "guard acquired",
            Self::PrimaryListening => "primary listening",
            Self::SecondaryForwarding => "secondary forwarding",
            Self::Running => "running",
            Self::ShuttingDown => "shutting down",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Outcome of [`ApplicationLifecycle::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This process is the primary. `listening` is false when it runs
    /// degraded, without a bound channel.
    Primary { listening: bool },
    /// Another process is primary; the invocation was handed to it.
    Secondary(Delivery),
}

/// Host-side teardown steps, run in order by
/// [`ApplicationLifecycle::shutdown`].
pub trait Teardown {
    /// Destroy every window-owning collaborator.
    fn close_windows(&mut self);
    /// Release caches and subsystems.
    fn release_subsystems(&mut self);
}

/// Hands the main window to a lifecycle that is already inside
/// [`ApplicationLifecycle::run_until`].
///
/// Handles sent before the loop starts are applied when it does.
#[derive(Debug, Clone)]
pub struct WindowRegistrar {
    tx: mpsc::UnboundedSender<WindowHandle>,
}

impl WindowRegistrar {
    /// Returns false once the lifecycle has been dropped.
    pub fn register(&self, handle: WindowHandle) -> bool {
        self.tx.send(handle).is_ok()
    }
}

enum Wake {
    Peer(Option<PeerEvent>),
    Window(Option<WindowHandle>),
    Shutdown,
}

/// Drives a process from launch to exit.
#[derive(Debug)]
pub struct ApplicationLifecycle {
    config: LaunchConfig,
    sink: CollaboratorSink,
    provider: Box<dyn GuardProvider>,
    state: LifecycleState,
    guard: Option<GuardHandle>,
    server: Option<PeerServer>,
    window: Option<WindowHandle>,
    registrar: WindowRegistrar,
    registrations: mpsc::UnboundedReceiver<WindowHandle>,
}

impl ApplicationLifecycle {
    /// Creates a lifecycle using the platform guard in `config.runtime_dir`.
    pub fn new(config: LaunchConfig, sink: CollaboratorSink) -> Self {
        let provider = platform::default_provider(&config.runtime_dir);
        let (tx, registrations) = mpsc::unbounded_channel();
        Self {
            config,
            sink,
            provider,
            state: LifecycleState::Starting,
            guard: None,
            server: None,
            window: None,
            registrar: WindowRegistrar { tx },
            registrations,
        }
    }

    /// Replaces the guard provider.
    #[must_use]
    pub fn with_guard_provider(mut self, provider: Box<dyn GuardProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn main_window(&self) -> Option<WindowHandle> {
        self.window
    }

    /// A handle for registering the main window while [`Self::run_until`]
    /// owns the lifecycle.
    pub fn window_registrar(&self) -> WindowRegistrar {
        self.registrar.clone()
    }

    /// Whether the local channel is bound.
    pub fn is_listening(&self) -> bool {
        self.server.is_some()
    }

    /// Resolves the guard and takes on a role.
    ///
    /// As primary, binds the channel and dispatches `command` locally. As
    /// secondary, forwards `command` (or an activation request when `None`)
    /// to the primary. A secondary that cannot reach the primary re-checks
    /// the guard and becomes primary itself.
    ///
    /// # Errors
    ///
    /// [`LaunchError::Guard`] when the guard cannot be created at all,
    /// [`LaunchError::Ipc`] when the primary was reached but the exchange
    /// failed.
    pub async fn start(&mut self, command: Option<&str>) -> Result<Role> {
        self.expect_state("start", &[LifecycleState::Starting])?;

        let guard = self.acquire_guard()?;
        self.state = LifecycleState::GuardAcquired;

        if guard.is_first() {
            return Ok(self.become_primary(guard, command, true));
        }

        self.state = LifecycleState::SecondaryForwarding;
        let client = PeerClient::from_config(&self.config);
        match client.connect_and_send(command).await {
            Ok(Delivery::Unreachable) => self.fall_back(guard, command),
            Ok(delivery) => {
                info!("Handed off to the primary instance ({delivery:?})");
                self.guard = Some(guard);
                Ok(Role::Secondary(delivery))
            }
            Err(e) => {
                self.guard = Some(guard);
                Err(e.into())
            }
        }
    }

    /// Records the main window and releases any raise queued before it existed.
    ///
    /// Only valid before the event loop starts. Once [`Self::run_until`] is
    /// running, use a [`WindowRegistrar`].
    pub fn register_window(&mut self, handle: WindowHandle) -> Result<()> {
        self.expect_state("register_window", &[LifecycleState::PrimaryListening])?;
        self.attach_window(handle);
        Ok(())
    }

    /// Routes inbound peer events and window registrations until `shutdown`
    /// resolves.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.expect_state("run_until", &[LifecycleState::PrimaryListening])?;
        self.state = LifecycleState::Running;

        let mut shutdown = pin!(shutdown.fuse());
        loop {
            let wake = match self.server.as_mut() {
                Some(server) => select! {
                    event = server.next_event().fuse() => Wake::Peer(event),
                    handle = self.registrations.recv().fuse() => Wake::Window(handle),
                    () = shutdown => Wake::Shutdown,
                },
                None => select! {
                    handle = self.registrations.recv().fuse() => Wake::Window(handle),
                    () = shutdown => Wake::Shutdown,
                },
            };

            match wake {
                Wake::Peer(Some(event)) => self.handle_event(event),
                Wake::Peer(None) => {
                    warn!("Local channel closed; no longer accepting secondaries");
                    self.server = None;
                }
                Wake::Window(Some(handle)) => self.attach_window(handle),
                // The lifecycle keeps a sender, so the channel never closes.
                Wake::Window(None) => {}
                Wake::Shutdown => break,
            }
        }

        debug!("Shutdown requested");
        Ok(())
    }

    /// Tears the session down in order: stop listening, close windows,
    /// release subsystems, then hand the guard back.
    ///
    /// Keep the returned guard alive until the process exits.
    pub async fn shutdown(&mut self, host: &mut impl Teardown) -> Result<GuardHandle> {
        self.expect_state(
            "shutdown",
            &[
                LifecycleState::PrimaryListening,
                LifecycleState::SecondaryForwarding,
                LifecycleState::Running,
            ],
        )?;
        self.state = LifecycleState::ShuttingDown;

        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }
        host.close_windows();
        host.release_subsystems();
        self.window = None;

        let state = self.state;
        let guard = self.guard.take().ok_or(LaunchError::InvalidState {
            operation: "shutdown",
            state,
        })?;
        self.state = LifecycleState::Terminated;
        info!("Shutdown complete");
        Ok(guard)
    }

    fn expect_state(&self, operation: &'static str, allowed: &[LifecycleState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LaunchError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn acquire_guard(&mut self) -> Result<GuardHandle> {
        match self.provider.acquire(&self.config.variant) {
            Ok(guard) => Ok(guard),
            Err(e) if e.is_fatal() => {
                error!("Cannot create instance guard: {e}");
                self.state = LifecycleState::Terminated;
                Err(e.into())
            }
            Err(e) => {
                warn!("{e}; assuming this is the first instance");
                Ok(GuardHandle::unguarded())
            }
        }
    }

    fn become_primary(&mut self, guard: GuardHandle, command: Option<&str>, listen: bool) -> Role {
        self.guard = Some(guard);

        if listen {
            match PeerServer::listen(self.config.channel(), self.config.server_read_timeout) {
                Ok(server) => self.server = Some(server),
                Err(e) => error!("Running without a local channel: {e}"),
            }
        }
        self.state = LifecycleState::PrimaryListening;
        info!(
            "Primary instance for variant {} ({})",
            self.config.variant,
            if self.server.is_some() {
                "listening"
            } else {
                "not listening"
            }
        );

        if let Some(raw) = command {
            CommandRouter::route(raw, &self.sink);
        }

        Role::Primary {
            listening: self.server.is_some(),
        }
    }

    /// The guard said another primary exists, yet nobody answered.
    fn fall_back(&mut self, stale: GuardHandle, command: Option<&str>) -> Result<Role> {
        drop(stale);
        let guard = self.acquire_guard()?;

        if guard.is_first() {
            info!("Previous primary is gone; taking over");
            Ok(self.become_primary(guard, command, true))
        } else {
            warn!("Primary holds the guard but is unreachable; running degraded");
            Ok(self.become_primary(guard, command, false))
        }
    }

    fn attach_window(&mut self, handle: WindowHandle) {
        debug!("Main window registered as {handle}");
        self.window = Some(handle);
        if let Some(server) = self.server.as_mut() {
            server.set_main_window(handle);
        }
    }

    fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Command(raw) => {
                CommandRouter::route(&raw, &self.sink);
            }
            PeerEvent::Raise(handle) => {
                debug!("Raising main window {handle}");
                CommandRouter::dispatch(Command::ActivateOnly, &self.sink);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{GuardError, Variant};
    use crate::core::guard::InstanceGuard;

    #[derive(Debug)]
    struct Fixed(bool);

    impl InstanceGuard for Fixed {
        fn is_first(&self) -> bool {
            self.0
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl GuardProvider for Broken {
        fn acquire(&self, _: &Variant) -> std::result::Result<GuardHandle, GuardError> {
            Err(GuardError::Create {
                path: "/nowhere/peerlaunch-main.lock".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }
    }

    #[derive(Debug)]
    struct Flaky;

    impl GuardProvider for Flaky {
        fn acquire(&self, _: &Variant) -> std::result::Result<GuardHandle, GuardError> {
            Err(GuardError::Unavailable(std::io::Error::other("no locks here")))
        }
    }

    #[derive(Debug)]
    struct Always(bool);

    impl GuardProvider for Always {
        fn acquire(&self, _: &Variant) -> std::result::Result<GuardHandle, GuardError> {
            Ok(GuardHandle::new(Fixed(self.0)))
        }
    }

    fn lifecycle(dir: &std::path::Path, provider: Box<dyn GuardProvider>) -> ApplicationLifecycle {
        let config = LaunchConfig::new(Variant::main()).with_runtime_dir(dir);
        ApplicationLifecycle::new(config, CollaboratorSink::new()).with_guard_provider(provider)
    }

    #[test]
    fn state_display() {
        assert_eq!(LifecycleState::PrimaryListening.to_string(), "primary listening");
        let err = LaunchError::InvalidState {
            operation: "run_until",
            state: LifecycleState::Starting,
        };
        assert_eq!(err.to_string(), "`run_until` is not allowed while starting");
    }

    #[test]
    fn window_before_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = lifecycle(dir.path(), Box::new(Always(true)));

        assert!(matches!(
            lc.register_window(WindowHandle::new(1)),
            Err(LaunchError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn registrar_applies_window_once_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = lifecycle(dir.path(), Box::new(Always(true)));
        lc.start(None).await.unwrap();

        let registrar = lc.window_registrar();
        assert!(registrar.register(WindowHandle::new(5)));
        assert_eq!(lc.main_window(), None);

        lc.run_until(tokio::task::yield_now()).await.unwrap();
        assert_eq!(lc.main_window(), Some(WindowHandle::new(5)));
        assert!(matches!(
            lc.register_window(WindowHandle::new(6)),
            Err(LaunchError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn fatal_guard_failure_aborts_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = lifecycle(dir.path(), Box::new(Broken));

        assert!(matches!(lc.start(None).await, Err(LaunchError::Guard(_))));
        assert_eq!(lc.state(), LifecycleState::Terminated);
    }

    #[tokio::test]
    async fn recoverable_guard_failure_assumes_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = lifecycle(dir.path(), Box::new(Flaky));

        assert!(matches!(
            lc.start(None).await.unwrap(),
            Role::Primary { .. }
        ));
        assert_eq!(lc.state(), LifecycleState::PrimaryListening);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut lc = lifecycle(dir.path(), Box::new(Always(true)));

        lc.start(None).await.unwrap();
        assert!(matches!(
            lc.start(None).await,
            Err(LaunchError::InvalidState {
                operation: "start",
                ..
            })
        ));
    }
}
