//! End-to-end lifecycle tests inside one process.
//!
//! A "primary" and a "secondary" lifecycle share a temporary runtime
//! directory. Each opens the lock file separately, so they contend exactly
//! as two processes would.

#![cfg(unix)]

use peerlaunch::{
    ApplicationLifecycle, CollaboratorSink, Command, Delivery, GuardError, GuardHandle,
    GuardProvider, InstanceGuard, LaunchConfig, LifecycleState, Role, Teardown,
    UnguardedProvider, Variant, WindowHandle,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

fn config(dir: &Path) -> LaunchConfig {
    LaunchConfig::new(Variant::main())
        .with_runtime_dir(dir)
        .with_connect_timeout(Duration::from_millis(300))
        .with_response_timeout(Duration::from_millis(300))
}

#[derive(Debug)]
struct Fixed(bool);

impl InstanceGuard for Fixed {
    fn is_first(&self) -> bool {
        self.0
    }
}

/// Answers from a script, one entry per acquisition.
#[derive(Debug)]
struct Scripted {
    answers: Vec<bool>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(answers: &[bool]) -> Box<Self> {
        Box::new(Self {
            answers: answers.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl GuardProvider for Scripted {
    fn acquire(&self, _: &Variant) -> Result<GuardHandle, GuardError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let first = self.answers.get(n).copied().unwrap_or(false);
        Ok(GuardHandle::new(Fixed(first)))
    }
}

#[derive(Debug, Default)]
struct Recorder {
    steps: Vec<String>,
    socket: Option<std::path::PathBuf>,
}

impl Teardown for Recorder {
    fn close_windows(&mut self) {
        let listening = self.socket.as_ref().is_some_and(|p| p.exists());
        self.steps
            .push(format!("close_windows (socket present: {listening})"));
    }

    fn release_subsystems(&mut self) {
        self.steps.push("release_subsystems".into());
    }
}

#[tokio::test]
async fn test_first_launch_is_listening_primary() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CollaboratorSink::new();
    let mut rx = sink.subscribe();
    let mut lifecycle = ApplicationLifecycle::new(config(dir.path()), sink);

    let role = lifecycle.start(Some("app://app/livechats-home")).await.unwrap();

    assert_eq!(role, Role::Primary { listening: true });
    assert_eq!(lifecycle.state(), LifecycleState::PrimaryListening);
    assert_eq!(
        rx.try_recv().unwrap(),
        Command::AppAction {
            action: Command::LIVECHATS_HOME.into()
        }
    );
}

#[tokio::test]
async fn test_second_launch_forwards_command() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CollaboratorSink::new();
    let mut rx = sink.subscribe();

    let mut primary = ApplicationLifecycle::new(config(dir.path()), sink);
    primary.start(None).await.unwrap();

    let mut secondary = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let run = primary.run_until(async {
        let _ = stop_rx.await;
    });
    let forward = async {
        let role = secondary.start(Some("app://profile/79991234567")).await.unwrap();
        let received = rx.recv().await.unwrap();
        let _ = stop_tx.send(());
        (role, received)
    };

    let (ran, (role, received)) = tokio::join!(run, forward);
    ran.unwrap();

    assert_eq!(role, Role::Secondary(Delivery::Forwarded));
    assert_eq!(secondary.state(), LifecycleState::SecondaryForwarding);
    assert_eq!(
        received,
        Command::OpenProfile {
            contact_id: "79991234567".into()
        }
    );
}

#[tokio::test]
async fn test_second_launch_without_command_activates() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CollaboratorSink::new();
    let mut rx = sink.subscribe();

    let mut primary = ApplicationLifecycle::new(config(dir.path()), sink);
    primary.start(None).await.unwrap();
    primary.register_window(WindowHandle::new(77)).unwrap();

    let mut secondary = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let run = primary.run_until(async {
        let _ = stop_rx.await;
    });
    let activate = async {
        let role = secondary.start(None).await.unwrap();
        let received = rx.recv().await.unwrap();
        let _ = stop_tx.send(());
        (role, received)
    };

    let (ran, (role, received)) = tokio::join!(run, activate);
    ran.unwrap();

    assert_eq!(role, Role::Secondary(Delivery::Activated(WindowHandle::new(77))));
    assert_eq!(received, Command::ActivateOnly);
}

#[tokio::test]
async fn test_window_registered_while_running_releases_queued_raise() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CollaboratorSink::new();
    let mut rx = sink.subscribe();

    let mut primary = ApplicationLifecycle::new(config(dir.path()), sink);
    primary.start(None).await.unwrap();
    let registrar = primary.window_registrar();

    let mut secondary = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let run = primary.run_until(async {
        let _ = stop_rx.await;
    });
    let activate = async {
        let role = secondary.start(None).await.unwrap();
        // The window only shows up after the loop is already running.
        assert!(registrar.register(WindowHandle::new(31)));
        let received = rx.recv().await.unwrap();
        let _ = stop_tx.send(());
        (role, received)
    };

    let (ran, (role, received)) = tokio::join!(run, activate);
    ran.unwrap();

    assert_eq!(role, Role::Secondary(Delivery::Activated(WindowHandle::NULL)));
    assert_eq!(received, Command::ActivateOnly);
    assert_eq!(primary.main_window(), Some(WindowHandle::new(31)));
}

#[tokio::test]
async fn test_unguarded_launch_never_steals_a_live_channel() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CollaboratorSink::new();
    let mut rx = sink.subscribe();

    let mut primary = ApplicationLifecycle::new(config(dir.path()), sink);
    primary.start(None).await.unwrap();

    // A launch whose guard is unusable believes it is first.
    let mut unguarded = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new())
        .with_guard_provider(Box::new(UnguardedProvider));
    assert_eq!(
        unguarded.start(None).await.unwrap(),
        Role::Primary { listening: false }
    );
    assert!(config(dir.path()).channel().address.exists());

    let mut third = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let run = primary.run_until(async {
        let _ = stop_rx.await;
    });
    let forward = async {
        let role = third.start(Some("app://profile/5")).await.unwrap();
        let received = rx.recv().await.unwrap();
        let _ = stop_tx.send(());
        (role, received)
    };

    let (ran, (role, received)) = tokio::join!(run, forward);
    ran.unwrap();

    assert_eq!(role, Role::Secondary(Delivery::Forwarded));
    assert_eq!(
        received,
        Command::OpenProfile {
            contact_id: "5".into()
        }
    );
}

#[tokio::test]
async fn test_unreachable_primary_with_free_guard_takes_over() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CollaboratorSink::new();
    let mut rx = sink.subscribe();

    // Contended on the first look, free on the re-check.
    let mut lifecycle = ApplicationLifecycle::new(config(dir.path()), sink)
        .with_guard_provider(Scripted::new(&[false, true]));

    let role = lifecycle.start(Some("app://profile/1")).await.unwrap();

    assert_eq!(role, Role::Primary { listening: true });
    assert!(lifecycle.is_listening());
    assert!(matches!(rx.try_recv().unwrap(), Command::OpenProfile { .. }));
}

#[tokio::test]
async fn test_unreachable_primary_with_held_guard_runs_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CollaboratorSink::new();
    let mut rx = sink.subscribe();

    let mut lifecycle = ApplicationLifecycle::new(config(dir.path()), sink)
        .with_guard_provider(Scripted::new(&[false, false]));

    let role = lifecycle.start(Some("app://stickerpack/abc")).await.unwrap();

    assert_eq!(role, Role::Primary { listening: false });
    assert!(!config(dir.path()).channel().address.exists());
    assert_eq!(
        rx.try_recv().unwrap(),
        Command::StickerPackInfo {
            store_id: "abc".into()
        }
    );
}

#[tokio::test]
async fn test_teardown_runs_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut lifecycle = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new());
    lifecycle.start(None).await.unwrap();
    lifecycle.register_window(WindowHandle::new(1)).unwrap();
    lifecycle.run_until(async {}).await.unwrap();

    let mut host = Recorder {
        socket: Some(lifecycle.config().channel().address),
        ..Recorder::default()
    };
    let guard = lifecycle.shutdown(&mut host).await.unwrap();

    assert!(guard.is_first());
    assert_eq!(lifecycle.state(), LifecycleState::Terminated);
    assert_eq!(
        host.steps,
        vec![
            "close_windows (socket present: false)".to_string(),
            "release_subsystems".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_guard_is_released_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new());
    first.start(None).await.unwrap();
    let guard = first.shutdown(&mut Recorder::default()).await.unwrap();
    drop(guard);

    let mut next = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new());
    assert_eq!(
        next.start(None).await.unwrap(),
        Role::Primary { listening: true }
    );
}

#[tokio::test]
async fn test_run_before_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut lifecycle = ApplicationLifecycle::new(config(dir.path()), CollaboratorSink::new());

    assert!(lifecycle.run_until(async {}).await.is_err());
    assert_eq!(lifecycle.state(), LifecycleState::Starting);
}
