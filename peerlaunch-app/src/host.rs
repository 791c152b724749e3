//! Headless stand-ins for the application's collaborators.
//!
//! Each collaborator subscribes to the command sink on its own task and acts
//! only on the commands for its feature. Nothing here renders anything; the
//! collaborators log what the real feature would do.

use log::{debug, info, warn};
use peerlaunch::{CollaboratorSink, Command, Feature, Teardown, WindowHandle};
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio::task::JoinHandle;

/// A consumer of routed commands.
pub trait Collaborator: Send + 'static {
    fn name(&self) -> &'static str;

    fn accepts(&self, command: &Command) -> bool;

    fn handle(&mut self, command: &Command);
}

fn spawn_collaborator<C: Collaborator>(mut collaborator: C, mut rx: Receiver<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(command) if collaborator.accepts(&command) => collaborator.handle(&command),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!("{} fell behind and missed {n} commands", collaborator.name());
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("{} stopped", collaborator.name());
    })
}

/// The top-level window.
#[derive(Debug)]
pub struct MainWindow {
    handle: WindowHandle,
    visible: bool,
}

impl MainWindow {
    pub fn new(handle: WindowHandle, visible: bool) -> Self {
        Self { handle, visible }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl Collaborator for MainWindow {
    fn name(&self) -> &'static str {
        "main window"
    }

    fn accepts(&self, command: &Command) -> bool {
        command.raises_window()
    }

    fn handle(&mut self, command: &Command) {
        if !self.visible {
            debug!("Showing hidden main window");
            self.visible = true;
        }
        info!("Raising main window {} for {command}", self.handle);
    }
}

#[derive(Debug, Default)]
pub struct ContactList;

impl Collaborator for ContactList {
    fn name(&self) -> &'static str {
        "contact list"
    }

    fn accepts(&self, command: &Command) -> bool {
        command.feature() == Feature::ContactList
    }

    fn handle(&mut self, command: &Command) {
        if let Command::JoinLiveChat { stamp, silent } = command {
            if *silent {
                info!("Joining live chat {stamp}");
            } else {
                info!("Showing preview for live chat {stamp}");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfilePanel;

impl Collaborator for ProfilePanel {
    fn name(&self) -> &'static str {
        "profile panel"
    }

    fn accepts(&self, command: &Command) -> bool {
        command.feature() == Feature::ProfilePanel
    }

    fn handle(&mut self, command: &Command) {
        if let Command::OpenProfile { contact_id } = command {
            info!("Opening profile of {contact_id}");
        }
    }
}

#[derive(Debug, Default)]
pub struct AppShell;

impl Collaborator for AppShell {
    fn name(&self) -> &'static str {
        "app shell"
    }

    fn accepts(&self, command: &Command) -> bool {
        command.feature() == Feature::AppShell
    }

    fn handle(&mut self, command: &Command) {
        match command {
            Command::AppAction { action } if action == Command::LIVECHATS_HOME => {
                info!("Opening live chats home");
            }
            Command::AppAction { action } => debug!("Ignoring unknown app action {action:?}"),
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct StickerStore;

impl Collaborator for StickerStore {
    fn name(&self) -> &'static str {
        "sticker store"
    }

    fn accepts(&self, command: &Command) -> bool {
        command.feature() == Feature::StickerStore
    }

    fn handle(&mut self, command: &Command) {
        if let Command::StickerPackInfo { store_id } = command {
            info!("Showing sticker pack {store_id}");
        }
    }
}

/// Owns the collaborator tasks for the life of the primary.
#[derive(Debug)]
pub struct Host {
    show_window: bool,
    window_rx: Option<Receiver<Command>>,
    window_task: Option<JoinHandle<()>>,
    subsystems: Vec<JoinHandle<()>>,
}

impl Host {
    /// Subscribes every collaborator. Must run inside the event loop.
    ///
    /// The window subscribes now but starts consuming only once it is
    /// created, so commands routed before that are not lost.
    pub fn new(sink: &CollaboratorSink, show_window: bool) -> Self {
        let subsystems = vec![
            spawn_collaborator(ContactList, sink.subscribe()),
            spawn_collaborator(ProfilePanel, sink.subscribe()),
            spawn_collaborator(AppShell, sink.subscribe()),
            spawn_collaborator(StickerStore, sink.subscribe()),
        ];

        Self {
            show_window,
            window_rx: Some(sink.subscribe()),
            window_task: None,
            subsystems,
        }
    }

    /// Builds the main window and returns its handle.
    ///
    /// The process id stands in for a native handle; it is never zero.
    pub fn create_main_window(&mut self) -> WindowHandle {
        let handle = WindowHandle::new(u64::from(std::process::id()));
        let window = MainWindow::new(handle, self.show_window);
        info!(
            "Main window {handle} created ({})",
            if window.is_visible() { "visible" } else { "hidden" }
        );

        if let Some(rx) = self.window_rx.take() {
            self.window_task = Some(spawn_collaborator(window, rx));
        }
        handle
    }
}

impl Teardown for Host {
    fn close_windows(&mut self) {
        self.window_rx = None;
        if let Some(task) = self.window_task.take() {
            task.abort();
            debug!("Main window closed");
        }
    }

    fn release_subsystems(&mut self) {
        for task in self.subsystems.drain(..) {
            task.abort();
        }
        debug!("Subsystems released");
    }
}

/// Asks the OS to foreground the primary's window.
///
/// Without a window system this only reports what would happen.
pub fn bring_to_front(handle: WindowHandle) {
    if handle.is_null() {
        info!("Primary has no window yet; it will raise itself once it does");
    } else {
        info!("Bringing window {handle} to the foreground");
    }
}
