//! URL commands.
//!
//! A command arrives as a URL such as `app://join-livechat/abc123?join=1`,
//! either on the command line or relayed from a secondary instance. The host
//! picks the command family, the path carries the payload and the query
//! carries flags. Anything unrecognized parses to `None` and is ignored.

use log::debug;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use url::Url;

use crate::types::constants::url_command;

/// A structured request decoded from a URL-style invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Join a live chat by its stamp. `silent` joins without the preview prompt.
    JoinLiveChat { stamp: String, silent: bool },
    /// Open the profile panel for a contact.
    OpenProfile { contact_id: String },
    /// Run an application-level sub-action (e.g. `livechats-home`).
    AppAction { action: String },
    /// Show a sticker pack from the store.
    StickerPackInfo { store_id: String },
    /// Bring the existing main window forward.
    ActivateOnly,
}

/// The collaborator that owns the feature a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Window,
    ContactList,
    ProfilePanel,
    AppShell,
    StickerStore,
}

impl Command {
    /// Known `app://app/...` sub-action that opens the live chats home page.
    pub const LIVECHATS_HOME: &'static str = "livechats-home";

    /// Parses a URL command.
    ///
    /// Returns `None` for unparsable URLs, unknown hosts, and commands whose
    /// payload is empty once a single trailing slash is removed. None of these
    /// are errors: a bad invocation simply does nothing.
    ///
    /// # Example
    ///
    /// ```
    /// use peerlaunch::Command;
    ///
    /// assert_eq!(
    ///     Command::parse("app://joinlivechat/abc123?join=1"),
    ///     Some(Command::JoinLiveChat { stamp: "abc123".into(), silent: true }),
    /// );
    /// assert_eq!(Command::parse("app://joinlivechat/"), None);
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let url = match Url::parse(raw.trim()) {
            Ok(url) => url,
            Err(e) => {
                debug!("Ignoring unparsable command {raw:?}: {e}");
                return None;
            }
        };

        let Some(host) = url.host_str() else {
            debug!("Ignoring command without host: {raw:?}");
            return None;
        };

        let command = if host_is(
            host,
            url_command::HOST_JOIN_LIVECHAT,
            url_command::HOST_JOIN_LIVECHAT_ALIAS,
        ) {
            let stamp = payload(&url)?;
            let silent = url.query_pairs().any(|(k, v)| {
                k == url_command::QUERY_JOIN && v == url_command::QUERY_JOIN_SILENT
            });
            Self::JoinLiveChat { stamp, silent }
        } else if host_is(
            host,
            url_command::HOST_OPEN_PROFILE,
            url_command::HOST_OPEN_PROFILE_ALIAS,
        ) {
            Self::OpenProfile {
                contact_id: payload(&url)?,
            }
        } else if host.eq_ignore_ascii_case(url_command::HOST_APP) {
            Self::AppAction {
                action: payload(&url)?,
            }
        } else if host_is(
            host,
            url_command::HOST_STICKERPACK_INFO,
            url_command::HOST_STICKERPACK_INFO_ALIAS,
        ) {
            Self::StickerPackInfo {
                store_id: payload(&url)?,
            }
        } else {
            debug!("Ignoring command with unknown host {host:?}");
            return None;
        };

        debug!("Parsed command: {command}");
        Some(command)
    }

    /// Canonical URL form, parsing back to an identical command.
    ///
    /// `ActivateOnly` has no URL form and returns `None`.
    pub fn to_url(&self) -> Option<String> {
        let (host, value) = match self {
            Self::JoinLiveChat { stamp, .. } => (url_command::HOST_JOIN_LIVECHAT, stamp),
            Self::OpenProfile { contact_id } => (url_command::HOST_OPEN_PROFILE, contact_id),
            Self::AppAction { action } => (url_command::HOST_APP, action),
            Self::StickerPackInfo { store_id } => (url_command::HOST_STICKERPACK_INFO, store_id),
            Self::ActivateOnly => return None,
        };

        let mut out = format!(
            "{}://{host}/{}",
            url_command::SCHEME,
            urlencoding::encode(value)
        );
        if let Self::JoinLiveChat { silent: true, .. } = self {
            out.push('?');
            out.push_str(url_command::QUERY_JOIN);
            out.push('=');
            out.push_str(url_command::QUERY_JOIN_SILENT);
        }
        Some(out)
    }

    /// The collaborator responsible for acting on this command.
    pub fn feature(&self) -> Feature {
        match self {
            Self::JoinLiveChat { .. } => Feature::ContactList,
            Self::OpenProfile { .. } => Feature::ProfilePanel,
            Self::AppAction { .. } => Feature::AppShell,
            Self::StickerPackInfo { .. } => Feature::StickerStore,
            Self::ActivateOnly => Feature::Window,
        }
    }

    /// Whether the main window is brought forward before the feature acts.
    pub fn raises_window(&self) -> bool {
        matches!(
            self,
            Self::JoinLiveChat { .. } | Self::OpenProfile { .. } | Self::ActivateOnly
        )
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JoinLiveChat { stamp, silent } => {
                write!(f, "join live chat {stamp} (silent: {silent})")
            }
            Self::OpenProfile { contact_id } => write!(f, "open profile {contact_id}"),
            Self::AppAction { action } => write!(f, "app action {action}"),
            Self::StickerPackInfo { store_id } => write!(f, "sticker pack {store_id}"),
            Self::ActivateOnly => write!(f, "activate"),
        }
    }
}

fn host_is(host: &str, canonical: &str, alias: &str) -> bool {
    host.eq_ignore_ascii_case(canonical) || host.eq_ignore_ascii_case(alias)
}

/// Extracts the path payload: leading slash dropped, one trailing slash
/// stripped, then percent-decoded. Empty payloads yield `None`.
fn payload(url: &Url) -> Option<String> {
    let path = url.path();
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() {
        return None;
    }

    match urlencoding::decode(path).map(Cow::into_owned) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!("Ignoring command with non UTF-8 payload {path:?}: {e}");
            None
        }
    }
}
