pub mod host;

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::{info, warn};
use peerlaunch::{
    ApplicationLifecycle, CollaboratorSink, Delivery, LaunchConfig, LaunchError, Role, Variant,
};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host::Host;

#[derive(Parser, Debug)]
#[command(name = "peerlaunch")]
#[command(disable_version_flag = true)]
#[command(version)]
struct Args {
    #[arg(short = 'V', long = "version", action = ArgAction::SetTrue)]
    version: bool,

    /// Product variant; instances of different variants never meet
    #[arg(long, env = "PEERLAUNCH_VARIANT")]
    variant: Option<Variant>,

    /// Start without showing the main window
    #[arg(long)]
    startup: bool,

    /// Directory for the instance lock and local socket
    #[arg(long, env = "PEERLAUNCH_RUNTIME_DIR")]
    runtime_dir: Option<PathBuf>,

    /// How long a second launch tries to reach the running instance
    #[arg(long, env = "PEERLAUNCH_CONNECT_TIMEOUT_MS", default_value_t = 2000)]
    connect_timeout_ms: u64,

    /// URL command, e.g. app://open-profile/79991234567
    url: Option<String>,
}

impl Args {
    fn launch_config(&self, argv0: Option<&OsStr>) -> LaunchConfig {
        let variant = self.variant.clone().unwrap_or_else(|| {
            if argv0.is_some_and(exe_selects_agent) {
                Variant::agent()
            } else {
                Variant::main()
            }
        });

        let config = LaunchConfig::new(variant)
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        match &self.runtime_dir {
            Some(dir) => config.with_runtime_dir(dir),
            None => config,
        }
    }
}

/// Rewrites the legacy `/agent` and `/startup` switches to their flag form.
fn normalize_legacy_switches(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut out = Vec::new();
    for arg in args {
        if arg == "/agent" {
            out.push("--variant".into());
            out.push("agent".into());
        } else if arg == "/startup" {
            out.push("--startup".into());
        } else {
            out.push(arg);
        }
    }
    out
}

/// An executable renamed to contain "agent" runs as the agent build.
fn exe_selects_agent(argv0: &OsStr) -> bool {
    Path::new(argv0)
        .file_stem()
        .is_some_and(|stem| stem.to_string_lossy().to_ascii_lowercase().contains("agent"))
}

pub fn run() -> anyhow::Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let args = Args::parse_from(normalize_legacy_switches(argv.iter().cloned()));

    if args.version {
        println!(
            "peerlaunch {} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH")
        );
        return Ok(());
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = args.launch_config(argv.first().map(OsString::as_os_str));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the event loop")?;

    runtime.block_on(launch(config, args.url, !args.startup))
}

async fn launch(config: LaunchConfig, url: Option<String>, show_window: bool) -> anyhow::Result<()> {
    let sink = CollaboratorSink::new();
    let mut host = Host::new(&sink, show_window);
    let mut lifecycle = ApplicationLifecycle::new(config, sink);

    let role = match lifecycle.start(url.as_deref()).await {
        Ok(role) => role,
        Err(e @ LaunchError::Guard(_)) => return Err(e.into()),
        Err(e) => {
            warn!("Primary instance was reached but the hand-off failed: {e}");
            return Ok(());
        }
    };

    match role {
        Role::Secondary(Delivery::Activated(handle)) => {
            host::bring_to_front(handle);
            Ok(())
        }
        Role::Secondary(_) => Ok(()),
        Role::Primary { listening } => {
            if !listening {
                warn!("Other launches cannot reach this instance");
            }

            let handle = host.create_main_window();
            lifecycle.register_window(handle)?;
            lifecycle.run_until(shutdown_signal()).await?;

            let _guard = lifecycle.shutdown(&mut host).await?;
            info!("Exiting");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl+C ({e}); running until killed");
        std::future::pending::<()>().await;
    }
}
