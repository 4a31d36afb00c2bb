//! `refresh listen`: follow one channel from the command line.
//!
//! Hot updates run the `--apply` shell command with `REFRESH_HASH` set to
//! the target build. A full reload runs `--reload` and starts over with a
//! fresh client, as a reloaded page would.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use super::ListenArgs;
use crate::client::{
    ApplyError, BootstrapOptions, ClientExit, ClientMachine, ClientOptions, PageLocation,
    RefreshClient, UpdateApplier, WsTransport,
};
use crate::core::{shutdown_signal, wait_for_shutdown};
use crate::log;
use crate::utils::exec::{Cmd, EMPTY_FILTER};

/// Environment variable carrying the target build hash
pub const HASH_ENV: &str = "REFRESH_HASH";

#[derive(Default)]
struct ApplierState {
    version: Mutex<Option<String>>,
    busy: AtomicBool,
}

/// Applies hot updates by running a shell command.
///
/// Without a command every update is accepted as applied.
#[derive(Clone, Default)]
pub struct CommandApplier {
    command: Option<Arc<str>>,
    state: Arc<ApplierState>,
}

impl CommandApplier {
    pub fn new(command: Option<String>) -> Self {
        Self {
            command: command.map(Arc::from),
            state: Arc::default(),
        }
    }

    /// Start out already running `version`.
    pub fn with_version(self, version: Option<String>) -> Self {
        *self.state.version.lock() = version;
        self
    }
}

impl UpdateApplier for CommandApplier {
    fn is_idle(&self) -> bool {
        !self.state.busy.load(Ordering::Acquire)
    }

    fn current_version(&self) -> Option<String> {
        self.state.version.lock().clone()
    }

    fn apply(&self, target: &str) -> impl Future<Output = Result<(), ApplyError>> + Send + 'static {
        // Busy from the moment the update is requested, not first poll
        self.state.busy.store(true, Ordering::Release);

        let command = self.command.clone();
        let state = Arc::clone(&self.state);
        let target = target.to_string();
        async move {
            let result = match command {
                Some(command) => run_apply(command, target.clone()).await,
                None => Ok(()),
            };
            if result.is_ok() {
                *state.version.lock() = Some(target);
            }
            state.busy.store(false, Ordering::Release);
            result
        }
    }
}

async fn run_apply(command: Arc<str>, target: String) -> Result<(), ApplyError> {
    tokio::task::spawn_blocking(move || {
        Cmd::shell(&command)
            .envs([(HASH_ENV, target.as_str())])
            .filter(&EMPTY_FILTER)
            .run()
    })
    .await
    .map_err(|e| ApplyError::new(format!("apply task failed: {e}")))?
    .map(|_| ())
    .map_err(|e| ApplyError::new(format!("{e:#}")))
}

/// Resolve client options from the command line.
pub fn client_options(args: &ListenArgs) -> Result<ClientOptions> {
    let location = PageLocation::parse(&args.page)?;
    let bootstrap = BootstrapOptions {
        protocol: args.protocol.clone(),
        address: args.address.clone(),
        port: Some(args.port),
        name: Some(args.name.clone()),
    };
    Ok(ClientOptions::resolve(&location, &bootstrap)?)
}

/// Run clients until Ctrl+C, starting a fresh one after every full reload.
pub fn run_listen(args: &ListenArgs) -> Result<()> {
    let options = client_options(args)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async {
        let shutdown = shutdown_signal();
        log!("client"; "following `{}` on {}", options.name, options.url());

        let mut version = None;
        loop {
            let applier = CommandApplier::new(args.apply.clone()).with_version(version.take());
            let mut client = RefreshClient::new(options.clone(), WsTransport::new(), applier);

            match client.run(wait_for_shutdown(shutdown.clone())).await {
                ClientExit::Shutdown => break,
                ClientExit::Reload => {
                    log!("client"; "full reload");
                    if let Some(command) = args.reload.clone() {
                        run_reload(command).await;
                    }
                    version = reloaded_version(client.machine(), client.applier());
                }
            }
        }
        Ok(())
    })
}

/// Build the runtime is on after a full reload: the newest one announced,
/// or whatever it already ran.
fn reloaded_version(machine: &ClientMachine, applier: &CommandApplier) -> Option<String> {
    machine
        .latest_hash()
        .map(str::to_string)
        .or_else(|| applier.current_version())
}

async fn run_reload(command: String) {
    let result =
        tokio::task::spawn_blocking(move || Cmd::shell(&command).filter(&EMPTY_FILTER).run()).await;
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => log!("error"; "reload command failed: {:#}", e),
        Err(e) => log!("error"; "reload task failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SocketEvent;
    use crate::reload::message::Event;

    fn args(name: &str) -> ListenArgs {
        ListenArgs {
            page: "https://example.test/app".into(),
            name: name.into(),
            port: 45678,
            address: None,
            protocol: None,
            apply: None,
            reload: None,
        }
    }

    #[test]
    fn test_client_options_from_args() {
        let options = client_options(&args("dashboard")).unwrap();
        assert_eq!(options.url(), "wss://example.test:45678");
        assert_eq!(options.name, "dashboard");

        let mut local = args("graphics");
        local.page = "http://localhost:8080/".into();
        local.address = Some("127.0.0.1".into());
        assert_eq!(client_options(&local).unwrap().url(), "ws://127.0.0.1:45678");
    }

    #[test]
    fn test_client_options_reject_empty_name() {
        assert!(client_options(&args("")).is_err());
    }

    #[tokio::test]
    async fn test_applier_without_command_accepts() {
        let applier = CommandApplier::new(None);
        assert!(applier.is_idle());
        assert_eq!(applier.current_version(), None);

        let pending = applier.apply("v1");
        assert!(!applier.is_idle());
        pending.await.unwrap();

        assert!(applier.is_idle());
        assert_eq!(applier.current_version().as_deref(), Some("v1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_applier_runs_command_with_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("applied");
        let command = format!("printf %s \"${HASH_ENV}\" > '{}'", out.display());

        let applier = CommandApplier::new(Some(command));
        applier.apply("abc123").await.unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "abc123");
        assert_eq!(applier.current_version().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_seeded_applier_keeps_version() {
        let applier = CommandApplier::new(None).with_version(Some("v3".into()));
        assert_eq!(applier.current_version().as_deref(), Some("v3"));
        assert!(applier.is_idle());

        applier.apply("v4").await.unwrap();
        assert_eq!(applier.current_version().as_deref(), Some("v4"));
    }

    #[test]
    fn test_reloaded_client_skips_current_build() {
        let options = client_options(&args("dashboard")).unwrap();
        let applier = CommandApplier::new(None).with_version(Some("v3".into()));

        let mut machine = ClientMachine::new(options);
        assert_eq!(reloaded_version(&machine, &applier).as_deref(), Some("v3"));

        machine.connect();
        let socket = machine.socket().unwrap();
        machine.on_socket_event(socket, SocketEvent::Open, &applier);
        let actions = machine.on_socket_event(
            socket,
            SocketEvent::Text(Event::replace("dashboard", "v3").to_json()),
            &applier,
        );
        assert!(actions.is_empty());

        // A newer announced build wins over what the applier last ran
        machine.on_socket_event(
            socket,
            SocketEvent::Text(Event::replace("dashboard", "v4").to_json()),
            &applier,
        );
        assert_eq!(reloaded_version(&machine, &applier).as_deref(), Some("v4"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_applier_failure_keeps_version() {
        let applier = CommandApplier::new(Some("exit 1".into()));
        assert!(applier.apply("v2").await.is_err());
        assert!(applier.is_idle());
        assert_eq!(applier.current_version(), None);
    }
}
