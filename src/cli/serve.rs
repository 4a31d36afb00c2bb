//! `refresh serve`: run the hubs and forward build events.
//!
//! The build pipeline talks to the server through stdin, one JSON object
//! per line:
//!
//! ```text
//! {"type":"build","variant":"dashboard","hash":"abc123","errors":[],"warnings":[]}
//! {"type":"reload","variant":"dashboard"}
//! ```
//!
//! On startup every variant's bootstrap object is printed to stdout as one
//! JSON line so the pipeline can inject it into the client build.

use std::io::BufRead;
use std::thread;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::actor::Coordinator;
use crate::config::RefreshConfig;
use crate::core::{shutdown_signal, wait_for_shutdown};
use crate::reload::message::BuildResult;
use crate::{debug, log};

/// One line of build pipeline input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum PipelineEvent {
    /// A build cycle finished
    Build {
        variant: String,
        hash: String,
        #[serde(default)]
        errors: Vec<String>,
        #[serde(default)]
        warnings: Vec<String>,
    },
    /// Force every client of a variant to reload
    Reload { variant: String },
}

impl PipelineEvent {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .with_context(|| format!("invalid pipeline event `{line}`"))
    }

    pub fn variant(&self) -> &str {
        match self {
            Self::Build { variant, .. } | Self::Reload { variant } => variant,
        }
    }
}

/// Forward one event to the coordinator.
pub fn dispatch(coordinator: &Coordinator, event: PipelineEvent) {
    let delivered = match event {
        PipelineEvent::Build {
            ref variant,
            ref hash,
            ref errors,
            ref warnings,
        } => {
            let result = BuildResult::new(hash.as_str())
                .with_errors(errors.clone())
                .with_warnings(warnings.clone());
            coordinator.on_build_complete(variant, &result)
        }
        PipelineEvent::Reload { ref variant } => coordinator.reload(variant),
    };

    if !delivered {
        log!("serve"; "variant `{}` is not running, event ignored", event.variant());
    }
}

/// Run the serve command until stdin closes or Ctrl+C.
pub fn run_serve(config: RefreshConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async {
        let mut coordinator = Coordinator::new(config);
        coordinator.start()?;
        print_bootstrap(&coordinator)?;

        let events = spawn_stdin_reader();
        serve_loop(&coordinator, events).await;

        coordinator.shutdown();
        Ok(())
    })
}

/// Print each running variant's bootstrap as a JSON line.
fn print_bootstrap(coordinator: &Coordinator) -> Result<()> {
    for name in coordinator.variant_names() {
        if let Some(bootstrap) = coordinator.bootstrap(name) {
            println!("{}", serde_json::to_string(&bootstrap)?);
        }
    }
    Ok(())
}

async fn serve_loop(coordinator: &Coordinator, mut events: mpsc::UnboundedReceiver<PipelineEvent>) {
    let shutdown = wait_for_shutdown(shutdown_signal());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Some(event) => dispatch(coordinator, event),
                None => {
                    debug!("serve"; "stdin closed");
                    break;
                }
            },
        }
    }
}

/// Read pipeline events from stdin on a dedicated thread.
///
/// The channel closes at end of input.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<PipelineEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log!("serve"; "failed to read stdin: {}", e);
                    break;
                }
            };
            match PipelineEvent::parse(&line) {
                Ok(Some(event)) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => log!("serve"; "{:#}", e),
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HubConfig, VariantConfig};

    #[test]
    fn test_parse_build() {
        let event = PipelineEvent::parse(
            r#"{"type":"build","variant":"dashboard","hash":"abc123","errors":["boom"]}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            Some(PipelineEvent::Build {
                variant: "dashboard".into(),
                hash: "abc123".into(),
                errors: vec!["boom".into()],
                warnings: vec![],
            })
        );
    }

    #[test]
    fn test_parse_reload_and_blank() {
        let event = PipelineEvent::parse(r#"{"type":"reload","variant":"graphics"}"#).unwrap();
        assert_eq!(event.unwrap().variant(), "graphics");
        assert_eq!(PipelineEvent::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PipelineEvent::parse("not json").is_err());
        assert!(PipelineEvent::parse(r#"{"type":"deploy","variant":"x"}"#).is_err());
        assert!(PipelineEvent::parse(r#"{"type":"build","variant":"x"}"#).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispatch_reaches_coordinator() {
        let config = RefreshConfig {
            hub: HubConfig {
                address: "127.0.0.1".into(),
                port: 0,
            },
            variants: [("dashboard".to_string(), VariantConfig::default())].into(),
        };
        let mut coordinator = Coordinator::new(config);
        coordinator.start().unwrap();

        // No clients: publishing is a no-op, unknown variants are only logged
        dispatch(&coordinator, PipelineEvent::Reload {
            variant: "dashboard".into(),
        });
        dispatch(&coordinator, PipelineEvent::Reload {
            variant: "graphics".into(),
        });
        assert!(coordinator.variant("dashboard").unwrap().hub().is_listening());

        coordinator.shutdown();
    }
}
