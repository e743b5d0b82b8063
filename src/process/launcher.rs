//! Process Launcher
//!
//! Wires either a spawned subprocess or the local standard streams into the
//! relay. Local stdio is attached exactly once per [`StdioHub`], no matter how
//! many connection handlers ask for it.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::tokenizer::{split_exec, TokenizeError};
use crate::relay::{spawn_dispatch, BoxedReader, Destination, PeerHandle, Registry, SharedSink};

/// Failures while launching a subprocess. All of them are fatal to the relay.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to capture {pipe} of `{program}`")]
    MissingPipe { pipe: &'static str, program: String },
}

/// A started subprocess with its pipes taken
pub struct LaunchedProcess {
    pub program: String,
    pub pid: Option<u32>,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub stdin: SharedSink,
}

/// Spawn the command described by `exec` with all three stdio handles piped.
///
/// The child is reaped in the background and its exit status logged.
pub fn launch(exec: &str) -> Result<LaunchedProcess, LaunchError> {
    let (program, args) = split_exec(exec)?;

    debug!(program = %program, ?args, "Spawning subprocess");
    let mut child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;

    let missing = |pipe| LaunchError::MissingPipe {
        pipe,
        program: program.clone(),
    };
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;

    let pid = child.id();
    info!(program = %program, pid = ?pid, "Subprocess started");
    reap(program.clone(), child);

    Ok(LaunchedProcess {
        stdin: SharedSink::new(format!("{} stdin", program), stdin),
        program,
        pid,
        stdout,
        stderr,
    })
}

fn reap(program: String, mut child: Child) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => info!(program = %program, %status, "Subprocess exited"),
            Err(e) => warn!(program = %program, "Failed to wait for subprocess: {}", e),
        }
    });
}

/// Owner of the process-wide local stdio wiring.
///
/// Construct one per process and share it by `Arc` with every connection
/// handler.
pub struct StdioHub {
    registry: Registry,
    local_output: SharedSink,
    local_input: Mutex<Option<BoxedReader>>,
    local_sink: OnceLock<SharedSink>,
    local_pumps: AtomicUsize,
}

impl StdioHub {
    /// Hub backed by this process's standard input and output
    pub fn new(registry: Registry) -> Self {
        Self::with_local_io(
            registry,
            Box::new(tokio::io::stdin()),
            SharedSink::new("stdout", tokio::io::stdout()),
        )
    }

    /// Hub backed by arbitrary local streams
    pub fn with_local_io(registry: Registry, input: BoxedReader, output: SharedSink) -> Self {
        Self {
            registry,
            local_output: output,
            local_input: Mutex::new(Some(input)),
            local_sink: OnceLock::new(),
            local_pumps: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prepare the input side for a new connection and return the sink its
    /// inbound bytes should be written to.
    ///
    /// With a non-empty `exec` a fresh subprocess is launched for `peer`: its
    /// stdout and stderr are pumped straight to the peer and its stdin is
    /// returned. With an empty `exec` the local stdio is attached once and
    /// the local stdout sink is returned.
    pub fn handle_stdin(&self, exec: &str, peer: &PeerHandle) -> Result<SharedSink, LaunchError> {
        if exec.is_empty() {
            return Ok(self.local_sink());
        }

        let process = launch(exec)?;
        spawn_dispatch(process.stdout, Destination::Direct(peer.sink.clone()));
        spawn_dispatch(process.stderr, Destination::Direct(peer.sink.clone()));
        debug!(
            connection_id = %peer.id(),
            program = %process.program,
            pid = ?process.pid,
            "Subprocess output wired to peer"
        );
        Ok(process.stdin)
    }

    /// The local stdout sink, attaching local stdin on first use
    pub fn local_sink(&self) -> SharedSink {
        self.local_sink
            .get_or_init(|| {
                let input = self
                    .local_input
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .take();
                if let Some(input) = input {
                    self.local_pumps.fetch_add(1, Ordering::SeqCst);
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        let summary =
                            crate::relay::dispatch(input, Destination::Broadcast(registry)).await;
                        info!(bytes = summary.bytes, "Local input closed");
                    });
                    info!("Local input attached to connected peers");
                }
                self.local_output.clone()
            })
            .clone()
    }

    /// Number of local input pumps started so far
    pub fn local_pump_count(&self) -> usize {
        self.local_pumps.load(Ordering::SeqCst)
    }
}
