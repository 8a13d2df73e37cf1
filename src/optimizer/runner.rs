//! # Process Runner
//!
//! Process runner for external optimization passes.
//!
//! Every pass is one child process, spawned directly (never through a shell),
//! bounded by a timeout and raced against the request's stop signal. The
//! runner never returns an error: launch failures, non-zero exits, timeouts
//! and cancellations all become a `PassOutcome` plus a log line.

use crate::tool_resolver::ToolPathResolver;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Result of a single external pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Exited with status 0
    Succeeded,
    /// The process could not be started (missing binary, permissions)
    LaunchFailed,
    /// The tool ran and reported failure
    Failed { code: Option<i32> },
    /// Killed after exceeding the per-pass timeout
    TimedOut,
    /// Not started, or killed, because the request was stopped
    Cancelled,
}

impl PassOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Sending half of a stop signal
#[derive(Debug)]
pub struct StopHandle {
    sender: watch::Sender<bool>,
}

impl StopHandle {
    /// Stop every request holding a signal from this handle.
    ///
    /// The flag is sticky: signals subscribed afterwards observe it too.
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    /// A new receiving half
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            receiver: Some(self.sender.subscribe()),
        }
    }
}

/// Receiving half of a stop signal, cloned into each request
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl StopSignal {
    /// Creates a connected handle/signal pair
    pub fn channel() -> (StopHandle, StopSignal) {
        let (sender, receiver) = watch::channel(false);
        (StopHandle { sender }, StopSignal { receiver: Some(receiver) })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        Self::default()
    }

    /// Checks if a stop signal has been received.
    pub fn should_stop(&self) -> bool {
        self.receiver
            .as_ref()
            .map(|receiver| *receiver.borrow())
            .unwrap_or(false)
    }

    /// Resolves once the stop signal fires. Pending forever if it cannot.
    pub async fn stopped(&mut self) {
        if let Some(ref mut receiver) = self.receiver {
            loop {
                if *receiver.borrow_and_update() {
                    return;
                }
                if receiver.changed().await.is_err() {
                    // Sender dropped without stopping
                    break;
                }
            }
        }
        std::future::pending::<()>().await
    }
}

/// Runs argument vectors as child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    resolver: ToolPathResolver,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            resolver: ToolPathResolver::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one command, `true` iff it exited with status 0
    pub async fn run(&self, args: &[String], stop: &mut StopSignal) -> bool {
        self.execute(args, stop).await.is_success()
    }

    /// Runs one command and reports how it ended
    pub async fn execute(&self, args: &[String], stop: &mut StopSignal) -> PassOutcome {
        let Some((program, rest)) = args.split_first() else {
            error!("Error executing command: empty argument vector");
            return PassOutcome::LaunchFailed;
        };

        if stop.should_stop() {
            debug!("Stop signal received, not starting {}", program);
            return PassOutcome::Cancelled;
        }

        let program_path = self
            .resolver
            .resolve_tool(program)
            .unwrap_or_else(|| PathBuf::from(program));
        debug!("Running {:?} {:?}", program_path, rest);

        let child = Command::new(&program_path)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                error!("Error executing command {:?}. Error was {}", args, e);
                return PassOutcome::LaunchFailed;
            }
        };

        let start_time = Instant::now();
        // Dropping the wait future drops the child, which kills it
        let finished = tokio::select! {
            finished = tokio::time::timeout(self.timeout, child.wait_with_output()) => finished,
            _ = stop.stopped() => {
                warn!("{} cancelled after {:?}", program, start_time.elapsed());
                return PassOutcome::Cancelled;
            }
        };
        let elapsed = start_time.elapsed();

        match finished {
            Err(_) => {
                warn!("{} timed out after {:?}, process killed", program, self.timeout);
                PassOutcome::TimedOut
            }
            Ok(Err(e)) => {
                error!("Failed waiting for {}: {}", program, e);
                PassOutcome::Failed { code: None }
            }
            Ok(Ok(output)) if output.status.success() => {
                debug!("{} completed successfully in {:?}", program, elapsed);
                PassOutcome::Succeeded
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    "{} failed with {} after {:?}: {}",
                    program,
                    output.status,
                    elapsed,
                    stderr.trim()
                );
                PassOutcome::Failed {
                    code: output.status.code(),
                }
            }
        }
    }
}
