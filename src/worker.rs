//! Polling worker lifecycle and the parent-side supervisor.
//!
//! The worker runs in its own process so a crash there cannot take down the
//! interactive front end. The bot process spawns this same executable with
//! `APP_MODE=WORKER`, observes its exit, and respawns it after a fixed delay
//! unless its own shutdown is in progress.

use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio::process::{Child, Command};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

use crate::aggregate::JobSource;
use crate::scheduler::PollScheduler;
use crate::telegram::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Running,
    Stopping,
}

/// Worker state machine: `Stopped → Running → Stopping → Stopped`.
/// Transitions return false when the current state does not permit them.
#[derive(Debug)]
pub struct Lifecycle {
    state: WorkerState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { state: WorkerState::Stopped }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }

    pub fn start(&mut self) -> bool {
        if self.state == WorkerState::Stopped {
            self.state = WorkerState::Running;
            true
        } else {
            false
        }
    }

    pub fn request_stop(&mut self) -> bool {
        if self.state == WorkerState::Running {
            self.state = WorkerState::Stopping;
            true
        } else {
            false
        }
    }

    pub fn finish(&mut self) -> bool {
        if self.state == WorkerState::Stopping {
            self.state = WorkerState::Stopped;
            true
        } else {
            false
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker-mode entry point: an immediate first tick, then a fixed-cadence
/// interval until SIGINT/SIGTERM. A termination signal only cancels the
/// pending timer; an in-flight tick runs to completion.
pub async fn run_worker<J: JobSource, N: Notifier>(
    scheduler: PollScheduler<J, N>,
    poll_interval: Duration,
) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let mut lifecycle = Lifecycle::new();
    lifecycle.start();
    info!("polling worker started, interval {}ms", poll_interval.as_millis());

    scheduler.tick().await;

    let mut timer = interval(poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await; // the first interval tick fires immediately; already done above

    while lifecycle.is_running() {
        tokio::select! {
            _ = timer.tick() => scheduler.tick().await,
            _ = sigint.recv() => { lifecycle.request_stop(); }
            _ = sigterm.recv() => { lifecycle.request_stop(); }
        }
    }

    lifecycle.finish();
    info!("polling worker stopped");
    Ok(())
}

/// Command line for the worker child: the parent's own flags (token, database
/// path, feed URL, ...) forwarded as-is, with any `--mode` selection replaced
/// by `worker`. A forwarded `--mode bot` would outrank the `APP_MODE` env and
/// make the child spawn workers of its own.
fn worker_args(parent_args: impl Iterator<Item = std::ffi::OsString>) -> Vec<std::ffi::OsString> {
    let mut args: Vec<std::ffi::OsString> = Vec::new();
    let mut skip_value = false;
    for arg in parent_args {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg == "--mode" {
            skip_value = true;
            continue;
        }
        if arg.to_string_lossy().starts_with("--mode=") {
            continue;
        }
        args.push(arg);
    }
    args.push("--mode".into());
    args.push("worker".into());
    args
}

/// Parent-side supervisor: keeps one worker process alive, respawning after
/// `restart_delay` on any exit that was not part of our own shutdown.
/// Respawning is unbounded by design; there is no crash-loop circuit breaker.
pub struct WorkerSupervisor {
    restart_delay: Duration,
    shutdown: watch::Receiver<bool>,
}

impl WorkerSupervisor {
    pub fn new(restart_delay: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self { restart_delay, shutdown }
    }

    fn spawn(&self) -> Result<Child> {
        let exe = std::env::current_exe()?;
        let child = Command::new(exe)
            .args(worker_args(std::env::args_os().skip(1)))
            .env("APP_MODE", "WORKER")
            .kill_on_drop(true)
            .spawn()?;
        info!("polling worker spawned (pid={})", child.id().unwrap_or_default());
        Ok(child)
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            let mut child = self.spawn()?;
            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    if *self.shutdown.borrow() {
                        break;
                    }
                    error!(
                        "polling worker exited ({status}); respawning in {}ms",
                        self.restart_delay.as_millis()
                    );
                }
                _ = self.shutdown.changed() => {
                    let _ = child.kill().await;
                    break;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.restart_delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }
        info!("worker supervisor stopped");
        Ok(())
    }
}
