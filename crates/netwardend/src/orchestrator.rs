//! Orchestration context: one dedicated thread hosting one cooperative
//! event loop that owns the state machine and the trigger set.
//!
//! All transitions and trigger ticks run on this loop, one at a time, so
//! they never interleave with each other and snapshot reads are never torn.
//! Transition requests are processed strictly in submission order. The only
//! escape hatch is PERFORM_ACTION, which the state machine launches on an
//! independent thread that is never joined.

use crate::state_machine::{SnapshotHandle, StateMachine};
use crate::triggers::TriggerSet;
use anyhow::{anyhow, Context, Result};
use netwarden_common::{ConnectivityState, StateContext, WardenError};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// How long trigger ticks are spaced apart.
pub const TRIGGER_INTERVAL: Duration = Duration::from_secs(2);

/// How long shutdown waits for the loop thread before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

enum Command {
    UpdateState {
        state: ConnectivityState,
        context: StateContext,
        reply: Option<std::sync::mpsc::Sender<Result<(), WardenError>>>,
    },
    Shutdown,
}

/// Cloneable submitter for state transitions.
#[derive(Clone)]
pub struct StateSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl StateSender {
    /// Queue a transition without waiting for it. Failures surface in the
    /// orchestrator log.
    pub fn submit(&self, state: ConnectivityState, context: StateContext) {
        let sent = self.tx.send(Command::UpdateState {
            state,
            context,
            reply: None,
        });
        if sent.is_err() {
            warn!("Orchestrator is not running; dropped transition to {state}");
        }
    }

    /// Queue a transition and wait for the loop to process it.
    pub fn update_state(&self, state: ConnectivityState, context: StateContext) -> Result<()> {
        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        self.tx
            .send(Command::UpdateState {
                state,
                context,
                reply: Some(reply_tx),
            })
            .map_err(|_| anyhow!("orchestrator is not running"))?;
        reply_rx
            .recv()
            .context("orchestrator stopped before processing the transition")?
            .map_err(Into::into)
    }
}

pub struct Orchestrator {
    tx: mpsc::UnboundedSender<Command>,
    snapshots: SnapshotHandle,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    done_rx: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
}

impl Orchestrator {
    /// Spawn the orchestration thread. The machine and trigger set move onto
    /// it; everything else talks to them through this handle.
    pub fn spawn(machine: StateMachine, triggers: TriggerSet, tick: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building orchestrator runtime")?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let snapshots = machine.handle();

        let thread = std::thread::Builder::new()
            .name("warden-orchestrator".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut interval = tokio::time::interval(tick);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    info!("Orchestrator loop started ({} triggers)", triggers.len());
                    loop {
                        tokio::select! {
                            // Commands win over ticks so transitions keep
                            // strict submission order under load.
                            biased;
                            cmd = rx.recv() => match cmd {
                                Some(Command::UpdateState { state, context, reply }) => {
                                    let result = machine.apply(state, context);
                                    if let (Err(e), None) = (&result, &reply) {
                                        warn!("Transition to {state} rejected: {e}");
                                    }
                                    if let Some(reply) = reply {
                                        let _ = reply.send(result);
                                    }
                                }
                                Some(Command::Shutdown) | None => break,
                            },
                            _ = interval.tick() => {
                                triggers.check_all().await;
                            }
                        }
                    }
                    info!("Orchestrator loop stopped");
                });
                let _ = done_tx.send(());
            })
            .context("spawning orchestrator thread")?;

        Ok(Self {
            tx,
            snapshots,
            thread: Mutex::new(Some(thread)),
            done_rx: Mutex::new(Some(done_rx)),
        })
    }

    pub fn sender(&self) -> StateSender {
        StateSender { tx: self.tx.clone() }
    }

    /// Read-only view of the current state and context.
    pub fn snapshots(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    /// Cooperative shutdown with a bounded wait. If the loop does not wind
    /// down within the grace period the thread is abandoned rather than
    /// blocked on.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
        let done_rx = self.done_rx.lock().unwrap().take();
        let finished = match done_rx {
            Some(rx) => rx.recv_timeout(SHUTDOWN_GRACE).is_ok(),
            None => return, // already shut down
        };
        let thread = self.thread.lock().unwrap().take();
        if finished {
            if let Some(thread) = thread {
                let _ = thread.join();
            }
        } else {
            warn!("Orchestrator did not stop within {SHUTDOWN_GRACE:?}; abandoning thread");
        }
    }
}
