//! Process-wide asynchronous dispatch queue
//!
//! Every async pipeline shares one unbounded queue and one consumer thread
//! (`scriptorium-dispatch`). Each queued item carries the sink it must be
//! delivered to, so chains of different loggers interleave on the queue but
//! each chain sees its own events in submission order.
//!
//! The consumer is started lazily by the first submission and stopped by
//! [`shutdown`]. The lock guarding the slot is only held to start, take or
//! enqueue, never while a queue drains. A submission that arrives while a
//! stopped consumer is still draining starts a fresh consumer, which waits
//! for its predecessor to finish before delivering anything, so per-chain
//! order survives a restart.

use super::error::{LoggerError, Result};
use super::event::LogEvent;
use super::metrics::LoggerMetrics;
use super::shutdown::{join_with_timeout, DEFAULT_SHUTDOWN_TIMEOUT};
use super::sink::{deliver, SharedSink};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{const_mutex, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Name of the consumer thread
pub const DISPATCH_THREAD_NAME: &str = "scriptorium-dispatch";

enum Item {
    Event {
        event: LogEvent,
        target: SharedSink,
        metrics: Arc<LoggerMetrics>,
    },
    /// Acknowledged once everything queued before it has been delivered
    Barrier(Sender<()>),
    Stop,
}

struct Dispatcher {
    sender: Sender<Item>,
    consumer: JoinHandle<()>,
    /// Disconnects when the consumer thread exits
    finished: Receiver<()>,
}

struct State {
    active: Option<Dispatcher>,
    /// Completion signal of a stopped consumer that may still be draining
    draining: Option<Receiver<()>>,
}

static DISPATCHER: Mutex<State> = const_mutex(State {
    active: None,
    draining: None,
});

impl Dispatcher {
    fn start(predecessor: Option<Receiver<()>>) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let (finished_tx, finished) = bounded::<()>(0);
        let consumer = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || {
                let _finished = finished_tx;
                if let Some(predecessor) = predecessor {
                    await_predecessor(&predecessor);
                }
                consume(receiver);
            })
            .map_err(|e| {
                LoggerError::io_operation("starting dispatcher", "Failed to spawn consumer", e)
            })?;
        Ok(Self {
            sender,
            consumer,
            finished,
        })
    }
}

fn await_predecessor(predecessor: &Receiver<()>) {
    if let Err(RecvTimeoutError::Timeout) = predecessor.recv_timeout(DEFAULT_SHUTDOWN_TIMEOUT) {
        eprintln!(
            "[LOGGER WARNING] Previous dispatch consumer still draining after {:?}. \
             Starting anyway.",
            DEFAULT_SHUTDOWN_TIMEOUT
        );
    }
}

fn consume(receiver: Receiver<Item>) {
    while let Ok(item) = receiver.recv() {
        match item {
            Item::Event {
                event,
                target,
                metrics,
            } => {
                let mut sink = target.lock();
                deliver(&mut **sink, &event, &metrics, "async dispatch");
            }
            Item::Barrier(ack) => {
                let _ = ack.send(());
            }
            Item::Stop => break,
        }
    }
}

/// Queue `event` for delivery to `target`, starting the consumer if needed.
///
/// Never blocks on sink I/O, including while a previous consumer drains.
///
/// # Errors
///
/// Returns an error only if the consumer thread cannot be spawned.
pub fn submit(event: LogEvent, target: SharedSink, metrics: Arc<LoggerMetrics>) -> Result<()> {
    let mut state = DISPATCHER.lock();
    if state.active.is_none() {
        let predecessor = state.draining.take();
        state.active = Some(Dispatcher::start(predecessor)?);
    }

    let item = Item::Event {
        event,
        target,
        metrics,
    };
    match state.active {
        Some(ref dispatcher) => dispatcher
            .sender
            .send(item)
            .map_err(|_| LoggerError::ChannelSendError),
        None => Err(LoggerError::sink_closed("dispatcher")),
    }
}

/// Wait until everything queued so far has been delivered.
///
/// Returns `false` if `timeout` elapsed first. Returns `true` immediately when
/// no consumer is running or draining.
pub fn barrier(timeout: Duration) -> bool {
    let (ack_tx, ack_rx) = bounded(1);
    let draining = {
        let state = DISPATCHER.lock();
        match state.active {
            Some(ref dispatcher) => {
                if dispatcher.sender.send(Item::Barrier(ack_tx)).is_err() {
                    return false;
                }
                None
            }
            None => match state.draining {
                Some(ref finished) => Some(finished.clone()),
                None => return true,
            },
        }
    };

    match draining {
        Some(finished) => matches!(
            finished.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        ),
        None => ack_rx.recv_timeout(timeout).is_ok(),
    }
}

/// Whether a consumer thread is currently accepting items
pub fn is_running() -> bool {
    DISPATCHER.lock().active.is_some()
}

/// Items queued but not yet picked up by the consumer
pub fn queued() -> usize {
    DISPATCHER
        .lock()
        .active
        .as_ref()
        .map_or(0, |dispatcher| dispatcher.sender.len())
}

/// Drain the queue and stop the consumer.
///
/// Items submitted before the call are delivered first. The slot lock is
/// released before waiting, so submissions made meanwhile go to a fresh
/// consumer instead of blocking. Returns `false` if the consumer did not
/// finish within `timeout`; it is then detached. With no consumer running
/// this only waits for a previous one that is still draining.
pub fn shutdown(timeout: Duration) -> bool {
    let dispatcher = {
        let mut state = DISPATCHER.lock();
        let Some(dispatcher) = state.active.take() else {
            drop(state);
            return barrier(timeout);
        };
        let _ = dispatcher.sender.send(Item::Stop);
        state.draining = Some(dispatcher.finished.clone());
        dispatcher
    };

    let drained = join_with_timeout(dispatcher.consumer, timeout, "dispatch consumer");
    if drained {
        let mut state = DISPATCHER.lock();
        let ours = state
            .draining
            .as_ref()
            .is_some_and(|finished| finished.same_channel(&dispatcher.finished));
        if ours {
            state.draining = None;
        }
    }
    drained
}
