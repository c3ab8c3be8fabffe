use crate::event_log::EventLog;
use crate::events::WorkflowEvent;
use crate::graph::NodeState;
use crate::instance::WorkflowInstance;
use crate::readiness;
use crate::store::CompletionStore;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Invoked exactly once per run when the whole graph has completed.
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Message posted by a node's simulated-work task when its duration
/// elapses. `run` is the instance run number observed at activation; the
/// receive loop drops messages from a run that has since been reset.
/// `finished_at` is the timer's scheduled deadline; cascaded activations
/// anchor their own deadlines to it so durations don't accumulate the
/// lag between a deadline elapsing and its message being processed.
#[derive(Debug)]
struct NodeFinished {
    node_id: String,
    run: u64,
    finished_at: tokio::time::Instant,
}

/// Drives one workflow instance through the simulation.
///
/// The scheduler is an event loop in the same shape as a task
/// orchestrator: node activations spawn a sleep task per node, finished
/// nodes report back over an mpsc channel, and a single receive loop
/// applies every state transition while holding the instance lock. No
/// `.await` is reached under that lock, so readiness evaluation, state
/// transitions, and the completion guard's check-and-set are each one
/// uninterrupted step.
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    instance: Mutex<WorkflowInstance>,
    // Lock order: instance before timers, everywhere.
    timers: Mutex<Vec<JoinHandle<()>>>,
    finished_tx: mpsc::UnboundedSender<NodeFinished>,
    event_tx: broadcast::Sender<WorkflowEvent>,
    log: EventLog,
    store: Arc<dyn CompletionStore>,
    on_complete: Mutex<Option<CompletionCallback>>,
}

impl Scheduler {
    /// Must be called from within a tokio runtime; the receive loop is
    /// spawned here and lives until the scheduler and all outstanding
    /// timers are dropped.
    pub fn new(instance: WorkflowInstance, store: Arc<dyn CompletionStore>) -> Self {
        let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let inner = Arc::new(Inner {
            instance: Mutex::new(instance),
            timers: Mutex::new(Vec::new()),
            finished_tx,
            event_tx,
            log: EventLog::new(),
            store,
            on_complete: Mutex::new(None),
        });

        // The loop holds only a weak reference so dropping the scheduler
        // lets everything unwind once in-flight timers finish.
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(msg) = finished_rx.recv().await {
                match weak.upgrade() {
                    Some(inner) => inner.handle_finished(msg),
                    None => break,
                }
            }
            debug!("scheduler loop shut down");
        });

        Self { inner }
    }

    pub fn instance_id(&self) -> String {
        self.lock_instance().instance_id().to_string()
    }

    /// Activate every node that is ready right now. Nodes with no unmet
    /// dependencies begin processing in this same synchronous pass, with
    /// no guaranteed relative order among them. Idempotent: nodes already
    /// processing or completed are left alone.
    pub fn start(&self) {
        let mut instance = self.lock_instance();
        let ready = readiness::find_ready(
            instance.graph().clone().as_ref(),
            instance.states(),
            instance.completed(),
            instance.processing(),
        );
        info!(
            instance_id = instance.instance_id(),
            ready = ready.len(),
            "starting workflow"
        );
        for node_id in ready {
            self.inner
                .activate(&mut instance, &node_id, tokio::time::Instant::now());
        }
    }

    /// Return the instance to all-idle and cancel every pending timer.
    /// The run number is bumped before the timers are aborted, so a finish
    /// message that already made it into the channel is discarded as stale
    /// rather than mutating the freshly reset instance.
    pub fn reset(&self) {
        let mut instance = self.lock_instance();
        let run = instance.reset();
        let instance_id = instance.instance_id().to_string();
        info!(%instance_id, run, "resetting workflow");

        if let Ok(mut timers) = self.inner.timers.lock() {
            for handle in timers.drain(..) {
                handle.abort();
            }
        }

        for node_id in instance.graph().clone().node_ids() {
            self.inner.emit(WorkflowEvent::node_state_changed(
                &instance_id,
                node_id,
                NodeState::Idle,
            ));
        }
        self.inner.emit(WorkflowEvent::workflow_reset(&instance_id));
    }

    /// Move a processing node to `error`. Its dependents never become
    /// ready, so the workflow stalls and the completion callback never
    /// fires; only `reset` recovers the instance.
    pub fn fail_node(&self, node_id: &str) -> bool {
        let mut instance = self.lock_instance();
        if instance.fail(node_id) {
            warn!(
                instance_id = instance.instance_id(),
                node_id, "node failed"
            );
            self.inner.emit(WorkflowEvent::node_state_changed(
                instance.instance_id(),
                node_id,
                NodeState::Error,
            ));
            true
        } else {
            false
        }
    }

    /// Rebuild terminal state from the persistence store: every node goes
    /// straight to `completed`, the completion latch is set, no timers are
    /// scheduled, and the completion callback is not invoked. Per-node
    /// transitions are still emitted so a renderer can paint the final
    /// state.
    pub fn restore_completed(&self) {
        let mut instance = self.lock_instance();
        instance.restore_completed();
        let instance_id = instance.instance_id().to_string();
        info!(%instance_id, "replaying completed workflow from store");
        for node_id in instance.graph().clone().node_ids() {
            self.inner.emit(WorkflowEvent::node_state_changed(
                &instance_id,
                node_id,
                NodeState::Completed,
            ));
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn event_stream(&self) -> BroadcastStream<WorkflowEvent> {
        BroadcastStream::new(self.subscribe())
    }

    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.inner.on_complete.lock() {
            *slot = Some(Arc::new(callback));
        }
    }

    pub fn log(&self) -> EventLog {
        self.inner.log.clone()
    }

    /// Render-ready copy of the per-node states.
    pub fn snapshot(&self) -> std::collections::HashMap<String, NodeState> {
        self.lock_instance().states().clone()
    }

    pub fn completion_fired(&self) -> bool {
        self.lock_instance().completion_fired()
    }

    fn lock_instance(&self) -> std::sync::MutexGuard<'_, WorkflowInstance> {
        self.inner
            .instance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    /// Transition one node to `processing` and schedule its simulated
    /// completion, whose duration counts from `activated_at`. Called with
    /// the instance lock held.
    fn activate(
        &self,
        instance: &mut WorkflowInstance,
        node_id: &str,
        activated_at: tokio::time::Instant,
    ) {
        if !instance.begin_processing(node_id) {
            return;
        }
        debug!(
            instance_id = instance.instance_id(),
            node_id, "node processing"
        );
        self.emit(WorkflowEvent::node_state_changed(
            instance.instance_id(),
            node_id,
            NodeState::Processing,
        ));

        let duration = instance
            .graph()
            .duration_of(node_id)
            .unwrap_or_default();
        let run = instance.run();
        let tx = self.finished_tx.clone();
        let id = node_id.to_string();

        // Even a zero-duration node takes this path, so completion is
        // always observed strictly after activation. The deadline is
        // computed here, not at first poll of the spawned task, so the
        // duration counts from activation.
        let deadline = activated_at + duration;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = tx.send(NodeFinished {
                node_id: id,
                run,
                finished_at: deadline,
            });
        });

        if let Ok(mut timers) = self.timers.lock() {
            timers.retain(|h| !h.is_finished());
            timers.push(handle);
        }
    }

    /// Apply one node completion: mark it completed, cascade-activate
    /// anything it unblocked, then run the completion guard. Everything
    /// through the guard's check-and-set happens under the instance lock;
    /// the callback and completed-event broadcast happen after it is
    /// released so the callback may call back into the engine.
    fn handle_finished(&self, msg: NodeFinished) {
        let fired_for = {
            let mut instance = match self.instance.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            if instance.is_stale(msg.run) {
                debug!(node_id = %msg.node_id, run = msg.run, "stale timer dropped");
                return;
            }
            if !instance.finish(&msg.node_id) {
                // e.g. the node was failed while its timer was pending
                debug!(node_id = %msg.node_id, "ignoring completion for non-processing node");
                return;
            }
            debug!(
                instance_id = instance.instance_id(),
                node_id = %msg.node_id,
                "node completed"
            );
            self.emit(WorkflowEvent::node_state_changed(
                instance.instance_id(),
                &msg.node_id,
                NodeState::Completed,
            ));

            let ready = readiness::find_ready(
                instance.graph().clone().as_ref(),
                instance.states(),
                instance.completed(),
                instance.processing(),
            );
            for node_id in ready {
                self.activate(&mut instance, &node_id, msg.finished_at);
            }

            if instance.try_fire_completion() {
                let instance_id = instance.instance_id().to_string();
                info!(%instance_id, "workflow completed");
                self.store.mark_completed(&instance_id);
                Some(instance_id)
            } else {
                None
            }
        };

        if let Some(instance_id) = fired_for {
            self.emit(WorkflowEvent::workflow_completed(instance_id));
            let callback = self
                .on_complete
                .lock()
                .ok()
                .and_then(|slot| slot.clone());
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        self.log.append(event.clone());
        // nobody listening is fine
        let _ = self.event_tx.send(event);
    }
}
