//! The worker's control loop.
//!
//! One task is in flight at a time, by design: the provider meters requests
//! per user token, and serial processing bounds outbound volume without a
//! separate limiter. The loop alternates between `Idle` (polling the queue)
//! and `Processing` (driving one task through the workflow), with a short
//! cooldown after every task and a longer sleep when the queue is empty.
//!
//! The timed poll is the load-bearing pickup mechanism. Change
//! notifications and front-end messages only shorten the latency between a
//! task appearing and the next poll; losing them costs latency, never
//! correctness.
//!
//! A crash during processing leaves the task locked. The loop does **not**
//! resume locked tasks on restart - automatic resumption risks
//! double-submission of partially completed paginated fetches; recovering
//! abandoned locks belongs to an out-of-band reaper.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::DispatchConfig;
use crate::provider::SeriesApi;
use crate::queue::{ChangeNotifier, QueueEvent, QueueStore};
use crate::types::{Namespace, SessionId};

use super::message::WorkerMessage;
use super::processor::TaskProcessor;

/// Outcome of one pickup attempt, deciding the next sleep.
enum Attempt {
    /// A task was processed (successfully or not); cool down briefly.
    Processed,
    /// Nothing queued; sleep the full poll interval.
    Idle,
}

/// The worker's dispatch loop for one namespace.
pub struct DispatchLoop<A> {
    store: QueueStore,
    namespace: Namespace,
    processor: TaskProcessor<A>,
    config: DispatchConfig,
}

impl<A: SeriesApi> DispatchLoop<A> {
    pub fn new(
        store: QueueStore,
        namespace: Namespace,
        processor: TaskProcessor<A>,
        config: DispatchConfig,
    ) -> Self {
        DispatchLoop {
            store,
            namespace,
            processor,
            config,
        }
    }

    /// Runs the loop until shutdown.
    ///
    /// * `messages` - front-end commands; closing the channel stops the
    ///   loop, so a caller with no front end must keep a sender alive.
    /// * `notifier` - optional change notifications; `None` falls back to
    ///   pure polling.
    /// * `shutdown` - cooperative stop after the current task.
    #[instrument(skip_all, fields(namespace = %self.namespace))]
    pub async fn run(
        self,
        mut messages: mpsc::Receiver<WorkerMessage>,
        mut notifier: Option<ChangeNotifier>,
        shutdown: CancellationToken,
    ) -> crate::queue::store::Result<()> {
        self.store.init(&self.namespace)?;
        info!("dispatch loop started");

        // Zero wait on entry: pick up any backlog left from a previous run
        // before settling into the poll rhythm.
        let mut wait = Duration::ZERO;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown signal received");
                    break;
                }

                message = messages.recv() => match message {
                    Some(WorkerMessage::Create { session_id, data }) => {
                        self.handle_create(session_id, data);
                    }
                    Some(WorkerMessage::Shutdown) => {
                        info!("shutdown message received");
                        break;
                    }
                    None => {
                        info!("message channel closed");
                        break;
                    }
                },

                event = next_event(&mut notifier) => match event {
                    Some(event) => {
                        trace!(path = %event.path.display(), kind = ?event.kind, "queue change observed");
                        // A Created event means the next poll will find
                        // work; fall through and poll now instead of
                        // waiting out the interval.
                    }
                    None => {
                        warn!("change notifier stopped; relying on polling");
                        notifier = None;
                    }
                },

                _ = tokio::time::sleep(wait) => {}
            }

            wait = match self.attempt_next().await {
                Attempt::Processed => self.config.cooldown,
                Attempt::Idle => self.config.poll_interval,
            };
        }

        info!("dispatch loop stopped");
        Ok(())
    }

    /// Creates a queue entry for a front-end `create` command. Failures are
    /// logged; there is no reply channel.
    fn handle_create(&self, session_id: SessionId, data: serde_json::Value) {
        let payload = match data {
            serde_json::Value::Object(map) => map,
            other => {
                warn!(session = %session_id, "create message data is not an object: {other}");
                return;
            }
        };

        match self.store.create(&self.namespace, &session_id, payload) {
            Ok(task) => info!(task = %task, "created task"),
            Err(error) => error!(session = %session_id, %error, "failed to create task"),
        }
    }

    /// Polls the queue and processes at most one task.
    ///
    /// Per-task failures are logged with the session identifier and leave
    /// the record locked; they never crash the loop.
    async fn attempt_next(&self) -> Attempt {
        let task = match self.store.find_next_task(&self.namespace) {
            Ok(Some(task)) => task,
            Ok(None) => return Attempt::Idle,
            Err(error) => {
                error!(%error, "queue poll failed");
                return Attempt::Idle;
            }
        };

        debug!(task = %task, "picked up task");
        match self.processor.process(&task).await {
            Ok(()) => {
                info!(task = %task, session = %task.session(), "task completed");
            }
            Err(error) => {
                error!(
                    task = %task,
                    session = %task.session(),
                    %error,
                    "task failed; record left locked for inspection"
                );
            }
        }
        Attempt::Processed
    }
}

/// Resolves to the notifier's next event, or never if there is no notifier.
async fn next_event(notifier: &mut Option<ChangeNotifier>) -> Option<QueueEvent> {
    match notifier {
        Some(notifier) => notifier.next().await,
        None => std::future::pending().await,
    }
}
