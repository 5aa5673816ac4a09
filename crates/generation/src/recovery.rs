/// Recovery poller
///
/// After a reload the in-session futures are gone but provider work may
/// still be running. The poller recomputes the set of Loading nodes every
/// cycle and asks the status endpoint about each one; it owns no
/// subscription list and stops caring about a node the moment its status
/// leaves Loading.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use canvas_graph::{GenerationSettings, NodeId, NodeStore};

use crate::providers::{GenerationProvider, ResultKind, StatusState};
use crate::reconcile::{Reconciler, GENERIC_FAILURE};
use crate::resolver;

pub struct RecoveryPoller {
    store: Arc<NodeStore>,
    provider: Arc<dyn GenerationProvider>,
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

/// Handle to a running poll loop; dropping it without `shutdown` leaves the
/// loop running until the runtime stops.
pub struct RecoveryHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RecoveryHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    pub fn abort(self) {
        self.task.abort();
    }
}

impl RecoveryPoller {
    pub fn new(
        store: Arc<NodeStore>,
        provider: Arc<dyn GenerationProvider>,
        reconciler: Arc<Reconciler>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            reconciler,
            interval,
        }
    }

    /// Start the loop: one immediate pass, then one per interval.
    pub fn spawn(self) -> RecoveryHandle {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.poll_once().await,
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            info!("recovery poller shutting down");
                            return;
                        }
                    }
                }
            }
        });
        RecoveryHandle { shutdown: tx, task }
    }

    /// One reconciliation pass over every node currently in Loading.
    pub async fn poll_once(&self) {
        for node_id in self.store.graph().loading_ids() {
            self.poll_node(node_id).await;
        }
    }

    async fn poll_node(&self, node_id: NodeId) {
        let status = match self.provider.generation_status(node_id).await {
            Ok(status) => status,
            // Transport failures never mark the node Error; retry next cycle.
            Err(e) => {
                debug!(node = %node_id, error = %e, "status poll failed; will retry");
                return;
            }
        };

        match status.state {
            StatusState::Pending => {}
            StatusState::Error => {
                self.reconciler.commit_failure(
                    node_id,
                    status.error.as_deref().unwrap_or(GENERIC_FAILURE),
                );
            }
            StatusState::Success => {
                let graph = self.store.graph();
                let Some(node) = graph.node(node_id) else {
                    return;
                };
                // Freshness guard: a result produced before this node's
                // current generation began belongs to a superseded run.
                if let (Some(started), Some(created)) =
                    (node.generation_start_time, status.created_at)
                {
                    if created < started {
                        debug!(node = %node_id, "discarding stale recovery result");
                        return;
                    }
                }
                let Some(url) = status.url else {
                    debug!(node = %node_id, "success status without result reference; ignoring");
                    return;
                };
                // The same composed prompt the dispatch would have carried.
                let settings = GenerationSettings {
                    prompt: resolver::combined_prompt(&graph, node),
                    model: node.video_model.clone().or_else(|| node.image_model.clone()),
                    aspect_ratio: node.aspect_ratio.clone(),
                    resolution: node.resolution.clone(),
                };
                match status.kind {
                    Some(ResultKind::Video) => {
                        self.reconciler
                            .commit_video_success(node_id, url, settings)
                            .await;
                    }
                    _ => {
                        self.reconciler
                            .commit_image_success(node_id, vec![url], settings, false, None)
                            .await;
                    }
                }
            }
        }
    }
}
