/// Top-level generation orchestration.
///
/// `GenerationEngine` owns the shared store, the provider, and the
/// snapshot table, and exposes the three operations callers drive the
/// system with: `generate`, `cancel`, and `spawn_recovery`. `generate`
/// never surfaces an error; every outcome lands on the node itself.
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tracing::{debug, info, warn};

use canvas_graph::{GenerationSettings, NodeId, NodeStatus, NodeStore};

use crate::config::EngineConfig;
use crate::media::MediaProbe;
use crate::providers::GenerationProvider;
use crate::reconcile::Reconciler;
use crate::recovery::{RecoveryHandle, RecoveryPoller};
use crate::resolver::{self, GenerationPlan};
use crate::snapshots::{NodeSnapshot, SnapshotTable};
use crate::variations;

pub struct GenerationEngine {
    store: Arc<NodeStore>,
    provider: Arc<dyn GenerationProvider>,
    reconciler: Arc<Reconciler>,
    snapshots: SnapshotTable,
    config: EngineConfig,
}

impl GenerationEngine {
    pub fn new(
        store: Arc<NodeStore>,
        provider: Arc<dyn GenerationProvider>,
        probe: Arc<dyn MediaProbe>,
        config: EngineConfig,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(store.clone(), probe));
        Self {
            store,
            provider,
            reconciler,
            snapshots: SnapshotTable::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drive one generation for `node_id` to completion. Invalid requests
    /// (unknown node, non-generatable kind, missing prompt) return without
    /// touching the node; every other outcome is written back as Success or
    /// Error. Callers never see a failure from this method.
    pub async fn generate(&self, node_id: NodeId) {
        let graph = self.store.graph();
        let Some(node) = graph.node(node_id) else {
            warn!(node = %node_id, "generate requested for unknown node");
            return;
        };
        let Some(plan) = resolver::resolve(&graph, node, &self.config) else {
            debug!(node = %node_id, kind = ?node.kind, "nothing to generate");
            return;
        };

        self.snapshots.save(node_id, NodeSnapshot::of(node));
        self.store.update(node_id, |node| {
            node.status = NodeStatus::Loading;
            node.generation_start_time = Some(Utc::now());
            node.error_message = None;
        });

        match plan {
            GenerationPlan::SingleImage(request) => {
                let settings = GenerationSettings {
                    prompt: request.prompt.clone(),
                    model: Some(request.model.clone()),
                    aspect_ratio: request.aspect_ratio.clone(),
                    resolution: request.resolution.clone(),
                };
                info!(node = %node_id, model = %request.model, "generating image");
                match self.provider.generate_image(request).await {
                    Ok(result) => {
                        self.reconciler
                            .commit_image_success(node_id, result.urls(), settings, false, None)
                            .await;
                    }
                    Err(e) => self.reconciler.commit_failure(node_id, &e.to_string()),
                }
            }
            GenerationPlan::FanOutImage { request, count } => {
                info!(node = %node_id, model = %request.model, count, "generating image variations");
                variations::run_fan_out(
                    &self.store,
                    &self.provider,
                    &self.reconciler,
                    node_id,
                    request,
                    count,
                )
                .await;
            }
            GenerationPlan::LocalImage(request) => {
                let settings = GenerationSettings {
                    prompt: request.prompt.clone(),
                    model: Some(request.model.clone()),
                    aspect_ratio: request.aspect_ratio.clone(),
                    resolution: request.resolution.clone(),
                };
                info!(node = %node_id, model = %request.model, "generating via local model");
                match self.provider.generate_local_image(request).await {
                    Ok(result) => {
                        self.reconciler
                            .commit_image_success(node_id, result.urls(), settings, false, None)
                            .await;
                    }
                    Err(e) => self.reconciler.commit_failure(node_id, &e.to_string()),
                }
            }
            GenerationPlan::Video(request) => {
                let settings = GenerationSettings {
                    prompt: request.prompt.clone(),
                    model: Some(request.model.clone()),
                    aspect_ratio: request.aspect_ratio.clone(),
                    resolution: request.resolution.clone(),
                };
                info!(node = %node_id, model = %request.model, "generating video");
                match self.provider.generate_video(request).await {
                    Ok(result) => {
                        self.reconciler
                            .commit_video_success(node_id, result.url, settings)
                            .await;
                    }
                    Err(e) => self.reconciler.commit_failure(node_id, &e.to_string()),
                }
            }
        }

        // A settled run supersedes its rollback point.
        self.snapshots.clear(node_id);
    }

    /// Roll the node back to its pre-generation state. Without a snapshot
    /// the node is reset to Idle. The in-flight provider call, if any, is
    /// not chased; its eventual completion finds the node no longer Loading
    /// and its result is simply never asked for again.
    pub fn cancel(&self, node_id: NodeId) {
        match self.snapshots.restore(node_id) {
            Some(snapshot) => {
                info!(node = %node_id, "cancelling; restoring previous state");
                self.store.update(node_id, |node| snapshot.restore_onto(node));
            }
            None => {
                info!(node = %node_id, "cancelling; no snapshot, resetting");
                self.store.update(node_id, NodeSnapshot::reset_onto);
            }
        }
    }

    /// Start the background poller that settles Loading nodes left over
    /// from interrupted sessions.
    pub fn spawn_recovery(&self) -> RecoveryHandle {
        RecoveryPoller::new(
            self.store.clone(),
            self.provider.clone(),
            self.reconciler.clone(),
            Duration::from_secs(self.config.poll_interval_secs),
        )
        .spawn()
    }
}
