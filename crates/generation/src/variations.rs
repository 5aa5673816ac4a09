/// Variation orchestrator
///
/// Fan-out: K independent single-variation attempts issued concurrently,
/// each settling into its own slot as it completes. Fan-in: a settle-all
/// join barrier, then one terminal reconciliation. A failed attempt never
/// cancels its siblings.
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use canvas_graph::{GenerationSettings, NodeId, NodeStore, SlotStatus, VariationSlot};

use crate::providers::{GenerationProvider, ImageRequest};
use crate::reconcile::{Reconciler, PARTIAL_FAILURE_NOTE, TOTAL_FAILURE_MESSAGE};

pub async fn run_fan_out(
    store: &Arc<NodeStore>,
    provider: &Arc<dyn GenerationProvider>,
    reconciler: &Reconciler,
    node_id: NodeId,
    request: ImageRequest,
    count: u32,
) {
    let count = count.max(1) as usize;

    // The slots double as live progress when the node has no prior carousel;
    // on a re-generation the old carousel stays visible (face-image
    // resolution ignores slots until one succeeds) and they update silently.
    store.update(node_id, |node| {
        node.image_variations = Some(vec![VariationSlot::generating(); count]);
    });

    let mut attempts: JoinSet<(usize, Result<String, String>)> = JoinSet::new();
    for slot in 0..count {
        let provider = Arc::clone(provider);
        let request = request.clone();
        attempts.spawn(async move {
            let outcome = provider
                .generate_image(request)
                .await
                .map(|r| r.url)
                .map_err(|e| e.to_string());
            (slot, outcome)
        });
    }

    // Slot updates land in completion order; consolidation waits for all.
    while let Some(joined) = attempts.join_next().await {
        let (slot, outcome) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                warn!(node = %node_id, error = %e, "variation task panicked");
                continue;
            }
        };
        store.update(node_id, |node| {
            if let Some(slots) = node.image_variations.as_mut() {
                if let Some(entry) = slots.get_mut(slot) {
                    *entry = match &outcome {
                        Ok(url) => VariationSlot {
                            status: SlotStatus::Success,
                            url: Some(url.clone()),
                        },
                        Err(_) => VariationSlot {
                            status: SlotStatus::Failed,
                            url: None,
                        },
                    };
                }
            }
        });
        if let Err(e) = &outcome {
            debug!(node = %node_id, slot, error = %e, "variation attempt failed");
        }
    }

    // Terminal reconciliation, in slot order.
    let succeeded: Vec<String> = store
        .get(node_id)
        .and_then(|n| n.image_variations)
        .map(|slots| {
            slots
                .into_iter()
                .filter_map(|s| if s.is_success() { s.url } else { None })
                .collect()
        })
        .unwrap_or_default();

    if succeeded.is_empty() {
        reconciler.apply_error(node_id, TOTAL_FAILURE_MESSAGE.to_string());
        return;
    }

    let advisory = (succeeded.len() < count).then_some(PARTIAL_FAILURE_NOTE);
    let settings = GenerationSettings {
        prompt: request.prompt.clone(),
        model: Some(request.model.clone()),
        aspect_ratio: request.aspect_ratio.clone(),
        resolution: request.resolution.clone(),
    };
    reconciler
        .commit_image_success(node_id, succeeded, settings, true, advisory)
        .await;
}
