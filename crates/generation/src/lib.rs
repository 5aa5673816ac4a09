/// Generation orchestration for the node canvas
///
/// Turns a node and its upstream graph into provider calls, settles the
/// results back onto the node, and keeps interrupted runs recoverable.

pub mod config;
pub mod engine;
pub mod media;
pub mod models;
pub mod providers;
pub mod reconcile;
pub mod recovery;
pub mod resolver;
pub mod snapshots;
pub mod variations;

pub use config::EngineConfig;
pub use engine::GenerationEngine;
pub use media::{HttpMediaProbe, MediaProbe, MockProbe, ProbeError};
pub use models::ModelFamilies;
pub use providers::http::{HttpProvider, HttpProviderConfig};
pub use providers::mock::MockProvider;
pub use providers::{
    GenerationProvider, ImageRequest, ImageResult, LocalModelRequest, ProviderError, ResultKind,
    StatusResponse, StatusState, VideoRequest, VideoResult,
};
pub use reconcile::Reconciler;
pub use recovery::{RecoveryHandle, RecoveryPoller};
pub use resolver::GenerationPlan;
pub use snapshots::{NodeSnapshot, SnapshotTable};
