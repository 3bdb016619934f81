//! Pipeline components: channels, assembly workers, sync orchestration.

pub mod context;
pub mod orchestrator;
pub mod workers;

pub use context::{AssemblyResult, PipelineChannels, PipelineHandles, create_pipeline_channels};
pub use orchestrator::{
    refetch_item, run_content_sync, run_identity_sync, shutdown_pipeline, start_pipeline,
};
pub use workers::spawn_assembly_workers;
