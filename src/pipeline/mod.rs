pub mod assembler;
pub mod chunk_pipeline;
pub mod resolver;
pub mod step_size;

pub use assembler::ResultAssembler;
pub use chunk_pipeline::{BranchRequest, ChunkPipeline, Notification, PipelineOutput};
pub use resolver::{
    ExpressionContext, ExpressionResolver, ExpressionSpec, Expressions, Resolution,
};
pub use step_size::{memory_size, num_entries_for, regularize_step_size, StepSize};
