mod pipeline;
mod queue;
mod worker;

pub use pipeline::{CommandPipeline, EpitopePipeline};
pub use queue::{JobQueue, JobReceiver, PipelineJob};
pub use worker::Worker;
