pub mod execute;
pub mod jobs;
pub mod pipeline;
