mod conductor;
mod error;
mod loops;
mod pool;
mod task;

pub use conductor::Conductor;
pub use error::ConductorError;
pub use pool::WorkerPool;
pub use task::{Task, TaskManager};
