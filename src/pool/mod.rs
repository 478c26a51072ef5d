pub mod executor;
pub mod scheduler;

pub use executor::{Executor, Task, TrivialExecutor};
pub use scheduler::ThreadPool;
