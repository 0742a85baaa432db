pub mod models;
pub mod utils;

pub use models::scheduler::{
    EarliestDeadlineFirst, EDFVDScheduler, FMCDropScheduler, FMCScheduler, HFMCScheduler,
    Metrics, REDScheduler, Scheduler,
};
pub use models::{Criticality, Task, TaskSet, TimeStep, ID};
pub use utils::constants;
pub use utils::errors::TaskSetError;
pub use utils::lcm::multiple_lcm;
