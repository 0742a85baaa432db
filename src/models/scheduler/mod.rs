pub mod edf;
pub mod edf_vd;
pub mod fmc;
pub mod fmc_drop;
pub mod h_fmc;
pub mod red;
pub mod scheduler;

pub use edf::EarliestDeadlineFirst;
pub use edf_vd::EDFVDScheduler;
pub use fmc::FMCScheduler;
pub use fmc_drop::FMCDropScheduler;
pub use h_fmc::HFMCScheduler;
pub use red::REDScheduler;
pub use scheduler::{Metrics, Scheduler};
