pub mod constants;
pub mod errors;
pub mod lcm;

pub use constants::PolicyKind;
pub use errors::TaskSetError;
pub use lcm::multiple_lcm;
