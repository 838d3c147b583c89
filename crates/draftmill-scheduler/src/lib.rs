pub mod compute;
pub mod job;

pub use compute::*;
pub use job::*;
