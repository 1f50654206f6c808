pub mod evaluator;
pub mod report;

pub use evaluator::*;
pub use report::*;
