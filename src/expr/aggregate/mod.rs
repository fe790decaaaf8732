pub mod aggregate;
mod average;
mod count;
mod count_distinct;
mod sum;

pub use aggregate::*;
pub use average::*;
pub use count::*;
pub use count_distinct::*;
pub use sum::*;
