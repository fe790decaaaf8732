pub mod aggregate;
pub mod conditional;
pub mod expr;
pub mod expr_fn;
pub mod generator;
pub mod misc;
mod operation;
pub mod tree_node;

pub use conditional::*;
pub use expr::*;
pub use expr_fn::*;
pub use generator::*;
pub use misc::*;
