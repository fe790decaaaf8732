pub mod attribute;
pub mod binary;
pub mod cast;
pub mod conditional;
pub mod generator;
pub mod literal;
pub mod misc;
pub mod null;
pub mod physical_expr;
pub mod planner;
pub mod predicate;
pub mod projection;

pub use attribute::*;
pub use binary::*;
pub use cast::*;
pub use conditional::*;
pub use generator::*;
pub use literal::*;
pub use misc::*;
pub use null::*;
pub use physical_expr::*;
pub use planner::*;
pub use predicate::*;
pub use projection::*;
