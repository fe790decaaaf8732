pub mod analyzer;
pub mod function_registry;
pub mod rules;
pub mod type_coercion;

pub use analyzer::*;
pub use function_registry::*;
pub use rules::*;
pub use type_coercion::*;
