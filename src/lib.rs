pub mod conc;
pub mod error;
pub mod math;
pub mod node;
pub mod prelude;
pub mod stirling;
pub mod store;
pub mod tree;

pub use crate::error::Error;
pub use crate::tree::{ProbabilityTree, TyingStrategy};
