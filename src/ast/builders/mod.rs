//! Free-function builders for expressions and predicates.

mod conditions;
mod functions;
mod literals;

pub use conditions::*;
pub use functions::*;
pub use literals::*;
