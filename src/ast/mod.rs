//! Clause nodes and statement AST.

pub mod builders;
pub mod expr;
pub mod meta;
pub mod predicate;
pub mod stmt;
pub mod table;
pub mod types;
pub mod values;
pub mod visit;
pub mod window;

pub use expr::*;
pub use meta::*;
pub use predicate::*;
pub use stmt::*;
pub use table::*;
pub use types::*;
pub use values::*;
pub use window::*;
