//! # qail-criteria
//!
//! > **Build the statement, not the string.**
//!
//! A typed statement AST with grammar-position builders, a dialect-aware SQL
//! renderer, and a splitter that turns DML on inheritance-mapped tables into
//! coordinated pairs of physical statements.
//!
//! ## Quick Example
//!
//! ```rust
//! use qail_criteria::prelude::*;
//!
//! let users = TableMeta::builder("users")
//!     .generated_key("id", SqlType::BigInt)
//!     .field("email", SqlType::Varchar(255))
//!     .field("active", SqlType::Boolean)
//!     .build()
//!     .unwrap();
//!
//! let compiled = select([col("id"), col("email")])
//!     .from(table(&users))
//!     .where_(col("active").eq(true))
//!     .limit(10)
//!     .compile(&Dialect::postgres())
//!     .unwrap();
//!
//! let stmt = compiled.single().unwrap();
//! assert_eq!(stmt.sql, "SELECT id, email FROM users WHERE active = $1 LIMIT 10");
//! assert_eq!(stmt.params[0].value, Value::Bool(true));
//! ```
//!
//! ## Pipeline
//!
//! | Stage      | Module        | Output                          |
//! |------------|---------------|---------------------------------|
//! | Build      | [`builder`]   | [`ast::Statement`]              |
//! | Resolve    | [`context`]   | bound column references         |
//! | Render     | [`render`]    | [`Compiled`] (`Stmt`, batch)    |
//! | Split      | [`split`]     | [`PairStmt`] for child tables   |
//! | Execute    | [`exec`]      | validated [`ExecOutcome`] pairs |

pub mod ast;
pub mod builder;
pub mod context;
pub mod dialect;
pub mod error;
pub mod exec;
pub mod render;
pub mod split;

pub use context::ContextStack;
pub use dialect::{Dialect, DialectConfig, MySqlVersion};
pub use error::{BuildError, ConsistencyFault, QailError, QailResult, RenderError, SplitError};
pub use exec::{execute_compiled, execute_pair, ExecOutcome, StmtExecutor};
pub use render::{compile, BatchStmt, BindValue, Compiled, Stmt, StmtFlags};
pub use split::{Linkage, PairStmt};

pub mod prelude {
    pub use crate::ast::builders::*;
    pub use crate::ast::*;
    pub use crate::builder::*;
    pub use crate::context::ContextStack;
    pub use crate::dialect::{Dialect, MySqlVersion};
    pub use crate::error::*;
    pub use crate::render::{compile, Compiled, Stmt};
    pub use crate::split::{Linkage, PairStmt};
}
