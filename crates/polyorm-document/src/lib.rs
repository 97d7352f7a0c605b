//! Document-store backend: compiles filters to the N1QL-style query dialect
//! and executes them through a `DocumentDriver`.

pub mod backend;
pub mod compiler;
pub mod driver;
pub mod operation;

pub use backend::DocumentBackend;
pub use compiler::{DocumentCompiler, DocumentExpression};
pub use driver::{ConsistencyLevel, DocumentDriver, SubDocMutation};
pub use operation::DocumentOperationService;
