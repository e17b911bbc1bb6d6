//! ZQL Core - value, record and error types shared by the ZQL dataflow engine.
//!
//! This crate provides the foundational types that flow through ZQL queries:
//!
//! - `Value`: A dynamically typed cell value (Null, Boolean, Int64, Float64, String, Record)
//! - `Record`: An ordered map of field names to values, the row type of record queries
//! - `predicate`: Comparison operators (`= < > >= <= IN LIKE ILIKE`) used by `where` clauses
//! - `Error`: Error type for every engine operation
//!
//! # Example
//!
//! ```rust
//! use zql_core::{Record, Value};
//! use zql_core::predicate::{Operand, SimpleOperator};
//!
//! let issue = Record::new()
//!     .with("id", "a")
//!     .with("priority", 101i64);
//!
//! let op = SimpleOperator::parse(">").unwrap();
//! let operand = Operand::scalar(100i64);
//! assert!(op.evaluate(issue.get("priority").unwrap(), &operand).unwrap());
//! assert_eq!(issue.id(), Some(&Value::from("a")));
//! ```

mod error;
pub mod predicate;
mod record;
mod value;

pub use error::{Error, Result};
pub use record::{Record, ID_FIELD};
pub use value::Value;
