//! Task execution bridge.
//!
//! A task is a class with a single instance method `apply` taking one
//! argument and returning a value. [`invoke`] loads the class in a node,
//! marshals the host input into the node's namespace, runs the method under
//! the node's cost and stack limits and marshals the result back. Everything
//! that goes wrong inside the sandbox is reported in the
//! [`ExecutionSummary`]; only hierarchy misuse is returned as an error.

mod executor;
mod marshal;
mod summary;

pub use executor::{invoke, TASK_METHOD};
pub use marshal::{to_host, to_sandbox, MAX_MARSHAL_DEPTH};
pub use summary::{ExecutionFailure, ExecutionSummary, HostValue};
