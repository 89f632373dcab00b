//! Scalar reverse-mode automatic differentiation, plus a small multi-layer
//! perceptron built from it.
//!
//! ```
//! use microdiff::Value;
//!
//! let x = Value::from(-4.0);
//! let y = x.powi(2) + 3.0 * &x;
//! y.backward();
//! assert_eq!(x.grad(), -5.0);
//! ```

mod engine;
pub use crate::engine::{Operation, Value};

mod nn;
pub use crate::nn::{Layer, Module, Neuron, MLP};

mod graph;
pub use crate::graph::create_graph;

mod error;
pub use crate::error::{ConfigError, DataError, EngineError, RunError};

pub mod config;
pub mod data;
pub mod train;
