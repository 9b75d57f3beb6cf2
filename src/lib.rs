//! # symdd: symbolic decision diagrams over pluggable engines
//!
//! **`symdd`** is a runtime for working with **decision diagrams** as symbolic
//! representations of boolean and value-valued functions over finite-domain variables.
//! It is meant as the symbolic core of model checkers and similar analyses.
//!
//! ## Architecture
//!
//! - **Context-Centric**: All operations go through a [`Context`][crate::context::Context],
//!   which owns two backends: a *binary* engine for boolean diagrams and a *multi-terminal*
//!   engine for diagrams with integer, real or enum leaves.
//!   Results move between the two transparently.
//! - **Explicit Ownership**: Diagrams are lightweight [`Dd`][crate::dd::Dd] handles.
//!   Every operation returns a new owned handle that must eventually be released.
//!   With leak checking enabled, [`Context::close`][crate::context::Context::close] reports
//!   every handle that is still alive, together with the place where it was created.
//! - **Generic Fallback**: Operators the backend does not natively support are evaluated
//!   by a Shannon expansion over the operands, see [`Context::apply_generic`][crate::context::Context::apply_generic].
//! - **Finite-Domain Variables**: [`VariableDd`][crate::variable::VariableDd] encodes booleans,
//!   bounded integers and enumerations as groups of diagram bits, with several copies
//!   (for example current and next state).
//!
//! ## Basic Usage
//!
//! ```rust
//! use symdd::context::Context;
//! use symdd::options::DdOptions;
//!
//! // 1. Initialize the context
//! let ctx = Context::new(DdOptions::default().with_leak_check(true)).unwrap();
//!
//! // 2. Create variables (0-indexed)
//! let x = ctx.variable(ctx.new_dd_variable().unwrap()).unwrap();
//! let y = ctx.variable(ctx.new_dd_variable().unwrap()).unwrap();
//!
//! // 3. Build a formula: f = x AND (NOT y)
//! let not_y = ctx.not(y).unwrap();
//! let f = ctx.and(x, not_y).unwrap();
//!
//! // 4. Count the models over {x, y}
//! let cube = ctx.list_to_cube(&[x, y]).unwrap();
//! assert_eq!(ctx.count_sat(f, cube).unwrap(), 1u32.into());
//!
//! // 5. Release what we own and shut down
//! ctx.release_all(&[not_y, f, cube]).unwrap();
//! ctx.close().unwrap();
//! ```
//!
//! ## Core Components
//!
//! - **[`context`]**: The [`Context`][crate::context::Context] and its apply, conversion and abstraction operations.
//! - **[`backend`]**: The engine interface and the two bundled engines.
//! - **[`walker`]** and **[`support_walker`]**: Read-only traversal of diagrams.
//! - **[`variable`]**: Finite-domain variables encoded in diagram bits.
//! - **[`sat`]**: Cubes, supports, model counting and folds over satisfying assignments.
//! - **[`arith`]**: Two's-complement arithmetic over lists of boolean diagrams.
//! - **[`dot`]**: Utilities for visualizing diagrams using Graphviz.

pub mod arith;
pub mod backend;
pub mod cache;
pub mod context;
pub mod dd;
pub mod dot;
pub mod error;
mod generic;
pub mod operator;
pub mod ops;
pub mod options;
pub mod permutation;
pub mod reference;
pub mod sat;
pub mod support_walker;
pub mod table;
pub mod types;
pub mod utils;
pub mod variable;
pub mod walker;
