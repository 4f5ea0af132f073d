//! Rendering engine
//!
//! Rendering runs in three stages over an immutable [`Template`](crate::template::Template):
//!
//! 1. **Bind** - merge supplied parameter values with declared defaults and
//!    pseudo parameters into an [`Environment`]
//! 2. **Evaluate** - resolve intrinsic functions and named conditions lazily,
//!    memoizing conditions for the duration of one render
//! 3. **Build** - walk resources in declaration order, drop the ones whose
//!    condition is false, and assemble a [`RenderedDocument`](crate::document::RenderedDocument)
//!
//! Each render owns its environment and evaluator, so one template can be
//! rendered concurrently from several threads.

mod binder;
mod conditions;
mod config;
mod error;
mod eval;
mod graph;
mod suggest;

pub use binder::{bind, bind_with_config, Environment, Parameters};
pub use conditions::{resolve as resolve_condition, ConditionState};
pub use config::{ConfigError, OutputPolicy, RenderConfig};
pub use error::{EvalError, ParameterError};
pub use eval::{evaluate, Evaluator, PartialGraph};
pub use graph::{build, build_with_config};
pub use suggest::find_similar;
