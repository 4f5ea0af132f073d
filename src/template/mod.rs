//! Template model and loading
//!
//! This module turns declarative template text into an immutable [`Template`]:
//! typed parameters, named conditions, mapping tables, resources and outputs,
//! with every intrinsic function lifted into an [`Expression`] tree.
//!
//! # Example
//!
//! ```rust
//! use stack_render::template::Template;
//!
//! let template = Template::from_str(r#"
//! Resources:
//!   Topic:
//!     Type: AWS::SNS::Topic
//! "#).unwrap();
//!
//! assert!(template.has_resource("Topic"));
//! ```

mod cache;
mod expr;
mod loader;
mod model;

pub use cache::TemplateCache;
pub use expr::{parse_sub_string, ConditionKind, Expression, SubPart};
pub use loader::{load, load_values};
pub use model::{
    is_pseudo_parameter, MappingTable, OutputSpec, ParameterConstraints, ParameterSpec,
    ParameterType, ResourceSpec, Template, NO_VALUE, PSEUDO_PARAMETERS,
};
