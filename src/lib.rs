//! Stack Render - render declarative infrastructure templates
//!
//! This library loads CloudFormation-style templates, binds parameter values,
//! evaluates conditions and intrinsic functions, and produces a concrete
//! document of the resources and outputs that would be deployed.
//!
//! # Example
//!
//! ```rust
//! use stack_render::{render_source, Parameters, Value};
//!
//! let mut params = Parameters::new();
//! params.insert("KeyName".to_string(), Value::from("your-key-name"));
//!
//! let document = render_source(r#"
//! Parameters:
//!   KeyName:
//!     Type: AWS::EC2::KeyPair::KeyName
//! Resources:
//!   WebServer:
//!     Type: AWS::EC2::Instance
//!     Properties:
//!       KeyName: !Ref KeyName
//! "#, &params).unwrap();
//!
//! assert!(document.contains_resource("WebServer"));
//! ```

pub mod document;
pub mod error;
pub mod render;
pub mod template;
pub mod value;

pub use document::{RenderedDocument, RenderedExport, RenderedOutput, RenderedResource};
pub use error::ParseError;
pub use render::{EvalError, OutputPolicy, ParameterError, Parameters, RenderConfig};
pub use template::{Template, TemplateCache};
pub use value::{Map, Value};

use thiserror::Error;
use tracing::debug;

/// Errors that can occur during the render pipeline
#[derive(Debug, Error)]
pub enum RenderError {
    /// Error while loading the template
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error while binding parameters
    #[error("parameter error: {0}")]
    Parameter(#[from] ParameterError),

    /// Error while evaluating a resource, output or condition
    #[error("{location}: {source}")]
    Eval {
        location: String,
        #[source]
        source: EvalError,
    },
}

impl RenderError {
    pub fn eval(location: impl Into<String>, source: EvalError) -> Self {
        Self::Eval {
            location: location.into(),
            source,
        }
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }

    pub fn parameter_error(&self) -> Option<&ParameterError> {
        match self {
            Self::Parameter(e) => Some(e),
            _ => None,
        }
    }

    pub fn eval_error(&self) -> Option<&EvalError> {
        match self {
            Self::Eval { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Render a template with default configuration
///
/// This is the main entry point for the library. It binds `params` against
/// the declared parameters and builds the rendered document.
pub fn render(template: &Template, params: &Parameters) -> Result<RenderedDocument, RenderError> {
    render_with_config(template, params, &RenderConfig::default())
}

/// Render a template with custom configuration
///
/// # Example
///
/// ```rust
/// use stack_render::{render_with_config, Parameters, RenderConfig, Template, Value};
///
/// let template = Template::from_str(r#"
/// Resources:
///   Bucket:
///     Type: AWS::S3::Bucket
///     Properties:
///       BucketName: !Sub "${AWS::StackName}-${AWS::Region}"
/// "#).unwrap();
///
/// let config = RenderConfig::new().with_region("eu-west-1").with_stack_name("finance");
/// let document = render_with_config(&template, &Parameters::new(), &config).unwrap();
///
/// let bucket = document.resource("Bucket").unwrap();
/// assert_eq!(bucket.property("BucketName"), Some(&Value::from("finance-eu-west-1")));
/// ```
pub fn render_with_config(
    template: &Template,
    params: &Parameters,
    config: &RenderConfig,
) -> Result<RenderedDocument, RenderError> {
    let env = render::bind_with_config(&template.parameters, params, config)?;
    debug!(bound = env.len(), region = %config.region, "bound parameters");
    render::build_with_config(template, &env, config)
}

/// Load template source text and render it with default configuration
pub fn render_source(source: &str, params: &Parameters) -> Result<RenderedDocument, RenderError> {
    let template = Template::from_str(source)?;
    render(&template, params)
}
