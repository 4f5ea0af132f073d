//! Typed template model

use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::ParseError;
use crate::value::Value;

use super::expr::Expression;

/// Pseudo parameters bound by the renderer rather than the caller
pub const PSEUDO_PARAMETERS: &[&str] = &[
    "AWS::AccountId",
    "AWS::NotificationARNs",
    "AWS::Partition",
    "AWS::Region",
    "AWS::StackId",
    "AWS::StackName",
    "AWS::URLSuffix",
];

/// The pseudo parameter that removes the enclosing property
pub const NO_VALUE: &str = "AWS::NoValue";

pub fn is_pseudo_parameter(name: &str) -> bool {
    PSEUDO_PARAMETERS.contains(&name)
}

/// Declared type of a template parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Number,
    NumberList,
    CommaDelimitedList,
    /// Provider-specific string type such as `AWS::EC2::KeyPair::KeyName`
    Provider(String),
    /// Provider-specific list type such as `List<AWS::EC2::Subnet::Id>`
    ProviderList(String),
}

impl ParameterType {
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            ParameterType::NumberList
                | ParameterType::CommaDelimitedList
                | ParameterType::ProviderList(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParameterType::Number | ParameterType::NumberList)
    }
}

impl FromStr for ParameterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "String" => Ok(ParameterType::String),
            "Number" => Ok(ParameterType::Number),
            "List<Number>" => Ok(ParameterType::NumberList),
            "CommaDelimitedList" => Ok(ParameterType::CommaDelimitedList),
            _ => {
                if let Some(inner) = s.strip_prefix("List<").and_then(|r| r.strip_suffix('>')) {
                    if inner.starts_with("AWS::") {
                        return Ok(ParameterType::ProviderList(inner.to_string()));
                    }
                }
                if s.starts_with("AWS::") {
                    return Ok(ParameterType::Provider(s.to_string()));
                }
                Err(format!("unknown parameter type '{}'", s))
            }
        }
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterType::String => write!(f, "String"),
            ParameterType::Number => write!(f, "Number"),
            ParameterType::NumberList => write!(f, "List<Number>"),
            ParameterType::CommaDelimitedList => write!(f, "CommaDelimitedList"),
            ParameterType::Provider(name) => write!(f, "{}", name),
            ParameterType::ProviderList(name) => write!(f, "List<{}>", name),
        }
    }
}

/// Optional value constraints on a parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterConstraints {
    pub allowed_pattern: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Message shown instead of the generic violation text
    pub description: Option<String>,
}

/// A declared template parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParameterType,
    pub default: Option<Value>,
    pub allowed_values: Option<Vec<Value>>,
    pub constraints: ParameterConstraints,
    pub description: Option<String>,
    pub no_echo: bool,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            default: None,
            allowed_values: None,
            constraints: ParameterConstraints::default(),
            description: None,
            no_echo: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

/// A declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub logical_name: String,
    /// Opaque provider type such as `AWS::EC2::VPC`
    pub type_name: String,
    pub properties: IndexMap<String, Expression>,
    /// Name of the gating condition
    pub condition: Option<String>,
    pub depends_on: Vec<String>,
    /// Evaluated like properties when the resource is rendered
    pub metadata: Option<Expression>,
    pub deletion_policy: Option<String>,
    pub update_replace_policy: Option<String>,
}

impl ResourceSpec {
    pub fn new(logical_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            type_name: type_name.into(),
            properties: IndexMap::new(),
            condition: None,
            depends_on: Vec::new(),
            metadata: None,
            deletion_policy: None,
            update_replace_policy: None,
        }
    }
}

/// A declared output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub value: Expression,
    pub description: Option<Expression>,
    pub condition: Option<String>,
    pub export_name: Option<Expression>,
}

/// Two-level lookup tables from the `Mappings` section
pub type MappingTable = IndexMap<String, IndexMap<String, Value>>;

/// A parsed template
///
/// Immutable once loaded; rendering only borrows it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub format_version: Option<String>,
    pub description: Option<String>,
    pub parameters: IndexMap<String, ParameterSpec>,
    pub conditions: IndexMap<String, Expression>,
    pub mappings: IndexMap<String, MappingTable>,
    pub resources: IndexMap<String, ResourceSpec>,
    pub outputs: IndexMap<String, OutputSpec>,
}

impl Template {
    /// Parse a template from YAML or JSON text
    pub fn from_str(source: &str) -> Result<Self, ParseError> {
        super::loader::load(source)
    }

    /// Read and parse a template file
    pub fn from_yaml_file(path: &Path) -> Result<Self, ParseError> {
        let source = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&source)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.get(name)
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Whether a bare `Ref` name resolves against the parameter environment
    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name) || is_pseudo_parameter(name)
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_type_parsing() {
        assert_eq!("String".parse(), Ok(ParameterType::String));
        assert_eq!("List<Number>".parse(), Ok(ParameterType::NumberList));
        assert_eq!(
            "AWS::EC2::KeyPair::KeyName".parse(),
            Ok(ParameterType::Provider("AWS::EC2::KeyPair::KeyName".to_string()))
        );
        assert_eq!(
            "List<AWS::EC2::Subnet::Id>".parse(),
            Ok(ParameterType::ProviderList("AWS::EC2::Subnet::Id".to_string()))
        );
        assert!("Strng".parse::<ParameterType>().is_err());
    }

    #[test]
    fn test_parameter_type_display_roundtrips_list_form() {
        let ty = ParameterType::ProviderList("AWS::EC2::VPC::Id".to_string());
        assert_eq!(ty.to_string(), "List<AWS::EC2::VPC::Id>");
        assert!(ty.is_list());
    }

    #[test]
    fn test_pseudo_parameters_are_parameters() {
        let template = Template::default();
        assert!(template.is_parameter("AWS::Region"));
        assert!(!template.is_parameter("AWS::NoValue"));
        assert!(!template.is_parameter("KeyName"));
    }
}
