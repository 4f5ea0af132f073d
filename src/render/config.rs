//! Configuration for rendering

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::value::Value;

/// Errors that can occur when loading a render configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// What to do with an output that references a condition-excluded resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPolicy {
    /// Leave the output out of the rendered document
    #[default]
    Skip,
    /// Fail the render with `EvalError::UnresolvedOutput`
    Fail,
}

/// Configuration options for a render
///
/// Supplies the values of pseudo parameters and of exports visible to
/// `Fn::ImportValue`. None of it is looked up from the environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub region: String,
    pub account_id: String,
    pub stack_name: String,
    /// Synthesized from the other fields when unset
    pub stack_id: Option<String>,
    pub partition: String,
    pub url_suffix: String,
    pub notification_arns: Vec<String>,
    /// Export name -> value for `Fn::ImportValue`
    pub imports: IndexMap<String, String>,
    pub excluded_output_policy: OutputPolicy,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
            stack_name: "stack".to_string(),
            stack_id: None,
            partition: "aws".to_string(),
            url_suffix: "amazonaws.com".to_string(),
            notification_arns: Vec::new(),
            imports: IndexMap::new(),
            excluded_output_policy: OutputPolicy::Skip,
        }
    }
}

impl RenderConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string; missing keys keep their defaults
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_stack_name(mut self, stack_name: impl Into<String>) -> Self {
        self.stack_name = stack_name.into();
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Make an export visible to `Fn::ImportValue`
    pub fn with_import(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.imports.insert(name.into(), value.into());
        self
    }

    pub fn with_output_policy(mut self, policy: OutputPolicy) -> Self {
        self.excluded_output_policy = policy;
        self
    }

    pub fn stack_id(&self) -> String {
        self.stack_id.clone().unwrap_or_else(|| {
            format!(
                "arn:{}:cloudformation:{}:{}:stack/{}/00000000-0000-0000-0000-000000000000",
                self.partition, self.region, self.account_id, self.stack_name
            )
        })
    }

    /// Values bound to the pseudo parameters
    pub fn pseudo_parameters(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("AWS::AccountId", Value::string(&self.account_id)),
            (
                "AWS::NotificationARNs",
                Value::string_list(self.notification_arns.iter().cloned()),
            ),
            ("AWS::Partition", Value::string(&self.partition)),
            ("AWS::Region", Value::string(&self.region)),
            ("AWS::StackId", Value::string(self.stack_id())),
            ("AWS::StackName", Value::string(&self.stack_name)),
            ("AWS::URLSuffix", Value::string(&self.url_suffix)),
        ]
    }
}
