//! Rendered documents
//!
//! The output of a render: every included resource with its properties fully
//! evaluated, and every emitted output. Serialization keeps declaration order
//! and the template's own section and key names.

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::{Map, Value};

/// A resource after evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedResource {
    #[serde(rename = "Type")]
    pub type_name: String,
    #[serde(rename = "Properties", skip_serializing_if = "Map::is_empty")]
    pub properties: Map,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "Metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

impl RenderedResource {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            metadata: None,
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("Type".to_string(), Value::string(&self.type_name));
        if !self.properties.is_empty() {
            map.insert("Properties".to_string(), Value::Map(self.properties.clone()));
        }
        if !self.depends_on.is_empty() {
            map.insert(
                "DependsOn".to_string(),
                Value::string_list(self.depends_on.iter().cloned()),
            );
        }
        if let Some(metadata) = &self.metadata {
            map.insert("Metadata".to_string(), metadata.clone());
        }
        if let Some(policy) = &self.deletion_policy {
            map.insert("DeletionPolicy".to_string(), Value::string(policy));
        }
        if let Some(policy) = &self.update_replace_policy {
            map.insert("UpdateReplacePolicy".to_string(), Value::string(policy));
        }
        Value::Map(map)
    }
}

/// Export block of an output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedExport {
    #[serde(rename = "Name")]
    pub name: Value,
}

/// An output after evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedOutput {
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(rename = "Export", skip_serializing_if = "Option::is_none")]
    pub export: Option<RenderedExport>,
}

impl RenderedOutput {
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("Value".to_string(), self.value.clone());
        if let Some(description) = &self.description {
            map.insert("Description".to_string(), description.clone());
        }
        if let Some(export) = &self.export {
            let mut block = Map::new();
            block.insert("Name".to_string(), export.name.clone());
            map.insert("Export".to_string(), Value::Map(block));
        }
        Value::Map(map)
    }
}

/// The concrete result of rendering a template
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedDocument {
    #[serde(rename = "AWSTemplateFormatVersion", skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, RenderedResource>,
    #[serde(rename = "Outputs", skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, RenderedOutput>,
}

impl RenderedDocument {
    pub fn contains_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn resource(&self, name: &str) -> Option<&RenderedResource> {
        self.resources.get(name)
    }

    pub fn output(&self, name: &str) -> Option<&RenderedOutput> {
        self.outputs.get(name)
    }

    /// Included resource names in declaration order
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// The whole document as a single value tree
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(version) = &self.format_version {
            map.insert("AWSTemplateFormatVersion".to_string(), Value::string(version));
        }
        if let Some(description) = &self.description {
            map.insert("Description".to_string(), Value::string(description));
        }
        let resources = self
            .resources
            .iter()
            .map(|(name, resource)| (name.clone(), resource.to_value()))
            .collect();
        map.insert("Resources".to_string(), Value::Map(resources));
        if !self.outputs.is_empty() {
            let outputs = self
                .outputs
                .iter()
                .map(|(name, output)| (name.clone(), output.to_value()))
                .collect();
            map.insert("Outputs".to_string(), Value::Map(outputs));
        }
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn document() -> RenderedDocument {
        let mut vpc = RenderedResource::new("AWS::EC2::VPC");
        vpc.properties
            .insert("CidrBlock".to_string(), Value::from("10.0.0.0/16"));
        let mut subnet = RenderedResource::new("AWS::EC2::Subnet");
        subnet
            .properties
            .insert("VpcId".to_string(), Value::from("FinanceVPC"));
        subnet.depends_on.push("FinanceVPC".to_string());

        let mut document = RenderedDocument {
            format_version: Some("2010-09-09".to_string()),
            ..Default::default()
        };
        document.resources.insert("FinanceVPC".to_string(), vpc);
        document.resources.insert("PublicSubnet1".to_string(), subnet);
        document.outputs.insert(
            "VpcId".to_string(),
            RenderedOutput {
                value: Value::from("FinanceVPC"),
                description: None,
                export: Some(RenderedExport {
                    name: Value::from("stack-VpcId"),
                }),
            },
        );
        document
    }

    #[test]
    fn test_lookup_helpers() {
        let document = document();
        assert!(document.contains_resource("FinanceVPC"));
        assert!(!document.contains_resource("FinanceDB"));
        assert_eq!(
            document.resource("PublicSubnet1").and_then(|r| r.property("VpcId")),
            Some(&Value::from("FinanceVPC"))
        );
        assert_eq!(
            document.resource_names().collect::<Vec<_>>(),
            vec!["FinanceVPC", "PublicSubnet1"]
        );
        assert!(document.output("VpcId").is_some());
    }

    #[test]
    fn test_json_keeps_declaration_order_and_omits_empty_fields() {
        let json = document().to_json().unwrap();
        let vpc = json.find("\"FinanceVPC\": {").unwrap();
        let subnet = json.find("\"PublicSubnet1\"").unwrap();
        assert!(vpc < subnet);
        assert!(!json.contains("Description"));
        assert_eq!(json.matches("DependsOn").count(), 1);
    }

    #[test]
    fn test_to_value_matches_json() {
        let document = document();
        let from_value = serde_json::to_string_pretty(&document.to_value()).unwrap();
        assert_eq!(from_value, document.to_json().unwrap());
    }

    #[test]
    fn test_yaml_output() {
        let yaml = document().to_yaml().unwrap();
        assert!(yaml.contains("AWSTemplateFormatVersion: 2010-09-09")
            || yaml.contains("AWSTemplateFormatVersion: '2010-09-09'"));
        assert!(yaml.contains("Type: AWS::EC2::Subnet"));
    }
}
