//! Template loading
//!
//! YAML text is parsed into a [`Value`] tree with short-form tags (`!Ref`,
//! `!Sub`, ...) normalized to their long form, then lifted section by section
//! into the typed [`Template`] model. Only structural shape is checked here;
//! whether references resolve is decided at render time.

use indexmap::IndexMap;
use serde_json::Number;
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::value::{Map, Value};

use super::expr::{parse_sub_string, ConditionKind, Expression};
use super::model::{
    is_pseudo_parameter, MappingTable, OutputSpec, ParameterConstraints, ParameterSpec,
    ParameterType, ResourceSpec, Template, NO_VALUE,
};

const KNOWN_SECTIONS: &[&str] = &[
    "AWSTemplateFormatVersion",
    "Description",
    "Metadata",
    "Parameters",
    "Rules",
    "Mappings",
    "Conditions",
    "Transform",
    "Resources",
    "Outputs",
];

/// Parse template source text into a [`Template`]
pub fn load(source: &str) -> Result<Template, ParseError> {
    let raw: serde_yaml::Value = serde_yaml::from_str(source)?;
    let mut sections = match from_yaml(raw)? {
        Value::Map(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ParseError::section(
                "template",
                format!("expected a mapping at the top level, found {}", other.kind()),
            ))
        }
    };

    for key in sections.keys() {
        if !KNOWN_SECTIONS.contains(&key.as_str()) {
            warn!(section = %key, "ignoring unknown template section");
        }
    }

    let format_version = optional_string(&mut sections, "AWSTemplateFormatVersion")?;
    let description = optional_string(&mut sections, "Description")?;
    let parameters = load_parameters(sections.shift_remove("Parameters"))?;
    let lifter = Lifter {
        parameters: &parameters,
    };

    let mappings = load_mappings(sections.shift_remove("Mappings"))?;
    let conditions = match section_map("Conditions", sections.shift_remove("Conditions"))? {
        Some(entries) => entries
            .into_iter()
            .map(|(name, body)| Ok((name, lifter.lift(body)?)))
            .collect::<Result<IndexMap<_, _>, ParseError>>()?,
        None => IndexMap::new(),
    };
    let resources = load_resources(&lifter, sections.shift_remove("Resources"))?;
    let outputs = load_outputs(&lifter, sections.shift_remove("Outputs"))?;

    debug!(
        parameters = parameters.len(),
        conditions = conditions.len(),
        resources = resources.len(),
        outputs = outputs.len(),
        "loaded template"
    );

    Ok(Template {
        format_version,
        description,
        parameters,
        conditions,
        mappings,
        resources,
        outputs,
    })
}

/// Parse a flat YAML or JSON mapping of values, such as a parameters file
pub fn load_values(source: &str) -> Result<Map, ParseError> {
    let raw: serde_yaml::Value = serde_yaml::from_str(source)?;
    match from_yaml(raw)? {
        Value::Map(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ParseError::section(
            "values",
            format!("expected a mapping, found {}", other.kind()),
        )),
    }
}

/// Convert a YAML node into a [`Value`], expanding short-form intrinsic tags
fn from_yaml(node: serde_yaml::Value) -> Result<Value, ParseError> {
    Ok(match node {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => Value::Number(convert_number(&n)?),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::List(
            items
                .into_iter()
                .map(from_yaml)
                .collect::<Result<_, _>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = mapping_key(key)?;
                if map.contains_key(&key) {
                    // `1` and "1" are distinct to the YAML layer but collide here
                    return Err(ParseError::Syntax {
                        message: format!("duplicate entry with key \"{}\"", key),
                        location: None,
                    });
                }
                map.insert(key, from_yaml(value)?);
            }
            Value::Map(map)
        }
        serde_yaml::Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let name = tag.trim_start_matches('!');
            let inner = from_yaml(tagged.value)?;
            let (key, body) = match name {
                "Ref" | "Condition" => (name.to_string(), inner),
                "GetAtt" => ("Fn::GetAtt".to_string(), split_dotted_attribute(inner)),
                _ => (format!("Fn::{}", name), inner),
            };
            let mut map = Map::new();
            map.insert(key, body);
            Value::Map(map)
        }
    })
}

fn convert_number(n: &serde_yaml::Number) -> Result<Number, ParseError> {
    if let Some(i) = n.as_i64() {
        return Ok(i.into());
    }
    if let Some(u) = n.as_u64() {
        return Ok(u.into());
    }
    n.as_f64()
        .and_then(Number::from_f64)
        .ok_or_else(|| ParseError::section("value", format!("non-finite number {}", n)))
}

fn mapping_key(key: serde_yaml::Value) -> Result<String, ParseError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(ParseError::section(
            "mapping key",
            format!("keys must be scalars, found {:?}", other),
        )),
    }
}

/// `!GetAtt Resource.Attr` is shorthand for `[Resource, Attr]`
fn split_dotted_attribute(value: Value) -> Value {
    match value {
        Value::String(s) => match s.split_once('.') {
            Some((resource, attribute)) => Value::string_list([resource, attribute]),
            None => Value::String(s),
        },
        other => other,
    }
}

fn optional_string(sections: &mut Map, key: &str) -> Result<Option<String>, ParseError> {
    match sections.shift_remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .scalar_string()
            .map(Some)
            .ok_or_else(|| ParseError::section(key, "expected a scalar")),
    }
}

fn section_map(section: &str, value: Option<Value>) -> Result<Option<Map>, ParseError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Map(map)) => Ok(Some(map)),
        Some(other) => Err(ParseError::section(
            section,
            format!("expected a mapping, found {}", other.kind()),
        )),
    }
}

fn entry_map(section: &str, name: &str, value: Value) -> Result<Map, ParseError> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(ParseError::section(
            section,
            format!("'{}' must be a mapping, found {}", name, other.kind()),
        )),
    }
}

fn load_parameters(value: Option<Value>) -> Result<IndexMap<String, ParameterSpec>, ParseError> {
    let Some(entries) = section_map("Parameters", value)? else {
        return Ok(IndexMap::new());
    };

    let mut parameters = IndexMap::with_capacity(entries.len());
    for (name, body) in entries {
        let mut body = entry_map("Parameters", &name, body)?;
        let invalid = |message: String| ParseError::section("Parameters", format!("'{}': {}", name, message));

        let type_name = body
            .shift_remove("Type")
            .and_then(|t| t.as_str().map(str::to_string))
            .ok_or_else(|| invalid("missing Type".to_string()))?;
        let param_type: ParameterType = type_name.parse().map_err(invalid)?;

        let allowed_values = match body.shift_remove("AllowedValues") {
            None => None,
            Some(Value::List(values)) => Some(values),
            Some(other) => return Err(invalid(format!("AllowedValues must be a list, found {}", other.kind()))),
        };

        let number = |body: &mut Map, key: &str| -> Result<Option<f64>, ParseError> {
            match body.shift_remove(key) {
                None => Ok(None),
                Some(v) => v
                    .as_f64()
                    .map(Some)
                    .ok_or_else(|| invalid(format!("{} must be a number", key))),
            }
        };
        let min_value = number(&mut body, "MinValue")?;
        let max_value = number(&mut body, "MaxValue")?;
        let length = |body: &mut Map, key: &str| -> Result<Option<usize>, ParseError> {
            match number(body, key)? {
                None => Ok(None),
                Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as usize)),
                Some(n) => Err(invalid(format!("{} must be a non-negative integer, found {}", key, n))),
            }
        };
        let min_length = length(&mut body, "MinLength")?;
        let max_length = length(&mut body, "MaxLength")?;

        let text = |body: &mut Map, key: &str| body.shift_remove(key).and_then(|v| v.scalar_string());
        let constraints = ParameterConstraints {
            allowed_pattern: text(&mut body, "AllowedPattern"),
            min_length,
            max_length,
            min_value,
            max_value,
            description: text(&mut body, "ConstraintDescription"),
        };
        let description = text(&mut body, "Description");
        let no_echo = body
            .shift_remove("NoEcho")
            .map(|v| v.loosely_equals(&Value::Bool(true)))
            .unwrap_or(false);
        let default = body.shift_remove("Default");

        parameters.insert(
            name.clone(),
            ParameterSpec {
                name,
                param_type,
                default,
                allowed_values,
                constraints,
                description,
                no_echo,
            },
        );
    }
    Ok(parameters)
}

fn load_mappings(value: Option<Value>) -> Result<IndexMap<String, MappingTable>, ParseError> {
    let Some(entries) = section_map("Mappings", value)? else {
        return Ok(IndexMap::new());
    };

    let mut mappings = IndexMap::with_capacity(entries.len());
    for (name, body) in entries {
        let mut table = MappingTable::new();
        for (top_key, second_level) in entry_map("Mappings", &name, body)? {
            let second_level = entry_map("Mappings", &format!("{}.{}", name, top_key), second_level)?;
            table.insert(top_key, second_level);
        }
        mappings.insert(name, table);
    }
    Ok(mappings)
}

fn load_resources(
    lifter: &Lifter<'_>,
    value: Option<Value>,
) -> Result<IndexMap<String, ResourceSpec>, ParseError> {
    let Some(entries) = section_map("Resources", value)? else {
        return Ok(IndexMap::new());
    };

    let mut resources = IndexMap::with_capacity(entries.len());
    for (name, body) in entries {
        let mut body = entry_map("Resources", &name, body)?;
        let invalid = |message: &str| ParseError::section("Resources", format!("'{}': {}", name, message));

        let type_name = body
            .shift_remove("Type")
            .and_then(|t| t.as_str().map(str::to_string))
            .ok_or_else(|| invalid("missing Type"))?;

        let properties = match body.shift_remove("Properties") {
            None | Some(Value::Null) => IndexMap::new(),
            Some(Value::Map(props)) => props
                .into_iter()
                .map(|(key, value)| Ok((key, lifter.lift(value)?)))
                .collect::<Result<IndexMap<_, _>, ParseError>>()?,
            Some(_) => return Err(invalid("Properties must be a mapping")),
        };

        let condition = match body.shift_remove("Condition") {
            None => None,
            Some(Value::String(c)) => Some(c),
            Some(_) => return Err(invalid("Condition must be a condition name")),
        };

        let depends_on = match body.shift_remove("DependsOn") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(target)) => vec![target],
            Some(Value::List(targets)) => targets
                .into_iter()
                .map(|t| match t {
                    Value::String(s) => Ok(s),
                    _ => Err(invalid("DependsOn entries must be logical names")),
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(invalid("DependsOn must be a name or a list of names")),
        };

        let policy = |body: &mut Map, key: &str| body.shift_remove(key).and_then(|v| v.scalar_string());
        let deletion_policy = policy(&mut body, "DeletionPolicy");
        let update_replace_policy = policy(&mut body, "UpdateReplacePolicy");
        let metadata = body
            .shift_remove("Metadata")
            .map(|m| lifter.lift(m))
            .transpose()?;

        for key in body.keys() {
            debug!(resource = %name, attribute = %key, "ignoring resource attribute");
        }

        resources.insert(
            name.clone(),
            ResourceSpec {
                logical_name: name,
                type_name,
                properties,
                condition,
                depends_on,
                metadata,
                deletion_policy,
                update_replace_policy,
            },
        );
    }
    Ok(resources)
}

fn load_outputs(
    lifter: &Lifter<'_>,
    value: Option<Value>,
) -> Result<IndexMap<String, OutputSpec>, ParseError> {
    let Some(entries) = section_map("Outputs", value)? else {
        return Ok(IndexMap::new());
    };

    let mut outputs = IndexMap::with_capacity(entries.len());
    for (name, body) in entries {
        let mut body = entry_map("Outputs", &name, body)?;
        let invalid = |message: &str| ParseError::section("Outputs", format!("'{}': {}", name, message));

        let value = body.shift_remove("Value").ok_or_else(|| invalid("missing Value"))?;
        let description = body.shift_remove("Description").map(|d| lifter.lift(d)).transpose()?;
        let condition = match body.shift_remove("Condition") {
            None => None,
            Some(Value::String(c)) => Some(c),
            Some(_) => return Err(invalid("Condition must be a condition name")),
        };
        let export_name = match body.shift_remove("Export") {
            None => None,
            Some(Value::Map(mut export)) => {
                let export_name = export
                    .shift_remove("Name")
                    .ok_or_else(|| invalid("Export requires a Name"))?;
                Some(lifter.lift(export_name)?)
            }
            Some(_) => return Err(invalid("Export must be a mapping")),
        };

        outputs.insert(
            name.clone(),
            OutputSpec {
                name,
                value: lifter.lift(value)?,
                description,
                condition,
                export_name,
            },
        );
    }
    Ok(outputs)
}

/// Lifts untyped values into [`Expression`] trees
struct Lifter<'a> {
    parameters: &'a IndexMap<String, ParameterSpec>,
}

impl Lifter<'_> {
    fn lift(&self, value: Value) -> Result<Expression, ParseError> {
        match value {
            Value::List(items) => Ok(Expression::List(
                items
                    .into_iter()
                    .map(|item| self.lift(item))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Map(map) => {
                if map.len() == 1 {
                    let is_intrinsic = map.get_index(0).is_some_and(|(key, value)| {
                        key == "Ref"
                            || key.starts_with("Fn::")
                            || (key == "Condition" && value.as_str().is_some())
                    });
                    if is_intrinsic {
                        if let Some((function, args)) = map.into_iter().next() {
                            return self.lift_intrinsic(&function, args);
                        }
                        return Ok(Expression::Map(IndexMap::new()));
                    }
                }
                Ok(Expression::Map(
                    map.into_iter()
                        .map(|(k, v)| Ok((k, self.lift(v)?)))
                        .collect::<Result<_, ParseError>>()?,
                ))
            }
            scalar => Ok(Expression::Literal(scalar)),
        }
    }

    fn boxed(&self, value: Value) -> Result<Box<Expression>, ParseError> {
        Ok(Box::new(self.lift(value)?))
    }

    fn classify_ref(&self, name: String) -> Expression {
        if name == NO_VALUE {
            Expression::NoValue
        } else if self.parameters.contains_key(&name) || is_pseudo_parameter(&name) {
            Expression::ParameterRef(name)
        } else {
            Expression::ResourceRef(name)
        }
    }

    fn lift_intrinsic(&self, function: &str, args: Value) -> Result<Expression, ParseError> {
        match function {
            "Ref" => match args {
                Value::String(name) => Ok(self.classify_ref(name)),
                other => Err(ParseError::intrinsic(
                    function,
                    format!("expected a name, found {}", other.kind()),
                )),
            },
            "Condition" => match args {
                Value::String(name) => Ok(Expression::ConditionRef(name)),
                _ => Err(ParseError::intrinsic(function, "expected a condition name")),
            },
            "Fn::GetAtt" => {
                let [resource, attribute] = fixed_args(function, args)?;
                match (resource, attribute) {
                    (Value::String(resource), Value::String(attribute)) => {
                        Ok(Expression::ResourceAttribute {
                            resource,
                            attribute,
                        })
                    }
                    _ => Err(ParseError::intrinsic(
                        function,
                        "expected a resource name and an attribute name",
                    )),
                }
            }
            "Fn::Join" => {
                let [delimiter, parts] = fixed_args(function, args)?;
                Ok(Expression::Join {
                    delimiter: delimiter_string(function, delimiter)?,
                    parts: self.boxed(parts)?,
                })
            }
            "Fn::Split" => {
                let [delimiter, source] = fixed_args(function, args)?;
                Ok(Expression::Split {
                    delimiter: delimiter_string(function, delimiter)?,
                    source: self.boxed(source)?,
                })
            }
            "Fn::Select" => {
                let [index, list] = fixed_args(function, args)?;
                Ok(Expression::Select {
                    index: self.boxed(index)?,
                    list: self.boxed(list)?,
                })
            }
            "Fn::FindInMap" => {
                let [map, top_key, second_key] = fixed_args(function, args)?;
                Ok(Expression::FindInMap {
                    map: self.boxed(map)?,
                    top_key: self.boxed(top_key)?,
                    second_key: self.boxed(second_key)?,
                })
            }
            "Fn::Sub" => {
                let (text, variables) = match args {
                    Value::String(text) => (text, IndexMap::new()),
                    Value::List(_) => {
                        let [text, variables] = fixed_args(function, args)?;
                        let text = text.as_str().map(str::to_string).ok_or_else(|| {
                            ParseError::intrinsic(function, "first argument must be a string")
                        })?;
                        let variables = match variables {
                            Value::Map(vars) => vars
                                .into_iter()
                                .map(|(k, v)| Ok((k, self.lift(v)?)))
                                .collect::<Result<_, ParseError>>()?,
                            _ => {
                                return Err(ParseError::intrinsic(
                                    function,
                                    "second argument must be a mapping of variables",
                                ))
                            }
                        };
                        (text, variables)
                    }
                    other => {
                        return Err(ParseError::intrinsic(
                            function,
                            format!("expected a string or [string, variables], found {}", other.kind()),
                        ))
                    }
                };
                let parts = parse_sub_string(&text).ok_or_else(|| {
                    ParseError::intrinsic(function, format!("unclosed placeholder in '{}'", text))
                })?;
                Ok(Expression::Sub { parts, variables })
            }
            "Fn::If" => {
                let [condition, when_true, when_false] = fixed_args(function, args)?;
                let condition = condition.as_str().map(str::to_string).ok_or_else(|| {
                    ParseError::intrinsic(function, "first argument must be a condition name")
                })?;
                Ok(Expression::If {
                    condition,
                    when_true: self.boxed(when_true)?,
                    when_false: self.boxed(when_false)?,
                })
            }
            "Fn::Equals" => {
                let [left, right] = fixed_args(function, args)?;
                Ok(Expression::Condition {
                    kind: ConditionKind::Equals,
                    args: vec![self.lift(left)?, self.lift(right)?],
                })
            }
            "Fn::Not" => {
                let [inner] = fixed_args(function, args)?;
                Ok(Expression::Condition {
                    kind: ConditionKind::Not,
                    args: vec![self.lift(inner)?],
                })
            }
            "Fn::And" | "Fn::Or" => {
                let kind = if function == "Fn::And" {
                    ConditionKind::And
                } else {
                    ConditionKind::Or
                };
                match args {
                    Value::List(items) if !items.is_empty() => Ok(Expression::Condition {
                        kind,
                        args: items
                            .into_iter()
                            .map(|item| self.lift(item))
                            .collect::<Result<_, _>>()?,
                    }),
                    _ => Err(ParseError::intrinsic(
                        function,
                        "expected a non-empty list of conditions",
                    )),
                }
            }
            "Fn::GetAZs" => Ok(Expression::GetAzs(self.boxed(args)?)),
            "Fn::Base64" => Ok(Expression::Base64(self.boxed(args)?)),
            "Fn::ImportValue" => Ok(Expression::ImportValue(self.boxed(args)?)),
            _ => Ok(Expression::Unsupported {
                function: function.to_string(),
            }),
        }
    }
}

/// Destructure an argument list of exactly `N` elements
fn fixed_args<const N: usize>(function: &str, args: Value) -> Result<[Value; N], ParseError> {
    match args {
        Value::List(items) => {
            let found = items.len();
            items.try_into().map_err(|_| {
                ParseError::intrinsic(
                    function,
                    format!("expected {} arguments, found {}", N, found),
                )
            })
        }
        other => Err(ParseError::intrinsic(
            function,
            format!("expected a list of {} arguments, found {}", N, other.kind()),
        )),
    }
}

fn delimiter_string(function: &str, value: Value) -> Result<String, ParseError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(ParseError::intrinsic(function, "delimiter must be a string")),
    }
}
