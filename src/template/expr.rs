//! Intrinsic expression tree
//!
//! Every value inside a template that can contain intrinsic functions is
//! lifted into an [`Expression`] at load time. The set of intrinsics is closed
//! so the evaluator can match on it exhaustively.

use indexmap::IndexMap;

use crate::value::Value;

/// Boolean condition functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    And,
    Or,
    Not,
    Equals,
}

impl ConditionKind {
    pub fn function_name(&self) -> &'static str {
        match self {
            ConditionKind::And => "Fn::And",
            ConditionKind::Or => "Fn::Or",
            ConditionKind::Not => "Fn::Not",
            ConditionKind::Equals => "Fn::Equals",
        }
    }
}

/// A segment of a `Fn::Sub` template string
#[derive(Debug, Clone, PartialEq)]
pub enum SubPart {
    Text(String),
    /// Body of a `${...}` placeholder
    Placeholder(String),
}

/// An unevaluated template expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Scalar or null literal
    Literal(Value),
    List(Vec<Expression>),
    Map(IndexMap<String, Expression>),
    /// `Ref` to a declared or pseudo parameter
    ParameterRef(String),
    /// `Ref` to anything else; validated against declared resources at evaluation
    ResourceRef(String),
    /// `Fn::GetAtt`
    ResourceAttribute { resource: String, attribute: String },
    /// `AWS::NoValue`: removes the enclosing entry
    NoValue,
    /// `{Condition: name}` inside condition functions
    ConditionRef(String),
    Condition {
        kind: ConditionKind,
        args: Vec<Expression>,
    },
    If {
        condition: String,
        when_true: Box<Expression>,
        when_false: Box<Expression>,
    },
    Join {
        delimiter: String,
        parts: Box<Expression>,
    },
    Select {
        index: Box<Expression>,
        list: Box<Expression>,
    },
    Split {
        delimiter: String,
        source: Box<Expression>,
    },
    FindInMap {
        map: Box<Expression>,
        top_key: Box<Expression>,
        second_key: Box<Expression>,
    },
    Sub {
        parts: Vec<SubPart>,
        variables: IndexMap<String, Expression>,
    },
    GetAzs(Box<Expression>),
    Base64(Box<Expression>),
    ImportValue(Box<Expression>),
    /// Recognized as an intrinsic but not implemented by this engine
    Unsupported { function: String },
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    /// Logical names of resources this expression refers to, including
    /// references embedded in `Fn::Sub` strings.
    ///
    /// Sub placeholders shadowed by a Sub variable or matching a parameter in
    /// `is_parameter` are not resource references.
    pub fn referenced_resources(&self, is_parameter: &dyn Fn(&str) -> bool) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_resources(is_parameter, &mut out);
        out
    }

    fn collect_resources(&self, is_parameter: &dyn Fn(&str) -> bool, out: &mut Vec<String>) {
        match self {
            Expression::ResourceRef(name) => push_unique(out, name),
            Expression::ResourceAttribute { resource, .. } => push_unique(out, resource),
            Expression::Sub { parts, variables } => {
                for part in parts {
                    if let SubPart::Placeholder(body) = part {
                        if variables.contains_key(body.as_str()) {
                            continue;
                        }
                        match body.split_once('.') {
                            Some((resource, _)) => push_unique(out, resource),
                            None if !is_parameter(body) => push_unique(out, body),
                            None => {}
                        }
                    }
                }
                for var in variables.values() {
                    var.collect_resources(is_parameter, out);
                }
            }
            Expression::List(items) => {
                for item in items {
                    item.collect_resources(is_parameter, out);
                }
            }
            Expression::Map(map) => {
                for item in map.values() {
                    item.collect_resources(is_parameter, out);
                }
            }
            Expression::Condition { args, .. } => {
                for arg in args {
                    arg.collect_resources(is_parameter, out);
                }
            }
            Expression::If {
                when_true,
                when_false,
                ..
            } => {
                when_true.collect_resources(is_parameter, out);
                when_false.collect_resources(is_parameter, out);
            }
            Expression::Join { parts: inner, .. }
            | Expression::Split { source: inner, .. }
            | Expression::GetAzs(inner)
            | Expression::Base64(inner)
            | Expression::ImportValue(inner) => inner.collect_resources(is_parameter, out),
            Expression::Select { index, list } => {
                index.collect_resources(is_parameter, out);
                list.collect_resources(is_parameter, out);
            }
            Expression::FindInMap {
                map,
                top_key,
                second_key,
            } => {
                map.collect_resources(is_parameter, out);
                top_key.collect_resources(is_parameter, out);
                second_key.collect_resources(is_parameter, out);
            }
            Expression::Literal(_)
            | Expression::ParameterRef(_)
            | Expression::NoValue
            | Expression::ConditionRef(_)
            | Expression::Unsupported { .. } => {}
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

/// Split a `Fn::Sub` string into literal text and placeholders
///
/// `${!Literal}` escapes to the text `${Literal}`. Returns None on an
/// unclosed placeholder.
pub fn parse_sub_string(input: &str) -> Option<Vec<SubPart>> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        text.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        let body = &after[..end];
        if let Some(escaped) = body.strip_prefix('!') {
            text.push_str("${");
            text.push_str(escaped);
            text.push('}');
        } else {
            if !text.is_empty() {
                parts.push(SubPart::Text(std::mem::take(&mut text)));
            }
            parts.push(SubPart::Placeholder(body.trim().to_string()));
        }
        rest = &after[end + 1..];
    }
    text.push_str(rest);
    if !text.is_empty() {
        parts.push(SubPart::Text(text));
    }
    Some(parts)
}
