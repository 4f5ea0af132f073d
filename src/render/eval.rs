//! Expression evaluation
//!
//! Recursive descent over [`Expression`] trees against a bound
//! [`Environment`]. Resource references are resolved by name against a
//! [`PartialGraph`] of every declared resource, so evaluation order never has
//! to follow dependency order. Evaluation has no side effects beyond the
//! per-render condition memo.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use indexmap::IndexMap;

use crate::template::{ConditionKind, Expression, ResourceSpec, SubPart, Template};
use crate::value::{Map, Value};

use super::binder::Environment;
use super::conditions::ConditionState;
use super::error::EvalError;
use super::suggest::find_similar;

/// Every declared resource, indexed by logical name
///
/// Declaration, not condition inclusion, decides whether a reference is
/// valid, so the graph is built once from the template and never pruned.
#[derive(Debug)]
pub struct PartialGraph<'t> {
    slots: Vec<&'t ResourceSpec>,
    index: HashMap<&'t str, usize>,
}

impl<'t> PartialGraph<'t> {
    pub fn declare(template: &'t Template) -> Self {
        let slots: Vec<&ResourceSpec> = template.resources.values().collect();
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.logical_name.as_str(), i))
            .collect();
        Self { slots, index }
    }

    pub fn get(&self, name: &str) -> Option<&'t ResourceSpec> {
        self.index.get(name).map(|&i| self.slots[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declared names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &'t str> + '_ {
        self.slots.iter().map(|spec| spec.logical_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Error for a name that is not declared, with suggestions
    pub fn unknown(&self, name: &str) -> EvalError {
        EvalError::unknown_resource(name, find_similar(self.names(), name))
    }
}

/// Evaluates expressions for a single render
pub struct Evaluator<'t> {
    pub(super) template: &'t Template,
    env: &'t Environment,
    graph: &'t PartialGraph<'t>,
    imports: Option<&'t IndexMap<String, String>>,
    pub(super) conditions: ConditionState,
    /// Resources resolved since the last `take_references`
    references: Vec<String>,
}

impl<'t> Evaluator<'t> {
    pub fn new(template: &'t Template, env: &'t Environment, graph: &'t PartialGraph<'t>) -> Self {
        Self {
            template,
            env,
            graph,
            imports: None,
            conditions: ConditionState::default(),
            references: Vec::new(),
        }
    }

    /// Make exports available to `Fn::ImportValue`
    pub fn with_imports(mut self, imports: &'t IndexMap<String, String>) -> Self {
        self.imports = Some(imports);
        self
    }

    /// Drain the resources resolved so far, in first-resolved order
    ///
    /// Only references on evaluated paths are recorded; the untaken branch of
    /// an `Fn::If` never shows up here.
    pub fn take_references(&mut self) -> Vec<String> {
        std::mem::take(&mut self.references)
    }

    fn note_reference(&mut self, name: &str) {
        if !self.references.iter().any(|n| n == name) {
            self.references.push(name.to_string());
        }
    }

    /// Evaluate an expression that must produce a value
    pub fn evaluate(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        self.required(expr, "Ref")
    }

    /// Evaluate an expression that may be `AWS::NoValue`
    pub fn evaluate_optional(&mut self, expr: &Expression) -> Result<Option<Value>, EvalError> {
        let value = match expr {
            Expression::Literal(value) => value.clone(),
            Expression::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = self.evaluate_optional(item)? {
                        out.push(value);
                    }
                }
                Value::List(out)
            }
            Expression::Map(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    if let Some(value) = self.evaluate_optional(item)? {
                        out.insert(key.clone(), value);
                    }
                }
                Value::Map(out)
            }
            Expression::NoValue => return Ok(None),
            Expression::ParameterRef(name) => self.parameter(name)?.clone(),
            Expression::ResourceRef(name) => self.resource_placeholder(name)?,
            Expression::ResourceAttribute {
                resource,
                attribute,
            } => self.attribute_placeholder(resource, attribute)?,
            Expression::ConditionRef(name) => Value::Bool(self.resolve_condition(name)?),
            Expression::Condition { kind, args } => Value::Bool(self.condition_function(*kind, args)?),
            Expression::If {
                condition,
                when_true,
                when_false,
            } => {
                let branch = if self.resolve_condition(condition)? {
                    when_true
                } else {
                    when_false
                };
                return self.evaluate_optional(branch);
            }
            Expression::Join { delimiter, parts } => self.join(delimiter, parts)?,
            Expression::Select { index, list } => self.select(index, list)?,
            Expression::Split { delimiter, source } => {
                let source = self.string_arg(source, "Fn::Split")?;
                Value::string_list(source.split(delimiter.as_str()))
            }
            Expression::FindInMap {
                map,
                top_key,
                second_key,
            } => self.find_in_map(map, top_key, second_key)?,
            Expression::Sub { parts, variables } => self.substitute(parts, variables)?,
            Expression::GetAzs(region) => {
                let mut region = self.string_arg(region, "Fn::GetAZs")?;
                if region.is_empty() {
                    region = self
                        .parameter("AWS::Region")?
                        .scalar_string()
                        .unwrap_or_default();
                }
                Value::string_list(["a", "b", "c"].iter().map(|zone| format!("{}{}", region, zone)))
            }
            Expression::Base64(inner) => {
                let text = self.string_arg(inner, "Fn::Base64")?;
                Value::String(STANDARD.encode(text))
            }
            Expression::ImportValue(name) => {
                let name = self.string_arg(name, "Fn::ImportValue")?;
                match self.imports.and_then(|imports| imports.get(&name)) {
                    Some(value) => Value::string(value),
                    None => return Err(EvalError::UnknownImport { name }),
                }
            }
            Expression::Unsupported { function } => {
                return Err(EvalError::Unsupported {
                    function: function.clone(),
                })
            }
        };
        Ok(Some(value))
    }

    fn required(&mut self, expr: &Expression, function: &str) -> Result<Value, EvalError> {
        self.evaluate_optional(expr)?
            .ok_or_else(|| EvalError::type_mismatch(function, "a value", "AWS::NoValue"))
    }

    /// Evaluate to a scalar and return its string form
    fn string_arg(&mut self, expr: &Expression, function: &str) -> Result<String, EvalError> {
        let value = self.required(expr, function)?;
        value
            .scalar_string()
            .ok_or_else(|| EvalError::type_mismatch(function, "a string", value.kind()))
    }

    /// Evaluate to a boolean
    pub(super) fn boolean_arg(&mut self, expr: &Expression, function: &str) -> Result<bool, EvalError> {
        match self.required(expr, function)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::type_mismatch(function, "a boolean", other.kind())),
        }
    }

    fn parameter(&self, name: &str) -> Result<&'t Value, EvalError> {
        self.env.get(name).ok_or_else(|| EvalError::undefined(name))
    }

    /// Resource references resolve to the logical name itself
    fn resource_placeholder(&mut self, name: &str) -> Result<Value, EvalError> {
        if self.graph.contains(name) {
            self.note_reference(name);
            Ok(Value::string(name))
        } else {
            Err(self.graph.unknown(name))
        }
    }

    /// Runtime attributes are opaque; they resolve to `Name.Attribute`
    fn attribute_placeholder(&mut self, resource: &str, attribute: &str) -> Result<Value, EvalError> {
        if self.graph.contains(resource) {
            self.note_reference(resource);
            Ok(Value::String(format!("{}.{}", resource, attribute)))
        } else {
            Err(self.graph.unknown(resource))
        }
    }

    fn condition_function(&mut self, kind: ConditionKind, args: &[Expression]) -> Result<bool, EvalError> {
        let function = kind.function_name();
        match kind {
            ConditionKind::Equals => match args {
                [left, right] => {
                    let left = self.required(left, function)?;
                    let right = self.required(right, function)?;
                    Ok(left.loosely_equals(&right))
                }
                _ => Err(EvalError::type_mismatch(function, "2 arguments", args.len().to_string())),
            },
            ConditionKind::Not => match args {
                [inner] => Ok(!self.boolean_arg(inner, function)?),
                _ => Err(EvalError::type_mismatch(function, "1 argument", args.len().to_string())),
            },
            ConditionKind::And => {
                for arg in args {
                    if !self.boolean_arg(arg, function)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConditionKind::Or => {
                for arg in args {
                    if self.boolean_arg(arg, function)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn join(&mut self, delimiter: &str, parts: &Expression) -> Result<Value, EvalError> {
        let parts = match self.required(parts, "Fn::Join")? {
            Value::List(items) => items,
            other => return Err(EvalError::type_mismatch("Fn::Join", "a list", other.kind())),
        };
        let strings = parts
            .iter()
            .map(|part| {
                part.scalar_string()
                    .ok_or_else(|| EvalError::type_mismatch("Fn::Join", "scalar parts", part.kind()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::String(strings.join(delimiter)))
    }

    fn select(&mut self, index: &Expression, list: &Expression) -> Result<Value, EvalError> {
        let index_value = self.required(index, "Fn::Select")?;
        let index = index_value
            .as_f64()
            .filter(|i| *i >= 0.0 && i.fract() == 0.0)
            .map(|i| i as usize)
            .ok_or_else(|| {
                EvalError::type_mismatch("Fn::Select", "a non-negative integer index", index_value.to_string())
            })?;
        match self.required(list, "Fn::Select")? {
            Value::List(mut items) => {
                let len = items.len();
                if index < len {
                    Ok(items.swap_remove(index))
                } else {
                    Err(EvalError::IndexOutOfRange { index, len })
                }
            }
            other => Err(EvalError::type_mismatch("Fn::Select", "a list", other.kind())),
        }
    }

    fn find_in_map(
        &mut self,
        map: &Expression,
        top_key: &Expression,
        second_key: &Expression,
    ) -> Result<Value, EvalError> {
        let map = self.string_arg(map, "Fn::FindInMap")?;
        let top_key = self.string_arg(top_key, "Fn::FindInMap")?;
        let second_key = self.string_arg(second_key, "Fn::FindInMap")?;
        let template = self.template;
        template
            .mappings
            .get(&map)
            .and_then(|table| table.get(&top_key))
            .and_then(|entries| entries.get(&second_key))
            .cloned()
            .ok_or(EvalError::MapLookupFailed {
                map,
                top_key,
                second_key,
            })
    }

    fn substitute(
        &mut self,
        parts: &[SubPart],
        variables: &IndexMap<String, Expression>,
    ) -> Result<Value, EvalError> {
        let mut out = String::new();
        for part in parts {
            match part {
                SubPart::Text(text) => out.push_str(text),
                SubPart::Placeholder(name) => {
                    let value = match variables.get(name) {
                        Some(expr) => self.required(expr, "Fn::Sub")?,
                        None => self.resolve_placeholder(name)?,
                    };
                    let text = value
                        .scalar_string()
                        .ok_or_else(|| EvalError::type_mismatch("Fn::Sub", "a scalar", value.kind()))?;
                    out.push_str(&text);
                }
            }
        }
        Ok(Value::String(out))
    }

    /// `${Param}`, `${Resource}` or `${Resource.Attribute}`
    fn resolve_placeholder(&mut self, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        if let Some((resource, attribute)) = name.split_once('.') {
            return self.attribute_placeholder(resource, attribute);
        }
        if self.graph.contains(name) {
            return self.resource_placeholder(name);
        }
        Err(EvalError::undefined(name))
    }
}

/// Evaluate a single expression against a template and environment
///
/// Conditions referenced by the expression are resolved on the way.
pub fn evaluate(expr: &Expression, template: &Template, env: &Environment) -> Result<Value, EvalError> {
    let graph = PartialGraph::declare(template);
    let mut evaluator = Evaluator::new(template, env, &graph);
    evaluator.evaluate(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{parse_sub_string, ResourceSpec};
    use pretty_assertions::assert_eq;

    fn template() -> Template {
        let mut template = Template::default();
        for (name, ty) in [("FinanceVPC", "AWS::EC2::VPC"), ("FinanceDB", "AWS::RDS::DBInstance")] {
            template
                .resources
                .insert(name.to_string(), ResourceSpec::new(name, ty));
        }
        let mut region_map = IndexMap::new();
        region_map.insert(
            "us-east-1".to_string(),
            [("Ami".to_string(), Value::from("ami-123"))].into_iter().collect(),
        );
        template.mappings.insert("RegionMap".to_string(), region_map);
        template
    }

    fn env() -> Environment {
        [
            ("KeyName".to_string(), Value::from("your-key-name")),
            ("AWS::Region".to_string(), Value::from("us-east-1")),
            ("Subnets".to_string(), Value::string_list(["subnet-a", "subnet-b"])),
        ]
        .into_iter()
        .collect()
    }

    fn eval(expr: Expression) -> Result<Value, EvalError> {
        evaluate(&expr, &template(), &env())
    }

    fn lit(s: &str) -> Expression {
        Expression::literal(s)
    }

    #[test]
    fn test_join_parameter_and_literal() {
        let expr = Expression::Join {
            delimiter: "-".to_string(),
            parts: Box::new(Expression::List(vec![
                Expression::ParameterRef("KeyName".to_string()),
                lit("suffix"),
            ])),
        };
        assert_eq!(eval(expr), Ok(Value::from("your-key-name-suffix")));
    }

    #[test]
    fn test_join_rejects_non_scalar_parts() {
        let expr = Expression::Join {
            delimiter: ",".to_string(),
            parts: Box::new(Expression::List(vec![Expression::List(vec![])])),
        };
        assert!(matches!(eval(expr), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn test_join_accepts_list_parameter() {
        let expr = Expression::Join {
            delimiter: ",".to_string(),
            parts: Box::new(Expression::ParameterRef("Subnets".to_string())),
        };
        assert_eq!(eval(expr), Ok(Value::from("subnet-a,subnet-b")));
    }

    #[test]
    fn test_undefined_parameter() {
        assert_eq!(
            eval(Expression::ParameterRef("Missing".to_string())),
            Err(EvalError::undefined("Missing"))
        );
    }

    #[test]
    fn test_resource_ref_resolves_to_logical_name() {
        assert_eq!(
            eval(Expression::ResourceRef("FinanceDB".to_string())),
            Ok(Value::from("FinanceDB"))
        );
    }

    #[test]
    fn test_unknown_resource_suggests_declared_name() {
        let err = eval(Expression::ResourceRef("FinanceVCP".to_string())).unwrap_err();
        assert_eq!(
            err,
            EvalError::unknown_resource("FinanceVCP", vec!["FinanceVPC".to_string()])
        );
    }

    #[test]
    fn test_attribute_placeholder() {
        let expr = Expression::ResourceAttribute {
            resource: "FinanceDB".to_string(),
            attribute: "Endpoint.Address".to_string(),
        };
        assert_eq!(eval(expr), Ok(Value::from("FinanceDB.Endpoint.Address")));

        let unknown = Expression::ResourceAttribute {
            resource: "Nope".to_string(),
            attribute: "Arn".to_string(),
        };
        assert!(matches!(eval(unknown), Err(EvalError::UnknownResource { .. })));
    }

    #[test]
    fn test_select_in_and_out_of_range() {
        let list = || Box::new(Expression::List(vec![lit("a"), lit("b")]));
        assert_eq!(
            eval(Expression::Select {
                index: Box::new(Expression::literal(1_i64)),
                list: list()
            }),
            Ok(Value::from("b"))
        );
        assert_eq!(
            eval(Expression::Select {
                index: Box::new(lit("2")),
                list: list()
            }),
            Err(EvalError::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn test_split() {
        let expr = Expression::Split {
            delimiter: "|".to_string(),
            source: Box::new(lit("a|b|c")),
        };
        assert_eq!(eval(expr), Ok(Value::string_list(["a", "b", "c"])));
    }

    #[test]
    fn test_find_in_map() {
        let lookup = |second: &str| Expression::FindInMap {
            map: Box::new(lit("RegionMap")),
            top_key: Box::new(Expression::ParameterRef("AWS::Region".to_string())),
            second_key: Box::new(lit(second)),
        };
        assert_eq!(eval(lookup("Ami")), Ok(Value::from("ami-123")));
        assert_eq!(
            eval(lookup("Kernel")),
            Err(EvalError::MapLookupFailed {
                map: "RegionMap".to_string(),
                top_key: "us-east-1".to_string(),
                second_key: "Kernel".to_string(),
            })
        );
    }

    #[test]
    fn test_sub_resolves_parameters_resources_and_variables() {
        let mut variables = IndexMap::new();
        variables.insert("Tier".to_string(), lit("web"));
        let expr = Expression::Sub {
            parts: parse_sub_string("${KeyName}/${FinanceVPC}/${FinanceDB.Arn}/${Tier}/${AWS::Region}")
                .unwrap(),
            variables,
        };
        assert_eq!(
            eval(expr),
            Ok(Value::from("your-key-name/FinanceVPC/FinanceDB.Arn/web/us-east-1"))
        );
    }

    #[test]
    fn test_sub_unknown_placeholder() {
        let expr = Expression::Sub {
            parts: parse_sub_string("${Nothing}").unwrap(),
            variables: IndexMap::new(),
        };
        assert_eq!(eval(expr), Err(EvalError::undefined("Nothing")));
    }

    #[test]
    fn test_no_value_drops_entries() {
        let mut entries = IndexMap::new();
        entries.insert("Keep".to_string(), lit("x"));
        entries.insert("Drop".to_string(), Expression::NoValue);
        let expr = Expression::Map(entries);
        let value = eval(expr).unwrap();
        assert_eq!(value.get("Keep"), Some(&Value::from("x")));
        assert_eq!(value.get("Drop"), None);

        assert!(matches!(
            eval(Expression::NoValue),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_condition_functions_short_circuit() {
        // The second operand would fail if evaluated
        let failing = Expression::ParameterRef("Missing".to_string());
        let and = Expression::Condition {
            kind: ConditionKind::And,
            args: vec![Expression::literal(false), failing.clone()],
        };
        assert_eq!(eval(and), Ok(Value::Bool(false)));

        let or = Expression::Condition {
            kind: ConditionKind::Or,
            args: vec![Expression::literal(true), failing],
        };
        assert_eq!(eval(or), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_equals_and_not() {
        let equals = Expression::Condition {
            kind: ConditionKind::Equals,
            args: vec![Expression::ParameterRef("KeyName".to_string()), lit("your-key-name")],
        };
        let not = Expression::Condition {
            kind: ConditionKind::Not,
            args: vec![equals.clone()],
        };
        assert_eq!(eval(equals), Ok(Value::Bool(true)));
        assert_eq!(eval(not), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_non_boolean_condition_operand() {
        let and = Expression::Condition {
            kind: ConditionKind::And,
            args: vec![lit("yes")],
        };
        assert!(matches!(eval(and), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn test_get_azs_defaults_to_bound_region() {
        assert_eq!(
            eval(Expression::GetAzs(Box::new(lit("")))),
            Ok(Value::string_list(["us-east-1a", "us-east-1b", "us-east-1c"]))
        );
    }

    #[test]
    fn test_base64() {
        assert_eq!(
            eval(Expression::Base64(Box::new(lit("#!/bin/bash")))),
            Ok(Value::from("IyEvYmluL2Jhc2g="))
        );
    }

    #[test]
    fn test_import_value() {
        let template = template();
        let env = env();
        let graph = PartialGraph::declare(&template);
        let mut imports = IndexMap::new();
        imports.insert("SharedVpc".to_string(), "vpc-42".to_string());
        let mut evaluator = Evaluator::new(&template, &env, &graph).with_imports(&imports);

        assert_eq!(
            evaluator.evaluate(&Expression::ImportValue(Box::new(lit("SharedVpc")))),
            Ok(Value::from("vpc-42"))
        );
        assert_eq!(
            evaluator.evaluate(&Expression::ImportValue(Box::new(lit("Other")))),
            Err(EvalError::UnknownImport {
                name: "Other".to_string()
            })
        );
    }

    #[test]
    fn test_only_taken_branch_references_are_recorded() {
        let mut template = template();
        template.conditions.insert("Never".to_string(), Expression::literal(false));
        let env = env();
        let graph = PartialGraph::declare(&template);
        let mut evaluator = Evaluator::new(&template, &env, &graph);

        let expr = Expression::If {
            condition: "Never".to_string(),
            when_true: Box::new(Expression::ResourceAttribute {
                resource: "FinanceDB".to_string(),
                attribute: "Endpoint.Address".to_string(),
            }),
            when_false: Box::new(Expression::Sub {
                parts: parse_sub_string("${FinanceVPC}-${KeyName}").unwrap(),
                variables: IndexMap::new(),
            }),
        };
        assert_eq!(
            evaluator.evaluate(&expr),
            Ok(Value::from("FinanceVPC-your-key-name"))
        );
        assert_eq!(evaluator.take_references(), vec!["FinanceVPC".to_string()]);
        assert!(evaluator.take_references().is_empty());
    }

    #[test]
    fn test_unsupported_intrinsic() {
        let expr = Expression::Unsupported {
            function: "Fn::Cidr".to_string(),
        };
        assert!(matches!(eval(expr), Err(EvalError::Unsupported { .. })));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let expr = Expression::Join {
            delimiter: ":".to_string(),
            parts: Box::new(Expression::List(vec![
                Expression::ResourceRef("FinanceVPC".to_string()),
                Expression::ParameterRef("KeyName".to_string()),
            ])),
        };
        assert_eq!(eval(expr.clone()), eval(expr));
    }
}
