//! Named condition resolution
//!
//! Conditions may refer to each other through `{Condition: name}`. Each name
//! is resolved at most once per render; names currently on the resolution
//! stack are tracked so a cycle fails instead of recursing forever.

use std::collections::HashMap;

use crate::template::Template;
use crate::value::Value;

use super::binder::Environment;
use super::error::EvalError;
use super::eval::{Evaluator, PartialGraph};
use super::suggest::find_similar;

/// Per-render condition memo and resolution stack
#[derive(Debug, Default)]
pub struct ConditionState {
    resolved: HashMap<String, bool>,
    visiting: Vec<String>,
}

impl ConditionState {
    /// Condition currently being resolved, innermost last
    pub fn stack(&self) -> &[String] {
        &self.visiting
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }
}

impl Evaluator<'_> {
    /// Resolve a named condition to a boolean
    pub fn resolve_condition(&mut self, name: &str) -> Result<bool, EvalError> {
        if let Some(&value) = self.conditions.resolved.get(name) {
            return Ok(value);
        }
        if let Some(start) = self.conditions.visiting.iter().position(|n| n == name) {
            let mut cycle = self.conditions.visiting[start..].to_vec();
            cycle.push(name.to_string());
            return Err(EvalError::cyclic(cycle));
        }

        let template = self.template;
        let expr = template.conditions.get(name).ok_or_else(|| {
            EvalError::unknown_condition(
                name,
                find_similar(template.conditions.keys().map(String::as_str), name),
            )
        })?;

        self.conditions.visiting.push(name.to_string());
        let result = self.evaluate(expr);
        self.conditions.visiting.pop();

        let value = match result? {
            Value::Bool(b) => b,
            other => {
                return Err(EvalError::type_mismatch(
                    format!("condition '{}'", name),
                    "a boolean",
                    other.kind(),
                ))
            }
        };
        self.conditions.resolved.insert(name.to_string(), value);
        Ok(value)
    }
}

/// Resolve a single named condition against a template and environment
pub fn resolve(name: &str, template: &Template, env: &Environment) -> Result<bool, EvalError> {
    let graph = PartialGraph::declare(template);
    let mut evaluator = Evaluator::new(template, env, &graph);
    evaluator.resolve_condition(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ConditionKind, Expression};

    fn env(environment: &str) -> Environment {
        [("Environment".to_string(), Value::from(environment))]
            .into_iter()
            .collect()
    }

    fn is_prod() -> Expression {
        Expression::Condition {
            kind: ConditionKind::Equals,
            args: vec![
                Expression::ParameterRef("Environment".to_string()),
                Expression::literal("prod"),
            ],
        }
    }

    fn template_with(conditions: Vec<(&str, Expression)>) -> Template {
        let mut template = Template::default();
        for (name, expr) in conditions {
            template.conditions.insert(name.to_string(), expr);
        }
        template
    }

    #[test]
    fn test_resolve_equals_condition() {
        let template = template_with(vec![("CreateDB", is_prod())]);
        assert_eq!(resolve("CreateDB", &template, &env("prod")), Ok(true));
        assert_eq!(resolve("CreateDB", &template, &env("dev")), Ok(false));
    }

    #[test]
    fn test_condition_referencing_condition() {
        let template = template_with(vec![
            ("IsProd", is_prod()),
            (
                "IsNotProd",
                Expression::Condition {
                    kind: ConditionKind::Not,
                    args: vec![Expression::ConditionRef("IsProd".to_string())],
                },
            ),
        ]);
        assert_eq!(resolve("IsNotProd", &template, &env("dev")), Ok(true));
    }

    #[test]
    fn test_cyclic_conditions_fail() {
        let template = template_with(vec![
            ("A", Expression::ConditionRef("B".to_string())),
            ("B", Expression::ConditionRef("A".to_string())),
        ]);
        assert_eq!(
            resolve("A", &template, &env("prod")),
            Err(EvalError::cyclic(vec![
                "A".to_string(),
                "B".to_string(),
                "A".to_string()
            ]))
        );
    }

    #[test]
    fn test_self_referencing_condition() {
        let template = template_with(vec![(
            "Loop",
            Expression::Condition {
                kind: ConditionKind::And,
                args: vec![
                    Expression::literal(true),
                    Expression::ConditionRef("Loop".to_string()),
                ],
            },
        )]);
        assert!(matches!(
            resolve("Loop", &template, &env("prod")),
            Err(EvalError::CyclicCondition { .. })
        ));
    }

    #[test]
    fn test_non_boolean_condition() {
        let template = template_with(vec![("Bad", Expression::literal("yes"))]);
        assert!(matches!(
            resolve("Bad", &template, &env("prod")),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_condition_suggests() {
        let template = template_with(vec![("IsProd", is_prod())]);
        let err = resolve("IsProdd", &template, &env("prod")).unwrap_err();
        assert_eq!(
            err,
            EvalError::unknown_condition("IsProdd", vec!["IsProd".to_string()])
        );
    }

    #[test]
    fn test_results_are_memoized_within_a_render() {
        let template = template_with(vec![("IsProd", is_prod())]);
        let env = env("prod");
        let graph = PartialGraph::declare(&template);
        let mut evaluator = Evaluator::new(&template, &env, &graph);

        assert!(!evaluator.conditions.is_resolved("IsProd"));
        assert_eq!(evaluator.resolve_condition("IsProd"), Ok(true));
        assert!(evaluator.conditions.is_resolved("IsProd"));
        assert!(evaluator.conditions.stack().is_empty());
    }
}
