//! Parameter binding
//!
//! Merges caller-supplied values with declared defaults, coerces them to the
//! declared type and checks their constraints. The result is an immutable
//! [`Environment`] that evaluation only reads from.

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use crate::template::{ParameterSpec, ParameterType};
use crate::value::Value;

use super::config::RenderConfig;
use super::error::ParameterError;

/// Caller-supplied parameter values by name
pub type Parameters = IndexMap<String, Value>;

/// Resolved parameter values, including pseudo parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    values: IndexMap<String, Value>,
}

impl Environment {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Bind declared parameters against supplied values
///
/// Supplied names that are not declared are ignored.
pub fn bind(
    declared: &IndexMap<String, ParameterSpec>,
    supplied: &Parameters,
) -> Result<Environment, ParameterError> {
    let mut values = IndexMap::with_capacity(declared.len());
    for (name, spec) in declared {
        let raw = match supplied.get(name) {
            Some(value) => value,
            None => spec
                .default
                .as_ref()
                .ok_or_else(|| ParameterError::missing(name))?,
        };
        let value = coerce(spec, raw)?;
        check_constraints(spec, &value)?;

        let shown = if spec.no_echo {
            "****".to_string()
        } else {
            value.to_string()
        };
        debug!(
            parameter = %name,
            value = %shown,
            defaulted = !supplied.contains_key(name),
            "bound parameter"
        );
        values.insert(name.clone(), value);
    }

    for name in supplied.keys().filter(|n| !declared.contains_key(*n)) {
        debug!(parameter = %name, "ignoring undeclared parameter");
    }

    Ok(Environment { values })
}

/// Bind declared parameters and add the pseudo parameters from `config`
pub fn bind_with_config(
    declared: &IndexMap<String, ParameterSpec>,
    supplied: &Parameters,
    config: &RenderConfig,
) -> Result<Environment, ParameterError> {
    let bound = bind(declared, supplied)?;
    let mut values: IndexMap<String, Value> = config
        .pseudo_parameters()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    values.extend(bound.values);
    Ok(Environment { values })
}

fn coerce(spec: &ParameterSpec, raw: &Value) -> Result<Value, ParameterError> {
    let invalid = |expected: &str, found: &Value| ParameterError::InvalidType {
        name: spec.name.clone(),
        expected: expected.to_string(),
        found: found.kind().to_string(),
    };

    if spec.param_type.is_list() {
        let items: Vec<Value> = match raw {
            Value::List(items) => items.clone(),
            Value::String(s) if s.is_empty() => Vec::new(),
            Value::String(s) => s.split(',').map(Value::from).collect(),
            scalar if scalar.is_scalar() => vec![scalar.clone()],
            other => return Err(invalid("a list or comma-delimited string", other)),
        };
        let items = items
            .iter()
            .map(|item| coerce_scalar(spec, item).ok_or_else(|| invalid(element_kind(&spec.param_type), item)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::List(items))
    } else {
        coerce_scalar(spec, raw).ok_or_else(|| invalid(element_kind(&spec.param_type), raw))
    }
}

fn element_kind(param_type: &ParameterType) -> &'static str {
    if param_type.is_numeric() {
        "a number"
    } else {
        "a scalar"
    }
}

/// Coerce a single scalar to the parameter's element type
fn coerce_scalar(spec: &ParameterSpec, raw: &Value) -> Option<Value> {
    if spec.param_type.is_numeric() {
        match raw {
            Value::Number(n) => Some(Value::Number(n.clone())),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .map(Value::from)
                    .or_else(|| s.parse::<f64>().ok().and_then(Value::from_f64))
            }
            _ => None,
        }
    } else {
        raw.scalar_string().map(Value::String)
    }
}

fn check_constraints(spec: &ParameterSpec, value: &Value) -> Result<(), ParameterError> {
    let elements: Vec<&Value> = match value {
        Value::List(items) => items.iter().collect(),
        single => vec![single],
    };

    if let Some(allowed) = &spec.allowed_values {
        for element in &elements {
            if !allowed.iter().any(|a| a.loosely_equals(element)) {
                return Err(ParameterError::NotAllowed {
                    name: spec.name.clone(),
                    value: element.to_string(),
                    allowed: allowed.iter().map(Value::to_string).collect(),
                });
            }
        }
    }

    let constraints = &spec.constraints;
    let violated = |generic: String| ParameterError::ConstraintViolated {
        name: spec.name.clone(),
        message: constraints.description.clone().unwrap_or(generic),
    };

    let pattern = match &constraints.allowed_pattern {
        Some(pattern) => Some(Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            ParameterError::InvalidPattern {
                name: spec.name.clone(),
                pattern: pattern.clone(),
                message: e.to_string(),
            }
        })?),
        None => None,
    };

    for element in elements {
        let text = element.to_string();
        if let Some(re) = &pattern {
            if !re.is_match(&text) {
                return Err(violated(format!("'{}' does not match pattern {}", text, re.as_str())));
            }
        }
        if !spec.param_type.is_numeric() {
            let length = text.chars().count();
            if let Some(min) = constraints.min_length.filter(|min| length < *min) {
                return Err(violated(format!("length {} is below the minimum of {}", length, min)));
            }
            if let Some(max) = constraints.max_length.filter(|max| length > *max) {
                return Err(violated(format!("length {} exceeds the maximum of {}", length, max)));
            }
        }
        if let Some(number) = element.as_f64().filter(|_| spec.param_type.is_numeric()) {
            if let Some(min) = constraints.min_value.filter(|min| number < *min) {
                return Err(violated(format!("{} is below the minimum of {}", text, min)));
            }
            if let Some(max) = constraints.max_value.filter(|max| number > *max) {
                return Err(violated(format!("{} exceeds the maximum of {}", text, max)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ParameterConstraints;

    fn declared(specs: Vec<ParameterSpec>) -> IndexMap<String, ParameterSpec> {
        specs.into_iter().map(|s| (s.name.clone(), s)).collect()
    }

    fn supplied(pairs: &[(&str, Value)]) -> Parameters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_supplied_value_wins_over_default() {
        let params = declared(vec![
            ParameterSpec::new("Environment", ParameterType::String).with_default("dev")
        ]);
        let env = bind(&params, &supplied(&[("Environment", "prod".into())])).unwrap();
        assert_eq!(env.get("Environment"), Some(&Value::from("prod")));
    }

    #[test]
    fn test_default_fallback() {
        let params = declared(vec![
            ParameterSpec::new("InstanceType", ParameterType::String).with_default("t3.micro")
        ]);
        let env = bind(&params, &Parameters::new()).unwrap();
        assert_eq!(env.get("InstanceType"), Some(&Value::from("t3.micro")));
    }

    #[test]
    fn test_missing_required_parameter() {
        let params = declared(vec![ParameterSpec::new(
            "KeyName",
            ParameterType::Provider("AWS::EC2::KeyPair::KeyName".to_string()),
        )]);
        let err = bind(&params, &Parameters::new()).unwrap_err();
        assert_eq!(err, ParameterError::missing("KeyName"));
    }

    #[test]
    fn test_undeclared_supplied_values_are_ignored() {
        let env = bind(&IndexMap::new(), &supplied(&[("Extra", "x".into())])).unwrap();
        assert!(env.is_empty());
    }

    #[test]
    fn test_not_allowed_value() {
        let params = declared(vec![ParameterSpec::new("Environment", ParameterType::String)
            .with_allowed_values(vec!["dev".into(), "prod".into()])]);
        let err = bind(&params, &supplied(&[("Environment", "qa".into())])).unwrap_err();
        assert!(matches!(
            err,
            ParameterError::NotAllowed { ref name, ref value, .. } if name == "Environment" && value == "qa"
        ));
    }

    #[test]
    fn test_default_is_checked_against_allowed_values() {
        let params = declared(vec![ParameterSpec::new("Size", ParameterType::String)
            .with_default("huge")
            .with_allowed_values(vec!["small".into()])]);
        assert!(matches!(
            bind(&params, &Parameters::new()),
            Err(ParameterError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_number_coercion_from_string() {
        let params = declared(vec![ParameterSpec::new("Count", ParameterType::Number)]);
        let env = bind(&params, &supplied(&[("Count", "3".into())])).unwrap();
        assert_eq!(env.get("Count"), Some(&Value::from(3_i64)));

        let err = bind(&params, &supplied(&[("Count", "three".into())])).unwrap_err();
        assert!(matches!(err, ParameterError::InvalidType { .. }));
    }

    #[test]
    fn test_comma_delimited_list_splits() {
        let params = declared(vec![ParameterSpec::new(
            "Subnets",
            ParameterType::ProviderList("AWS::EC2::Subnet::Id".to_string()),
        )]);
        let env = bind(&params, &supplied(&[("Subnets", "subnet-a,subnet-b".into())])).unwrap();
        assert_eq!(
            env.get("Subnets"),
            Some(&Value::string_list(["subnet-a", "subnet-b"]))
        );
    }

    #[test]
    fn test_string_parameter_rejects_list() {
        let params = declared(vec![ParameterSpec::new("Name", ParameterType::String)]);
        let err = bind(&params, &supplied(&[("Name", Value::string_list(["a"]))])).unwrap_err();
        assert!(matches!(err, ParameterError::InvalidType { .. }));
    }

    #[test]
    fn test_allowed_pattern_and_lengths() {
        let mut spec = ParameterSpec::new("DBName", ParameterType::String);
        spec.constraints = ParameterConstraints {
            allowed_pattern: Some("[a-zA-Z][a-zA-Z0-9]*".to_string()),
            min_length: Some(2),
            max_length: Some(8),
            ..Default::default()
        };
        let params = declared(vec![spec]);

        assert!(bind(&params, &supplied(&[("DBName", "finance".into())])).is_ok());
        assert!(matches!(
            bind(&params, &supplied(&[("DBName", "1finance".into())])),
            Err(ParameterError::ConstraintViolated { .. })
        ));
        assert!(matches!(
            bind(&params, &supplied(&[("DBName", "financedb1".into())])),
            Err(ParameterError::ConstraintViolated { .. })
        ));
    }

    #[test]
    fn test_value_range_uses_constraint_description() {
        let mut spec = ParameterSpec::new("Port", ParameterType::Number);
        spec.constraints = ParameterConstraints {
            min_value: Some(1024.0),
            max_value: Some(65535.0),
            description: Some("must be an unprivileged port".to_string()),
            ..Default::default()
        };
        let params = declared(vec![spec]);
        let err = bind(&params, &supplied(&[("Port", Value::from(80_i64))])).unwrap_err();
        assert_eq!(err.to_string(), "parameter 'Port': must be an unprivileged port");
    }

    #[test]
    fn test_invalid_pattern() {
        let mut spec = ParameterSpec::new("Name", ParameterType::String);
        spec.constraints.allowed_pattern = Some("[unclosed".to_string());
        let err = bind(&declared(vec![spec]), &supplied(&[("Name", "x".into())])).unwrap_err();
        assert!(matches!(err, ParameterError::InvalidPattern { .. }));
    }

    #[test]
    fn test_bind_with_config_adds_pseudo_parameters() {
        let config = RenderConfig::new().with_region("eu-central-1");
        let env = bind_with_config(&IndexMap::new(), &Parameters::new(), &config).unwrap();
        assert_eq!(env.get("AWS::Region"), Some(&Value::from("eu-central-1")));
        assert_eq!(env.get("AWS::NotificationARNs"), Some(&Value::List(vec![])));
    }
}
