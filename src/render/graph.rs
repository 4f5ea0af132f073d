//! Resource graph building
//!
//! Walks declared resources in declaration order, applies gating conditions,
//! and evaluates each included resource's properties. References are checked
//! against every declared resource, so forward references and references to
//! excluded resources both resolve to placeholders.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::document::{RenderedDocument, RenderedExport, RenderedOutput, RenderedResource};
use crate::template::{OutputSpec, ResourceSpec, Template};
use crate::RenderError;

use super::binder::Environment;
use super::config::{OutputPolicy, RenderConfig};
use super::error::EvalError;
use super::eval::{Evaluator, PartialGraph};

/// Build the rendered document with the default configuration
pub fn build(template: &Template, env: &Environment) -> Result<RenderedDocument, RenderError> {
    build_with_config(template, env, &RenderConfig::default())
}

/// Build the rendered document
///
/// All-or-nothing: the first failing resource or output aborts the build.
pub fn build_with_config(
    template: &Template,
    env: &Environment,
    config: &RenderConfig,
) -> Result<RenderedDocument, RenderError> {
    let graph = PartialGraph::declare(template);
    let mut evaluator = Evaluator::new(template, env, &graph).with_imports(&config.imports);

    let mut included = HashSet::with_capacity(graph.len());
    for spec in template.resources.values() {
        if gate(&mut evaluator, spec.condition.as_deref())? {
            included.insert(spec.logical_name.as_str());
        } else {
            debug!(
                resource = %spec.logical_name,
                condition = spec.condition.as_deref().unwrap_or_default(),
                "excluding resource"
            );
        }
    }

    let mut document = RenderedDocument {
        format_version: template.format_version.clone(),
        description: template.description.clone(),
        ..Default::default()
    };

    for spec in template.resources.values() {
        let location = || format!("resource '{}'", spec.logical_name);
        validate_references(template, &graph, spec).map_err(|e| RenderError::eval(location(), e))?;
        if !included.contains(spec.logical_name.as_str()) {
            continue;
        }
        let rendered =
            render_resource(&mut evaluator, spec, &included).map_err(|e| RenderError::eval(location(), e))?;
        document
            .resources
            .insert(spec.logical_name.clone(), rendered);
    }

    for output in template.outputs.values() {
        if !gate(&mut evaluator, output.condition.as_deref())? {
            debug!(output = %output.name, "skipping output with false condition");
            continue;
        }
        let location = || format!("output '{}'", output.name);
        evaluator.take_references();
        let rendered = render_output(&mut evaluator, output).map_err(|e| RenderError::eval(location(), e))?;
        let excluded = evaluator
            .take_references()
            .into_iter()
            .find(|name| !included.contains(name.as_str()));
        if let Some(resource) = excluded {
            match config.excluded_output_policy {
                OutputPolicy::Skip => {
                    debug!(
                        output = %output.name,
                        resource = %resource,
                        "skipping output that references an excluded resource"
                    );
                    continue;
                }
                OutputPolicy::Fail => {
                    let err = EvalError::UnresolvedOutput {
                        output: output.name.clone(),
                        resource,
                    };
                    return Err(RenderError::eval(location(), err));
                }
            }
        }
        document.outputs.insert(output.name.clone(), rendered);
    }

    info!(
        declared = graph.len(),
        included = document.resources.len(),
        outputs = document.outputs.len(),
        "rendered template"
    );
    Ok(document)
}

/// Resolve an optional gating condition; absent means included
fn gate(evaluator: &mut Evaluator<'_>, condition: Option<&str>) -> Result<bool, RenderError> {
    match condition {
        Some(name) => evaluator
            .resolve_condition(name)
            .map_err(|e| RenderError::eval(format!("condition '{}'", name), e)),
        None => Ok(true),
    }
}

/// Every reference and `DependsOn` target must name a declared resource,
/// whether or not the referring resource is included
fn validate_references(
    template: &Template,
    graph: &PartialGraph<'_>,
    spec: &ResourceSpec,
) -> Result<(), EvalError> {
    let is_parameter = |name: &str| template.is_parameter(name);
    let referenced = spec
        .properties
        .values()
        .chain(spec.metadata.as_ref())
        .flat_map(|expr| expr.referenced_resources(&is_parameter));
    for name in spec.depends_on.iter().cloned().chain(referenced) {
        if !graph.contains(&name) {
            return Err(graph.unknown(&name));
        }
    }
    Ok(())
}

fn render_resource(
    evaluator: &mut Evaluator<'_>,
    spec: &ResourceSpec,
    included: &HashSet<&str>,
) -> Result<RenderedResource, EvalError> {
    let mut rendered = RenderedResource::new(&spec.type_name);
    for (key, expr) in &spec.properties {
        if let Some(value) = evaluator.evaluate_optional(expr)? {
            rendered.properties.insert(key.clone(), value);
        }
    }
    rendered.depends_on = spec
        .depends_on
        .iter()
        .filter(|name| included.contains(name.as_str()))
        .cloned()
        .collect();
    rendered.metadata = match &spec.metadata {
        Some(expr) => evaluator.evaluate_optional(expr)?,
        None => None,
    };
    rendered.deletion_policy = spec.deletion_policy.clone();
    rendered.update_replace_policy = spec.update_replace_policy.clone();
    Ok(rendered)
}

fn render_output(evaluator: &mut Evaluator<'_>, output: &OutputSpec) -> Result<RenderedOutput, EvalError> {
    let value = evaluator.evaluate(&output.value)?;
    let description = output
        .description
        .as_ref()
        .map(|expr| evaluator.evaluate(expr))
        .transpose()?;
    let export = output
        .export_name
        .as_ref()
        .map(|expr| evaluator.evaluate(expr).map(|name| RenderedExport { name }))
        .transpose()?;
    Ok(RenderedOutput {
        value,
        description,
        export,
    })
}
