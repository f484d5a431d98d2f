//! Prompt Renderer - Render templates with context variables using Handlebars
//!
//! This module provides the PromptRenderer struct which uses Handlebars to
//! render prompt templates, and PromptTemplate which pairs a template with the
//! free variables it expects.

use std::collections::BTreeSet;

use handlebars::template::{BlockParam, HelperTemplate, Parameter, Template, TemplateElement};
use handlebars::{Handlebars, Path, PathSeg};
use serde_json::Value;

use crate::error::{FlowError, Result};

const TEMPLATE_NAME: &str = "prompt";

/// Renders prompt templates using Handlebars templating
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRenderer {
    /// Create a new PromptRenderer with default settings
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        // Missing variables render as empty strings
        handlebars.set_strict_mode(false);
        // Prompts are plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render a template string with a JSON context
    pub fn render(&self, template: &str, context: &Value) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .map_err(|e| FlowError::Template(format!("Failed to render template: {}", e)))
    }

    /// Register a compiled template for later use
    pub fn register_template(&mut self, name: &str, template: Template) {
        self.handlebars.register_template(name, template);
    }

    /// Render a previously registered template
    pub fn render_named(&self, name: &str, context: &Value) -> Result<String> {
        self.handlebars
            .render(name, context)
            .map_err(|e| FlowError::Template(format!("Failed to render template: {}", e)))
    }
}

fn compile(source: &str) -> Result<Template> {
    Template::compile(source).map_err(|e| FlowError::Template(format!("Failed to parse template: {}", e)))
}

/// Free variables referenced by a template, sorted and de-duplicated.
///
/// Helper names, block parameters, `@` locals and names read from the item
/// context of an `each`/`with` block are not free.
pub fn template_variables(template: &str) -> Result<BTreeSet<String>> {
    let compiled = compile(template)?;
    Ok(VariableCollector::collect(&compiled))
}

/// Walks a compiled template collecting the top-level names it reads
#[derive(Default)]
struct VariableCollector {
    variables: BTreeSet<String>,
    /// Block parameters in scope
    bound: Vec<String>,
    /// Enclosing blocks that switch the context
    depth: usize,
}

impl VariableCollector {
    fn collect(template: &Template) -> BTreeSet<String> {
        let mut collector = Self::default();
        collector.visit_template(template);
        collector.variables
    }

    fn visit_template(&mut self, template: &Template) {
        for element in &template.elements {
            self.visit_element(element);
        }
    }

    fn visit_element(&mut self, element: &TemplateElement) {
        match element {
            TemplateElement::Expression(helper) | TemplateElement::HtmlExpression(helper) => {
                self.visit_parameter(&helper.name);
                self.visit_arguments(helper);
            }
            TemplateElement::HelperBlock(helper) => self.visit_block(helper),
            TemplateElement::DecoratorExpression(decorator)
            | TemplateElement::DecoratorBlock(decorator)
            | TemplateElement::PartialExpression(decorator)
            | TemplateElement::PartialBlock(decorator) => {
                for param in decorator.params.iter().chain(decorator.hash.values()) {
                    self.visit_parameter(param);
                }
                if let Some(template) = &decorator.template {
                    self.visit_template(template);
                }
            }
            _ => {}
        }
    }

    fn visit_block(&mut self, helper: &HelperTemplate) {
        self.visit_arguments(helper);

        if let Some(template) = &helper.template {
            let switches_context = matches!(helper.name.as_name(), Some("each" | "with"));
            let bound = self.bound.len();
            self.bound.extend(block_param_names(helper.block_param.as_ref()));
            if switches_context {
                self.depth += 1;
            }
            self.visit_template(template);
            if switches_context {
                self.depth -= 1;
            }
            self.bound.truncate(bound);
        }
        // Else branches, including `{{else if ..}}` chains
        if let Some(inverse) = &helper.inverse {
            self.visit_template(inverse);
        }
    }

    fn visit_arguments(&mut self, helper: &HelperTemplate) {
        for param in helper.params.iter().chain(helper.hash.values()) {
            self.visit_parameter(param);
        }
    }

    /// `Parameter::Name` is a helper name and never a variable
    fn visit_parameter(&mut self, param: &Parameter) {
        match param {
            Parameter::Path(path) => self.visit_path(path),
            Parameter::Subexpression(subexpression) => self.visit_element(subexpression.as_element()),
            _ => {}
        }
    }

    fn visit_path(&mut self, path: &Path) {
        // `Path::Local` is `@index`, `@key` and friends
        let Path::Relative((segments, raw)) = path else {
            return;
        };
        let Some(name) = segments.iter().find_map(|segment| match segment {
            PathSeg::Named(name) => Some(name),
            _ => None,
        }) else {
            return;
        };

        let rest = ["this.", "this/", "./"]
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix))
            .unwrap_or(raw.as_str());
        if rest.starts_with("@root") {
            self.variables.insert(name.clone());
            return;
        }

        let mut ups = 0;
        let mut rest = rest;
        while let Some(next) = rest.strip_prefix("..") {
            ups += 1;
            rest = next.get(1..).unwrap_or_default();
        }

        if ups == 0 && self.bound.iter().any(|b| b == name) {
            return;
        }
        if ups >= self.depth {
            self.variables.insert(name.clone());
        }
    }
}

fn block_param_names(block_param: Option<&BlockParam>) -> Vec<String> {
    match block_param {
        Some(BlockParam::Single(first)) => first.as_name().map(str::to_string).into_iter().collect(),
        Some(BlockParam::Pair((first, second))) => [first, second]
            .into_iter()
            .filter_map(Parameter::as_name)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// A compiled prompt template and its free variables
pub struct PromptTemplate {
    source: String,
    variables: BTreeSet<String>,
    renderer: PromptRenderer,
}

impl PromptTemplate {
    /// Compile a template; fails on Handlebars syntax errors
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let compiled = compile(&source)?;
        let variables = VariableCollector::collect(&compiled);

        let mut renderer = PromptRenderer::new();
        renderer.register_template(TEMPLATE_NAME, compiled);
        Ok(Self {
            source,
            variables,
            renderer,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    pub fn render(&self, context: &Value) -> Result<String> {
        self.renderer.render_named(TEMPLATE_NAME, context)
    }
}
