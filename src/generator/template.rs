//! Named templates rendered with tera. Autoescaping is off, the output is source code.

use std::{collections::BTreeMap, error::Error as _};

use tera::{Context, Tera};

use crate::{config::Target, error::TemplateError};

const RUST_HEADER: &str = "// Generated by apigen{% if title %} from {{ title }}{% if version %} {{ version }}{% endif %}{% endif %}. Do not edit.
#![allow(unused_imports, clippy::all)]
{{ imports }}

{{ doc }}{{ body }}";

const PROTOBUF_HEADER: &str = "// Generated by apigen{% if title %} from {{ title }}{% if version %} {{ version }}{% endif %}{% endif %}. Do not edit.
syntax = \"proto3\";

package {{ package }};
{{ imports }}
{{ doc }}{{ body }}";

pub const RUST_MODEL: &str = "rust/model";
pub const RUST_OPERATION: &str = "rust/operation";
pub const PROTOBUF_MODEL: &str = "protobuf/model";
pub const PROTOBUF_OPERATION: &str = "protobuf/operation";

/// Every template name a configuration may override
pub const TEMPLATE_NAMES: [&str; 4] = [RUST_MODEL, RUST_OPERATION, PROTOBUF_MODEL, PROTOBUF_OPERATION];

/// The templates of one target, built-ins replaced by configured overrides
#[derive(Debug, Clone)]
pub struct Templates {
    templates: BTreeMap<&'static str, String>,
}

impl Templates {
    pub fn new(target: Target, overrides: &BTreeMap<String, String>) -> Self {
        let builtin: [(&'static str, &str); 2] = match target {
            Target::Rust => [(RUST_MODEL, RUST_HEADER), (RUST_OPERATION, RUST_HEADER)],
            Target::Protobuf => [(PROTOBUF_MODEL, PROTOBUF_HEADER), (PROTOBUF_OPERATION, PROTOBUF_HEADER)],
        };
        let templates = builtin
            .into_iter()
            .map(|(name, template)| {
                let template = overrides.get(name).cloned().unwrap_or_else(|| template.to_string());
                (name, template)
            })
            .collect();
        Self { templates }
    }

    pub fn render(&self, name: &str, variables: &BTreeMap<&str, String>) -> Result<String, TemplateError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::UnknownTemplate(name.to_string()))?;
        substitute(name, template, variables)
    }
}

/// Renders `template` once against `variables`.
pub fn substitute(name: &str, template: &str, variables: &BTreeMap<&str, String>) -> Result<String, TemplateError> {
    let mut context = Context::new();
    for (variable, value) in variables {
        context.insert(*variable, value);
    }
    Tera::one_off(template, &context, false).map_err(|err| template_error(name, &err))
}

/// Tera reports an undefined variable as a message somewhere down the error chain.
fn template_error(name: &str, err: &tera::Error) -> TemplateError {
    let mut messages = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        messages.push(cause.to_string());
        source = cause.source();
    }
    let missing = messages.iter().find_map(|message| {
        let rest = message.strip_prefix("Variable `")?;
        let (variable, tail) = rest.split_once('`')?;
        tail.contains("not found in context").then(|| variable.to_string())
    });
    match missing {
        Some(variable) => TemplateError::MissingVariable {
            template: name.to_string(),
            variable,
        },
        None => TemplateError::Malformed {
            template: name.to_string(),
            message: messages.join(": "),
        },
    }
}
