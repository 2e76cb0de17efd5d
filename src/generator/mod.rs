mod protobuf_gen;
mod rust_gen;
pub mod template;

use std::collections::BTreeMap;

use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{
    config::{GeneratorConfig, Target},
    diagnostics::{Diagnostic, DiagnosticCode},
    error::TemplateError,
    loader::Info,
    mapper::{LoweredModel, OperationDef, TypeDef},
    naming::snake_case,
};
use protobuf_gen::ProtobufRenderer;
use rust_gen::RustRenderer;
pub use template::Templates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Model,
    Operation,
}

/// One output file, not yet written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedUnit {
    pub name: String,
    pub kind: UnitKind,
    /// Relative to the output directory, always `/` separated
    pub path: String,
    pub text: String,
}

/// Target specific pieces of a unit, placed into its template
pub(crate) struct Rendered {
    pub imports: String,
    pub doc: String,
    pub body: String,
}

pub(crate) trait Renderer: Sync {
    fn model(&self, def: &TypeDef) -> Result<Rendered, TemplateError>;
    fn operation(&self, def: &OperationDef) -> Result<Rendered, TemplateError>;
    /// Checks a fully templated unit
    fn validate(&self, unit: &str, text: &str) -> Result<(), TemplateError>;
}

/// `models/pet_owner.rs`, `operations/get_hello_user.proto`
pub fn unit_path(kind: UnitKind, name: &str, target: Target) -> String {
    let directory = match kind {
        UnitKind::Model => "models",
        UnitKind::Operation => "operations",
    };
    format!("{}/{}.{}", directory, snake_case(name), target.extension())
}

pub(crate) fn doc_lines(doc: Option<&str>) -> Vec<&str> {
    doc.map(|doc| doc.trim().lines().map(str::trim_end).collect())
        .unwrap_or_default()
}

enum Job<'a> {
    Model(&'a TypeDef),
    Operation(&'a OperationDef),
}

pub struct Generator<'a> {
    target: Target,
    info: &'a Info,
    package: &'a str,
    parallel: bool,
    templates: Templates,
}

impl<'a> Generator<'a> {
    pub fn new(target: Target, info: &'a Info, config: &'a GeneratorConfig) -> Self {
        Self {
            target,
            info,
            package: &config.package,
            parallel: config.parallel,
            templates: Templates::new(target, &config.templates),
        }
    }

    /// Renders every model, then every operation. Units are independent, a failing unit is
    /// reported and left out without affecting the others. The output order never depends on
    /// scheduling.
    pub fn render_all(&self, model: &LoweredModel) -> (Vec<RenderedUnit>, Vec<Diagnostic>) {
        let renderer: &dyn Renderer = match self.target {
            Target::Rust => &RustRenderer,
            Target::Protobuf => &ProtobufRenderer,
        };
        let jobs = model
            .types
            .iter()
            .map(Job::Model)
            .chain(model.operations.iter().map(Job::Operation))
            .collect::<Vec<_>>();
        log::debug!("rendering {} units for {}", jobs.len(), self.target);

        let render = |job: &Job| self.render_unit(renderer, job);
        let results: Vec<Result<RenderedUnit, Diagnostic>> = if self.parallel {
            jobs.par_iter().map(render).collect()
        } else {
            jobs.iter().map(render).collect()
        };

        let mut units = vec![];
        let mut diagnostics = vec![];
        for result in results {
            match result {
                Ok(unit) => units.push(unit),
                Err(diagnostic) => {
                    diagnostic.log();
                    diagnostics.push(diagnostic);
                }
            }
        }
        (units, diagnostics)
    }

    fn render_unit(&self, renderer: &dyn Renderer, job: &Job) -> Result<RenderedUnit, Diagnostic> {
        let (name, kind, rendered, template) = match (job, self.target) {
            (Job::Model(def), Target::Rust) => (&def.name, UnitKind::Model, renderer.model(def), template::RUST_MODEL),
            (Job::Model(def), Target::Protobuf) => {
                (&def.name, UnitKind::Model, renderer.model(def), template::PROTOBUF_MODEL)
            }
            (Job::Operation(def), Target::Rust) => {
                (&def.id, UnitKind::Operation, renderer.operation(def), template::RUST_OPERATION)
            }
            (Job::Operation(def), Target::Protobuf) => (
                &def.id,
                UnitKind::Operation,
                renderer.operation(def),
                template::PROTOBUF_OPERATION,
            ),
        };
        let text = rendered.and_then(|rendered| {
            let variables = BTreeMap::from([
                ("name", name.clone()),
                ("title", self.info.title.clone()),
                ("version", self.info.version.clone()),
                ("package", self.package.to_string()),
                ("imports", rendered.imports),
                ("doc", rendered.doc),
                ("body", rendered.body),
            ]);
            let text = self.templates.render(template, &variables)?;
            renderer.validate(name, &text)?;
            Ok(text)
        });
        match text {
            Ok(text) => {
                log::trace!("rendered {}", name);
                Ok(RenderedUnit {
                    name: name.clone(),
                    kind,
                    path: unit_path(kind, name, self.target),
                    text,
                })
            }
            Err(err) => Err(Diagnostic::error(DiagnosticCode::Template, name.as_str(), err.to_string())),
        }
    }
}

/// Warnings for configured templates that no target knows
pub fn unknown_templates(config: &GeneratorConfig) -> Vec<Diagnostic> {
    config
        .templates
        .keys()
        .filter(|name| !template::TEMPLATE_NAMES.contains(&name.as_str()))
        .map(|name| {
            Diagnostic::warning(
                DiagnosticCode::Template,
                name.as_str(),
                format!("unknown template `{}` is ignored", name),
            )
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;
    use crate::{
        mapper::{Scalar, TypeDefKind, TypeDescriptor, TypeKind},
        operation::Method,
        parser::SchemaId,
    };
    use pretty_assertions::assert_eq;

    fn info() -> Info {
        Info {
            title: "Zoo".into(),
            version: "2.0".into(),
            description: None,
        }
    }

    fn model() -> LoweredModel {
        let types = ["Cat", "Dog", "Bird", "Fish"]
            .into_iter()
            .map(|name| TypeDef {
                name: name.to_string(),
                source: SchemaId::new(format!("#/components/schemas/{}", name)),
                doc: Some(format!("A {}", name.to_lowercase())),
                kind: TypeDefKind::Alias(TypeDescriptor::new(TypeKind::Scalar(Scalar::Text))),
            })
            .collect();
        let operations = vec![OperationDef {
            id: "list_cats".into(),
            method: Method::Get,
            path: "/cats".into(),
            summary: None,
            description: None,
            deprecated: false,
            request: "ListCatsParams".into(),
            response: "ListCatsResponse".into(),
            service: "ListCatsHandler".into(),
            params: vec![],
            body: None,
            responses: vec![],
        }];
        LoweredModel {
            types,
            operations,
            diagnostics: vec![],
        }
    }

    #[test]
    fn test_unit_path() {
        assert_eq!(unit_path(UnitKind::Model, "PetOwner", Target::Rust), "models/pet_owner.rs");
        assert_eq!(
            unit_path(UnitKind::Operation, "get_hello_user", Target::Protobuf),
            "operations/get_hello_user.proto"
        );
    }

    #[test]
    fn test_render_all_in_canonical_order() {
        let info = info();
        let config = GeneratorConfig::default();
        let (units, diagnostics) = Generator::new(Target::Rust, &info, &config).render_all(&model());
        assert_eq!(diagnostics, vec![]);
        let paths = units.iter().map(|unit| unit.path.as_str()).collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                "models/cat.rs",
                "models/dog.rs",
                "models/bird.rs",
                "models/fish.rs",
                "operations/list_cats.rs"
            ]
        );
        assert!(units[0].text.starts_with("// Generated by apigen from Zoo 2.0. Do not edit.\n"));
        assert!(units[0].text.contains("/// A cat\n"));
        assert!(units[4].text.contains("pub trait ListCatsHandler"));
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let info = info();
        let parallel = GeneratorConfig::default();
        let sequential = GeneratorConfig {
            parallel: false,
            ..GeneratorConfig::default()
        };
        for target in [Target::Rust, Target::Protobuf] {
            assert_eq!(
                Generator::new(target, &info, &parallel).render_all(&model()),
                Generator::new(target, &info, &sequential).render_all(&model())
            );
        }
    }

    #[test]
    fn test_failing_unit_is_isolated() {
        let info = info();
        let config = GeneratorConfig {
            templates: BTreeMap::from([(template::RUST_OPERATION.to_string(), "{{ owner }}".to_string())]),
            ..GeneratorConfig::default()
        };
        let (units, diagnostics) = Generator::new(Target::Rust, &info, &config).render_all(&model());
        assert_eq!(units.len(), 4);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::Template);
        assert_eq!(diagnostics[0].unit, "list_cats");
        assert!(diagnostics[0].is_error());
    }

    #[test]
    fn test_invalid_output_is_reported() {
        let info = info();
        let config = GeneratorConfig {
            templates: BTreeMap::from([(template::RUST_MODEL.to_string(), "{{ body }} }".to_string())]),
            ..GeneratorConfig::default()
        };
        let (units, diagnostics) = Generator::new(Target::Rust, &info, &config).render_all(&model());
        assert_eq!(units.len(), 1);
        assert_eq!(diagnostics.len(), 4);
    }

    #[test]
    fn test_unknown_templates_are_warned() {
        let config = GeneratorConfig {
            templates: BTreeMap::from([
                (template::RUST_MODEL.to_string(), "{{ body }}".to_string()),
                ("go/model".to_string(), "{{ body }}".to_string()),
            ]),
            ..GeneratorConfig::default()
        };
        let diagnostics = unknown_templates(&config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].unit, "go/model");
        assert!(!diagnostics[0].is_error());
    }
}
