//! Generates typed models and operation stubs from an OpenAPI contract.
//!
//! The [`Pipeline`] runs every stage in order: the document is loaded, references are checked,
//! schemas are interpreted into a canonical graph, operations are extracted, everything is
//! lowered for the target and finally rendered (and optionally written to disk).

pub mod config;
pub mod deserializer;
pub mod diagnostics;
pub mod error;
pub mod generator;
pub mod loader;
pub mod mapper;
pub mod naming;
pub mod operation;
pub mod parser;
pub mod resolver;
pub mod writer;

use std::path::Path;

pub use config::{GeneratorConfig, Target};
pub use diagnostics::{Diagnostic, Report, Status};
pub use error::Error;
pub use generator::RenderedUnit;
pub use loader::Format;
/// Checked between stages. Clones share one cancellation state.
pub use tokio_util::sync::CancellationToken;

use generator::Generator;
use loader::Document;
use parser::Interpreter;
use resolver::Resolver;
use writer::Writer;

/// Everything a run produced, nothing written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub units: Vec<RenderedUnit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Generation {
    pub fn status(&self) -> Status {
        Status::from_diagnostics(&self.diagnostics)
    }
}

pub struct Pipeline {
    target: Target,
    config: GeneratorConfig,
    cancellation: CancellationToken,
}

impl Pipeline {
    pub fn new(target: Target, config: GeneratorConfig) -> Self {
        Self {
            target,
            config,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    fn checkpoint(&self, stage: &'static str) -> Result<(), Error> {
        if self.cancellation.is_cancelled() {
            log::info!("cancelled before {}", stage);
            return Err(Error::Cancelled { stage });
        }
        Ok(())
    }

    /// Generates from contract text without touching the disk
    pub fn run(&self, text: &str, format: Format) -> Result<Generation, Error> {
        self.checkpoint("load")?;
        let document = loader::load(text, format)?;
        self.generate(&document)
    }

    /// Generates from the contract at `input` and writes the units and the report under
    /// `out_dir`
    pub fn generate_to_dir(&self, input: &Path, out_dir: &Path) -> Result<Report, Error> {
        self.checkpoint("load")?;
        let document = loader::load_file(input)?;
        let generation = self.generate(&document)?;
        self.checkpoint("write")?;
        let report = Report {
            status: generation.status(),
            files: generation.units.iter().map(|unit| unit.path.clone()).collect(),
            diagnostics: generation.diagnostics,
        };
        Writer::new(out_dir).write(&generation.units, &report)?;
        Ok(report)
    }

    fn generate(&self, document: &Document) -> Result<Generation, Error> {
        self.checkpoint("resolve")?;
        let mut resolver = Resolver::new(document);
        let references = resolver.check_all()?;
        log::debug!("{} reference(s) resolved", references);

        self.checkpoint("interpret")?;
        let mut interpreter = Interpreter::new(&mut resolver);
        interpreter.interpret_components(document)?;

        self.checkpoint("extract")?;
        let extraction = operation::extract(document, &mut interpreter, self.config.operation_naming)?;
        let graph = interpreter.finish();
        log::debug!(
            "{} definition(s), {} operation(s)",
            graph.len(),
            extraction.operations.len()
        );

        self.checkpoint("map")?;
        let model = mapper::lower(&graph, &extraction.operations, self.target, &self.config);

        self.checkpoint("render")?;
        let (units, rendered) = Generator::new(self.target, &document.info, &self.config).render_all(&model);

        let mut diagnostics = generator::unknown_templates(&self.config);
        diagnostics.extend(extraction.diagnostics);
        diagnostics.extend(model.diagnostics);
        diagnostics.extend(rendered);
        log::info!(
            "generated {} unit(s) for {} with {} diagnostic(s)",
            units.len(),
            self.target,
            diagnostics.len()
        );
        Ok(Generation { units, diagnostics })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;
    use crate::diagnostics::DiagnosticCode;
    use pretty_assertions::assert_eq;
    use std::{collections::BTreeMap, path::PathBuf};

    const HELLO: &str = include_str!("../resources/hello.yaml");
    const PETSTORE: &str = include_str!("../resources/petstore.yaml");

    fn petstore_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/petstore.yaml")
    }

    fn run(yaml: &str, target: Target, config: GeneratorConfig) -> Generation {
        Pipeline::new(target, config).run(yaml, Format::Yaml).unwrap()
    }

    fn unit<'g>(generation: &'g Generation, path: &str) -> &'g str {
        generation
            .units
            .iter()
            .find(|unit| unit.path == path)
            .map(|unit| unit.text.as_str())
            .unwrap_or_else(|| panic!("no unit at {}", path))
    }

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .map(Result::unwrap)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| (entry.path().to_path_buf(), std::fs::read(entry.path()).unwrap()))
            .collect()
    }

    #[test]
    fn test_hello_scenario() {
        let generation = run(HELLO, Target::Rust, GeneratorConfig::default());
        assert_eq!(generation.diagnostics, vec![]);
        assert_eq!(generation.status(), Status::Success);
        let paths = generation.units.iter().map(|unit| unit.path.as_str()).collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec!["models/get_hello_user400_response.rs", "operations/get_hello_user.rs"]
        );

        let model = unit(&generation, "models/get_hello_user400_response.rs");
        assert!(model.starts_with("// Generated by apigen from Hello 1.0.0. Do not edit.\n"));
        assert!(model.contains("pub enum GetHelloUser400Response {"));
        assert!(model.contains("#[serde(rename = \"Invalid characters\")]\n    InvalidCharacters,"));

        let operation = unit(&generation, "operations/get_hello_user.rs");
        assert!(operation.contains("pub user: String,"));
        assert!(operation.contains("Status200(String)"));
        assert!(operation.contains("Status400(GetHelloUser400Response)"));
        assert!(operation.contains("fn get_hello_user(&self, params: GetHelloUserParams) -> GetHelloUserResponse;"));
    }

    #[test]
    fn test_generating_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(Target::Rust, GeneratorConfig::default());
        let first = pipeline.generate_to_dir(&petstore_path(), dir.path()).unwrap();
        let written = snapshot(dir.path());
        let second = pipeline.generate_to_dir(&petstore_path(), dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(written, snapshot(dir.path()));
        assert!(written.contains_key(&dir.path().join(writer::REPORT_FILE)));
        assert_eq!(written.len(), first.files.len() + 1);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let sequential = GeneratorConfig {
            parallel: false,
            ..GeneratorConfig::default()
        };
        for target in [Target::Rust, Target::Protobuf] {
            assert_eq!(
                run(PETSTORE, target, GeneratorConfig::default()),
                run(PETSTORE, target, sequential.clone())
            );
        }
    }

    #[test]
    fn test_petstore_rust() {
        let generation = run(PETSTORE, Target::Rust, GeneratorConfig::default());
        assert_eq!(generation.status(), Status::Success);

        let category = unit(&generation, "models/category.rs");
        assert!(category.contains("pub parent: Option<Box<Category>>,"));
        assert!(category.contains("pub children: Option<Vec<Category>>,"));

        let pet = unit(&generation, "models/pet.rs");
        assert!(pet.contains("/// A pet in the store\n"));
        assert!(pet.contains("pub id: i64,"));
        assert!(pet.contains("pub tag: Option<String>,"));
        assert!(pet.contains("pub kind: Option<PetKind>,"));
        assert!(pet.contains("pub owner: Option<Box<Owner>>,"));

        let kind = unit(&generation, "models/pet_kind.rs");
        let order = ["\"cat\"", "\"dog\"", "\"bird\""].map(|value| kind.find(value).unwrap());
        assert!(order[0] < order[1] && order[1] < order[2]);

        // merged from both parts of the intersection
        let new_pet = unit(&generation, "models/new_pet.rs");
        assert!(new_pet.contains("pub name: String,"));
        assert!(new_pet.contains("pub note: Option<String>,"));

        let show = unit(&generation, "operations/get_pets_petid.rs");
        assert!(show.contains("pub pet_id: uuid::Uuid,"));
        assert!(show.contains("Status404,"));
        let delete = unit(&generation, "operations/delete_pets_petid.rs");
        assert!(delete.contains("#[deprecated]"));
    }

    #[test]
    fn test_operation_id_naming() {
        let config = GeneratorConfig {
            operation_naming: config::OperationNaming::OperationId,
            ..GeneratorConfig::default()
        };
        let generation = run(PETSTORE, Target::Rust, config);
        let operations = generation
            .units
            .iter()
            .filter(|unit| unit.kind == generator::UnitKind::Operation)
            .map(|unit| unit.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            operations,
            vec![
                "operations/list_pets.rs",
                "operations/create_pet.rs",
                "operations/show_pet_by_id.rs",
                "operations/delete_pet.rs"
            ]
        );
    }

    #[test]
    fn test_petstore_protobuf() {
        let generation = run(PETSTORE, Target::Protobuf, GeneratorConfig::default());
        assert_eq!(generation.status(), Status::Success);
        let pet = unit(&generation, "models/pet.proto");
        assert!(pet.contains("syntax = \"proto3\";\n\npackage api;\n"));
        assert!(pet.contains("import \"models/owner.proto\";"));
        assert!(pet.contains("  int64 id = 1;\n"));
        let list = unit(&generation, "operations/get_pets.proto");
        assert!(list.contains("  optional int32 limit = 1;\n"));
        assert!(list.contains("  repeated Pet status_200 = 1;\n"));
        assert!(list.contains("rpc GetPets(GetPetsRequest) returns (GetPetsResponse);"));
    }

    #[test]
    fn test_invalid_schema_gives_partial_output() {
        let yaml = r#"
            openapi: 3.0.3
            info: {title: Broken, version: "1"}
            paths: {}
            components:
              schemas:
                Empty:
                  type: string
                  enum: []
                Holder:
                  type: object
                  properties:
                    empty: {$ref: '#/components/schemas/Empty'}
                Fine:
                  type: string
        "#;
        let generation = run(yaml, Target::Rust, GeneratorConfig::default());
        assert_eq!(generation.status(), Status::Partial);
        let codes = generation.diagnostics.iter().map(|d| d.code).collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec![DiagnosticCode::EmptyEnumeration, DiagnosticCode::DependencySkipped]
        );
        let paths = generation.units.iter().map(|unit| unit.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["models/fine.rs"]);
    }

    #[test]
    fn test_warnings_alone_are_not_success() {
        let yaml = r#"
            openapi: 3.0.3
            info: {title: Loose, version: "1"}
            paths: {}
            components:
              schemas:
                Loose:
                  type: object
                  properties:
                    extra: {}
        "#;
        let generation = run(yaml, Target::Rust, GeneratorConfig::default());
        let codes = generation.diagnostics.iter().map(|d| d.code).collect::<Vec<_>>();
        assert_eq!(codes, vec![DiagnosticCode::OpaqueFallback]);
        assert_eq!(generation.units.len(), 1);
        assert_eq!(generation.status(), Status::Warnings);
        assert_eq!(generation.status().exit_code(), 2);
    }

    #[test]
    fn test_document_without_info() {
        let yaml = r#"
            paths: {}
            components:
              schemas:
                Name: {type: string}
        "#;
        let generation = run(yaml, Target::Rust, GeneratorConfig::default());
        assert!(unit(&generation, "models/name.rs").starts_with("// Generated by apigen. Do not edit.\n"));
    }

    #[test]
    fn test_fatal_errors_abort() {
        let pipeline = Pipeline::new(Target::Rust, GeneratorConfig::default());
        let dangling = r#"
            paths: {}
            components:
              schemas:
                Pet: {$ref: '#/components/schemas/Missing'}
        "#;
        assert!(matches!(
            pipeline.run(dangling, Format::Yaml),
            Err(Error::UnresolvedReference(_))
        ));
        assert!(matches!(pipeline.run("{", Format::Json), Err(Error::Parse(_))));
    }

    #[test]
    fn test_cancelled_run() {
        let token = CancellationToken::new();
        let pipeline = Pipeline::new(Target::Rust, GeneratorConfig::default()).with_cancellation(token.clone());
        token.cancel();
        assert!(matches!(
            pipeline.run(HELLO, Format::Yaml),
            Err(Error::Cancelled { stage: "load" })
        ));
    }
}
