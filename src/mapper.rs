//! Lowers the canonical schema graph and operations into target neutral type descriptors.
//!
//! Names are claimed here, sequentially and in canonical order: definitions in graph order,
//! then operations in document order. Renderers never invent type names.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::{
    config::{EmptyResponsePolicy, GeneratorConfig, Target, UnionPolicy, UnknownPolicy},
    deserializer::ParameterLocation,
    diagnostics::{Diagnostic, DiagnosticCode},
    naming::{pascal_case, pascal_case_or, proto_field_ident, rust_field_ident, NameRegistry},
    operation::{Method, Operation},
    parser::{Discriminator, Format, Literal, PrimitiveKind, SchemaGraph, SchemaId, SchemaNode, Shape},
    resolver::last_segment,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Text,
    Int32,
    Int64,
    Float,
    Double,
    Bool,
    DateTime,
    Date,
    Uuid,
    Bytes,
}

impl Scalar {
    pub fn name(&self) -> &'static str {
        match self {
            Scalar::Text => "text",
            Scalar::Int32 => "int32",
            Scalar::Int64 => "int64",
            Scalar::Float => "float",
            Scalar::Double => "double",
            Scalar::Bool => "bool",
            Scalar::DateTime => "date_time",
            Scalar::Date => "date",
            Scalar::Uuid => "uuid",
            Scalar::Bytes => "bytes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Scalar(Scalar),
    List(Box<TypeDescriptor>),
    /// String keyed map
    Map(Box<TypeDescriptor>),
    /// A [`TypeDef`]. `recursive` is set when the reference closes a cycle back to the type
    /// that holds it.
    Named { name: String, recursive: bool },
    Opaque,
    Unit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub nullable: bool,
}

impl TypeDescriptor {
    pub fn new(kind: TypeKind) -> Self {
        Self { kind, nullable: false }
    }

    fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable |= nullable;
        self
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, TypeKind::List(_) | TypeKind::Map(_))
    }

    /// Human readable form used in docs and diagnostics
    pub fn describe(&self) -> String {
        let described = match &self.kind {
            TypeKind::Scalar(scalar) => scalar.name().to_string(),
            TypeKind::List(item) => format!("list of {}", item.describe()),
            TypeKind::Map(value) => format!("map of {}", value.describe()),
            TypeKind::Named { name, .. } => name.clone(),
            TypeKind::Opaque => "any value".to_string(),
            TypeKind::Unit => "nothing".to_string(),
        };
        if self.nullable {
            format!("{} or null", described)
        } else {
            described
        }
    }

    /// Names of the [`TypeDef`]s this descriptor mentions
    pub fn named(&self) -> Vec<&str> {
        match &self.kind {
            TypeKind::List(inner) | TypeKind::Map(inner) => inner.named(),
            TypeKind::Named { name, .. } => vec![name.as_str()],
            _ => vec![],
        }
    }
}

/// What a target can represent natively. Everything else falls back to a simpler form.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub int32: bool,
    pub float: bool,
    pub uuid: bool,
    pub date_time: bool,
    pub date: bool,
    /// `format: byte`, base64 text on the wire
    pub base64: bool,
    pub binary: bool,
    /// Lists of lists, maps of lists, ...
    pub nested_containers: bool,
    /// Union branches that are lists or maps
    pub container_branches: bool,
    /// Type names that are taken before any is claimed
    pub reserved: &'static [&'static str],
}

impl Capabilities {
    pub fn of(target: Target) -> Self {
        match target {
            Target::Rust => Capabilities {
                int32: true,
                float: true,
                uuid: true,
                date_time: false,
                date: false,
                base64: false,
                binary: true,
                nested_containers: true,
                container_branches: true,
                reserved: &["String", "Vec", "Option", "Box", "Result", "HashMap", "Value", "Self"],
            },
            Target::Protobuf => Capabilities {
                int32: true,
                float: true,
                uuid: false,
                date_time: true,
                date: false,
                base64: true,
                binary: true,
                nested_containers: false,
                container_branches: false,
                reserved: &["Timestamp", "Value", "Empty", "Any"],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Name on the wire
    pub name: String,
    /// Identifier in the target language
    pub ident: String,
    pub doc: Option<String>,
    pub ty: TypeDescriptor,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumRepr {
    String,
    Integer,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionVariant {
    pub name: String,
    pub ty: TypeDescriptor,
    /// Discriminator value selecting this variant
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefKind {
    Struct {
        fields: Vec<Field>,
        /// Undeclared properties, kept in a map
        additional: Option<Field>,
    },
    Enum {
        repr: EnumRepr,
        variants: Vec<EnumVariant>,
    },
    Union {
        variants: Vec<UnionVariant>,
        discriminator: Option<String>,
    },
    /// A union the target can't express, kept as an opaque value
    Fallback { alternatives: Vec<String> },
    /// An intersection that could not be merged, each part kept whole
    Composite { parts: Vec<Field> },
    /// A named wrapper around a non composite definition
    Alias(TypeDescriptor),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub source: SchemaId,
    pub doc: Option<String>,
    pub kind: TypeDefKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    pub name: String,
    pub ident: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub doc: Option<String>,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDef {
    pub ident: String,
    pub media_type: String,
    pub required: bool,
    pub doc: Option<String>,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDef {
    /// `200`, `4XX` or `default`
    pub status: String,
    /// `Status200`, `Default`
    pub variant: String,
    /// `status_200`, `default`
    pub ident: String,
    pub doc: Option<String>,
    pub ty: TypeDescriptor,
}

impl ResponseDef {
    /// The exact status code, when the response isn't a range or the default
    pub fn code(&self) -> Option<u16> {
        self.status.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDef {
    pub id: String,
    pub method: Method,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    /// Type holding the parameters and body
    pub request: String,
    /// Type holding one of the responses
    pub response: String,
    /// Handler trait or service
    pub service: String,
    pub params: Vec<ParamDef>,
    pub body: Option<BodyDef>,
    pub responses: Vec<ResponseDef>,
}

#[derive(Debug, Clone, Default)]
pub struct LoweredModel {
    pub types: Vec<TypeDef>,
    pub operations: Vec<OperationDef>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn lower(graph: &SchemaGraph, operations: &[Operation], target: Target, config: &GeneratorConfig) -> LoweredModel {
    let mut mapper = Mapper::new(graph, target, config);
    let mut model = LoweredModel::default();

    for definition in graph.definitions() {
        match &definition.node {
            Ok(node) => {
                let name = mapper.names.claim(&definition_name(node, &definition.id));
                mapper.definition_names.insert(definition.id.clone(), name);
            }
            Err(err) => {
                record(&mut model.diagnostics, Diagnostic::schema(definition.id.as_str(), err));
                mapper.failed.insert(definition.id.clone());
            }
        }
    }

    let mut mapped = vec![];
    for definition in graph.definitions() {
        let (Ok(node), Some(name)) = (&definition.node, mapper.definition_names.get(&definition.id).cloned()) else {
            continue;
        };
        match mapper.map_definition(&definition.id, node, name) {
            Ok(scope) => mapped.push((definition.id.clone(), scope)),
            Err(diagnostic) => {
                record(&mut model.diagnostics, diagnostic);
                mapper.failed.insert(definition.id.clone());
            }
        }
    }

    // A definition depending on one that wasn't generated can't be generated either
    loop {
        let mut changed = false;
        for (id, _) in mapped.iter() {
            if mapper.failed.contains(id) {
                continue;
            }
            let broken = mapper
                .references
                .get(id)
                .and_then(|targets| targets.iter().find(|target| mapper.failed.contains(*target)))
                .cloned();
            if let Some(broken) = broken {
                record(&mut model.diagnostics, dependency_skipped(id.as_str(), &broken));
                mapper.failed.insert(id.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    for (id, scope) in mapped {
        if !mapper.failed.contains(&id) {
            mapper.commit(scope, &mut model);
        }
    }

    for operation in operations {
        match mapper.map_operation(operation) {
            Ok((definition, scope)) => {
                mapper.commit(scope, &mut model);
                model.operations.push(definition);
            }
            Err(diagnostic) => record(&mut model.diagnostics, diagnostic),
        }
    }

    log::debug!(
        "lowered {} type(s) and {} operation(s) for {}",
        model.types.len(),
        model.operations.len(),
        target
    );
    model
}

fn record(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    diagnostic.log();
    diagnostics.push(diagnostic);
}

fn dependency_skipped(unit: &str, dependency: &SchemaId) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::DependencySkipped,
        unit,
        format!("depends on `{}`, which could not be generated", dependency),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Parameters, request bodies and responses
    Payload,
    /// Fields, items and map values
    Nested,
}

/// Everything one definition or operation produces. Dropped as a whole when the unit fails.
struct Scope {
    unit: String,
    /// Definition being mapped, for recursion detection
    owner: Option<SchemaId>,
    types: Vec<TypeDef>,
    inline: Vec<(SchemaId, String)>,
    warnings: Vec<Diagnostic>,
}

impl Scope {
    fn new(unit: impl Into<String>, owner: Option<SchemaId>) -> Self {
        Scope {
            unit: unit.into(),
            owner,
            types: vec![],
            inline: vec![],
            warnings: vec![],
        }
    }

    fn warn(&mut self, code: DiagnosticCode, message: String) {
        self.warnings.push(Diagnostic::warning(code, self.unit.clone(), message));
    }
}

type Lowered<T> = Result<T, Diagnostic>;

struct Mapper<'g> {
    graph: &'g SchemaGraph,
    target: Target,
    capabilities: Capabilities,
    config: &'g GeneratorConfig,
    names: NameRegistry,
    definition_names: HashMap<SchemaId, String>,
    inline_names: HashMap<SchemaId, String>,
    /// Direct references of every definition
    references: HashMap<SchemaId, BTreeSet<SchemaId>>,
    /// Definitions reachable from every definition
    reachable: HashMap<SchemaId, HashSet<SchemaId>>,
    failed: HashSet<SchemaId>,
}

impl<'g> Mapper<'g> {
    fn new(graph: &'g SchemaGraph, target: Target, config: &'g GeneratorConfig) -> Self {
        let capabilities = Capabilities::of(target);
        let references: HashMap<SchemaId, BTreeSet<SchemaId>> = graph
            .definitions()
            .map(|definition| {
                let mut found = BTreeSet::new();
                if let Ok(node) = &definition.node {
                    collect_references(node, &mut found);
                }
                (definition.id.clone(), found)
            })
            .collect();
        let reachable = references
            .keys()
            .map(|id| (id.clone(), reachable_from(id, &references)))
            .collect();
        Mapper {
            graph,
            target,
            capabilities,
            config,
            names: NameRegistry::with_reserved(capabilities.reserved.iter().copied()),
            definition_names: HashMap::new(),
            inline_names: HashMap::new(),
            references,
            reachable,
            failed: HashSet::new(),
        }
    }

    fn commit(&mut self, scope: Scope, model: &mut LoweredModel) {
        for warning in scope.warnings {
            record(&mut model.diagnostics, warning);
        }
        self.inline_names.extend(scope.inline);
        model.types.extend(scope.types);
    }

    fn map_definition(&mut self, id: &SchemaId, node: &SchemaNode, name: String) -> Lowered<Scope> {
        let mut scope = Scope::new(id.as_str(), Some(id.clone()));
        let kind = if is_composite(node) {
            self.composite(&mut scope, node, &name)?
        } else {
            TypeDefKind::Alias(self.lower_node(&mut scope, node, &name, Position::Nested)?)
        };
        scope.types.insert(
            0,
            TypeDef {
                name,
                source: id.clone(),
                doc: node.description.clone(),
                kind,
            },
        );
        Ok(scope)
    }

    fn map_operation(&mut self, operation: &Operation) -> Lowered<(OperationDef, Scope)> {
        let base = pascal_case_or(&operation.id, "Operation");
        let (request_suffix, service_suffix) = match self.target {
            Target::Rust => ("Params", "Handler"),
            Target::Protobuf => ("Request", "Service"),
        };
        let request = self.names.claim(&format!("{}{}", base, request_suffix));
        let response = self.names.claim(&format!("{}Response", base));
        let service = self.names.claim(&format!("{}{}", base, service_suffix));

        let mut scope = Scope::new(operation.id.as_str(), None);
        let mut idents = NameRegistry::default();
        let mut params = vec![];
        for parameter in &operation.parameters {
            let hint = format!("{}{}", base, pascal_case(&parameter.name));
            let ty = self.lower(&mut scope, &parameter.schema, &hint, Position::Payload)?;
            params.push(ParamDef {
                name: parameter.name.clone(),
                ident: idents.claim(&self.field_ident(&parameter.name)),
                location: parameter.location,
                required: parameter.required,
                doc: parameter.description.clone(),
                ty,
            });
        }

        let body = match &operation.request_body {
            Some(body) => Some(BodyDef {
                ident: idents.claim("body"),
                media_type: body.media_type.clone(),
                required: body.required,
                doc: body.description.clone(),
                ty: self.lower(&mut scope, &body.schema, &format!("{}Body", base), Position::Payload)?,
            }),
            None => None,
        };

        let mut responses = vec![];
        for (status, declared) in &operation.responses {
            let ty = match &declared.schema {
                Some(schema) => {
                    let hint = format!("{}{}Response", base, pascal_case(status));
                    self.lower(&mut scope, schema, &hint, Position::Payload)?
                }
                None => match self.config.empty_responses {
                    EmptyResponsePolicy::Unit => TypeDescriptor::new(TypeKind::Unit),
                    EmptyResponsePolicy::Omit => continue,
                },
            };
            let (variant, ident) = if status == "default" {
                ("Default".to_string(), "default".to_string())
            } else {
                (format!("Status{}", status), format!("status_{}", status.to_ascii_lowercase()))
            };
            responses.push(ResponseDef {
                status: status.clone(),
                variant,
                ident,
                doc: declared.description.clone(),
                ty,
            });
        }

        let definition = OperationDef {
            id: operation.id.clone(),
            method: operation.method,
            path: operation.path.clone(),
            summary: operation.summary.clone(),
            description: operation.description.clone(),
            deprecated: operation.deprecated,
            request,
            response,
            service,
            params,
            body,
            responses,
        };
        Ok((definition, scope))
    }

    fn field_ident(&self, name: &str) -> String {
        match self.target {
            Target::Rust => rust_field_ident(name),
            Target::Protobuf => proto_field_ident(name),
        }
    }

    /// Descriptor of a node nested somewhere below a definition or operation
    fn lower(&mut self, scope: &mut Scope, node: &SchemaNode, hint: &str, position: Position) -> Lowered<TypeDescriptor> {
        // A named definition without shape is still an unknown payload
        if position == Position::Payload && self.config.unknown_payloads == UnknownPolicy::Reject {
            if let Some(target) = self.unknown_definition(node) {
                return self.unknown(scope, &target, position);
            }
        }
        if self.graph.get(&node.id).is_some() {
            let kind = self.reference(scope, &node.id)?;
            return Ok(TypeDescriptor::new(kind).with_nullable(node.nullable));
        }
        let known = self
            .inline_names
            .get(&node.id)
            .or_else(|| scope.inline.iter().find(|(id, _)| *id == node.id).map(|(_, name)| name));
        if let Some(name) = known {
            let kind = TypeKind::Named {
                name: name.clone(),
                recursive: false,
            };
            return Ok(TypeDescriptor::new(kind).with_nullable(node.nullable));
        }
        self.lower_node(scope, node, hint, position)
    }

    /// The definition `node` names, when following its alias chain ends at no known shape
    fn unknown_definition(&self, node: &SchemaNode) -> Option<SchemaId> {
        let mut target = match &node.shape {
            _ if self.graph.get(&node.id).is_some() => node.id.clone(),
            Shape::Reference { target } => target.clone(),
            _ => return None,
        };
        let mut seen = HashSet::new();
        while seen.insert(target.clone()) {
            let definition = self.graph.get(&target)?.node.as_ref().ok()?;
            match &definition.shape {
                Shape::Unknown => return Some(target),
                Shape::Reference { target: next } => target = next.clone(),
                _ => return None,
            }
        }
        None
    }

    fn lower_node(&mut self, scope: &mut Scope, node: &SchemaNode, hint: &str, position: Position) -> Lowered<TypeDescriptor> {
        let kind = match &node.shape {
            Shape::Primitive { kind, format } => TypeKind::Scalar(self.scalar(*kind, format.as_ref())),
            Shape::Array { items } => {
                let item = match items {
                    Some(items) => self.lower(scope, items, &format!("{}Item", hint), Position::Nested)?,
                    None => self.unknown(scope, &node.id.child("items"), Position::Nested)?,
                };
                TypeKind::List(Box::new(self.contained(scope, item, &node.id)))
            }
            Shape::Object {
                fields,
                additional: Some(value),
                ..
            } if fields.is_empty() => {
                let value = self.lower(scope, value, &format!("{}Value", hint), Position::Nested)?;
                TypeKind::Map(Box::new(self.contained(scope, value, &node.id)))
            }
            Shape::Enumeration { values } if enum_repr(values).is_none() => {
                scope.warn(
                    DiagnosticCode::OpaqueFallback,
                    format!("`{}` mixes literal kinds and is kept as an opaque value", node.id),
                );
                TypeKind::Opaque
            }
            Shape::Object { .. } | Shape::Enumeration { .. } | Shape::Union { .. } | Shape::Intersection { .. } => {
                return self.define_inline(scope, node, hint)
            }
            Shape::Reference { target } => self.reference(scope, target)?,
            Shape::Unknown => return Ok(self.unknown(scope, &node.id, position)?.with_nullable(node.nullable)),
        };
        Ok(TypeDescriptor::new(kind).with_nullable(node.nullable))
    }

    /// Claims a name for an inline composite and maps it
    fn define_inline(&mut self, scope: &mut Scope, node: &SchemaNode, hint: &str) -> Lowered<TypeDescriptor> {
        let name = self.names.claim(&inline_name(node, hint));
        scope.inline.push((node.id.clone(), name.clone()));
        let slot = scope.types.len();
        let kind = self.composite(scope, node, &name)?;
        scope.types.insert(
            slot,
            TypeDef {
                name: name.clone(),
                source: node.id.clone(),
                doc: node.description.clone(),
                kind,
            },
        );
        let kind = TypeKind::Named { name, recursive: false };
        Ok(TypeDescriptor::new(kind).with_nullable(node.nullable))
    }

    fn composite(&mut self, scope: &mut Scope, node: &SchemaNode, name: &str) -> Lowered<TypeDefKind> {
        match &node.shape {
            Shape::Object {
                fields,
                required,
                additional,
            } => {
                let mut idents = NameRegistry::default();
                let mut lowered = vec![];
                for (wire_name, field) in fields {
                    let hint = format!("{}{}", name, pascal_case(wire_name));
                    let ty = self.lower(scope, field, &hint, Position::Nested)?;
                    lowered.push(Field {
                        name: wire_name.clone(),
                        ident: idents.claim(&self.field_ident(wire_name)),
                        doc: field.description.clone(),
                        ty,
                        required: required.contains(wire_name),
                    });
                }
                let additional = match additional {
                    Some(value) => {
                        let value = self.lower(scope, value, &format!("{}Value", name), Position::Nested)?;
                        let value = self.contained(scope, value, &node.id);
                        Some(Field {
                            name: "additionalProperties".to_string(),
                            ident: idents.claim("additional_properties"),
                            doc: None,
                            ty: TypeDescriptor::new(TypeKind::Map(Box::new(value))),
                            required: true,
                        })
                    }
                    None => None,
                };
                Ok(TypeDefKind::Struct {
                    fields: lowered,
                    additional,
                })
            }
            Shape::Enumeration { values } => match enum_repr(values) {
                Some(repr) => {
                    let mut names = NameRegistry::with_reserved(["Self"]);
                    let variants = values
                        .iter()
                        .map(|value| EnumVariant {
                            name: names.claim(&pascal_case_or(&value.to_string(), "Value")),
                            value: value.clone(),
                        })
                        .collect();
                    Ok(TypeDefKind::Enum { repr, variants })
                }
                None => Ok(TypeDefKind::Alias(self.lower_node(scope, node, name, Position::Nested)?)),
            },
            Shape::Union {
                branches,
                discriminator,
            } => self.union(scope, name, branches, discriminator.as_ref()),
            Shape::Intersection { parts } => {
                let mut idents = NameRegistry::default();
                let mut lowered = vec![];
                for (index, part) in parts.iter().enumerate() {
                    let ty = self.lower(scope, part, &format!("{}Part{}", name, index + 1), Position::Nested)?;
                    let ident = match &ty.kind {
                        TypeKind::Named { name, .. } => self.field_ident(name),
                        _ => format!("part_{}", index + 1),
                    };
                    let ident = idents.claim(&ident);
                    lowered.push(Field {
                        name: ident.clone(),
                        ident,
                        doc: part.description.clone(),
                        ty,
                        required: true,
                    });
                }
                Ok(TypeDefKind::Composite { parts: lowered })
            }
            _ => Ok(TypeDefKind::Alias(self.lower_node(scope, node, name, Position::Nested)?)),
        }
    }

    fn union(
        &mut self,
        scope: &mut Scope,
        name: &str,
        branches: &[SchemaNode],
        discriminator: Option<&Discriminator>,
    ) -> Lowered<TypeDefKind> {
        let mut names = NameRegistry::with_reserved(["Self"]);
        let mut variants = vec![];
        for (index, branch) in branches.iter().enumerate() {
            let ty = self.lower(scope, branch, &format!("{}Variant{}", name, index + 1), Position::Nested)?;
            let variant = match &ty.kind {
                TypeKind::Named { name, .. } => name.clone(),
                TypeKind::Scalar(scalar) => pascal_case(scalar.name()),
                TypeKind::List(_) => "List".to_string(),
                TypeKind::Map(_) => "Map".to_string(),
                TypeKind::Opaque => "Value".to_string(),
                TypeKind::Unit => "Unit".to_string(),
            };
            variants.push(UnionVariant {
                name: names.claim(&variant),
                ty,
                tag: None,
            });
        }

        let downgrade = match self.config.union_policy {
            UnionPolicy::Fallback => Some("the fallback union policy is configured".to_string()),
            UnionPolicy::Native if !self.capabilities.container_branches && variants.iter().any(|v| v.ty.is_container()) => {
                Some(format!("{} unions can't hold list or map branches", self.target))
            }
            UnionPolicy::Native => None,
        };
        if let Some(reason) = downgrade {
            scope.warn(
                DiagnosticCode::UnionDowngraded,
                format!("`{}` is generated as an opaque value: {}", name, reason),
            );
            return Ok(TypeDefKind::Fallback {
                alternatives: variants.iter().map(|variant| variant.ty.describe()).collect(),
            });
        }

        let discriminator = match discriminator {
            Some(discriminator) if branches.iter().all(|branch| !branch.nullable && self.is_object_like(branch)) => {
                for (variant, branch) in variants.iter_mut().zip(branches) {
                    let tag = match &branch.shape {
                        Shape::Reference { target } => discriminator
                            .mapping
                            .get(target)
                            .cloned()
                            .unwrap_or_else(|| last_segment(target.as_str())),
                        _ => discriminator
                            .mapping
                            .get(&branch.id)
                            .cloned()
                            .unwrap_or_else(|| variant.name.clone()),
                    };
                    variant.tag = Some(tag);
                }
                Some(discriminator.property.clone())
            }
            Some(discriminator) => {
                scope.warn(
                    DiagnosticCode::DiscriminatorDropped,
                    format!(
                        "discriminator `{}` of `{}` is ignored, not every branch is an object",
                        discriminator.property, name
                    ),
                );
                None
            }
            None => None,
        };
        Ok(TypeDefKind::Union {
            variants,
            discriminator,
        })
    }

    fn is_object_like(&self, node: &SchemaNode) -> bool {
        match &node.shape {
            Shape::Object {
                fields, additional, ..
            } => !(fields.is_empty() && additional.is_some()),
            Shape::Intersection { .. } => true,
            Shape::Reference { target } => self
                .graph
                .get(target)
                .and_then(|definition| definition.node.as_ref().ok())
                .is_some_and(|target| self.is_object_like(target)),
            _ => false,
        }
    }

    fn reference(&mut self, scope: &Scope, target: &SchemaId) -> Lowered<TypeKind> {
        let name = match self.definition_names.get(target) {
            Some(name) if !self.failed.contains(target) => name.clone(),
            _ => return Err(dependency_skipped(&scope.unit, target)),
        };
        let recursive = scope.owner.as_ref().is_some_and(|owner| {
            target == owner
                || self
                    .reachable
                    .get(target)
                    .is_some_and(|reachable| reachable.contains(owner))
        });
        Ok(TypeKind::Named { name, recursive })
    }

    fn unknown(&mut self, scope: &mut Scope, id: &SchemaId, position: Position) -> Lowered<TypeDescriptor> {
        let policy = match position {
            Position::Payload => self.config.unknown_payloads,
            Position::Nested => self.config.unknown_fields,
        };
        match policy {
            UnknownPolicy::Reject => Err(Diagnostic::error(
                DiagnosticCode::UnknownShape,
                scope.unit.clone(),
                format!("`{}` has no recognizable shape", id),
            )),
            UnknownPolicy::Opaque => {
                scope.warn(
                    DiagnosticCode::OpaqueFallback,
                    format!("`{}` has no recognizable shape and is kept as an opaque value", id),
                );
                Ok(TypeDescriptor::new(TypeKind::Opaque))
            }
        }
    }

    /// Item or value of a container, downgraded when the target can't nest containers
    fn contained(&mut self, scope: &mut Scope, inner: TypeDescriptor, id: &SchemaId) -> TypeDescriptor {
        if inner.is_container() && !self.capabilities.nested_containers {
            scope.warn(
                DiagnosticCode::ContainerDowngraded,
                format!(
                    "`{}` nests a {} inside a container, which {} can't express; it is kept as an opaque value",
                    id,
                    inner.describe(),
                    self.target
                ),
            );
            return TypeDescriptor::new(TypeKind::Opaque);
        }
        inner
    }

    fn scalar(&self, kind: PrimitiveKind, format: Option<&Format>) -> Scalar {
        let capabilities = &self.capabilities;
        match (kind, format) {
            (PrimitiveKind::String, Some(Format::Uuid)) if capabilities.uuid => Scalar::Uuid,
            (PrimitiveKind::String, Some(Format::DateTime)) if capabilities.date_time => Scalar::DateTime,
            (PrimitiveKind::String, Some(Format::Date)) if capabilities.date => Scalar::Date,
            (PrimitiveKind::String, Some(Format::Byte)) if capabilities.base64 => Scalar::Bytes,
            (PrimitiveKind::String, Some(Format::Binary)) if capabilities.binary => Scalar::Bytes,
            (PrimitiveKind::String, _) => Scalar::Text,
            (PrimitiveKind::Integer, Some(Format::Int32)) if capabilities.int32 => Scalar::Int32,
            (PrimitiveKind::Integer, _) => Scalar::Int64,
            (PrimitiveKind::Number, Some(Format::Float)) if capabilities.float => Scalar::Float,
            (PrimitiveKind::Number, _) => Scalar::Double,
            (PrimitiveKind::Boolean, _) => Scalar::Bool,
        }
    }
}

/// Shapes that become a [`TypeDef`] of their own
fn is_composite(node: &SchemaNode) -> bool {
    match &node.shape {
        Shape::Object {
            fields, additional, ..
        } => !(fields.is_empty() && additional.is_some()),
        Shape::Enumeration { values } => enum_repr(values).is_some(),
        Shape::Union { .. } | Shape::Intersection { .. } => true,
        _ => false,
    }
}

fn enum_repr(values: &[Literal]) -> Option<EnumRepr> {
    let all = |check: fn(&Literal) -> bool| values.iter().all(check);
    if all(|value| matches!(value, Literal::String(_))) {
        Some(EnumRepr::String)
    } else if all(|value| matches!(value, Literal::Boolean(_))) {
        Some(EnumRepr::Boolean)
    } else if all(|value| matches!(value, Literal::Integer(_))) {
        Some(EnumRepr::Integer)
    } else if all(|value| matches!(value, Literal::Integer(_) | Literal::Number(_))) {
        Some(EnumRepr::Number)
    } else {
        None
    }
}

fn definition_name(node: &SchemaNode, id: &SchemaId) -> String {
    match &node.title {
        Some(title) => pascal_case_or(title, "Type"),
        None => pascal_case_or(&last_segment(id.as_str()), "Type"),
    }
}

fn inline_name(node: &SchemaNode, hint: &str) -> String {
    match &node.title {
        Some(title) => pascal_case_or(title, "Type"),
        None => hint.to_string(),
    }
}

fn collect_references(node: &SchemaNode, found: &mut BTreeSet<SchemaId>) {
    match &node.shape {
        Shape::Array { items: Some(items) } => collect_references(items, found),
        Shape::Object {
            fields, additional, ..
        } => {
            fields.values().for_each(|field| collect_references(field, found));
            if let Some(additional) = additional {
                collect_references(additional, found);
            }
        }
        Shape::Union { branches: nodes, .. } | Shape::Intersection { parts: nodes } => {
            nodes.iter().for_each(|node| collect_references(node, found))
        }
        Shape::Reference { target } => {
            found.insert(target.clone());
        }
        _ => {}
    }
}

fn reachable_from(start: &SchemaId, references: &HashMap<SchemaId, BTreeSet<SchemaId>>) -> HashSet<SchemaId> {
    let mut reachable = HashSet::new();
    let mut queue: VecDeque<&SchemaId> = references.get(start).into_iter().flatten().collect();
    while let Some(id) = queue.pop_front() {
        if reachable.insert(id.clone()) {
            queue.extend(references.get(id).into_iter().flatten());
        }
    }
    reachable
}
