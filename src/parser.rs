use std::{collections::BTreeSet, fmt};

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::{
    error::{SchemaError, UnresolvedReferenceError},
    loader::Document,
    resolver::{child_pointer, key_segment, Resolver},
};

/// Stable identity of a schema node: the JSON pointer of the place it is first defined, e.g.
/// `#/components/schemas/Pet` or `#/paths/~1pets/get/responses/200/content/application~1json/schema`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(String);

impl SchemaId {
    pub fn new(pointer: impl Into<String>) -> Self {
        SchemaId(pointer.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn child(&self, segment: &str) -> SchemaId {
        SchemaId(child_pointer(&self.0, segment))
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Integer,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    Int32,
    Int64,
    Float,
    Double,
    Byte,
    Binary,
    Date,
    DateTime,
    Uuid,
    Other(String),
}

impl Format {
    pub fn parse(format: &str) -> Format {
        match format {
            "int32" => Format::Int32,
            "int64" => Format::Int64,
            "float" => Format::Float,
            "double" => Format::Double,
            "byte" => Format::Byte,
            "binary" => Format::Binary,
            "date" => Format::Date,
            "date-time" => Format::DateTime,
            "uuid" => Format::Uuid,
            other => Format::Other(other.to_string()),
        }
    }
}

/// A literal value of an enumeration. `null` is not a literal, it makes the node nullable.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => f.write_str(s),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    pub property: String,
    /// Explicit tag values, keyed by the schema they select
    pub mapping: IndexMap<SchemaId, String>,
}

/// The canonical shape of a schema. Exactly one is active per node.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Primitive {
        kind: PrimitiveKind,
        format: Option<Format>,
    },
    /// `items = None` accepts any item
    Array { items: Option<Box<SchemaNode>> },
    /// `additional` holds the schema of undeclared properties, when they are allowed
    Object {
        fields: IndexMap<String, SchemaNode>,
        required: BTreeSet<String>,
        additional: Option<Box<SchemaNode>>,
    },
    Enumeration { values: Vec<Literal> },
    Union {
        branches: Vec<SchemaNode>,
        discriminator: Option<Discriminator>,
    },
    /// An `allOf` that could not be flattened into a single object
    Intersection { parts: Vec<SchemaNode> },
    /// Edge to a definition of the [`SchemaGraph`]. Recursive schemas stay as edges.
    Reference { target: SchemaId },
    /// Matches no rule, the mapper decides whether an opaque type is acceptable
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub id: SchemaId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub nullable: bool,
    pub shape: Shape,
}

impl SchemaNode {
    pub fn unknown(id: SchemaId) -> Self {
        SchemaNode {
            id,
            title: None,
            description: None,
            nullable: false,
            shape: Shape::Unknown,
        }
    }

    /// Structural equality that ignores where the nodes were defined and their docs
    pub fn same_shape(&self, other: &SchemaNode) -> bool {
        fn same_boxed(a: &Option<Box<SchemaNode>>, b: &Option<Box<SchemaNode>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a.same_shape(b),
                (None, None) => true,
                _ => false,
            }
        }
        fn same_all(a: &[SchemaNode], b: &[SchemaNode]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.same_shape(b))
        }
        if self.nullable != other.nullable {
            return false;
        }
        match (&self.shape, &other.shape) {
            (
                Shape::Primitive { kind, format },
                Shape::Primitive {
                    kind: other_kind,
                    format: other_format,
                },
            ) => kind == other_kind && format == other_format,
            (Shape::Array { items }, Shape::Array { items: other_items }) => same_boxed(items, other_items),
            (
                Shape::Object {
                    fields,
                    required,
                    additional,
                },
                Shape::Object {
                    fields: other_fields,
                    required: other_required,
                    additional: other_additional,
                },
            ) => {
                fields.len() == other_fields.len()
                    && required == other_required
                    && fields.iter().all(|(name, field)| {
                        other_fields
                            .get(name)
                            .is_some_and(|other_field| field.same_shape(other_field))
                    })
                    && same_boxed(additional, other_additional)
            }
            (Shape::Enumeration { values }, Shape::Enumeration { values: other_values }) => values == other_values,
            (
                Shape::Union { branches, .. },
                Shape::Union {
                    branches: other_branches,
                    ..
                },
            ) => same_all(branches, other_branches),
            (Shape::Intersection { parts }, Shape::Intersection { parts: other_parts }) => same_all(parts, other_parts),
            (Shape::Reference { target }, Shape::Reference { target: other_target }) => target == other_target,
            (Shape::Unknown, Shape::Unknown) => true,
            _ => false,
        }
    }
}

/// A named schema: every `components/schemas` entry and every `$ref` target. Invalid schemas
/// keep their error so that dependents can be skipped with a precise diagnostic.
#[derive(Debug, Clone)]
pub struct Definition {
    pub id: SchemaId,
    pub node: Result<SchemaNode, SchemaError>,
}

/// All definitions, in the order they were first reached
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    definitions: IndexMap<SchemaId, Definition>,
}

impl SchemaGraph {
    pub fn get(&self, id: &SchemaId) -> Option<&Definition> {
        self.definitions.get(id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Unresolved(#[from] UnresolvedReferenceError),
}

/// Classifies raw schema nodes. Definitions are interpreted once, when first reached, and
/// references to them become [`Shape::Reference`] edges, so recursion never expands.
pub struct Interpreter<'r, 'doc> {
    resolver: &'r mut Resolver<'doc>,
    /// `None` while the definition is being interpreted
    slots: IndexMap<SchemaId, Option<Result<SchemaNode, SchemaError>>>,
}

impl<'r, 'doc> Interpreter<'r, 'doc> {
    pub fn new(resolver: &'r mut Resolver<'doc>) -> Self {
        Self {
            resolver,
            slots: IndexMap::new(),
        }
    }

    pub fn resolver(&mut self) -> &mut Resolver<'doc> {
        &mut *self.resolver
    }

    /// Interprets every component schema in declaration order
    pub fn interpret_components(&mut self, document: &'doc Document) -> Result<(), UnresolvedReferenceError> {
        let Some(schemas) = document.component_schemas() else {
            return Ok(());
        };
        let base = SchemaId::new("#/components/schemas");
        for (name, schema) in schemas {
            if let Some(name) = key_segment(name) {
                self.define(base.child(&name), schema)?;
            }
        }
        Ok(())
    }

    /// Interprets an inline schema, e.g. the body of a response
    pub fn interpret_inline(&mut self, value: &'doc Value, id: SchemaId) -> Result<SchemaNode, InterpretError> {
        self.interpret(value, id)
    }

    pub fn finish(self) -> SchemaGraph {
        let definitions = self
            .slots
            .into_iter()
            .filter_map(|(id, slot)| {
                debug_assert!(slot.is_some(), "{} left unfinished", id);
                slot.map(|node| (id.clone(), Definition { id, node }))
            })
            .collect();
        SchemaGraph { definitions }
    }

    fn define(&mut self, id: SchemaId, value: &'doc Value) -> Result<(), UnresolvedReferenceError> {
        if self.slots.contains_key(&id) {
            return Ok(());
        }
        self.slots.insert(id.clone(), None);
        let node = match self.interpret(value, id.clone()) {
            Ok(node) => Ok(node),
            Err(InterpretError::Schema(err)) => Err(err),
            Err(InterpretError::Unresolved(err)) => return Err(err),
        };
        log::debug!("defined {}", id);
        self.slots.insert(id, Some(node));
        Ok(())
    }

    fn reference(&mut self, reference: &str, at: &SchemaId) -> Result<SchemaId, UnresolvedReferenceError> {
        let resolved = self.resolver.resolve(reference, at.as_str())?;
        let target = SchemaId::new(resolved.pointer);
        self.define(target.clone(), resolved.node)?;
        Ok(target)
    }

    fn interpret(&mut self, value: &'doc Value, id: SchemaId) -> Result<SchemaNode, InterpretError> {
        // `true` and non-mapping schemas accept anything
        let Some(mapping) = value.as_mapping() else {
            return Ok(SchemaNode::unknown(id));
        };
        let title = text(mapping, "title");
        let description = text(mapping, "description");
        let mut nullable = mapping.get("nullable").and_then(Value::as_bool).unwrap_or(false);
        let declared = declared_types(mapping, &mut nullable);

        let shape = if let Some(values) = literal_values(mapping) {
            let mut literals = vec![];
            for value in values {
                match literal(value) {
                    Some(literal) => literals.push(literal),
                    None if value.is_null() => nullable = true,
                    None => {
                        return Err(SchemaError::UnsupportedType {
                            schema: id.to_string(),
                            found: "non-scalar enumeration value".to_string(),
                        }
                        .into())
                    }
                }
            }
            if literals.is_empty() {
                return Err(SchemaError::EmptyEnumeration {
                    schema: id.to_string(),
                }
                .into());
            }
            Shape::Enumeration { values: literals }
        } else if let Some((key, branches)) = ["oneOf", "anyOf"]
            .iter()
            .find_map(|key| mapping.get(*key).and_then(Value::as_sequence).map(|seq| (*key, seq)))
        {
            let (has_null, branches) = split_null_branches(branches);
            nullable |= has_null;
            let mut nodes = vec![];
            for (index, branch) in branches {
                nodes.push(self.interpret(branch, id.child(key).child(&index.to_string()))?);
            }
            if nodes.len() == 1 && has_null {
                // `oneOf: [X, {type: null}]` is a nullable X
                let single = nodes.remove(0);
                nullable |= single.nullable;
                single.shape
            } else {
                let discriminator = self.discriminator(mapping, &id)?;
                Shape::Union {
                    branches: nodes,
                    discriminator,
                }
            }
        } else if let Some(parts) = mapping.get("allOf").and_then(Value::as_sequence) {
            let mut nodes = vec![];
            for (index, part) in parts.iter().enumerate() {
                nodes.push(self.interpret(part, id.child("allOf").child(&index.to_string()))?);
            }
            // Sibling properties act as one more part, addressed past the declared ones
            if mapping.contains_key("properties") {
                nodes.push(SchemaNode {
                    id: id.child("allOf").child(&parts.len().to_string()),
                    title: None,
                    description: None,
                    nullable: false,
                    shape: self.object(mapping, &id)?,
                });
            }
            match self.merge_objects(&id, &nodes)? {
                Some(merged) => merged,
                None => Shape::Intersection { parts: nodes },
            }
        } else if declared.len() > 1 {
            let mut nodes = vec![];
            for (index, declared_type) in declared.iter().enumerate() {
                let branch_id = id.child("type").child(&index.to_string());
                let shape = self.typed(declared_type, mapping, &branch_id)?;
                nodes.push(SchemaNode {
                    shape,
                    ..SchemaNode::unknown(branch_id)
                });
            }
            Shape::Union {
                branches: nodes,
                discriminator: None,
            }
        } else if let Some(declared_type) = declared.first() {
            self.typed(declared_type, mapping, &id)?
        } else if mapping.contains_key("properties") || mapping.contains_key("additionalProperties") {
            self.object(mapping, &id)?
        } else if mapping.contains_key("items") {
            self.array(mapping, &id)?
        } else if let Some(reference) = mapping.get("$ref").and_then(Value::as_str) {
            Shape::Reference {
                target: self.reference(reference, &id)?,
            }
        } else {
            Shape::Unknown
        };

        Ok(SchemaNode {
            id,
            title,
            description,
            nullable,
            shape,
        })
    }

    /// Shape of a node with a single declared `type`
    fn typed(&mut self, declared_type: &str, mapping: &'doc Mapping, id: &SchemaId) -> Result<Shape, InterpretError> {
        let format = text(mapping, "format").map(|format| Format::parse(&format));
        let primitive = |kind| Shape::Primitive { kind, format };
        Ok(match declared_type {
            "string" => primitive(PrimitiveKind::String),
            "integer" => primitive(PrimitiveKind::Integer),
            "number" => primitive(PrimitiveKind::Number),
            "boolean" => primitive(PrimitiveKind::Boolean),
            "object" => self.object(mapping, id)?,
            "array" => self.array(mapping, id)?,
            other => {
                return Err(SchemaError::UnsupportedType {
                    schema: id.to_string(),
                    found: other.to_string(),
                }
                .into())
            }
        })
    }

    fn object(&mut self, mapping: &'doc Mapping, id: &SchemaId) -> Result<Shape, InterpretError> {
        let mut fields = IndexMap::new();
        let properties = mapping.get("properties").and_then(Value::as_mapping);
        if let Some(properties) = properties {
            let base = id.child("properties");
            for (name, field) in properties {
                let Some(name) = key_segment(name) else {
                    continue;
                };
                let node = self.interpret(field, base.child(&name))?;
                fields.insert(name, node);
            }
        }
        let required = mapping
            .get("required")
            .and_then(Value::as_sequence)
            .map(|names| names.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        let additional_id = id.child("additionalProperties");
        let additional = match mapping.get("additionalProperties") {
            Some(Value::Bool(false)) => None,
            Some(Value::Bool(true)) => Some(Box::new(SchemaNode::unknown(additional_id))),
            Some(schema) => Some(Box::new(self.interpret(schema, additional_id)?)),
            // a bare `type: object` is a free-form map
            None if properties.is_none() => Some(Box::new(SchemaNode::unknown(additional_id))),
            None => None,
        };
        Ok(Shape::Object {
            fields,
            required,
            additional,
        })
    }

    fn array(&mut self, mapping: &'doc Mapping, id: &SchemaId) -> Result<Shape, InterpretError> {
        let items = match mapping.get("items") {
            Some(items) => Some(Box::new(self.interpret(items, id.child("items"))?)),
            None => None,
        };
        Ok(Shape::Array { items })
    }

    fn discriminator(&mut self, mapping: &'doc Mapping, id: &SchemaId) -> Result<Option<Discriminator>, InterpretError> {
        let Some(discriminator) = mapping.get("discriminator") else {
            return Ok(None);
        };
        // AsyncAPI style documents put the property name directly
        if let Some(property) = discriminator.as_str() {
            return Ok(Some(Discriminator {
                property: property.to_string(),
                mapping: IndexMap::new(),
            }));
        }
        let Some(property) = discriminator.get("propertyName").and_then(Value::as_str) else {
            return Ok(None);
        };
        let mut tags = IndexMap::new();
        if let Some(explicit) = discriminator.get("mapping").and_then(Value::as_mapping) {
            let at = id.child("discriminator");
            for (tag, target) in explicit {
                let (Some(tag), Some(target)) = (key_segment(tag), target.as_str()) else {
                    continue;
                };
                let reference = if target.starts_with('#') {
                    target.to_string()
                } else {
                    format!("#/components/schemas/{}", target)
                };
                tags.insert(self.reference(&reference, &at)?, tag);
            }
        }
        Ok(Some(Discriminator {
            property: property.to_string(),
            mapping: tags,
        }))
    }

    /// Flattens the parts of an `allOf` into one object. Returns `None` when a part is not an
    /// object, or refers to a definition that is still being interpreted (a cycle).
    fn merge_objects(&self, id: &SchemaId, parts: &[SchemaNode]) -> Result<Option<Shape>, SchemaError> {
        let mut merged_fields: IndexMap<String, SchemaNode> = IndexMap::new();
        let mut merged_required = BTreeSet::new();
        let mut merged_additional = None;
        for part in parts {
            let shape = match &part.shape {
                Shape::Reference { target } => match self.slots.get(target) {
                    Some(Some(Ok(node))) => &node.shape,
                    _ => return Ok(None),
                },
                shape => shape,
            };
            let Shape::Object {
                fields,
                required,
                additional,
            } = shape
            else {
                return Ok(None);
            };
            for (name, field) in fields {
                match merged_fields.get(name) {
                    Some(existing) if !existing.same_shape(field) => {
                        return Err(SchemaError::IncompatibleComposition {
                            schema: id.to_string(),
                            field: name.clone(),
                        })
                    }
                    Some(_) => {}
                    None => {
                        merged_fields.insert(name.clone(), field.clone());
                    }
                }
            }
            merged_required.extend(required.iter().cloned());
            if merged_additional.is_none() {
                merged_additional = additional.clone();
            }
        }
        Ok(Some(Shape::Object {
            fields: merged_fields,
            required: merged_required,
            additional: merged_additional,
        }))
    }
}

fn text(mapping: &Mapping, key: &str) -> Option<String> {
    mapping.get(key).and_then(Value::as_str).map(String::from)
}

/// Declared `type`s, with `null` moved into the nullable flag
fn declared_types(mapping: &Mapping, nullable: &mut bool) -> Vec<String> {
    let declared = match mapping.get("type") {
        Some(Value::String(declared)) => vec![declared.clone()],
        Some(Value::Sequence(declared)) => declared.iter().filter_map(Value::as_str).map(String::from).collect(),
        _ => vec![],
    };
    declared
        .into_iter()
        .filter(|declared| {
            if declared == "null" {
                *nullable = true;
                false
            } else {
                true
            }
        })
        .collect()
}

fn literal_values(mapping: &Mapping) -> Option<Vec<&Value>> {
    if let Some(values) = mapping.get("enum").and_then(Value::as_sequence) {
        return Some(values.iter().collect());
    }
    mapping.get("const").map(|value| vec![value])
}

fn literal(value: &Value) -> Option<Literal> {
    match value {
        Value::String(s) => Some(Literal::String(s.clone())),
        Value::Bool(b) => Some(Literal::Boolean(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Literal::Integer(i)),
            None => n.as_f64().map(Literal::Number),
        },
        _ => None,
    }
}

fn split_null_branches(branches: &[Value]) -> (bool, Vec<(usize, &Value)>) {
    let is_null = |branch: &Value| branch.get("type").and_then(Value::as_str) == Some("null");
    let has_null = branches.iter().any(is_null);
    let rest = branches
        .iter()
        .enumerate()
        .filter(|(_, branch)| !is_null(branch))
        .collect();
    (has_null, rest)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;
    use crate::loader::{load, Format as DocumentFormat};
    use pretty_assertions::assert_eq;

    fn interpret_components(yaml: &str) -> SchemaGraph {
        let document = load(yaml, DocumentFormat::Yaml).unwrap();
        let mut resolver = Resolver::new(&document);
        let mut interpreter = Interpreter::new(&mut resolver);
        interpreter.interpret_components(&document).unwrap();
        interpreter.finish()
    }

    fn node<'g>(graph: &'g SchemaGraph, name: &str) -> &'g SchemaNode {
        let id = SchemaId::new(format!("#/components/schemas/{}", name));
        graph.get(&id).unwrap().node.as_ref().unwrap()
    }

    fn error(graph: &SchemaGraph, name: &str) -> SchemaError {
        let id = SchemaId::new(format!("#/components/schemas/{}", name));
        graph.get(&id).unwrap().node.clone().unwrap_err()
    }

    #[test]
    fn test_classification_precedence() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                EnumWins:
                  type: string
                  enum: [a, b]
                UnionWins:
                  type: object
                  oneOf:
                    - type: string
                    - type: integer
                Primitive:
                  type: integer
                  format: int32
                  properties: {}
                Object:
                  properties:
                    name:
                      type: string
                Array:
                  items:
                    type: boolean
                Alias:
                  $ref: '#/components/schemas/Object'
                Nothing:
                  description: just words
            "#,
        );
        assert!(matches!(node(&graph, "EnumWins").shape, Shape::Enumeration { .. }));
        assert!(matches!(node(&graph, "UnionWins").shape, Shape::Union { .. }));
        assert_eq!(
            node(&graph, "Primitive").shape,
            Shape::Primitive {
                kind: PrimitiveKind::Integer,
                format: Some(Format::Int32)
            }
        );
        assert!(matches!(node(&graph, "Object").shape, Shape::Object { .. }));
        assert!(matches!(node(&graph, "Array").shape, Shape::Array { .. }));
        assert_eq!(
            node(&graph, "Alias").shape,
            Shape::Reference {
                target: SchemaId::new("#/components/schemas/Object")
            }
        );
        assert_eq!(node(&graph, "Nothing").shape, Shape::Unknown);
    }

    #[test]
    fn test_enumeration_keeps_order_and_moves_null() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Level:
                  enum: [low, null, high, medium]
            "#,
        );
        let level = node(&graph, "Level");
        assert!(level.nullable);
        assert_eq!(
            level.shape,
            Shape::Enumeration {
                values: vec![
                    Literal::String("low".into()),
                    Literal::String("high".into()),
                    Literal::String("medium".into()),
                ]
            }
        );
    }

    #[test]
    fn test_empty_enumeration_is_an_error() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Nope:
                  type: string
                  enum: []
            "#,
        );
        assert_eq!(
            error(&graph, "Nope"),
            SchemaError::EmptyEnumeration {
                schema: "#/components/schemas/Nope".into()
            }
        );
    }

    #[test]
    fn test_self_reference_stays_an_edge() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Tree:
                  type: object
                  properties:
                    children:
                      type: array
                      items:
                        $ref: '#/components/schemas/Tree'
            "#,
        );
        let Shape::Object { fields, .. } = &node(&graph, "Tree").shape else {
            panic!("expected object");
        };
        let Shape::Array { items: Some(items) } = &fields["children"].shape else {
            panic!("expected array");
        };
        assert_eq!(
            items.shape,
            Shape::Reference {
                target: SchemaId::new("#/components/schemas/Tree")
            }
        );
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_reference_chain_cycle_terminates() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                A:
                  type: object
                  properties:
                    b:
                      $ref: '#/components/schemas/B'
                B:
                  type: object
                  properties:
                    a:
                      $ref: '#/components/schemas/A'
            "#,
        );
        let ids = graph.definitions().map(|d| d.id.to_string()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["#/components/schemas/A", "#/components/schemas/B"]);
    }

    #[test]
    fn test_intersection_of_disjoint_objects_merges() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Base:
                  type: object
                  required: [id]
                  properties:
                    id:
                      type: integer
                Pet:
                  allOf:
                    - $ref: '#/components/schemas/Base'
                    - type: object
                      required: [name]
                      properties:
                        name:
                          type: string
            "#,
        );
        let Shape::Object { fields, required, .. } = &node(&graph, "Pet").shape else {
            panic!("expected merged object");
        };
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(required.iter().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn test_intersection_with_conflicting_field_fails() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Clash:
                  allOf:
                    - type: object
                      properties:
                        id:
                          type: integer
                    - type: object
                      properties:
                        id:
                          type: string
            "#,
        );
        assert_eq!(
            error(&graph, "Clash"),
            SchemaError::IncompatibleComposition {
                schema: "#/components/schemas/Clash".into(),
                field: "id".into()
            }
        );
    }

    #[test]
    fn test_intersection_with_same_field_shape_merges() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Twice:
                  allOf:
                    - properties:
                        id:
                          type: integer
                          description: first
                    - properties:
                        id:
                          type: integer
                          description: second
            "#,
        );
        let Shape::Object { fields, .. } = &node(&graph, "Twice").shape else {
            panic!("expected merged object");
        };
        assert_eq!(fields["id"].description.as_deref(), Some("first"));
    }

    #[test]
    fn test_intersection_with_primitive_is_preserved() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Mixed:
                  allOf:
                    - type: string
                    - type: object
                      properties:
                        id:
                          type: integer
            "#,
        );
        assert!(matches!(
            &node(&graph, "Mixed").shape,
            Shape::Intersection { parts } if parts.len() == 2
        ));
    }

    #[test]
    fn test_sibling_properties_get_their_own_part() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Either:
                  oneOf:
                    - type: string
                    - type: integer
                Mixed:
                  allOf:
                    - $ref: '#/components/schemas/Either'
                  properties:
                    extra:
                      type: string
            "#,
        );
        let Shape::Intersection { parts } = &node(&graph, "Mixed").shape else {
            panic!("expected an intersection");
        };
        let ids = parts.iter().map(|part| part.id.as_str()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["#/components/schemas/Mixed/allOf/0", "#/components/schemas/Mixed/allOf/1"]
        );
        assert!(matches!(&parts[1].shape, Shape::Object { fields, .. } if fields.contains_key("extra")));
    }

    #[test]
    fn test_nullable_union_collapses() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Owner:
                  type: object
                  properties:
                    name:
                      type: string
                MaybeOwner:
                  oneOf:
                    - $ref: '#/components/schemas/Owner'
                    - type: 'null'
                Versions:
                  type: [string, integer, 'null']
            "#,
        );
        let maybe = node(&graph, "MaybeOwner");
        assert!(maybe.nullable);
        assert!(matches!(maybe.shape, Shape::Reference { .. }));
        let versions = node(&graph, "Versions");
        assert!(versions.nullable);
        assert!(matches!(&versions.shape, Shape::Union { branches, .. } if branches.len() == 2));
    }

    #[test]
    fn test_discriminator_mapping_is_resolved() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Cat:
                  properties:
                    meow:
                      type: boolean
                Dog:
                  properties:
                    bark:
                      type: boolean
                Pet:
                  oneOf:
                    - $ref: '#/components/schemas/Cat'
                    - $ref: '#/components/schemas/Dog'
                  discriminator:
                    propertyName: kind
                    mapping:
                      kitty: Cat
            "#,
        );
        let Shape::Union {
            discriminator: Some(discriminator),
            ..
        } = &node(&graph, "Pet").shape
        else {
            panic!("expected discriminated union");
        };
        assert_eq!(discriminator.property, "kind");
        assert_eq!(
            discriminator.mapping[&SchemaId::new("#/components/schemas/Cat")],
            "kitty"
        );
    }

    #[test]
    fn test_unsupported_type_is_an_error() {
        let graph = interpret_components(
            r#"
            components:
              schemas:
                Upload:
                  type: file
            "#,
        );
        assert!(matches!(
            error(&graph, "Upload"),
            SchemaError::UnsupportedType { found, .. } if found == "file"
        ));
    }
}
