//! Builds [`Operation`]s from the `paths` of a document.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::{
    config::OperationNaming,
    deserializer::{pick_media_schema, ParameterLocation, RawOperation, RawParameter, RawRequestBody, RawResponse},
    diagnostics::{Diagnostic, DiagnosticCode},
    error::{DuplicateOperationError, Error, UnresolvedReferenceError},
    loader::Document,
    naming::snake_case,
    parser::{InterpretError, Interpreter, SchemaId, SchemaNode},
    resolver::{child_pointer, key_segment},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl Method {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "get" => Some(Method::Get),
            "put" => Some(Method::Put),
            "post" => Some(Method::Post),
            "delete" => Some(Method::Delete),
            "options" => Some(Method::Options),
            "head" => Some(Method::Head),
            "patch" => Some(Method::Patch),
            "trace" => Some(Method::Trace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Put => "put",
            Method::Post => "post",
            Method::Delete => "delete",
            Method::Options => "options",
            Method::Head => "head",
            Method::Patch => "patch",
            Method::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub description: Option<String>,
    pub schema: SchemaNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub media_type: String,
    pub required: bool,
    pub description: Option<String>,
    pub schema: SchemaNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub description: Option<String>,
    pub media_type: Option<String>,
    /// `None` when the response declares no content
    pub schema: Option<SchemaNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Unique identifier, e.g. `get_hello_user`
    pub id: String,
    pub method: Method,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    /// Keyed by normalized status (`200`, `4XX`, `default`), in declaration order
    pub responses: IndexMap<String, Response>,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub operations: Vec<Operation>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Why a single operation was not built
enum Rejection {
    Skip(Diagnostic),
    Abort(Error),
}

impl From<UnresolvedReferenceError> for Rejection {
    fn from(err: UnresolvedReferenceError) -> Self {
        Rejection::Abort(err.into())
    }
}

impl From<Error> for Rejection {
    fn from(err: Error) -> Self {
        Rejection::Abort(err)
    }
}

/// Walks every path and method in declaration order. Operations that can't be built are
/// skipped with a diagnostic, the other ones are still extracted.
pub fn extract<'doc>(
    document: &'doc Document,
    interpreter: &mut Interpreter<'_, 'doc>,
    naming: OperationNaming,
) -> Result<Extraction, Error> {
    let mut extraction = Extraction::default();
    let Some(paths) = document.paths() else {
        return Ok(extraction);
    };
    let mut seen: HashMap<String, String> = HashMap::new();
    for (path, item) in paths {
        let Some(path) = path.as_str() else {
            return Err(Error::structure("#/paths", "path keys must be strings"));
        };
        let path_pointer = child_pointer("#/paths", path);
        let item = match item {
            Value::Mapping(item) => item,
            Value::Null => continue,
            _ => return Err(Error::structure(path_pointer, "a path item must be a mapping")),
        };
        for (method, node) in item {
            let Some(method) = method.as_str().and_then(Method::parse) else {
                continue;
            };
            let pointer = child_pointer(&path_pointer, method.as_str());
            let Some(node) = node.as_mapping() else {
                return Err(Error::structure(pointer, "an operation must be a mapping"));
            };
            let raw = serde_yaml::from_value::<RawOperation>(Value::Mapping(node.clone()))
                .map_err(|err| Error::structure(&pointer, err.to_string()))?;

            let id = match (naming, raw.operation_id.as_deref()) {
                (OperationNaming::OperationId, Some(operation_id)) => snake_case(operation_id),
                _ => path_identifier(method, path),
            };
            let label = format!("{} {}", method.as_str().to_uppercase(), path);
            if let Some(first) = seen.get(&id) {
                return Err(DuplicateOperationError {
                    identifier: id,
                    first: first.clone(),
                    second: label,
                }
                .into());
            }
            seen.insert(id.clone(), label);

            let context = OperationContext {
                id: &id,
                pointer: &pointer,
                path_pointer: &path_pointer,
            };
            let built = build(
                interpreter,
                &context,
                node,
                item.get("parameters"),
                &mut extraction.diagnostics,
            );
            match built {
                Ok(parts) => extraction.operations.push(Operation {
                    id,
                    method,
                    path: path.to_string(),
                    summary: raw.summary,
                    description: raw.description,
                    deprecated: raw.deprecated,
                    parameters: parts.parameters,
                    request_body: parts.request_body,
                    responses: parts.responses,
                }),
                Err(Rejection::Skip(diagnostic)) => {
                    diagnostic.log();
                    extraction.diagnostics.push(diagnostic);
                }
                Err(Rejection::Abort(err)) => return Err(err),
            }
        }
    }
    log::debug!(
        "extracted {} operation(s), {} diagnostic(s)",
        extraction.operations.len(),
        extraction.diagnostics.len()
    );
    Ok(extraction)
}

/// `GET /hello/{user}` -> `get_hello_user`
pub fn path_identifier(method: Method, path: &str) -> String {
    let mut identifier = method.as_str().to_string();
    for c in path.chars().filter(|c| !matches!(c, '{' | '}')) {
        let c = if c.is_ascii_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            '_'
        };
        if c != '_' || !identifier.ends_with('_') {
            identifier.push(c);
        }
    }
    identifier.trim_end_matches('_').to_string()
}

/// `2xx` -> `2XX`, YAML integer keys and strings end up the same
pub fn normalize_status(status: &str) -> String {
    let status = status.trim();
    if status.eq_ignore_ascii_case("default") {
        "default".to_string()
    } else {
        status.to_ascii_uppercase()
    }
}

struct OperationContext<'a> {
    id: &'a str,
    pointer: &'a str,
    path_pointer: &'a str,
}

struct OperationParts {
    parameters: Vec<Parameter>,
    request_body: Option<RequestBody>,
    responses: IndexMap<String, Response>,
}

fn build<'doc>(
    interpreter: &mut Interpreter<'_, 'doc>,
    context: &OperationContext,
    node: &'doc Mapping,
    shared_parameters: Option<&'doc Value>,
    warnings: &mut Vec<Diagnostic>,
) -> Result<OperationParts, Rejection> {
    let mut parameters: Vec<Parameter> = vec![];
    let lists = [
        (shared_parameters, child_pointer(context.path_pointer, "parameters")),
        (node.get("parameters"), child_pointer(context.pointer, "parameters")),
    ];
    for (list, base) in lists {
        let Some(list) = list else {
            continue;
        };
        let Some(list) = list.as_sequence() else {
            return Err(Rejection::Skip(Diagnostic::error(
                DiagnosticCode::InvalidParameter,
                context.id,
                format!("`{}` must be a list", base),
            )));
        };
        for (index, entry) in list.iter().enumerate() {
            let parameter = parameter(interpreter, context.id, entry, child_pointer(&base, &index.to_string()))?;
            // operation level parameters override the path level ones in place
            match parameters
                .iter_mut()
                .find(|existing| existing.name == parameter.name && existing.location == parameter.location)
            {
                Some(existing) => *existing = parameter,
                None => parameters.push(parameter),
            }
        }
    }

    let request_body = match node.get("requestBody") {
        Some(entry) => request_body(interpreter, context, entry)?,
        None => None,
    };

    let mut responses = IndexMap::new();
    match node.get("responses") {
        Some(Value::Mapping(declared)) => {
            let base = child_pointer(context.pointer, "responses");
            for (key, entry) in declared {
                let Some(key) = key_segment(key) else {
                    continue;
                };
                let status = normalize_status(&key);
                let response = response(interpreter, context.id, entry, child_pointer(&base, &key))?;
                if responses.insert(status.clone(), response).is_some() {
                    let warning = Diagnostic::warning(
                        DiagnosticCode::DuplicateResponse,
                        context.id,
                        format!("response `{}` is declared more than once, the last declaration is used", status),
                    );
                    warning.log();
                    warnings.push(warning);
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(_) => {
            return Err(Error::structure(child_pointer(context.pointer, "responses"), "responses must be a mapping").into())
        }
    }

    Ok(OperationParts {
        parameters,
        request_body,
        responses,
    })
}

fn parameter<'doc>(
    interpreter: &mut Interpreter<'_, 'doc>,
    unit: &str,
    entry: &'doc Value,
    pointer: String,
) -> Result<Parameter, Rejection> {
    let (pointer, entry) = follow(interpreter, entry, pointer)?;
    let raw = serde_yaml::from_value::<RawParameter>(entry.clone()).map_err(|err| {
        Rejection::Skip(Diagnostic::error(
            DiagnosticCode::InvalidParameter,
            unit,
            format!("invalid parameter at `{}`: {}", pointer, err),
        ))
    })?;
    let Some(location) = ParameterLocation::parse(&raw.location) else {
        return Err(Rejection::Skip(Diagnostic::error(
            DiagnosticCode::UnsupportedParameterLocation,
            unit,
            format!("parameter `{}` is sent in the unsupported location `{}`", raw.name, raw.location),
        )));
    };
    let content = entry.get("content").and_then(Value::as_mapping);
    let schema = match (entry.get("schema"), content.and_then(pick_media_schema)) {
        (Some(schema), _) => interpret(interpreter, unit, schema, child_pointer(&pointer, "schema"))?,
        (None, Some((media_type, schema))) => interpret(interpreter, unit, schema, media_pointer(&pointer, &media_type))?,
        (None, None) => SchemaNode::unknown(SchemaId::new(child_pointer(&pointer, "schema"))),
    };
    Ok(Parameter {
        name: raw.name,
        location,
        // path parameters can't be left out
        required: raw.required || location == ParameterLocation::Path,
        description: raw.description,
        schema,
    })
}

fn request_body<'doc>(
    interpreter: &mut Interpreter<'_, 'doc>,
    context: &OperationContext,
    entry: &'doc Value,
) -> Result<Option<RequestBody>, Rejection> {
    let (pointer, entry) = follow(interpreter, entry, child_pointer(context.pointer, "requestBody"))?;
    let raw = serde_yaml::from_value::<RawRequestBody>(entry.clone())
        .map_err(|err| Error::structure(&pointer, err.to_string()))?;
    let Some((media_type, schema)) = entry
        .get("content")
        .and_then(Value::as_mapping)
        .and_then(pick_media_schema)
    else {
        return Ok(None);
    };
    let schema = interpret(interpreter, context.id, schema, media_pointer(&pointer, &media_type))?;
    Ok(Some(RequestBody {
        media_type,
        required: raw.required,
        description: raw.description,
        schema,
    }))
}

fn response<'doc>(
    interpreter: &mut Interpreter<'_, 'doc>,
    unit: &str,
    entry: &'doc Value,
    pointer: String,
) -> Result<Response, Rejection> {
    let (pointer, entry) = follow(interpreter, entry, pointer)?;
    let raw = if entry.is_null() {
        RawResponse::default()
    } else {
        serde_yaml::from_value::<RawResponse>(entry.clone()).map_err(|err| Error::structure(&pointer, err.to_string()))?
    };
    let picked = entry
        .get("content")
        .and_then(Value::as_mapping)
        .and_then(pick_media_schema);
    let (media_type, schema) = match picked {
        Some((media_type, schema)) => {
            let node = interpret(interpreter, unit, schema, media_pointer(&pointer, &media_type))?;
            (Some(media_type), Some(node))
        }
        None => (None, None),
    };
    Ok(Response {
        description: raw.description,
        media_type,
        schema,
    })
}

/// Follows a `$ref` to a reusable component, returning the pointer the entry really lives at
fn follow<'doc>(
    interpreter: &mut Interpreter<'_, 'doc>,
    entry: &'doc Value,
    pointer: String,
) -> Result<(String, &'doc Value), UnresolvedReferenceError> {
    match entry.get("$ref").and_then(Value::as_str) {
        Some(reference) => {
            let resolved = interpreter.resolver().resolve(reference, &pointer)?;
            Ok((resolved.pointer, resolved.node))
        }
        None => Ok((pointer, entry)),
    }
}

fn interpret<'doc>(
    interpreter: &mut Interpreter<'_, 'doc>,
    unit: &str,
    schema: &'doc Value,
    pointer: String,
) -> Result<SchemaNode, Rejection> {
    interpreter
        .interpret_inline(schema, SchemaId::new(pointer))
        .map_err(|err| match err {
            InterpretError::Schema(err) => Rejection::Skip(Diagnostic::schema(unit, &err)),
            InterpretError::Unresolved(err) => err.into(),
        })
}

fn media_pointer(pointer: &str, media_type: &str) -> String {
    child_pointer(&child_pointer(&child_pointer(pointer, "content"), media_type), "schema")
}
