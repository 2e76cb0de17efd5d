use std::collections::BTreeSet;

use super::{doc_lines, unit_path, Rendered, Renderer, UnitKind};
use crate::{
    config::Target,
    error::TemplateError,
    mapper::{EnumVariant, Field, OperationDef, Scalar, TypeDef, TypeDefKind, TypeDescriptor, TypeKind},
    naming::{pascal_case_or, proto_field_ident, screaming_snake_case},
};

const TIMESTAMP: &str = "google.protobuf.Timestamp";
const VALUE: &str = "google.protobuf.Value";
const EMPTY: &str = "google.protobuf.Empty";

/// Renders proto3 messages and services
pub struct ProtobufRenderer;

impl Renderer for ProtobufRenderer {
    fn model(&self, def: &TypeDef) -> Result<Rendered, TemplateError> {
        let body = generate_type(def);
        Ok(Rendered {
            imports: imports(&def.name, &descriptors(def)),
            doc: proto_doc(def.doc.as_deref(), ""),
            body,
        })
    }

    fn operation(&self, def: &OperationDef) -> Result<Rendered, TemplateError> {
        let mut used = def.params.iter().map(|param| &param.ty).collect::<Vec<_>>();
        used.extend(def.body.iter().map(|body| &body.ty));
        used.extend(def.responses.iter().map(|response| &response.ty));
        let doc = [def.summary.as_deref(), def.description.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Rendered {
            imports: imports(&def.request, &used),
            doc: proto_doc(Some(doc.as_str()), ""),
            body: generate_operation(def),
        })
    }

    fn validate(&self, unit: &str, text: &str) -> Result<(), TemplateError> {
        let unbalanced = || TemplateError::InvalidOutput {
            unit: unit.to_string(),
            message: "unbalanced braces".to_string(),
        };
        let mut depth = 0usize;
        for line in text.lines() {
            let code = line.split("//").next().unwrap_or_default();
            for c in code.chars() {
                match c {
                    '{' => depth += 1,
                    '}' => depth = depth.checked_sub(1).ok_or_else(unbalanced)?,
                    _ => {}
                }
            }
        }
        if depth != 0 {
            return Err(unbalanced());
        }
        if !text.contains("syntax = \"proto3\";") {
            return Err(TemplateError::InvalidOutput {
                unit: unit.to_string(),
                message: "missing proto3 syntax declaration".to_string(),
            });
        }
        Ok(())
    }
}

fn proto_doc(doc: Option<&str>, indent: &str) -> String {
    doc_lines(doc)
        .into_iter()
        .map(|line| format!("{}//{}{}\n", indent, if line.is_empty() { "" } else { " " }, line))
        .collect()
}

fn descriptors(def: &TypeDef) -> Vec<&TypeDescriptor> {
    match &def.kind {
        TypeDefKind::Struct { fields, additional } => fields.iter().chain(additional).map(|field| &field.ty).collect(),
        TypeDefKind::Composite { parts } => parts.iter().map(|part| &part.ty).collect(),
        TypeDefKind::Union { variants, .. } => variants.iter().map(|variant| &variant.ty).collect(),
        TypeDefKind::Alias(ty) => vec![ty],
        TypeDefKind::Fallback { .. } => vec![],
        TypeDefKind::Enum { .. } => vec![],
    }
}

fn well_known(ty: &TypeDescriptor, found: &mut BTreeSet<String>) {
    match &ty.kind {
        TypeKind::List(inner) | TypeKind::Map(inner) => well_known(inner, found),
        TypeKind::Scalar(Scalar::DateTime) => {
            found.insert("google/protobuf/timestamp.proto".into());
        }
        TypeKind::Opaque => {
            found.insert("google/protobuf/struct.proto".into());
        }
        TypeKind::Unit => {
            found.insert("google/protobuf/empty.proto".into());
        }
        _ => {}
    }
}

fn imports(own: &str, used: &[&TypeDescriptor]) -> String {
    let mut found = BTreeSet::new();
    for ty in used {
        well_known(ty, &mut found);
        for name in ty.named() {
            if name != own {
                found.insert(unit_path(UnitKind::Model, name, Target::Protobuf));
            }
        }
    }
    found.into_iter().map(|path| format!("import \"{}\";\n", path)).collect()
}

fn scalar_type(scalar: Scalar) -> &'static str {
    match scalar {
        Scalar::Text | Scalar::Date | Scalar::Uuid => "string",
        Scalar::Int32 => "int32",
        Scalar::Int64 => "int64",
        Scalar::Float => "float",
        Scalar::Double => "double",
        Scalar::Bool => "bool",
        Scalar::DateTime => TIMESTAMP,
        Scalar::Bytes => "bytes",
    }
}

/// The type of a singular position. Containers only show up here when a downgrade was not needed.
fn expand_type(ty: &TypeDescriptor) -> String {
    match &ty.kind {
        TypeKind::Scalar(scalar) => scalar_type(*scalar).to_string(),
        TypeKind::Named { name, .. } => name.clone(),
        TypeKind::Opaque | TypeKind::List(_) | TypeKind::Map(_) => VALUE.to_string(),
        TypeKind::Unit => EMPTY.to_string(),
    }
}

fn generate_field(ty: &TypeDescriptor, ident: &str, number: usize, optional: bool) -> String {
    match &ty.kind {
        TypeKind::List(item) => format!("repeated {} {} = {};", expand_type(item), ident, number),
        TypeKind::Map(value) => format!("map<string, {}> {} = {};", expand_type(value), ident, number),
        _ if optional || ty.nullable => format!("optional {} {} = {};", expand_type(ty), ident, number),
        _ => format!("{} {} = {};", expand_type(ty), ident, number),
    }
}

fn message(name: &str, lines: &[String]) -> String {
    let mut out = format!("message {} {{\n", name);
    for line in lines {
        for part in line.lines() {
            out.push_str("  ");
            out.push_str(part);
            out.push('\n');
        }
    }
    out.push_str("}\n");
    out
}

fn field_lines(fields: &[Field]) -> Vec<String> {
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            format!(
                "{}{}",
                proto_doc(field.doc.as_deref(), ""),
                generate_field(&field.ty, &field.ident, i + 1, !field.required)
            )
        })
        .collect()
}

fn generate_enum(name: &str, variants: &[EnumVariant]) -> String {
    let prefix = screaming_snake_case(name);
    let values = variants
        .iter()
        .map(|variant| format!("{}_{}", prefix, screaming_snake_case(&variant.name)))
        .collect::<Vec<_>>();
    let mut unspecified = format!("{}_UNSPECIFIED", prefix);
    while values.contains(&unspecified) {
        unspecified.push_str("_VALUE");
    }
    let mut out = format!("enum {} {{\n  {} = 0;\n", name, unspecified);
    for (i, (variant, value)) in variants.iter().zip(values).enumerate() {
        out.push_str(&format!("  // {}\n  {} = {};\n", variant.value, value, i + 1));
    }
    out.push_str("}\n");
    out
}

fn generate_type(def: &TypeDef) -> String {
    match &def.kind {
        TypeDefKind::Struct { fields, additional } => {
            let mut lines = field_lines(fields);
            if let Some(additional) = additional {
                lines.push(generate_field(&additional.ty, &additional.ident, fields.len() + 1, false));
            }
            message(&def.name, &lines)
        }
        TypeDefKind::Enum { variants, .. } => generate_enum(&def.name, variants),
        TypeDefKind::Union {
            variants,
            discriminator,
        } => {
            let mut lines = vec![];
            if let Some(discriminator) = discriminator {
                lines.push(format!("// Selected by `{}`", discriminator));
            }
            lines.push("oneof value {".to_string());
            for (i, variant) in variants.iter().enumerate() {
                let tag = variant
                    .tag
                    .as_ref()
                    .map(|tag| format!("  // {}\n", tag))
                    .unwrap_or_default();
                lines.push(format!(
                    "{}  {} {} = {};",
                    tag,
                    expand_type(&variant.ty),
                    proto_field_ident(&variant.name),
                    i + 1
                ));
            }
            lines.push("}".to_string());
            message(&def.name, &lines)
        }
        TypeDefKind::Fallback { alternatives } => message(
            &def.name,
            &[format!("// Holds one of: {}", alternatives.join(", ")), format!("{} value = 1;", VALUE)],
        ),
        TypeDefKind::Composite { parts } => message(&def.name, &field_lines(parts)),
        TypeDefKind::Alias(ty) => message(&def.name, &[generate_field(ty, "value", 1, false)]),
    }
}

fn generate_operation(def: &OperationDef) -> String {
    let mut request = def
        .params
        .iter()
        .enumerate()
        .map(|(i, param)| {
            format!(
                "{}// Sent in the {}.\n{}",
                proto_doc(param.doc.as_deref(), ""),
                param.location.as_str(),
                generate_field(&param.ty, &param.ident, i + 1, !param.required)
            )
        })
        .collect::<Vec<_>>();
    if let Some(body) = &def.body {
        request.push(format!(
            "{}// Request body, sent as `{}`.\n{}",
            proto_doc(body.doc.as_deref(), ""),
            body.media_type,
            generate_field(&body.ty, &body.ident, def.params.len() + 1, !body.required)
        ));
    }
    let response = def
        .responses
        .iter()
        .enumerate()
        .map(|(i, declared)| {
            format!(
                "{}// {}\n{}",
                proto_doc(declared.doc.as_deref(), ""),
                declared.status,
                generate_field(&declared.ty, &declared.ident, i + 1, true)
            )
        })
        .collect::<Vec<_>>();
    let rpc = pascal_case_or(&def.id, "Operation");
    let options = if def.deprecated {
        " {\n    option deprecated = true;\n  }"
    } else {
        ";"
    };
    format!(
        "{}\n{}\nservice {} {{\n  // {} {}\n  rpc {}({}) returns ({}){}\n}}\n",
        message(&def.request, &request),
        message(&def.response, &response),
        def.service,
        def.method.as_str().to_uppercase(),
        def.path,
        rpc,
        def.request,
        def.response,
        options
    )
}
