use proc_macro2::{Literal as LiteralToken, TokenStream};
use quote::quote;

use super::{doc_lines, Rendered, Renderer};
use crate::{
    error::TemplateError,
    mapper::{EnumRepr, EnumVariant, Field, OperationDef, Scalar, TypeDef, TypeDefKind, TypeDescriptor, TypeKind, UnionVariant},
    naming::{rust_field_ident, screaming_snake_case},
    parser::Literal,
};

const IMPORTS: &str = "use crate::models::*;";

/// Renders serde models and operation stubs
pub struct RustRenderer;

impl Renderer for RustRenderer {
    fn model(&self, def: &TypeDef) -> Result<Rendered, TemplateError> {
        let code = generate_type(def)?;
        Ok(Rendered {
            imports: IMPORTS.to_string(),
            doc: rust_doc(def.doc.as_deref()),
            body: unparse(code)?,
        })
    }

    fn operation(&self, def: &OperationDef) -> Result<Rendered, TemplateError> {
        let code = generate_operation(def)?;
        let doc = [def.summary.as_deref(), def.description.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Rendered {
            imports: IMPORTS.to_string(),
            doc: rust_doc(Some(&doc).filter(|doc| !doc.is_empty()).map(String::as_str)),
            body: unparse(code)?,
        })
    }

    fn validate(&self, unit: &str, text: &str) -> Result<(), TemplateError> {
        syn::parse_file(text).map(|_| ()).map_err(|err| TemplateError::InvalidOutput {
            unit: unit.to_string(),
            message: err.to_string(),
        })
    }
}

fn unparse(code: TokenStream) -> Result<String, TemplateError> {
    let file = syn::parse2::<syn::File>(code.clone()).map_err(|err| TemplateError::InvalidToken {
        text: code.to_string(),
        message: err.to_string(),
    })?;
    Ok(prettyplease::unparse(&file))
}

fn tokens(text: &str) -> Result<TokenStream, TemplateError> {
    text.parse::<TokenStream>().map_err(|err| TemplateError::InvalidToken {
        text: text.to_string(),
        message: err.to_string(),
    })
}

fn rust_doc(doc: Option<&str>) -> String {
    doc_lines(doc)
        .into_iter()
        .map(|line| format!("///{}{}\n", if line.is_empty() { "" } else { " " }, line))
        .collect()
}

fn doc_attrs(doc: Option<&str>) -> Vec<TokenStream> {
    doc_lines(doc)
        .into_iter()
        .map(|line| {
            let line = format!(" {}", line);
            quote!(#[doc = #line])
        })
        .collect()
}

fn expand_scalar(scalar: Scalar) -> &'static str {
    match scalar {
        Scalar::Text | Scalar::DateTime | Scalar::Date => "String",
        Scalar::Int32 => "i32",
        Scalar::Int64 => "i64",
        Scalar::Float => "f32",
        Scalar::Double => "f64",
        Scalar::Bool => "bool",
        Scalar::Uuid => "uuid::Uuid",
        Scalar::Bytes => "Vec<u8>",
    }
}

/// `boxed` is set for positions that are stored inline, where a recursive type needs a `Box`
fn expand_kind(kind: &TypeKind, boxed: bool) -> String {
    match kind {
        TypeKind::Scalar(scalar) => expand_scalar(*scalar).into(),
        TypeKind::List(item) => format!("Vec<{}>", expand_nested(item)),
        TypeKind::Map(value) => format!("std::collections::HashMap<String, {}>", expand_nested(value)),
        TypeKind::Named { name, recursive } if *recursive && boxed => format!("Box<{}>", name),
        TypeKind::Named { name, .. } => name.clone(),
        TypeKind::Opaque => "serde_json::Value".into(),
        TypeKind::Unit => "()".into(),
    }
}

fn expand_nested(ty: &TypeDescriptor) -> String {
    let base = expand_kind(&ty.kind, false);
    if ty.nullable {
        format!("Option<{}>", base)
    } else {
        base
    }
}

fn expand_field_type(ty: &TypeDescriptor, optional: bool) -> String {
    let base = expand_kind(&ty.kind, true);
    if optional || ty.nullable {
        format!("Option<{}>", base)
    } else {
        base
    }
}

fn generate_field(field: &Field) -> Result<TokenStream, TemplateError> {
    let name = &field.name;
    let ident = tokens(&field.ident)?;
    let optional = !field.required;
    let field_type = tokens(&expand_field_type(&field.ty, optional))?;
    let doc = doc_attrs(field.doc.as_deref());
    let skip = optional.then(|| quote!(#[serde(default, skip_serializing_if = "Option::is_none")]));
    Ok(quote! {
        #(#doc)*
        #[serde(rename = #name)]
        #skip
        pub #ident: #field_type
    })
}

fn literal_token(value: &Literal, repr: EnumRepr) -> Result<TokenStream, TemplateError> {
    let invalid = |message: &str| TemplateError::InvalidToken {
        text: value.to_string(),
        message: message.to_string(),
    };
    Ok(match (value, repr) {
        (Literal::Boolean(b), _) => quote!(#b),
        (Literal::Integer(i), EnumRepr::Number) => {
            let float = LiteralToken::f64_unsuffixed(*i as f64);
            quote!(#float)
        }
        (Literal::Integer(i), _) => {
            let int = LiteralToken::i64_unsuffixed(*i);
            quote!(#int)
        }
        (Literal::Number(n), _) if n.is_finite() => {
            let float = LiteralToken::f64_unsuffixed(*n);
            quote!(#float)
        }
        (Literal::Number(_), _) => return Err(invalid("only finite numbers can be constants")),
        (Literal::String(s), _) => quote!(#s),
    })
}

fn generate_enum(identifier: &TokenStream, repr: EnumRepr, variants: &[EnumVariant]) -> Result<TokenStream, TemplateError> {
    if repr == EnumRepr::String {
        let names = variants
            .iter()
            .map(|variant| tokens(&variant.name))
            .collect::<Result<Vec<_>, _>>()?;
        let values = variants.iter().map(|variant| variant.value.to_string()).collect::<Vec<_>>();
        return Ok(quote! {
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
            pub enum #identifier {
                #(
                    #[serde(rename = #values)]
                    #names
                ),*
            }

            impl std::fmt::Display for #identifier {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    match self {
                        #(Self::#names => f.write_str(#values)),*
                    }
                }
            }
        });
    }
    // serde can't rename variants to numbers or booleans, so the set is a newtype with constants
    let inner = tokens(match repr {
        EnumRepr::Integer => "i64",
        EnumRepr::Number => "f64",
        _ => "bool",
    })?;
    let consts = variants
        .iter()
        .map(|variant| tokens(&screaming_snake_case(&variant.name)))
        .collect::<Result<Vec<_>, _>>()?;
    let values = variants
        .iter()
        .map(|variant| literal_token(&variant.value, repr))
        .collect::<Result<Vec<_>, _>>()?;
    let count = LiteralToken::usize_unsuffixed(variants.len());
    Ok(quote! {
        #[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
        #[serde(transparent)]
        pub struct #identifier(pub #inner);

        impl #identifier {
            #(pub const #consts: Self = Self(#values);)*

            /// Every declared value, in declaration order
            pub const ALL: [Self; #count] = [#(Self::#consts),*];
        }
    })
}

fn generate_union(
    identifier: &TokenStream,
    variants: &[UnionVariant],
    discriminator: Option<&str>,
) -> Result<TokenStream, TemplateError> {
    let variants = variants
        .iter()
        .map(|variant| {
            let variant_name = tokens(&variant.name)?;
            let variant_type = tokens(&expand_field_type(&variant.ty, false))?;
            let rename = match (&variant.tag, discriminator) {
                (Some(tag), Some(_)) => Some(quote!(#[serde(rename = #tag)])),
                _ => None,
            };
            Ok(quote! {
                #rename
                #variant_name(#variant_type)
            })
        })
        .collect::<Result<Vec<_>, TemplateError>>()?;
    let representation = match discriminator {
        Some(discriminator) => quote!(#[serde(tag = #discriminator)]),
        None => quote!(#[serde(untagged)]),
    };
    Ok(quote! {
        #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
        #representation
        pub enum #identifier {
            #(#variants),*
        }
    })
}

fn generate_type(def: &TypeDef) -> Result<TokenStream, TemplateError> {
    let identifier = tokens(&def.name)?;
    let code = match &def.kind {
        TypeDefKind::Struct { fields, additional } => {
            let mut fields = fields.iter().map(generate_field).collect::<Result<Vec<_>, _>>()?;
            if let Some(additional) = additional {
                let ident = tokens(&additional.ident)?;
                let field_type = tokens(&expand_field_type(&additional.ty, false))?;
                fields.push(quote! {
                    #[serde(flatten)]
                    pub #ident: #field_type
                })
            }
            quote! {
                #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
                pub struct #identifier {
                    #(#fields),*
                }
            }
        }
        TypeDefKind::Enum { repr, variants } => generate_enum(&identifier, *repr, variants)?,
        TypeDefKind::Union {
            variants,
            discriminator,
        } => generate_union(&identifier, variants, discriminator.as_deref())?,
        TypeDefKind::Fallback { alternatives } => {
            let doc = format!(" Holds one of: {}", alternatives.join(", "));
            quote! {
                #[doc = #doc]
                #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
                #[serde(transparent)]
                pub struct #identifier(pub serde_json::Value);
            }
        }
        TypeDefKind::Composite { parts } => {
            let flattened = parts
                .iter()
                .map(|part| {
                    let field_name = tokens(&part.ident)?;
                    let field_type = tokens(&expand_field_type(&part.ty, false))?;
                    Ok(quote! {
                        #[serde(flatten)]
                        pub #field_name: #field_type
                    })
                })
                .collect::<Result<Vec<_>, TemplateError>>()?;
            quote! {
                #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
                pub struct #identifier {
                    #(#flattened),*
                }
            }
        }
        TypeDefKind::Alias(ty) => {
            let inner = tokens(&expand_field_type(ty, false))?;
            quote! {
                #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
                #[serde(transparent)]
                pub struct #identifier(pub #inner);
            }
        }
    };
    Ok(code)
}

fn generate_operation(def: &OperationDef) -> Result<TokenStream, TemplateError> {
    let request = tokens(&def.request)?;
    let response = tokens(&def.response)?;
    let handler = tokens(&def.service)?;
    let method_name = tokens(&rust_field_ident(&def.id))?;
    let http_method = def.method.as_str().to_uppercase();
    let path = &def.path;

    let mut fields = def
        .params
        .iter()
        .map(|param| {
            generate_field(&Field {
                name: param.name.clone(),
                ident: param.ident.clone(),
                doc: Some(match &param.doc {
                    Some(doc) => format!("{}\n\nSent in the {}.", doc, param.location.as_str()),
                    None => format!("Sent in the {}.", param.location.as_str()),
                }),
                ty: param.ty.clone(),
                required: param.required,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(body) = &def.body {
        let ident = tokens(&body.ident)?;
        let field_type = tokens(&expand_field_type(&body.ty, !body.required))?;
        let doc = format!(
            "{}Request body, sent as `{}`.",
            body.doc.as_deref().map(|doc| format!("{}\n\n", doc)).unwrap_or_default(),
            body.media_type
        );
        let doc = doc_attrs(Some(doc.as_str()));
        fields.push(quote! {
            #(#doc)*
            pub #ident: #field_type
        });
    }

    let (response_enum, returns) = if def.responses.is_empty() {
        (quote!(), quote!())
    } else {
        let mut variants = vec![];
        let mut arms = vec![];
        for declared in &def.responses {
            let variant = tokens(&declared.variant)?;
            let doc = doc_attrs(declared.doc.as_deref());
            let code = match declared.code() {
                Some(code) => quote!(Some(#code)),
                None => quote!(None),
            };
            if declared.ty.kind == TypeKind::Unit {
                variants.push(quote!(#(#doc)* #variant));
                arms.push(quote!(#response::#variant => #code));
            } else {
                let payload = tokens(&expand_field_type(&declared.ty, false))?;
                variants.push(quote!(#(#doc)* #variant(#payload)));
                arms.push(quote!(#response::#variant(..) => #code));
            }
        }
        let response_enum = quote! {
            #[derive(Debug, Clone, PartialEq)]
            pub enum #response {
                #(#variants),*
            }

            impl #response {
                /// The exact status code, `None` for ranges and the default response
                pub fn status(&self) -> Option<u16> {
                    match self {
                        #(#arms),*
                    }
                }
            }
        };
        (response_enum, quote!(-> #response))
    };
    let deprecated = def.deprecated.then(|| quote!(#[deprecated]));

    Ok(quote! {
        #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
        pub struct #request {
            #(#fields),*
        }

        impl #request {
            pub const METHOD: &'static str = #http_method;
            pub const PATH: &'static str = #path;
        }

        #response_enum

        pub trait #handler {
            #deprecated
            fn #method_name(&self, params: #request) #returns;
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;
    use crate::{
        deserializer::ParameterLocation,
        mapper::{ParamDef, ResponseDef},
        operation::Method,
        parser::SchemaId,
    };
    use pretty_assertions::assert_eq;

    fn scalar(scalar: Scalar) -> TypeDescriptor {
        TypeDescriptor::new(TypeKind::Scalar(scalar))
    }

    fn type_def(name: &str, kind: TypeDefKind) -> TypeDef {
        TypeDef {
            name: name.to_string(),
            source: SchemaId::new(format!("#/components/schemas/{}", name)),
            doc: None,
            kind,
        }
    }

    fn compact(code: &str) -> String {
        code.split_whitespace().collect()
    }

    #[test]
    fn test_generate_struct() {
        let def = type_def(
            "StructEntity",
            TypeDefKind::Struct {
                fields: vec![
                    Field {
                        name: "fieldName".into(),
                        ident: "field_name".into(),
                        doc: Some("A field".into()),
                        ty: TypeDescriptor::new(TypeKind::Named {
                            name: "StructEntity".into(),
                            recursive: true,
                        }),
                        required: false,
                    },
                    Field {
                        name: "type".into(),
                        ident: "r#type".into(),
                        doc: None,
                        ty: scalar(Scalar::Text),
                        required: true,
                    },
                ],
                additional: Some(Field {
                    name: "additionalProperties".into(),
                    ident: "additional_properties".into(),
                    doc: None,
                    ty: TypeDescriptor::new(TypeKind::Map(Box::new(TypeDescriptor::new(TypeKind::Opaque)))),
                    required: true,
                }),
            },
        );
        let code = RustRenderer.model(&def).unwrap().body;
        println!("{}", code);
        assert!(code.contains("pub struct StructEntity"));
        let code = compact(&code);
        assert!(code.contains("pubfield_name:Option<Box<StructEntity>>"));
        assert!(code.contains("#[serde(rename=\"type\")]pubr#type:String"));
        assert!(code.contains("#[serde(flatten)]pubadditional_properties:std::collections::HashMap<String,serde_json::Value>"));
    }

    #[test]
    fn test_generate_tagged_enum() {
        let named = |name: &str| TypeDescriptor::new(TypeKind::Named {
            name: name.into(),
            recursive: false,
        });
        let def = type_def(
            "EnumEntity",
            TypeDefKind::Union {
                variants: vec![
                    UnionVariant {
                        name: "Variant1".into(),
                        ty: named("Variant1"),
                        tag: Some("one".into()),
                    },
                    UnionVariant {
                        name: "Variant2".into(),
                        ty: named("Variant2"),
                        tag: Some("two".into()),
                    },
                ],
                discriminator: Some("type".into()),
            },
        );
        let code = RustRenderer.model(&def).unwrap().body;
        println!("{}", code);
        assert!(code.contains("pub enum EnumEntity"));
        let code = compact(&code);
        assert!(code.contains("#[serde(tag=\"type\")]"));
        assert!(code.contains("#[serde(rename=\"one\")]Variant1(Variant1)"));
    }

    #[test]
    fn test_generate_string_enum() {
        let def = type_def(
            "Level",
            TypeDefKind::Enum {
                repr: EnumRepr::String,
                variants: vec![
                    EnumVariant {
                        name: "InvalidCharacters".into(),
                        value: Literal::String("Invalid characters".into()),
                    },
                    EnumVariant {
                        name: "Low".into(),
                        value: Literal::String("low".into()),
                    },
                ],
            },
        );
        let body = RustRenderer.model(&def).unwrap().body;
        assert!(
            body.contains("#[serde(rename = \"Invalid characters\")]\n    InvalidCharacters,"),
            "{body}"
        );
        let code = compact(&body);
        assert!(code.find("InvalidCharacters").unwrap() < code.find("Low").unwrap());
        assert!(code.contains("Self::Low=>f.write_str(\"low\")"));
    }

    #[test]
    fn test_generate_integer_enum() {
        let def = type_def(
            "Code",
            TypeDefKind::Enum {
                repr: EnumRepr::Integer,
                variants: vec![
                    EnumVariant {
                        name: "Value1".into(),
                        value: Literal::Integer(1),
                    },
                    EnumVariant {
                        name: "Value2".into(),
                        value: Literal::Integer(2),
                    },
                ],
            },
        );
        let code = compact(&RustRenderer.model(&def).unwrap().body);
        assert!(code.contains("pubstructCode(pubi64);"));
        assert!(code.contains("pubconstVALUE1:Self=Self(1);"));
        assert!(code.contains("pubconstALL:[Self;2]=[Self::VALUE1,Self::VALUE2];"));
    }

    #[test]
    fn test_generate_operation() {
        let def = OperationDef {
            id: "get_hello_user".into(),
            method: Method::Get,
            path: "/hello/{user}".into(),
            summary: Some("Greets a user".into()),
            description: None,
            deprecated: true,
            request: "GetHelloUserParams".into(),
            response: "GetHelloUserResponse".into(),
            service: "GetHelloUserHandler".into(),
            params: vec![ParamDef {
                name: "user".into(),
                ident: "user".into(),
                location: ParameterLocation::Path,
                required: true,
                doc: None,
                ty: scalar(Scalar::Text),
            }],
            body: None,
            responses: vec![
                ResponseDef {
                    status: "200".into(),
                    variant: "Status200".into(),
                    ident: "status_200".into(),
                    doc: None,
                    ty: scalar(Scalar::Text),
                },
                ResponseDef {
                    status: "default".into(),
                    variant: "Default".into(),
                    ident: "default".into(),
                    doc: None,
                    ty: TypeDescriptor::new(TypeKind::Unit),
                },
            ],
        };
        let rendered = RustRenderer.operation(&def).unwrap();
        assert_eq!(rendered.doc, "/// Greets a user\n");
        let code = compact(&rendered.body);
        assert!(code.contains("pubuser:String"));
        assert!(code.contains("pubconstPATH:&'staticstr=\"/hello/{user}\";"));
        assert!(code.contains("Status200(String)"));
        assert!(code.contains("GetHelloUserResponse::Status200(..)=>Some(200u16)"));
        assert!(code.contains("GetHelloUserResponse::Default=>None"));
        assert!(code.contains("#[deprecated]fnget_hello_user(&self,params:GetHelloUserParams)->GetHelloUserResponse;"));
    }

    #[test]
    fn test_validate_rejects_broken_output() {
        assert!(RustRenderer.validate("Broken", "pub struct {").is_err());
        assert!(RustRenderer.validate("Fine", "pub struct Fine;").is_ok());
    }
}
