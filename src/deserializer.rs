//! Serde views over the metadata of operations. Schemas are not part of these structs, the
//! extractor reads them from the document tree so the parser can borrow them with their pointer.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Where a parameter is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
}

impl ParameterLocation {
    pub fn parse(location: &str) -> Option<Self> {
        match location {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawParameter {
    pub name: String,
    /// Kept as text so that unsupported locations (`cookie`) can be reported by name
    #[serde(rename = "in")]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawRequestBody {
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawResponse {
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
}

/// Picks the media type the generated code speaks: `application/json` when declared, the
/// first one carrying a schema otherwise.
pub fn pick_media_schema(content: &Mapping) -> Option<(String, &Value)> {
    fn schema_of(media: &Value) -> Option<&Value> {
        media.get("schema")
    }
    if let Some(schema) = content.get("application/json").and_then(schema_of) {
        return Some(("application/json".to_string(), schema));
    }
    content.iter().find_map(|(media_type, media)| {
        let media_type = media_type.as_str()?;
        schema_of(media).map(|schema| (media_type.to_string(), schema))
    })
}
