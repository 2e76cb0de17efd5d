//! Turns contract text into a generic, order preserving tree.

use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{Error, ParseError};

/// Serialization of the contract document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// Guesses the format from a file extension. Anything that isn't `.json` is read as YAML,
    /// which also accepts most JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// The `info` block of the contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    pub description: Option<String>,
}

/// A loaded contract document. The tree is kept as-is, later stages read from it.
#[derive(Debug, Clone)]
pub struct Document {
    pub format: Format,
    pub info: Info,
    root: Value,
}

impl Document {
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// The `paths` mapping, empty when the document declares none
    pub fn paths(&self) -> Option<&Mapping> {
        self.root.get("paths").and_then(Value::as_mapping)
    }

    /// The `components/schemas` mapping
    pub fn component_schemas(&self) -> Option<&Mapping> {
        self.root
            .get("components")
            .and_then(|components| components.get("schemas"))
            .and_then(Value::as_mapping)
    }
}

pub fn load(content: &str, format: Format) -> Result<Document, Error> {
    let root = match format {
        Format::Yaml => serde_yaml::from_str::<Value>(content).map_err(|err| ParseError {
            format: "YAML",
            message: err.to_string(),
            line: err.location().map(|loc| loc.line()),
            column: err.location().map(|loc| loc.column()),
        })?,
        // serde_json reports JSON specific positions, the target value keeps key order
        Format::Json => serde_json::from_str::<Value>(content).map_err(|err| ParseError {
            format: "JSON",
            message: err.to_string(),
            line: Some(err.line()).filter(|line| *line > 0),
            column: Some(err.column()).filter(|column| *column > 0),
        })?,
    };
    if !root.is_mapping() {
        return Err(Error::structure("#", "the document root must be a mapping"));
    }
    if let Some(paths) = root.get("paths") {
        if !paths.is_mapping() && !paths.is_null() {
            return Err(Error::structure("#/paths", "`paths` must be a mapping"));
        }
    }
    let info = match root.get("info") {
        Some(info) => serde_yaml::from_value::<Info>(info.clone())
            .map_err(|err| Error::structure("#/info", err.to_string()))?,
        None => Info::default(),
    };
    log::debug!("loaded {:?} document `{}` {}", format, info.title, info.version);
    Ok(Document { format, info, root })
}

pub fn load_file(path: &Path) -> Result<Document, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load(&content, Format::from_path(path))
}
