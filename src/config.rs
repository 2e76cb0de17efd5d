use std::{collections::BTreeMap, fmt};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The language generated code is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Rust,
    Protobuf,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::Rust => "rust",
            Target::Protobuf => "protobuf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Target::Rust => "rs",
            Target::Protobuf => "proto",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How operation identifiers are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OperationNaming {
    /// `get_hello_user` for `GET /hello/{user}`
    #[default]
    Path,
    /// The declared `operationId`, falling back to the path based identifier when absent
    #[value(name = "operation-id")]
    OperationId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnionPolicy {
    /// Native tagged unions where the target can express them
    #[default]
    Native,
    /// Always downgrade unions to the documented opaque fallback
    Fallback,
}

/// What happens to schemas that match no known shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    Reject,
    Opaque,
}

/// Type used for responses that declare no body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyResponsePolicy {
    #[default]
    Unit,
    Omit,
}

/// Per-target configuration. Every field has a default so a config file only needs to list
/// what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub operation_naming: OperationNaming,
    pub union_policy: UnionPolicy,
    /// Applies to parameters, request bodies and responses
    pub unknown_payloads: UnknownPolicy,
    /// Applies to object fields, array items and map values
    pub unknown_fields: UnknownPolicy,
    pub empty_responses: EmptyResponsePolicy,
    pub parallel: bool,
    /// `package` declaration of generated protobuf files
    pub package: String,
    /// Replaces built-in templates by name, e.g. `rust/model`
    pub templates: BTreeMap<String, String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            operation_naming: OperationNaming::default(),
            union_policy: UnionPolicy::default(),
            unknown_payloads: UnknownPolicy::Reject,
            unknown_fields: UnknownPolicy::Opaque,
            empty_responses: EmptyResponsePolicy::default(),
            parallel: true,
            package: "api".to_string(),
            templates: BTreeMap::new(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}
