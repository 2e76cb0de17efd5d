use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort the whole run. Nothing is written when one of these is returned, except
/// for `OutputWrite`, which reports the files that made it to disk before the failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    UnresolvedReference(#[from] UnresolvedReferenceError),
    #[error("invalid document structure at `{pointer}`: {message}")]
    Structure { pointer: String, message: String },
    #[error(transparent)]
    DuplicateOperation(#[from] DuplicateOperationError),
    #[error(transparent)]
    OutputWrite(#[from] OutputWriteError),
    #[error("generation cancelled before the {stage} stage")]
    Cancelled { stage: &'static str },
    #[error("could not read `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn structure(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Structure {
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not parse {format} document{}: {message}", location(.line, .column))]
pub struct ParseError {
    pub format: &'static str,
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

fn location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" at line {line}, column {column}"),
        (Some(line), None) => format!(" at line {line}"),
        _ => String::new(),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("reference `{reference}` at `{at}` cannot be resolved: {reason}")]
pub struct UnresolvedReferenceError {
    pub reference: String,
    /// Pointer of the node holding the `$ref`
    pub at: String,
    pub reason: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("operations `{first}` and `{second}` both derive the identifier `{identifier}`")]
pub struct DuplicateOperationError {
    pub identifier: String,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Error)]
#[error("could not write `{}` ({} file(s) written before the failure)", path.display(), written.len())]
pub struct OutputWriteError {
    pub path: PathBuf,
    pub written: Vec<PathBuf>,
    #[source]
    pub source: std::io::Error,
}

/// Errors that invalidate a single schema definition. Every type or operation depending on
/// the schema is skipped, the rest of the run goes on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("field `{field}` is declared with different shapes in the parts of `{schema}`")]
    IncompatibleComposition { schema: String, field: String },
    #[error("enumeration `{schema}` declares no values")]
    EmptyEnumeration { schema: String },
    #[error("`{schema}` has an unrecognized type `{found}`")]
    UnsupportedType { schema: String, found: String },
}

/// Errors local to one rendered unit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("no template named `{0}`")]
    UnknownTemplate(String),
    #[error("template `{template}` uses the undefined variable `{variable}`")]
    MissingVariable { template: String, variable: String },
    #[error("template `{template}` could not be rendered: {message}")]
    Malformed { template: String, message: String },
    #[error("`{text}` is not a valid token sequence: {message}")]
    InvalidToken { text: String, message: String },
    #[error("rendered `{unit}` is not valid source: {message}")]
    InvalidOutput { unit: String, message: String },
}
