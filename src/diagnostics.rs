use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Machine readable category of a diagnostic, stable across releases so that tooling can
/// match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    IncompatibleComposition,
    EmptyEnumeration,
    UnsupportedType,
    UnknownShape,
    OpaqueFallback,
    UnionDowngraded,
    DiscriminatorDropped,
    ContainerDowngraded,
    UnsupportedParameterLocation,
    InvalidParameter,
    DuplicateResponse,
    DependencySkipped,
    Template,
}

/// A condition recorded during the run that did not abort it. `unit` identifies the schema
/// (by its pointer) or the operation (by its identifier) the diagnostic belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub unit: String,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(code: DiagnosticCode, unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            unit: unit.into(),
            message: message.into(),
        }
    }

    pub fn error(code: DiagnosticCode, unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// An error diagnostic for `unit`, which was invalidated by a schema error
    pub fn schema(unit: impl Into<String>, err: &SchemaError) -> Self {
        let code = match err {
            SchemaError::IncompatibleComposition { .. } => DiagnosticCode::IncompatibleComposition,
            SchemaError::EmptyEnumeration { .. } => DiagnosticCode::EmptyEnumeration,
            SchemaError::UnsupportedType { .. } => DiagnosticCode::UnsupportedType,
        };
        Self::error(code, unit, err.to_string())
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Emits the diagnostic through the `log` facade at a matching level
    pub(crate) fn log(&self) {
        match self.severity {
            Severity::Warning => log::warn!("{}: {}", self.unit, self.message),
            Severity::Error => log::error!("{}: {}", self.unit, self.message),
        }
    }
}

/// Outcome of a run that was not aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    /// Every unit was generated, some with a recorded fallback
    Warnings,
    /// At least one unit was dropped because of an error diagnostic
    Partial,
}

impl Status {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        if diagnostics.iter().any(Diagnostic::is_error) {
            Status::Partial
        } else if !diagnostics.is_empty() {
            Status::Warnings
        } else {
            Status::Success
        }
    }

    /// Process exit code of a finished run. Fatal errors exit with 1.
    pub fn exit_code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Warnings | Status::Partial => 2,
        }
    }
}

/// The machine readable report written next to the generated files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub status: Status,
    pub files: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}
