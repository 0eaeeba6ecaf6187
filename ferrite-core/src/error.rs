#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use ferrite_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

/// Diagnostic taxonomy. `ParseDefect` is produced by the front end; every
/// other kind comes from the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    ParseDefect,
    UnknownType,
    DuplicateDeclaration,
    ArityMismatch,
    MissingField,
    ExtraField,
    TypeMismatch,
    UnsupportedCall,
    UnsupportedConstruct,
    UnresolvedName,
}

#[derive(Debug, Clone, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum TranslateError {
    #[error("unknown type `{name}`")]
    #[diagnostic(code(ferrite::unknown_type))]
    UnknownType {
        name: String,
        #[label("not declared in this unit")]
        span: Span,
    },

    #[error("`{name}` is declared more than once")]
    #[diagnostic(code(ferrite::duplicate_declaration))]
    DuplicateDeclaration {
        name: String,
        #[label("declared again here")]
        span: Span,
        #[label("first declared here")]
        first: Span,
    },

    #[error("`{callee}` takes {expected} argument(s) but {found} were supplied")]
    #[diagnostic(code(ferrite::arity_mismatch))]
    ArityMismatch {
        callee: String,
        expected: String,
        found: usize,
        #[label]
        span: Span,
    },

    #[error("missing field `{field}` in `{ty}`")]
    #[diagnostic(code(ferrite::missing_field))]
    MissingField {
        ty: String,
        field: String,
        #[label("`{field}` is never initialized")]
        span: Span,
    },

    #[error("`{ty}` has no field `{field}`")]
    #[diagnostic(code(ferrite::extra_field))]
    ExtraField {
        ty: String,
        field: String,
        #[label]
        span: Span,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    #[diagnostic(code(ferrite::type_mismatch))]
    TypeMismatch {
        expected: String,
        found: String,
        #[label]
        span: Span,
    },

    #[error("unsupported call `{callee}`")]
    #[diagnostic(
        code(ferrite::unsupported_call),
        help(
            "only user-declared functions and calls listed in the API mapping table \
             can be translated"
        )
    )]
    UnsupportedCall {
        callee: String,
        #[label("no mapping for this call")]
        span: Span,
    },

    #[error("unsupported construct: {message}")]
    #[diagnostic(code(ferrite::unsupported_construct))]
    UnsupportedConstruct {
        message: String,
        #[label]
        span: Span,
    },

    #[error("cannot find `{name}` in this scope")]
    #[diagnostic(code(ferrite::unresolved_name))]
    UnresolvedName {
        name: String,
        #[label]
        span: Span,
    },
}

impl TranslateError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            TranslateError::UnknownType { .. } => DiagnosticKind::UnknownType,
            TranslateError::DuplicateDeclaration { .. } => DiagnosticKind::DuplicateDeclaration,
            TranslateError::ArityMismatch { .. } => DiagnosticKind::ArityMismatch,
            TranslateError::MissingField { .. } => DiagnosticKind::MissingField,
            TranslateError::ExtraField { .. } => DiagnosticKind::ExtraField,
            TranslateError::TypeMismatch { .. } => DiagnosticKind::TypeMismatch,
            TranslateError::UnsupportedCall { .. } => DiagnosticKind::UnsupportedCall,
            TranslateError::UnsupportedConstruct { .. } => DiagnosticKind::UnsupportedConstruct,
            TranslateError::UnresolvedName { .. } => DiagnosticKind::UnresolvedName,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TranslateError::UnknownType { span, .. }
            | TranslateError::DuplicateDeclaration { span, .. }
            | TranslateError::ArityMismatch { span, .. }
            | TranslateError::MissingField { span, .. }
            | TranslateError::ExtraField { span, .. }
            | TranslateError::TypeMismatch { span, .. }
            | TranslateError::UnsupportedCall { span, .. }
            | TranslateError::UnsupportedConstruct { span, .. }
            | TranslateError::UnresolvedName { span, .. } => *span,
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>, span: Span) -> Self {
        TranslateError::UnsupportedConstruct {
            message: message.into(),
            span,
        }
    }

    pub(crate) fn mismatch(expected: impl ToString, found: impl ToString, span: Span) -> Self {
        TranslateError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
            span,
        }
    }
}

/// A unit that accumulated at least one error. Nothing is emitted for it.
#[derive(Debug, Error, Diagnostic)]
#[error("translation failed with {} error(s); no output was produced", .errors.len())]
#[diagnostic(code(ferrite::unit_failed))]
pub struct UnitFailed {
    #[related]
    pub errors: Vec<TranslateError>,
}

impl UnitFailed {
    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.errors.iter().map(TranslateError::kind).collect()
    }
}
