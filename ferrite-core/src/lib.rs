#![forbid(unsafe_code)]

mod error;
mod lower;
pub mod mapping;
pub mod mutability;
pub mod naming;
mod options;
pub mod symbols;
mod types;

pub use error::{DiagnosticKind, TranslateError, UnitFailed};
pub use mapping::{ApiTable, MappingRule};
pub use mutability::{Mutability, MutabilityTable, ReceiverAccess};
pub use options::{AsyncFallback, Rounding, TextLength, TranslateOptions};
pub use symbols::{Symbol, SymbolKind, SymbolTable};
pub use types::{PrimitiveType, TargetType, TypeMapper, TypePosition};

use ferrite_ast::Program;
use ferrite_rir as rir;
use tracing::{debug, debug_span};

/// Translates one parsed unit into a lowered module.
///
/// Emission is all-or-nothing: if any declaration or statement fails, every
/// error is returned (in source order) and no module is produced.
pub fn translate_unit(
    program: &Program,
    options: &TranslateOptions,
    api: &ApiTable,
) -> Result<rir::Module, UnitFailed> {
    let _span = debug_span!("translate_unit", items = program.items.len()).entered();

    let (symbols, mut errors) = symbols::resolve(program);
    let mutability = mutability::analyze(program, api);
    let lowerer = lower::Lowerer::new(&symbols, &mutability, api, options);
    let (module, lower_errors) = lowerer.lower_program(program);
    errors.extend(lower_errors);

    if errors.is_empty() {
        if let Err(err) = rir::validate_module(&module) {
            errors.push(TranslateError::UnsupportedConstruct {
                message: format!("generated tree failed validation: {err}"),
                span: ferrite_ast::span(0, 0),
            });
        }
    }

    if errors.is_empty() {
        debug!(items = module.items.len(), "unit translated");
        return Ok(module);
    }
    errors.sort_by_key(|e| e.span().offset());
    debug!(errors = errors.len(), "unit failed");
    Err(UnitFailed { errors })
}
