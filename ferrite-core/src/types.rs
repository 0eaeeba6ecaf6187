#![forbid(unsafe_code)]

use std::fmt;

use ferrite_ast::{TypeAnn, TypeAnnKind};
use ferrite_rir as rir;

use crate::error::TranslateError;
use crate::symbols::{SymbolKind, SymbolTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Number,
    Text,
    Boolean,
    Unit,
}

/// Target-side type of a value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetType {
    Primitive(PrimitiveType),
    /// An interface or class declared in this unit.
    Named(String),
    Optional(Box<TargetType>),
    Sequence(Box<TargetType>),
    /// Untyped values; never narrowed implicitly.
    Dynamic,
    /// Payload of an asynchronous function's result. Only ever the declared
    /// return type of an async function or the type of a not-yet-awaited call.
    AsyncResult(Box<TargetType>),
    /// `null`/`undefined` literals before they meet an optional type.
    Null,
}

impl TargetType {
    pub const NUMBER: TargetType = TargetType::Primitive(PrimitiveType::Number);
    pub const TEXT: TargetType = TargetType::Primitive(PrimitiveType::Text);
    pub const BOOLEAN: TargetType = TargetType::Primitive(PrimitiveType::Boolean);
    pub const UNIT: TargetType = TargetType::Primitive(PrimitiveType::Unit);

    pub fn optional(inner: TargetType) -> Self {
        match inner {
            TargetType::Optional(_) => inner,
            other => TargetType::Optional(Box::new(other)),
        }
    }

    pub fn sequence(elem: TargetType) -> Self {
        TargetType::Sequence(Box::new(elem))
    }

    pub fn is_copy(&self) -> bool {
        matches!(
            self,
            TargetType::Primitive(
                PrimitiveType::Number | PrimitiveType::Boolean | PrimitiveType::Unit
            )
        )
    }

    pub fn is_text(&self) -> bool {
        *self == TargetType::TEXT
    }

    /// Records, class instances and arrays: values the source shares by
    /// reference.
    pub fn is_object(&self) -> bool {
        matches!(self, TargetType::Named(_) | TargetType::Sequence(_))
    }

    pub fn element(&self) -> Option<&TargetType> {
        match self {
            TargetType::Sequence(elem) => Some(elem),
            _ => None,
        }
    }

    /// Payload type: `AsyncResult(T)` → `T`.
    pub fn payload(&self) -> &TargetType {
        match self {
            TargetType::AsyncResult(inner) => inner,
            other => other,
        }
    }

    pub fn to_rir(&self) -> rir::Type {
        match self {
            TargetType::Primitive(PrimitiveType::Number) => rir::Type::F64,
            TargetType::Primitive(PrimitiveType::Text) => rir::Type::String,
            TargetType::Primitive(PrimitiveType::Boolean) => rir::Type::Bool,
            TargetType::Primitive(PrimitiveType::Unit) => rir::Type::Unit,
            TargetType::Named(name) => rir::Type::Named(name.clone()),
            TargetType::Optional(inner) => rir::Type::Option(Box::new(inner.to_rir())),
            TargetType::Sequence(elem) => rir::Type::Vec(Box::new(elem.to_rir())),
            TargetType::Dynamic | TargetType::Null => rir::Type::Json,
            TargetType::AsyncResult(inner) => inner.to_rir(),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Primitive(PrimitiveType::Number) => write!(f, "f64"),
            TargetType::Primitive(PrimitiveType::Text) => write!(f, "String"),
            TargetType::Primitive(PrimitiveType::Boolean) => write!(f, "bool"),
            TargetType::Primitive(PrimitiveType::Unit) => write!(f, "()"),
            TargetType::Named(name) => write!(f, "{name}"),
            TargetType::Optional(inner) => write!(f, "Option<{inner}>"),
            TargetType::Sequence(elem) => write!(f, "Vec<{elem}>"),
            TargetType::Dynamic => write!(f, "serde_json::Value"),
            TargetType::AsyncResult(inner) => write!(f, "async {inner}"),
            TargetType::Null => write!(f, "null"),
        }
    }
}

/// Where an annotation appears; `Promise<T>` is only meaningful as an async
/// function's return type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypePosition {
    Value,
    AsyncReturn,
}

pub struct TypeMapper<'a> {
    symbols: &'a SymbolTable,
}

impl<'a> TypeMapper<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self { symbols }
    }

    pub fn map(&self, ann: &TypeAnn, pos: TypePosition) -> Result<TargetType, TranslateError> {
        match &ann.kind {
            TypeAnnKind::Array(elem) => {
                Ok(TargetType::sequence(self.map(elem, TypePosition::Value)?))
            }
            TypeAnnKind::Nullable(inner) => {
                Ok(TargetType::optional(self.map(inner, TypePosition::Value)?))
            }
            TypeAnnKind::Named { name, args } => {
                let expect_args = |n: usize| -> Result<(), TranslateError> {
                    if args.len() == n {
                        Ok(())
                    } else {
                        Err(TranslateError::unsupported(
                            format!(
                                "`{}` takes {n} type argument(s), found {}",
                                name.node,
                                args.len()
                            ),
                            ann.span,
                        ))
                    }
                };

                match name.node.as_str() {
                    "number" => expect_args(0).map(|_| TargetType::NUMBER),
                    "string" => expect_args(0).map(|_| TargetType::TEXT),
                    "boolean" => expect_args(0).map(|_| TargetType::BOOLEAN),
                    "void" => expect_args(0).map(|_| TargetType::UNIT),
                    "any" | "unknown" | "object" => expect_args(0).map(|_| TargetType::Dynamic),
                    "Array" => {
                        expect_args(1)?;
                        Ok(TargetType::sequence(self.map(&args[0], TypePosition::Value)?))
                    }
                    "Promise" => {
                        expect_args(1)?;
                        if pos != TypePosition::AsyncReturn {
                            return Err(TranslateError::unsupported(
                                "`Promise<T>` is only supported as the return type \
                                 of an async function",
                                ann.span,
                            ));
                        }
                        let payload = self.map(&args[0], TypePosition::Value)?;
                        Ok(TargetType::AsyncResult(Box::new(payload)))
                    }
                    other => {
                        let Some(symbol) = self.symbols.get(other) else {
                            return Err(TranslateError::UnknownType {
                                name: other.to_string(),
                                span: name.span,
                            });
                        };
                        if symbol.kind == SymbolKind::Function {
                            return Err(TranslateError::UnknownType {
                                name: other.to_string(),
                                span: name.span,
                            });
                        }
                        if !args.is_empty() {
                            return Err(TranslateError::unsupported(
                                "generic type arguments are not supported",
                                ann.span,
                            ));
                        }
                        Ok(TargetType::Named(other.to_string()))
                    }
                }
            }
        }
    }

    /// Return type of a function or method. No annotation means the unit
    /// type; async functions always yield an `AsyncResult`.
    pub fn map_return(
        &self,
        ann: Option<&TypeAnn>,
        is_async: bool,
    ) -> Result<TargetType, TranslateError> {
        let pos = if is_async {
            TypePosition::AsyncReturn
        } else {
            TypePosition::Value
        };
        let ty = match ann {
            Some(ann) => self.map(ann, pos)?,
            None => TargetType::UNIT,
        };
        Ok(match ty {
            TargetType::AsyncResult(_) => ty,
            other if is_async => TargetType::AsyncResult(Box::new(other)),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_ast::{Ident, span};

    fn named(name: &str, args: Vec<TypeAnn>) -> TypeAnn {
        TypeAnn {
            span: span(0, name.len()),
            kind: TypeAnnKind::Named {
                name: Ident::new(span(0, name.len()), name.to_string()),
                args,
            },
        }
    }

    #[test]
    fn primitives_map_to_target_types() {
        let symbols = SymbolTable::default();
        let mapper = TypeMapper::new(&symbols);
        let v = TypePosition::Value;
        assert_eq!(mapper.map(&named("number", vec![]), v).unwrap(), TargetType::NUMBER);
        assert_eq!(mapper.map(&named("string", vec![]), v).unwrap(), TargetType::TEXT);
        assert_eq!(mapper.map(&named("any", vec![]), v).unwrap(), TargetType::Dynamic);
        assert_eq!(
            mapper.map(&named("Array", vec![named("boolean", vec![])]), v).unwrap(),
            TargetType::sequence(TargetType::BOOLEAN)
        );
    }

    #[test]
    fn promise_collapses_only_in_async_return_position() {
        let symbols = SymbolTable::default();
        let mapper = TypeMapper::new(&symbols);
        let promise = named("Promise", vec![named("number", vec![])]);
        assert_eq!(
            mapper.map_return(Some(&promise), true).unwrap(),
            TargetType::AsyncResult(Box::new(TargetType::NUMBER))
        );
        let err = mapper.map(&promise, TypePosition::Value).unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn unresolved_name_is_unknown_type() {
        let symbols = SymbolTable::default();
        let mapper = TypeMapper::new(&symbols);
        let err = mapper.map(&named("Widget", vec![]), TypePosition::Value).unwrap_err();
        assert!(matches!(err, TranslateError::UnknownType { ref name, .. } if name == "Widget"));
    }

    #[test]
    fn optional_does_not_nest() {
        let t = TargetType::optional(TargetType::optional(TargetType::TEXT));
        assert_eq!(t, TargetType::Optional(Box::new(TargetType::TEXT)));
        assert_eq!(t.to_string(), "Option<String>");
    }
}
