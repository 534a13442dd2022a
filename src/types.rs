//! Type system for penguin.
//!
//! A closed, flat type universe — no user-defined types, no generics
//! beyond the single built-in `List<T>` constructor. `Error` is an
//! internal sentinel used to suppress cascading diagnostics once a
//! subtree has already failed to type-check; `Unit` is the type of
//! statement positions and void procedure calls.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Sprite,
    Tileset,
    Tilemap,
    List(Box<Type>),
    Procedure { params: Vec<Type>, ret: Box<Option<Type>> },
    Unit,
    Error,
    /// A bare string literal's type. String is not a value type a
    /// variable can hold; the only legal use of a string literal is as
    /// an asset initializer, which the semantic analyzer matches on the
    /// AST node directly rather than through this type. Conforms to
    /// nothing, so any other use falls through to `type-mismatch`.
    StrLiteral,
}

impl Type {
    pub fn is_asset(&self) -> bool {
        matches!(self, Type::Sprite | Type::Tileset | Type::Tilemap)
    }

    /// `true` for any type an arithmetic/bitwise/relational/logical
    /// operator accepts — in this language, only `Int`.
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int)
    }

    /// Structural conformance: two types "conform" for assignment and
    /// initializer checks when they are equal, or when either side is
    /// the `Error` sentinel (already-diagnosed, don't cascade).
    pub fn conforms(&self, expected: &Type) -> bool {
        if *self == Type::Error || *expected == Type::Error {
            return true;
        }
        self == expected
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Sprite => write!(f, "sprite"),
            Type::Tileset => write!(f, "tileset"),
            Type::Tilemap => write!(f, "tilemap"),
            Type::List(elem) => write!(f, "list<{}>", elem),
            Type::Procedure { params, ret } => {
                write!(f, "procedure(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")?;
                if let Some(ret) = ret.as_ref() {
                    write!(f, " -> {}", ret)?;
                }
                Ok(())
            }
            Type::Unit => write!(f, "unit"),
            Type::Error => write!(f, "<error>"),
            Type::StrLiteral => write!(f, "string"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_conforms_to_anything() {
        assert!(Type::Error.conforms(&Type::Int));
        assert!(Type::Sprite.conforms(&Type::Error));
    }

    #[test]
    fn distinct_concrete_types_do_not_conform() {
        assert!(!Type::Int.conforms(&Type::Sprite));
    }

    #[test]
    fn display_matches_source_syntax_for_base_types() {
        assert_eq!(Type::Int.to_string(), "int");
        assert_eq!(Type::Tilemap.to_string(), "tilemap");
    }
}
