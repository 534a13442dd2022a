//! Classification of builtin-namespace accesses (`display.*`, `input.*`,
//! `control.*`), shared by the semantic analyzer (for type checking) and
//! by IR lowering (for address/emission decisions), so the two phases
//! never drift on what counts as a valid builtin access.

use crate::ast::Expr;
use crate::builtins::{self, Builtin, BuiltinRoot, OamField};

/// The classified shape of one builtin-namespace expression.
pub enum AccessKind<'a> {
    /// A plain `root.member` access with no index: `input.Right`,
    /// `display.tileset0`, `display.tilemap0` (whole-asset form). Dotted
    /// builtin *calls* like `control.waitVBlank()` parse as `Expr::ProcCall`
    /// rather than `Expr::AttrAccess` and are resolved directly by
    /// `sema::check_proc_call` / `ir::lower_proc_call` instead of through
    /// this classifier.
    Member(Builtin),
    /// `display.oam[slot].field`.
    OamField { slot: &'a Expr, field: OamField },
    /// `display.tilemap0[x][y]`.
    TilemapCell { x: &'a Expr, y: &'a Expr },
}

/// Classifies `expr` as a builtin-namespace access, or returns `None` if
/// it isn't one (a plain user variable/list/call).
pub fn classify(expr: &Expr) -> Option<AccessKind<'_>> {
    match expr {
        // display.oam[slot].field — checked before the plain-member arm
        // below, since both match an `AttrAccess` with empty `indices`
        // and this one's `base` is itself an `AttrAccess`, not a `Name`.
        Expr::AttrAccess { base, attr, indices, .. } if indices.is_empty() => {
            let Expr::AttrAccess { base: inner_base, attr: inner_attr, indices: inner_indices, .. } = base.as_ref() else {
                return classify_plain_member(base, attr);
            };
            if inner_attr != "oam" || inner_indices.len() != 1 {
                return None;
            }
            let Expr::Name { path, .. } = inner_base.as_ref() else { return None };
            if path.len() != 1 || BuiltinRoot::from_name(&path[0]) != Some(BuiltinRoot::Display) {
                return None;
            }
            let field = builtins::resolve_oam_member(attr)?;
            Some(AccessKind::OamField { slot: &inner_indices[0], field })
        }
        // display.tilemap0[x][y]
        Expr::AttrAccess { base, attr, indices, .. } if indices.len() == 2 && attr == "tilemap0" => {
            let Expr::Name { path, .. } = base.as_ref() else { return None };
            if path.len() != 1 || BuiltinRoot::from_name(&path[0]) != Some(BuiltinRoot::Display) {
                return None;
            }
            Some(AccessKind::TilemapCell { x: &indices[0], y: &indices[1] })
        }
        _ => None,
    }
}

// display.tileset0 / display.tilemap0 / input.X / control.X()
fn classify_plain_member<'a>(base: &'a Expr, attr: &str) -> Option<AccessKind<'a>> {
    let Expr::Name { path, .. } = base else { return None };
    if path.len() != 1 {
        return None;
    }
    let root = BuiltinRoot::from_name(&path[0])?;
    builtins::resolve_member(root, attr).map(AccessKind::Member)
}

/// `true` if `name` is one of the three reserved namespace roots, used to
/// reject any attempt to declare, assign, or bare-reference them as
/// ordinary values (spec.md §9: "Hardware attribute namespace").
pub fn is_reserved(name: &str) -> bool {
    builtins::is_reserved_root(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::ast::Statement;

    fn parse_expr_stmt(src: &str) -> Expr {
        let mut sink = DiagnosticSink::new();
        let tokens = tokenize(src, &mut sink);
        let program = parse(tokens, &mut sink);
        assert!(!sink.has_errors(), "{:?}", sink.into_vec());
        match program.statements.into_iter().next().unwrap() {
            Statement::Assignment { lvalue, .. } => lvalue,
            Statement::ProcCallStmt { call, .. } => call,
            other => panic!("expected an expression-bearing statement, got {other:?}"),
        }
    }

    #[test]
    fn classifies_plain_member_access() {
        let expr = parse_expr_stmt("display.tileset0 = 0;");
        assert!(matches!(classify(&expr), Some(AccessKind::Member(Builtin::DisplayTileset0))));
    }

    #[test]
    fn classifies_oam_field_access() {
        let expr = parse_expr_stmt("display.oam[0].x = 1;");
        assert!(matches!(classify(&expr), Some(AccessKind::OamField { field: OamField::X, .. })));
    }

    #[test]
    fn classifies_tilemap_cell_access() {
        let expr = parse_expr_stmt("display.tilemap0[1][2] = 3;");
        assert!(matches!(classify(&expr), Some(AccessKind::TilemapCell { .. })));
    }

    #[test]
    fn plain_variable_is_not_a_builtin_access() {
        let expr = parse_expr_stmt("x = 1;");
        assert!(classify(&expr).is_none());
    }
}
