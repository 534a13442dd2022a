//! Semantic analyzer: two passes over the AST (spec.md §4.3).
//!
//! Pass 1 (collection) registers every top-level procedure declaration
//! and global initialization into the root scope so forward references
//! resolve. Pass 2 (check) walks the tree maintaining a scope stack,
//! type-checking every expression and allocating WRAM storage for every
//! variable/list/parameter it declares.
//!
//! Every failed subtree is typed [`Type::Error`] so downstream checks on
//! the same span don't cascade a second diagnostic for one mistake.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::ast::{BinOp, Expr, Literal, Param, Program, Statement, TypeName, UnOp};
use crate::builtins::{self, Builtin};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Span};
use crate::resolve::{self, AccessKind};
use crate::symbol::{ScopeId, ScopeTree, Storage, Symbol, SymbolKind, WramAllocator};
use crate::types::Type;

fn type_from_name(ty: TypeName) -> Type {
    match ty {
        TypeName::Int => Type::Int,
        TypeName::Sprite => Type::Sprite,
        TypeName::Tileset => Type::Tileset,
        TypeName::Tilemap => Type::Tilemap,
    }
}

/// One resolved procedure signature, kept alongside the scope tree so
/// lowering and codegen don't need to re-walk symbols to find arity.
#[derive(Debug, Clone)]
pub struct ProcSig {
    pub name: String,
    pub label: String,
    pub params: Vec<(String, Type)>,
    pub ret: Option<Type>,
    pub body: Vec<Statement>,
    pub span: Span,
    /// The scope the procedure's top-level body was checked in, so
    /// lowering resolves names through the same bindings (parameters,
    /// in particular) without re-deriving scope structure from the AST.
    pub scope: ScopeId,
}

/// A resolved asset binding: symbol name, on-disk path, and the label
/// used for its `INCBIN` directive.
#[derive(Debug, Clone)]
pub struct AssetBinding {
    pub label: String,
    pub ty: Type,
    pub path: String,
}

/// Output of semantic analysis: the scope tree (kept for lowering to
/// resolve names to storage) plus derived tables lowering/codegen need
/// without re-deriving them from the AST.
pub struct Analysis {
    pub scopes: ScopeTree,
    pub root: ScopeId,
    pub procedures: Vec<ProcSig>,
    pub assets: Vec<AssetBinding>,
    /// Top-level statements that are not `ProcDecl` — the implicit
    /// `__entry` procedure body (spec.md §9 "Main program statements").
    pub entry_body: Vec<Statement>,
    /// List element type and length, keyed by the list's storage address,
    /// so lowering can compute `stride` for indexed access.
    pub list_lengths: HashMap<u16, u32>,
    /// The child scope(s) created for an `If`/`Loop` statement's nested
    /// blocks, keyed by that statement's span start (unique per node).
    /// `(then_or_body_scope, else_scope)` — `else_scope` is `None` for
    /// `Loop` and for an `If` with no `else`.
    pub block_scopes: HashMap<u32, (ScopeId, Option<ScopeId>)>,
    /// The next free WRAM address after every variable/list/parameter
    /// has been allocated. Codegen continues the same monotonic cursor
    /// from here for virtual-register storage so neither pool overlaps
    /// the other (spec.md §3's "not overlapping any other symbol").
    pub next_free_wram: u16,
}

struct Analyzer<'a> {
    sink: &'a mut DiagnosticSink,
    scopes: ScopeTree,
    alloc: WramAllocator,
    asset_root: Option<&'a Path>,
    asset_counter: u32,
    assets: Vec<AssetBinding>,
    list_lengths: HashMap<u16, u32>,
    block_scopes: HashMap<u32, (ScopeId, Option<ScopeId>)>,
    /// Declared return type of the procedure currently being checked,
    /// `None` while walking the implicit entry program (which has no
    /// `return` target at all — any `Return` there is also an error).
    current_proc_return: Option<Option<Type>>,
    in_procedure: bool,
    /// `(scope, name)` pairs the check pass has itself declared. The
    /// collection pass already pre-populates the root scope with every
    /// top-level global/procedure so forward references resolve, which
    /// means `ScopeTree::declared_in_scope` can't tell "this name was
    /// pre-registered by collection" from "this name was genuinely
    /// declared twice" — so redeclaration checks in the check pass
    /// consult this set instead of the scope tree directly.
    checked_names: HashSet<(ScopeId, String)>,
}

pub fn analyze(program: &Program, sink: &mut DiagnosticSink, asset_root: Option<&Path>) -> Analysis {
    let mut analyzer = Analyzer {
        sink,
        scopes: ScopeTree::new(),
        alloc: WramAllocator::new(),
        asset_root,
        asset_counter: 0,
        assets: Vec::new(),
        list_lengths: HashMap::new(),
        block_scopes: HashMap::new(),
        current_proc_return: None,
        in_procedure: false,
        checked_names: HashSet::new(),
    };
    let root = ScopeTree::ROOT;

    let mut procedures = Vec::new();
    let mut assets = Vec::new();
    let mut entry_body = Vec::new();

    // -- collection pass: register every top-level proc + global so
    // forward references resolve regardless of source order.
    for stmt in &program.statements {
        analyzer.collect_top_level(stmt, root);
    }

    // -- check pass.
    for stmt in &program.statements {
        match stmt {
            Statement::ProcDecl { return_ty, name, params, body, span } => {
                let sig = analyzer.check_proc_decl(root, return_ty.as_ref(), name, params, body, *span);
                procedures.push(sig);
            }
            other => {
                analyzer.check_statement(other, root);
                entry_body.push(other.clone());
            }
        }
    }

    assets.extend(analyzer.assets.clone());

    Analysis {
        scopes: analyzer.scopes,
        root,
        procedures,
        assets,
        entry_body,
        list_lengths: analyzer.list_lengths,
        block_scopes: analyzer.block_scopes,
        next_free_wram: analyzer.alloc.next_free(),
    }
}

impl<'a> Analyzer<'a> {
    /// Allocates one WRAM word for a scalar symbol, pushing an ICE
    /// diagnostic and returning a dummy address if the `$C000-$DFFF`
    /// window is exhausted (spec.md §3's "not overlapping any other
    /// symbol" invariant can't be upheld past that point).
    fn alloc_word(&mut self, span: Span) -> u16 {
        self.alloc_words(1, span)
    }

    /// As [`Self::alloc_word`], but for a run of `count` consecutive
    /// words (list storage).
    fn alloc_words(&mut self, count: u32, span: Span) -> u16 {
        match self.alloc.allocate_words(count) {
            Ok(addr) => addr,
            Err(msg) => {
                self.sink.push(Diagnostic::ice(span, msg));
                0
            }
        }
    }

    /// Records that the check pass itself is declaring `name` in `scope`,
    /// returning `true` if this is a genuine second declaration (as
    /// opposed to the collection pass having pre-registered the symbol).
    fn check_pass_redeclares(&mut self, scope: ScopeId, name: &str) -> bool {
        !self.checked_names.insert((scope, name.to_string()))
    }

    /// Registers names in the root scope during the collection pass so
    /// later statements can reference procedures/globals declared after
    /// them in source order. Re-checking happens in the check pass;
    /// this pass only needs enough to let `lookup` succeed.
    fn collect_top_level(&mut self, stmt: &Statement, root: ScopeId) {
        match stmt {
            Statement::ProcDecl { return_ty, name, params, span, .. } => {
                if resolve::is_reserved(name) {
                    self.sink.push(Diagnostic::error(
                        DiagnosticKind::Redeclaration,
                        *span,
                        format!("`{name}` is a reserved builtin namespace and cannot be declared"),
                    ));
                    return;
                }
                let param_types: Vec<Type> = params.iter().map(|p| type_from_name(p.ty)).collect();
                let ret = return_ty.map(type_from_name);
                let ty = Type::Procedure { params: param_types, ret: Box::new(ret) };
                let label = format!("proc_{name}");
                let sym = Symbol { name: name.clone(), kind: SymbolKind::Procedure, ty, storage: Storage::Label(label) };
                if self.scopes.declared_in_scope(root, name) {
                    self.sink.push(Diagnostic::error(
                        DiagnosticKind::Redeclaration,
                        *span,
                        format!("`{name}` is already declared in this scope"),
                    ));
                } else {
                    self.scopes.declare_or_replace(root, sym);
                }
            }
            Statement::Initialization { ty, name, span, .. } | Statement::Declaration { ty, name, span } => {
                if resolve::is_reserved(name) {
                    self.sink.push(Diagnostic::error(
                        DiagnosticKind::Redeclaration,
                        *span,
                        format!("`{name}` is a reserved builtin namespace and cannot be declared"),
                    ));
                    return;
                }
                if self.scopes.declared_in_scope(root, name) {
                    return; // reported properly in the check pass
                }
                let declared = type_from_name(*ty);
                // Asset initializers get an asset symbol placeholder now;
                // the check pass fills in the real path once it evaluates
                // the initializer. Plain variables get WRAM storage here.
                let sym = if declared.is_asset() {
                    Symbol { name: name.clone(), kind: SymbolKind::Asset, ty: declared, storage: Storage::Asset { label: String::new(), path: String::new() } }
                } else {
                    let addr = self.alloc_word(*span);
                    Symbol { name: name.clone(), kind: SymbolKind::Variable, ty: declared, storage: Storage::Wram(addr) }
                };
                self.scopes.declare_or_replace(root, sym);
            }
            Statement::ListInit { name, span, .. } => {
                if resolve::is_reserved(name) {
                    self.sink.push(Diagnostic::error(
                        DiagnosticKind::Redeclaration,
                        *span,
                        format!("`{name}` is a reserved builtin namespace and cannot be declared"),
                    ));
                }
            }
            _ => {}
        }
    }

    fn push_child(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push_child(parent)
    }

    fn check_proc_decl(
        &mut self,
        root: ScopeId,
        return_ty: Option<&TypeName>,
        name: &str,
        params: &[Param],
        body: &[Statement],
        span: Span,
    ) -> ProcSig {
        let ret = return_ty.map(|t| type_from_name(*t));
        let scope = self.push_child(root);
        let mut param_syms = Vec::new();
        for p in params {
            let ty = type_from_name(p.ty);
            let addr = self.alloc_word(p.span);
            let sym = Symbol { name: p.name.clone(), kind: SymbolKind::Parameter, ty: ty.clone(), storage: Storage::Wram(addr) };
            if self.scopes.declared_in_scope(scope, &p.name) {
                self.sink.push(Diagnostic::error(DiagnosticKind::Redeclaration, p.span, format!("duplicate parameter `{}`", p.name)));
            } else {
                self.scopes.declare_or_replace(scope, sym);
            }
            param_syms.push((p.name.clone(), ty));
        }

        let prev_return = self.current_proc_return.replace(ret.clone());
        let prev_in_proc = self.in_procedure;
        self.in_procedure = true;
        for stmt in body {
            self.check_statement(stmt, scope);
        }
        self.in_procedure = prev_in_proc;
        self.current_proc_return = prev_return;

        ProcSig { name: name.to_string(), label: format!("proc_{name}"), params: param_syms, ret, body: body.to_vec(), span, scope }
    }

    fn check_statement(&mut self, stmt: &Statement, scope: ScopeId) {
        match stmt {
            Statement::Declaration { ty, name, span } => {
                self.declare_scalar(scope, *ty, name, *span);
            }
            Statement::Initialization { ty, name, expr, span } => {
                let declared = type_from_name(*ty);
                let expr_ty = self.check_expr(expr, scope);
                if declared.is_asset() {
                    self.bind_asset(scope, name, declared.clone(), expr, *span);
                } else {
                    self.declare_scalar(scope, *ty, name, *span);
                    if !expr_ty.conforms(&declared) {
                        self.sink.push(Diagnostic::error(
                            DiagnosticKind::TypeMismatch,
                            expr.span(),
                            format!("cannot initialize `{name}` of type `{declared}` with a value of type `{expr_ty}`"),
                        ));
                    }
                }
            }
            Statement::ListInit { name, elements, span } => {
                let mut elem_ty: Option<Type> = None;
                for e in elements {
                    let t = self.check_expr(e, scope);
                    if t != Type::Error {
                        match &elem_ty {
                            None => elem_ty = Some(t),
                            Some(prev) if *prev != t => {
                                self.sink.push(Diagnostic::error(
                                    DiagnosticKind::TypeMismatch,
                                    e.span(),
                                    format!("list element type `{t}` does not match earlier element type `{prev}`"),
                                ));
                            }
                            _ => {}
                        }
                    }
                }
                let elem = elem_ty.unwrap_or(Type::Int);
                let ty = Type::List(Box::new(elem));
                if resolve::is_reserved(name) {
                    return;
                }
                if self.check_pass_redeclares(scope, name) {
                    self.sink.push(Diagnostic::error(DiagnosticKind::Redeclaration, *span, format!("`{name}` is already declared in this scope")));
                    return;
                }
                let count = elements.len() as u32;
                let addr = self.alloc_words(count.max(1), *span);
                self.list_lengths.insert(addr, count);
                let sym = Symbol { name: name.clone(), kind: SymbolKind::List, ty, storage: Storage::Wram(addr) };
                self.scopes.declare_or_replace(scope, sym);
            }
            Statement::Assignment { lvalue, expr, span } => {
                let rhs_ty = self.check_expr(expr, scope);
                self.check_assignment_target(lvalue, &rhs_ty, scope, *span);
            }
            Statement::If { cond, then_block, else_block, span } => {
                self.require_int_condition(cond, scope);
                let then_scope = self.push_child(scope);
                for s in then_block {
                    self.check_statement(s, then_scope);
                }
                let else_scope = else_block.as_ref().map(|else_block| {
                    let else_scope = self.push_child(scope);
                    for s in else_block {
                        self.check_statement(s, else_scope);
                    }
                    else_scope
                });
                self.block_scopes.insert(span.start, (then_scope, else_scope));
            }
            Statement::Loop { cond, body, span } => {
                self.require_int_condition(cond, scope);
                let body_scope = self.push_child(scope);
                for s in body {
                    self.check_statement(s, body_scope);
                }
                self.block_scopes.insert(span.start, (body_scope, None));
            }
            Statement::ProcDecl { .. } => {
                self.sink.push(Diagnostic::error(
                    DiagnosticKind::ParseError,
                    stmt.span(),
                    "nested procedure declarations are not supported",
                ));
            }
            Statement::Return { expr, span } => {
                if !self.in_procedure {
                    self.sink.push(Diagnostic::error(DiagnosticKind::ReturnOutsideProcedure, *span, "`return` outside a procedure body"));
                    if let Some(e) = expr {
                        self.check_expr(e, scope);
                    }
                    return;
                }
                let declared_ret = self.current_proc_return.clone().flatten();
                match (expr, &declared_ret) {
                    (Some(e), Some(ret)) => {
                        let ty = self.check_expr(e, scope);
                        if !ty.conforms(ret) {
                            self.sink.push(Diagnostic::error(
                                DiagnosticKind::ReturnTypeMismatch,
                                e.span(),
                                format!("procedure returns `{ret}` but this `return` yields `{ty}`"),
                            ));
                        }
                    }
                    (Some(e), None) => {
                        self.check_expr(e, scope);
                        self.sink.push(Diagnostic::error(
                            DiagnosticKind::ReturnTypeMismatch,
                            e.span(),
                            "procedure has no declared return type but `return` yields a value",
                        ));
                    }
                    (None, Some(ret)) => {
                        self.sink.push(Diagnostic::error(
                            DiagnosticKind::ReturnTypeMismatch,
                            *span,
                            format!("procedure declares return type `{ret}` but this `return` yields no value"),
                        ));
                    }
                    (None, None) => {}
                }
            }
            Statement::ProcCallStmt { call, .. } => {
                self.check_expr(call, scope);
            }
        }
    }

    fn declare_scalar(&mut self, scope: ScopeId, ty: TypeName, name: &str, span: Span) {
        if resolve::is_reserved(name) {
            self.sink.push(Diagnostic::error(
                DiagnosticKind::Redeclaration,
                span,
                format!("`{name}` is a reserved builtin namespace and cannot be declared"),
            ));
            return;
        }
        if self.check_pass_redeclares(scope, name) {
            self.sink.push(Diagnostic::error(DiagnosticKind::Redeclaration, span, format!("`{name}` is already declared in this scope")));
            return;
        }
        let declared = type_from_name(ty);
        let addr = self.alloc_word(span);
        let sym = Symbol { name: name.to_string(), kind: SymbolKind::Variable, ty: declared, storage: Storage::Wram(addr) };
        self.scopes.declare_or_replace(scope, sym);
    }

    fn bind_asset(&mut self, scope: ScopeId, name: &str, ty: Type, expr: &Expr, span: Span) {
        let Expr::Literal { value: Literal::Str(path), .. } = expr else {
            self.sink.push(Diagnostic::error(
                DiagnosticKind::TypeMismatch,
                expr.span(),
                format!("`{name}` of type `{ty}` must be initialized from a string literal asset path"),
            ));
            return;
        };
        if resolve::is_reserved(name) {
            return;
        }
        if self.check_pass_redeclares(scope, name) {
            self.sink.push(Diagnostic::error(DiagnosticKind::Redeclaration, span, format!("`{name}` is already declared in this scope")));
            return;
        }
        if let Some(root) = self.asset_root {
            let full = root.join(path);
            if !full.exists() {
                self.sink.push(Diagnostic::error(
                    DiagnosticKind::AssetNotFound,
                    expr.span(),
                    format!("asset file not found: {}", full.display()),
                ));
            }
        }
        self.asset_counter += 1;
        let label = format!("asset_{name}_{}", self.asset_counter);
        let sym = Symbol { name: name.to_string(), kind: SymbolKind::Asset, ty: ty.clone(), storage: Storage::Asset { label: label.clone(), path: path.clone() } };
        self.scopes.declare_or_replace(scope, sym);
        self.assets.push(AssetBinding { label, ty, path: path.clone() });
    }

    fn require_int_condition(&mut self, cond: &Expr, scope: ScopeId) {
        let ty = self.check_expr(cond, scope);
        if ty != Type::Error && ty != Type::Int {
            self.sink.push(Diagnostic::error(
                DiagnosticKind::TypeMismatch,
                cond.span(),
                format!("condition must be `int`, found `{ty}`"),
            ));
        }
    }

    fn check_assignment_target(&mut self, lvalue: &Expr, rhs_ty: &Type, scope: ScopeId, span: Span) {
        if let Some(access) = resolve::classify(lvalue) {
            match access {
                AccessKind::Member(b) => {
                    if !b.is_assignable() {
                        self.sink.push(Diagnostic::error(DiagnosticKind::NotAssignable, span, "this builtin member is read-only"));
                        return;
                    }
                    if !rhs_ty.conforms(&b.ty()) {
                        self.sink.push(Diagnostic::error(
                            DiagnosticKind::TypeMismatch,
                            span,
                            format!("cannot assign `{rhs_ty}` to a member of type `{}`", b.ty()),
                        ));
                    }
                }
                AccessKind::OamField { slot, field } => {
                    let slot_ty = self.check_expr(slot, scope);
                    if slot_ty != Type::Error && slot_ty != Type::Int {
                        self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, slot.span(), "OAM slot index must be `int`"));
                    }
                    let field_ty = Builtin::DisplayOam(field).ty();
                    if !rhs_ty.conforms(&field_ty) {
                        self.sink.push(Diagnostic::error(
                            DiagnosticKind::TypeMismatch,
                            span,
                            format!("cannot assign `{rhs_ty}` to OAM field of type `{field_ty}`"),
                        ));
                    }
                }
                AccessKind::TilemapCell { x, y } => {
                    let xt = self.check_expr(x, scope);
                    let yt = self.check_expr(y, scope);
                    if xt != Type::Error && xt != Type::Int {
                        self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, x.span(), "tilemap x index must be `int`"));
                    }
                    if yt != Type::Error && yt != Type::Int {
                        self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, y.span(), "tilemap y index must be `int`"));
                    }
                    if !rhs_ty.conforms(&Type::Int) {
                        self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, span, format!("cannot assign `{rhs_ty}` to a tilemap cell (expects `int`)")));
                    }
                }
            }
            return;
        }

        match lvalue {
            Expr::Name { path, span: nspan } if path.len() == 1 => {
                let name = &path[0];
                if resolve::is_reserved(name) {
                    self.sink.push(Diagnostic::error(DiagnosticKind::NotAssignable, *nspan, format!("`{name}` is a reserved builtin namespace")));
                    return;
                }
                match self.scopes.lookup(scope, name) {
                    None => {
                        self.sink.push(Diagnostic::error(DiagnosticKind::UnknownName, *nspan, format!("undefined name `{name}`")));
                    }
                    Some(sym) => {
                        if matches!(sym.kind, SymbolKind::Procedure | SymbolKind::Asset | SymbolKind::Builtin) {
                            self.sink.push(Diagnostic::error(DiagnosticKind::NotAssignable, *nspan, format!("`{name}` is not assignable")));
                        } else if !rhs_ty.conforms(&sym.ty) {
                            self.sink.push(Diagnostic::error(
                                DiagnosticKind::TypeMismatch,
                                span,
                                format!("cannot assign `{rhs_ty}` to `{name}` of type `{}`", sym.ty),
                            ));
                        }
                    }
                }
            }
            Expr::ListAccess { name, indices, .. } => {
                let elem_ty = self.check_list_access(name, indices, scope, span);
                if !rhs_ty.conforms(&elem_ty) {
                    self.sink.push(Diagnostic::error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("cannot assign `{rhs_ty}` to list element of type `{elem_ty}`"),
                    ));
                }
            }
            other => {
                self.sink.push(Diagnostic::error(DiagnosticKind::NotAssignable, other.span(), "this expression is not assignable"));
            }
        }
    }

    fn check_list_access(&mut self, name: &str, indices: &[Expr], scope: ScopeId, span: Span) -> Type {
        for idx in indices {
            let t = self.check_expr(idx, scope);
            if t != Type::Error && t != Type::Int {
                self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, idx.span(), "list index must be `int`"));
            }
        }
        let Some(sym) = self.scopes.lookup(scope, name) else {
            self.sink.push(Diagnostic::error(DiagnosticKind::UnknownName, span, format!("undefined name `{name}`")));
            return Type::Error;
        };
        let mut cur = sym.ty.clone();
        for _ in indices {
            match cur {
                Type::List(elem) => cur = *elem,
                Type::Error => return Type::Error,
                other => {
                    self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, span, format!("`{name}` of type `{other}` is not indexable")));
                    return Type::Error;
                }
            }
        }
        cur
    }

    fn check_expr(&mut self, expr: &Expr, scope: ScopeId) -> Type {
        match expr {
            Expr::Literal { value, span } => self.check_literal(value, *span),
            Expr::Name { path, span } => self.check_name(path, *span, scope),
            Expr::ListAccess { name, indices, span } => self.check_list_access(name, indices, scope, *span),
            Expr::AttrAccess { .. } => self.check_attr_access(expr, scope),
            Expr::ProcCall { name, args, span } => self.check_proc_call(name, args, *span, scope),
            Expr::Unary { op, expr: inner, span } => self.check_unary(*op, inner, *span, scope),
            Expr::Binary { op, lhs, rhs, span } => self.check_binary(*op, lhs, rhs, *span, scope),
            Expr::Paren { expr, .. } => self.check_expr(expr, scope),
        }
    }

    fn check_literal(&mut self, value: &Literal, span: Span) -> Type {
        match value {
            Literal::Decimal(v) | Literal::Hex(v) | Literal::Binary(v) => {
                if *v > 0xFFFF {
                    self.sink.push(Diagnostic::error(
                        DiagnosticKind::TypeMismatch,
                        span,
                        format!("integer literal {v} is out of range for `int` (0..=65535)"),
                    ));
                    Type::Error
                } else {
                    Type::Int
                }
            }
            Literal::Str(_) => Type::StrLiteral,
        }
    }

    fn check_name(&mut self, path: &[String], span: Span, scope: ScopeId) -> Type {
        if path.len() != 1 {
            // Dotted, non-builtin paths never occur from the parser except
            // through AttrAccess; defensive fallback.
            return Type::Error;
        }
        let name = &path[0];
        if resolve::is_reserved(name) {
            self.sink.push(Diagnostic::error(DiagnosticKind::NotAssignable, span, format!("`{name}` cannot be used as a value by itself")));
            return Type::Error;
        }
        match self.scopes.lookup(scope, name) {
            Some(sym) => sym.ty.clone(),
            None => {
                self.sink.push(Diagnostic::error(DiagnosticKind::UnknownName, span, format!("undefined name `{name}`")));
                Type::Error
            }
        }
    }

    fn check_attr_access(&mut self, expr: &Expr, scope: ScopeId) -> Type {
        let span = expr.span();
        match resolve::classify(expr) {
            Some(AccessKind::Member(b)) => b.ty(),
            Some(AccessKind::OamField { slot, field }) => {
                let t = self.check_expr(slot, scope);
                if t != Type::Error && t != Type::Int {
                    self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, slot.span(), "OAM slot index must be `int`"));
                }
                Builtin::DisplayOam(field).ty()
            }
            Some(AccessKind::TilemapCell { x, y }) => {
                let xt = self.check_expr(x, scope);
                let yt = self.check_expr(y, scope);
                if xt != Type::Error && xt != Type::Int {
                    self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, x.span(), "tilemap x index must be `int`"));
                }
                if yt != Type::Error && yt != Type::Int {
                    self.sink.push(Diagnostic::error(DiagnosticKind::TypeMismatch, y.span(), "tilemap y index must be `int`"));
                }
                Type::Int
            }
            None => {
                self.sink.push(Diagnostic::error(DiagnosticKind::UnknownName, span, "unrecognized attribute access"));
                Type::Error
            }
        }
    }

    fn check_proc_call(&mut self, name: &str, args: &[Expr], span: Span, scope: ScopeId) -> Type {
        // A dotted call like `control.LCDon()` is parsed as a ProcCall
        // whose name joins the path with `.`; resolve those against the
        // builtin table before falling back to user procedures.
        if let Some((root_name, member)) = name.split_once('.') {
            if let Some(root) = builtins::BuiltinRoot::from_name(root_name) {
                return match builtins::resolve_member(root, member) {
                    Some(b) => {
                        if !args.is_empty() {
                            self.sink.push(Diagnostic::error(
                                DiagnosticKind::ArityMismatch,
                                span,
                                format!("`{name}` takes no arguments, found {}", args.len()),
                            ));
                        }
                        b.ty()
                    }
                    None => {
                        self.sink.push(Diagnostic::error(DiagnosticKind::UnknownName, span, format!("unknown builtin member `{name}`")));
                        Type::Error
                    }
                };
            }
        }

        let Some(sym) = self.scopes.lookup(scope, name) else {
            self.sink.push(Diagnostic::error(DiagnosticKind::UnknownName, span, format!("undefined procedure `{name}`")));
            for a in args {
                self.check_expr(a, scope);
            }
            return Type::Error;
        };
        let Type::Procedure { params, ret } = sym.ty.clone() else {
            self.sink.push(Diagnostic::error(DiagnosticKind::NotAssignable, span, format!("`{name}` is not callable")));
            for a in args {
                self.check_expr(a, scope);
            }
            return Type::Error;
        };
        if params.len() != args.len() {
            self.sink.push(Diagnostic::error(
                DiagnosticKind::ArityMismatch,
                span,
                format!("`{name}` expects {} argument(s), found {}", params.len(), args.len()),
            ));
        }
        for (i, a) in args.iter().enumerate() {
            let at = self.check_expr(a, scope);
            if let Some(expected) = params.get(i) {
                if !at.conforms(expected) {
                    self.sink.push(Diagnostic::error(
                        DiagnosticKind::TypeMismatch,
                        a.span(),
                        format!("argument {} to `{name}` expects `{expected}`, found `{at}`", i + 1),
                    ));
                }
            }
        }
        ret.as_ref().clone().unwrap_or(Type::Unit)
    }

    fn check_unary(&mut self, op: UnOp, inner: &Expr, span: Span, scope: ScopeId) -> Type {
        let t = self.check_expr(inner, scope);
        if t == Type::Error {
            return Type::Error;
        }
        if !t.is_int() {
            self.sink.push(Diagnostic::error(
                DiagnosticKind::TypeMismatch,
                span,
                format!("unary `{}` requires `int`, found `{t}`", unop_str(op)),
            ));
            return Type::Error;
        }
        Type::Int
    }

    fn check_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span, scope: ScopeId) -> Type {
        let lt = self.check_expr(lhs, scope);
        let rt = self.check_expr(rhs, scope);
        if lt == Type::Error || rt == Type::Error {
            return Type::Error;
        }
        if !lt.is_int() || !rt.is_int() {
            self.sink.push(Diagnostic::error(
                DiagnosticKind::TypeMismatch,
                span,
                format!("`{}` requires `int` operands, found `{lt}` and `{rt}`", binop_str(op)),
            ));
            return Type::Error;
        }
        Type::Int
    }
}

fn unop_str(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "-",
        UnOp::BitNot => "~",
        UnOp::Not => "not",
        UnOp::Plus => "+",
    }
}

fn binop_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::BitAnd => "&",
        BinOp::BitXor => "^",
        BinOp::BitOr => "|",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn analyze_src(src: &str) -> (Analysis, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let tokens = tokenize(src, &mut sink);
        let program = parse(tokens, &mut sink);
        let analysis = analyze(&program, &mut sink, None);
        (analysis, sink)
    }

    #[test]
    fn redeclaration_in_same_scope_is_rejected() {
        let (_, sink) = analyze_src("int a = 1; int a = 2;");
        assert!(sink.iter().any(|d| d.kind == DiagnosticKind::Redeclaration));
    }

    #[test]
    fn redeclaration_in_inner_scope_shadows() {
        let (_, sink) = analyze_src("int a = 1; loop (1) { int a = 2; }");
        assert!(!sink.has_errors(), "{:?}", sink.iter().collect::<Vec<_>>());
    }

    #[test]
    fn unknown_name_on_assignment_is_reported() {
        let (_, sink) = analyze_src("x = 1;");
        assert!(sink.iter().any(|d| d.kind == DiagnosticKind::UnknownName));
    }

    #[test]
    fn string_initializer_for_int_is_type_mismatch() {
        let (_, sink) = analyze_src(r#"int x = "hello";"#);
        assert!(sink.iter().any(|d| d.kind == DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let (_, sink) = analyze_src("procedure foo(int a) { return a; } foo();");
        assert!(sink.iter().any(|d| d.kind == DiagnosticKind::ArityMismatch));
    }

    #[test]
    fn reserved_root_cannot_be_declared() {
        let (_, sink) = analyze_src("int display = 1;");
        assert!(sink.iter().any(|d| d.kind == DiagnosticKind::Redeclaration));
    }

    #[test]
    fn forward_reference_to_a_later_procedure_resolves() {
        let (_, sink) = analyze_src("int r = sq(4); procedure int sq(int x) { return x * x; }");
        assert!(!sink.has_errors(), "{:?}", sink.iter().collect::<Vec<_>>());
    }

    #[test]
    fn literal_out_of_range_is_type_mismatch() {
        let (_, sink) = analyze_src("int x = 65536;");
        assert!(sink.iter().any(|d| d.kind == DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn loop_one_is_accepted_as_infinite_loop_idiom() {
        let (_, sink) = analyze_src("loop (1) { int x = 1; }");
        assert!(!sink.has_errors());
    }

    #[test]
    fn oam_x_without_prior_tile_assignment_still_type_checks() {
        let (_, sink) = analyze_src("display.oam[0].x = 16;");
        assert!(!sink.has_errors(), "{:?}", sink.iter().collect::<Vec<_>>());
    }

    #[test]
    fn return_outside_procedure_is_rejected() {
        let (_, sink) = analyze_src("return 1;");
        assert!(sink.iter().any(|d| d.kind == DiagnosticKind::ReturnOutsideProcedure));
    }

    #[test]
    fn void_procedure_with_value_return_is_rejected() {
        let (_, sink) = analyze_src("procedure foo() { return 1; }");
        assert!(sink.iter().any(|d| d.kind == DiagnosticKind::ReturnTypeMismatch));
    }
}
