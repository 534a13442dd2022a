//! End-to-end scenarios from spec.md §8, exercised two ways: against the
//! public `compile_str` entry point (assembly-text shape assertions) and
//! against the lowered IR directly, run through a tiny in-test
//! interpreter so the arithmetic/control-flow *results* spec.md §8
//! describes ("after execution, `[b] = 8`") are checked without needing
//! the external RGBDS toolchain this compiler targets but never invokes
//! itself.

use std::collections::HashMap;

use penguinc::config::CompilerConfig;
use penguinc::diagnostics::DiagnosticSink;
use penguinc::driver::compile_str;
use penguinc::ir::{self, Inst, IrBinOp, IrProgram, IrUnOp, Operand, Procedure, VReg};
use penguinc::lexer::tokenize;
use penguinc::parser::parse;
use penguinc::sema::{self, Analysis};

/// A memory-only interpreter for the IR: WRAM cells plus a per-frame
/// table of virtual-register values. Good enough to check the handful
/// of arithmetic/control-flow scenarios spec.md §8 spells out literally;
/// it is not a byte-accurate SM83 emulator and never needs to be, since
/// actual ROM execution is out of scope (spec.md §1).
struct Interp<'a> {
    ir: &'a IrProgram,
    wram: HashMap<u16, u16>,
}

impl<'a> Interp<'a> {
    fn new(ir: &'a IrProgram) -> Self {
        Interp { ir, wram: HashMap::new() }
    }

    fn read(&self, addr: u16) -> u16 {
        *self.wram.get(&addr).unwrap_or(&0)
    }

    fn run_entry(&mut self) {
        let entry = self.ir.procedures.iter().find(|p| p.name == "__entry").expect("no __entry procedure");
        self.run_procedure(entry, &[]);
    }

    fn run_procedure(&mut self, proc: &Procedure, args: &[u16]) -> Option<u16> {
        for (addr, value) in proc.param_addrs.iter().zip(args.iter()) {
            self.wram.insert(*addr, *value);
        }

        let labels: HashMap<&str, usize> = proc
            .body
            .iter()
            .enumerate()
            .filter_map(|(i, inst)| match inst {
                Inst::Label { name } => Some((name.as_str(), i)),
                _ => None,
            })
            .collect();

        let mut vregs: HashMap<VReg, u16> = HashMap::new();
        let mut pc = 0usize;
        while pc < proc.body.len() {
            match &proc.body[pc] {
                Inst::Const { dst, imm } => {
                    vregs.insert(*dst, *imm);
                }
                Inst::Load { dst, addr } => {
                    vregs.insert(*dst, self.read(*addr));
                }
                Inst::Store { addr, src } => {
                    let v = self.eval(*src, &vregs);
                    self.wram.insert(*addr, v);
                }
                Inst::Move { dst, src } => {
                    let v = self.eval(*src, &vregs);
                    vregs.insert(*dst, v);
                }
                Inst::BinOp { dst, op, lhs, rhs } => {
                    let l = self.eval(*lhs, &vregs);
                    let r = self.eval(*rhs, &vregs);
                    vregs.insert(*dst, eval_binop(*op, l, r));
                }
                Inst::UnOp { dst, op, src } => {
                    let v = self.eval(*src, &vregs);
                    vregs.insert(*dst, eval_unop(*op, v));
                }
                Inst::LoadIndirect { dst, base, index, stride } => {
                    let idx = self.eval(*index, &vregs);
                    let addr = base.wrapping_add(idx.wrapping_mul(*stride));
                    vregs.insert(*dst, self.read(addr));
                }
                Inst::StoreIndirect { base, index, stride, src } => {
                    let idx = self.eval(*index, &vregs);
                    let addr = base.wrapping_add(idx.wrapping_mul(*stride));
                    let v = self.eval(*src, &vregs);
                    self.wram.insert(addr, v);
                }
                Inst::Call { dst, target, args } => {
                    let arg_vals: Vec<u16> = args.iter().map(|a| self.eval(*a, &vregs)).collect();
                    let result = self.call(target, &arg_vals);
                    if let Some(d) = dst {
                        vregs.insert(*d, result.unwrap_or(0));
                    }
                }
                Inst::Return { src } => {
                    return src.map(|op| self.eval(op, &vregs));
                }
                Inst::BranchIfZero { cond, false_label } => {
                    let v = self.eval(*cond, &vregs);
                    if v == 0 {
                        pc = labels[false_label.as_str()];
                        continue;
                    }
                }
                Inst::Jump { label } => {
                    pc = labels[label.as_str()];
                    continue;
                }
                Inst::Label { .. } => {}
            }
            pc += 1;
        }
        None
    }

    fn call(&mut self, target: &str, args: &[u16]) -> Option<u16> {
        if target == "__mul_u16" {
            return Some(args[0].wrapping_mul(args[1]));
        }
        if let Some(name) = target.strip_prefix("proc_") {
            let callee = self.ir.procedures.iter().find(|p| p.name == name)?.clone();
            return self.run_procedure(&callee, args);
        }
        // Hardware builtins (LCDon/LCDoff/waitVBlank/PenguinUpdateInput)
        // have no WRAM-observable effect this interpreter models.
        None
    }

    fn eval(&self, op: Operand, vregs: &HashMap<VReg, u16>) -> u16 {
        match op {
            Operand::Imm(v) => v,
            Operand::Reg(r) => *vregs.get(&r).unwrap_or(&0),
        }
    }
}

fn eval_binop(op: IrBinOp, l: u16, r: u16) -> u16 {
    match op {
        IrBinOp::Add => l.wrapping_add(r),
        IrBinOp::Sub => l.wrapping_sub(r),
        IrBinOp::Shl => l.wrapping_shl(r as u32 & 0xf),
        IrBinOp::Shr => l.wrapping_shr(r as u32 & 0xf),
        IrBinOp::Lt => u16::from(l < r),
        IrBinOp::Gt => u16::from(l > r),
        IrBinOp::Le => u16::from(l <= r),
        IrBinOp::Ge => u16::from(l >= r),
        IrBinOp::Eq => u16::from(l == r),
        IrBinOp::Ne => u16::from(l != r),
        IrBinOp::BitAnd => l & r,
        IrBinOp::BitXor => l ^ r,
        IrBinOp::BitOr => l | r,
    }
}

fn eval_unop(op: IrUnOp, v: u16) -> u16 {
    match op {
        IrUnOp::Neg => v.wrapping_neg(),
        IrUnOp::BitNot => !v,
        IrUnOp::Normalize => u16::from(v != 0),
        IrUnOp::LogicalNot => u16::from(v == 0),
    }
}

fn lower(src: &str) -> (IrProgram, Analysis) {
    let mut sink = DiagnosticSink::new();
    let tokens = tokenize(src, &mut sink);
    let program = parse(tokens, &mut sink);
    let analysis = sema::analyze(&program, &mut sink, None);
    assert!(!sink.has_errors(), "{:?}", sink.iter().collect::<Vec<_>>());
    let irp = ir::lower(&analysis, &mut sink);
    assert!(!sink.has_errors(), "{:?}", sink.iter().collect::<Vec<_>>());
    (irp, analysis)
}

fn wram_addr(analysis: &Analysis, name: &str) -> u16 {
    match analysis.scopes.lookup(analysis.root, name).unwrap().storage {
        penguinc::symbol::Storage::Wram(addr) => addr,
        ref other => panic!("{name} is not WRAM-resident: {other:?}"),
    }
}

/// Scenario 1: `int a = 5; int b = a + 3;` → `[b] = 8`.
#[test]
fn scenario_1_addition_between_two_variables() {
    let (irp, analysis) = lower("int a = 5; int b = a + 3;");
    let mut interp = Interp::new(&irp);
    interp.run_entry();
    assert_eq!(interp.read(wram_addr(&analysis, "a")), 5);
    assert_eq!(interp.read(wram_addr(&analysis, "b")), 8);
}

/// Scenario 2: `int n = 0; loop (n < 4) { n = n + 1; }` → `[n] = 4`,
/// with exactly one back-edge jump emitted for the loop head.
#[test]
fn scenario_2_loop_counts_up_to_four() {
    let (irp, analysis) = lower("int n = 0; loop (n < 4) { n = n + 1; }");
    let mut interp = Interp::new(&irp);
    interp.run_entry();
    assert_eq!(interp.read(wram_addr(&analysis, "n")), 4);

    let entry = irp.procedures.iter().find(|p| p.name == "__entry").unwrap();
    let jumps = entry.body.iter().filter(|i| matches!(i, Inst::Jump { .. })).count();
    assert_eq!(jumps, 1, "expected exactly one back-edge jump");
}

/// Scenario 3: `procedure int sq(int x) { return x * x; } int r = sq(7);`
/// → `[r] = 49`, via the `__mul_u16` helper (no native multiply
/// instruction on SM83).
#[test]
fn scenario_3_procedure_call_through_mul_u16() {
    let (irp, analysis) = lower("procedure int sq(int x) { return x * x; } int r = sq(7);");
    let mut interp = Interp::new(&irp);
    interp.run_entry();
    assert_eq!(interp.read(wram_addr(&analysis, "r")), 49);

    let sq = irp.procedures.iter().find(|p| p.name == "sq").unwrap();
    assert!(sq.body.iter().any(|i| matches!(i, Inst::Call { target, .. } if target == "__mul_u16")));
}

/// Boundary: `loop(0){...}` never executes its body at all.
#[test]
fn loop_zero_skips_body_entirely() {
    let (irp, analysis) = lower("int n = 0; loop (0) { n = n + 1; }");
    let mut interp = Interp::new(&irp);
    interp.run_entry();
    assert_eq!(interp.read(wram_addr(&analysis, "n")), 0);
}

/// Boundary: `loop(1){...}` with a `break`-free body is an infinite loop
/// at the source level; we can't run it to completion, so we only assert
/// the IR shape spec.md §8 describes ("optimization permitted but not
/// required") rather than executing it.
#[test]
fn loop_one_is_unconditional_in_shape_but_legal_to_lower_with_a_test() {
    let (irp, _analysis) = lower("int n = 0; loop (1) { n = 1; }");
    let entry = irp.procedures.iter().find(|p| p.name == "__entry").unwrap();
    assert!(entry.body.iter().any(|i| matches!(i, Inst::Jump { .. })));
    assert!(entry.body.iter().any(|i| matches!(i, Inst::BranchIfZero { .. })));
}

/// Scenario 4 is covered structurally at the target/codegen level
/// (`target::tests::oam_field_offsets_match_the_fixed_layout`,
/// `codegen::tests::push_and_pop_helpers_are_shipped_as_a_balanced_pair`).
/// Here we only check the public driver accepts the program end to end.
#[test]
fn scenario_4_oam_x_write_without_a_prior_tile_assignment_compiles() {
    let outcome = compile_str("display.oam[0].x = 16;", &CompilerConfig::default()).unwrap();
    assert!(outcome.assembly.contains("ld a, $10"));
}

/// Scenario 5: `int x = "hello";` is rejected with `type-mismatch`.
#[test]
fn scenario_5_string_literal_cannot_initialize_an_int() {
    let err = compile_str(r#"int x = "hello";"#, &CompilerConfig::default()).unwrap_err();
    let diags = match err {
        penguinc::DriverError::Diagnostics(d) => d,
        other => panic!("expected Diagnostics, got {other:?}"),
    };
    assert!(diags.iter().any(|d| d.kind.as_str() == "type-mismatch"));
}

/// Scenario 6: calling a one-parameter procedure with zero arguments is
/// an arity mismatch.
#[test]
fn scenario_6_call_with_wrong_arity_is_rejected() {
    let err = compile_str("procedure foo(int a) { return a; } foo();", &CompilerConfig::default())
        .unwrap_err();
    let diags = match err {
        penguinc::DriverError::Diagnostics(d) => d,
        other => panic!("expected Diagnostics, got {other:?}"),
    };
    assert!(diags.iter().any(|d| d.kind.as_str() == "arity-mismatch"));
}

/// A program with no top-level executable statements (only procedure
/// declarations) is legal: the implicit `__entry` body is empty and the
/// startup stub still halts cleanly (spec.md §9 "Main program
/// statements"). A *fully* empty source, by contrast, is a parse error
/// (spec.md §8), covered by `parser::tests::empty_program_is_a_parse_error`.
#[test]
fn no_top_level_statements_compiles_to_a_halting_stub() {
    let outcome = compile_str("procedure int f() { return 1; }", &CompilerConfig::default()).unwrap();
    assert!(outcome.assembly.contains("call __entry"));
}

/// Redeclaring a global in a nested scope shadows rather than conflicts.
#[test]
fn shadowing_a_global_in_a_nested_scope_is_legal() {
    let outcome = compile_str(
        "int a = 1; procedure int f() { int a = 2; return a; }",
        &CompilerConfig::default(),
    );
    assert!(outcome.is_ok());
}

/// Redeclaring a name in the *same* scope is a hard error.
#[test]
fn redeclaration_in_the_same_scope_is_rejected() {
    let err = compile_str("int a = 1; int a = 2;", &CompilerConfig::default()).unwrap_err();
    let diags = match err {
        penguinc::DriverError::Diagnostics(d) => d,
        other => panic!("expected Diagnostics, got {other:?}"),
    };
    assert!(diags.iter().any(|d| d.kind.as_str() == "redeclaration"));
}
