//! Code generator: lowers [`crate::ir::IrProgram`] into RGBDS-dialect
//! SM83 assembly text (spec.md §4.5).
//!
//! Layout: a fixed `Header` section, a `Start` startup stub, a block of
//! hand-written runtime helpers, one `SECTION ... ROM0` per compiled
//! procedure, and a final `Assets` section of `INCBIN` directives.
//!
//! Virtual registers share the WRAM allocation scheme user variables
//! use: one word-aligned cell per register, starting at
//! [`crate::sema::Analysis::next_free_wram`]. Every procedure's
//! registers reuse the *same* base address rather than getting their
//! own disjoint range — safe only because this compiler's calling
//! convention never lets a caller's live temporaries survive across a
//! `call` (every value is reloaded from its fixed WRAM cell on demand),
//! which also means this generator does not support recursion.

use std::fmt::Write as _;

use crate::ir::{Inst, IrBinOp, IrProgram, IrUnOp, Operand, Procedure, VReg};
use crate::sema::Analysis;
use crate::target::{self, JoypadButton};
use crate::types::Type;

#[derive(Debug)]
pub enum CodeGenError {
    /// A logical error in code generation (e.g. a call site whose
    /// argument count doesn't match the callee, or a program that
    /// overflows the WRAM window) — these indicate an inconsistency
    /// between the IR and what codegen assumes about it, not a source
    /// program error (semantic analysis already rejected those).
    Logic(String),
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Format(e) => write!(f, "assembly emission error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

/// One half of a 16-bit value's byte pair, already resolved to either a
/// WRAM address or a compile-time-constant byte — so every instruction
/// that needs an operand's low/high byte just asks for one without
/// caring whether it came from a register or an immediate.
#[derive(Debug, Clone, Copy)]
enum ByteRef {
    Mem(u16),
    Imm(u8),
}

fn hex8(v: u8) -> String {
    format!("${:02x}", v)
}

fn hex16(v: u16) -> String {
    format!("${:04x}", v)
}

pub struct CodeGen<'a> {
    ir: &'a IrProgram,
    analysis: &'a Analysis,
    out: String,
    vreg_base: u16,
    label_counter: u32,
}

pub fn generate(ir: &IrProgram, analysis: &Analysis) -> Result<String, CodeGenError> {
    let mut cg = CodeGen { ir, analysis, out: String::new(), vreg_base: analysis.next_free_wram, label_counter: 0 };
    cg.emit_header()?;
    cg.emit_startup()?;
    cg.emit_runtime_helpers()?;
    for proc in &ir.procedures {
        cg.emit_procedure(proc)?;
    }
    cg.emit_assets()?;
    Ok(cg.out)
}

impl<'a> CodeGen<'a> {
    fn fresh_label(&mut self, tag: &str) -> String {
        let l = format!("L_cg_{}_{}", tag, self.label_counter);
        self.label_counter += 1;
        l
    }

    fn vreg_addr(&self, v: VReg) -> u16 {
        self.vreg_base + (v as u16) * 2
    }

    fn operand_bytes(&self, op: Operand) -> (ByteRef, ByteRef) {
        match op {
            Operand::Reg(v) => {
                let addr = self.vreg_addr(v);
                (ByteRef::Mem(addr), ByteRef::Mem(addr + 1))
            }
            Operand::Imm(v) => (ByteRef::Imm((v & 0xff) as u8), ByteRef::Imm((v >> 8) as u8)),
        }
    }

    fn load_a(&mut self, b: ByteRef) -> Result<(), CodeGenError> {
        match b {
            ByteRef::Mem(addr) => writeln!(self.out, "    ld a, [{}]", hex16(addr))?,
            ByteRef::Imm(v) => writeln!(self.out, "    ld a, {}", hex8(v))?,
        }
        Ok(())
    }

    fn store_a(&mut self, addr: u16) -> Result<(), CodeGenError> {
        writeln!(self.out, "    ld [{}], a", hex16(addr))?;
        Ok(())
    }

    /// Materializes `op`'s low/high bytes into `addr`/`addr+1`. Used for
    /// `Store`, `Move`, `Const`, and passing a call argument into its
    /// callee's fixed parameter cell.
    fn emit_store_operand_to(&mut self, addr: u16, op: Operand) -> Result<(), CodeGenError> {
        let (lo, hi) = self.operand_bytes(op);
        self.load_a(lo)?;
        self.store_a(addr)?;
        self.load_a(hi)?;
        self.store_a(addr + 1)?;
        Ok(())
    }

    fn wram_used_bytes(&self) -> Result<u16, CodeGenError> {
        let mut end = u32::from(self.analysis.next_free_wram);
        for proc in &self.ir.procedures {
            let proc_end = u32::from(self.vreg_base) + u32::from(proc.temp_count) * 2;
            end = end.max(proc_end);
        }
        let start = u32::from(target::WRAM_START);
        if end > u32::from(target::WRAM_END) + 1 {
            return Err(CodeGenError::Logic(format!(
                "program needs {} bytes of WRAM, which overflows the {}-{} window",
                end - start,
                hex16(target::WRAM_START),
                hex16(target::WRAM_END)
            )));
        }
        Ok((end - start) as u16)
    }

    fn emit_header(&mut self) -> Result<(), CodeGenError> {
        writeln!(self.out, "SECTION \"Header\", ROM0[{}]", hex16(target::HEADER_ENTRY))?;
        writeln!(self.out, "    jp Start")?;
        writeln!(self.out, "    ds $150 - @, 0")?;
        Ok(())
    }

    fn emit_startup(&mut self) -> Result<(), CodeGenError> {
        let wram_used = self.wram_used_bytes()?;
        writeln!(self.out, "\nSECTION \"Start\", ROM0[$150]")?;
        writeln!(self.out, "Start:")?;
        writeln!(self.out, "    di")?;
        writeln!(self.out, "    ld sp, {}", hex16(target::STACK_INIT))?;
        writeln!(self.out, "    ld hl, {}", hex16(target::WRAM_START))?;
        writeln!(self.out, "    ld bc, {}", hex16(wram_used))?;
        writeln!(self.out, "    call PenguinMemClear")?;
        writeln!(self.out, "    call LCDoff")?;
        for asset in &self.analysis.assets {
            let dst = match asset.ty {
                Type::Tileset => target::VRAM_TILES_8000,
                Type::Tilemap => target::VRAM_TILEMAP_9800,
                // A Sprite asset is a tile reference within a tileset
                // already copied above; it has no VRAM region of its own.
                _ => continue,
            };
            writeln!(self.out, "    ld hl, {}", asset.label)?;
            writeln!(self.out, "    ld de, {}", hex16(dst))?;
            writeln!(self.out, "    ld bc, {}_end - {}", asset.label, asset.label)?;
            writeln!(self.out, "    call PenguinMemCopy")?;
        }
        writeln!(self.out, "    call __entry")?;
        writeln!(self.out, ".haltLoop:")?;
        writeln!(self.out, "    halt")?;
        writeln!(self.out, "    jp .haltLoop")?;
        Ok(())
    }

    fn emit_runtime_helpers(&mut self) -> Result<(), CodeGenError> {
        writeln!(self.out, "\nSECTION \"Runtime\", ROM0")?;

        writeln!(self.out, "; hl = dst, bc = length; zero-fills [hl, hl+bc)")?;
        writeln!(self.out, "PenguinMemClear:")?;
        writeln!(self.out, "    ld a, b")?;
        writeln!(self.out, "    or a, c")?;
        writeln!(self.out, "    ret z")?;
        writeln!(self.out, "    xor a, a")?;
        writeln!(self.out, "    ld [hl+], a")?;
        writeln!(self.out, "    dec bc")?;
        writeln!(self.out, "    jp PenguinMemClear")?;
        writeln!(self.out)?;

        writeln!(self.out, "; hl = src, de = dst, bc = length")?;
        writeln!(self.out, "PenguinMemCopy:")?;
        writeln!(self.out, "    ld a, b")?;
        writeln!(self.out, "    or a, c")?;
        writeln!(self.out, "    ret z")?;
        writeln!(self.out, "    ld a, [hl+]")?;
        writeln!(self.out, "    ld [de], a")?;
        writeln!(self.out, "    inc de")?;
        writeln!(self.out, "    dec bc")?;
        writeln!(self.out, "    jp PenguinMemCopy")?;
        writeln!(self.out)?;

        // Neither helper has a call site in this codegen: the fixed
        // argument/return-slot calling convention never keeps a value
        // live across a `call` in a register, so there is nothing to
        // save. Shipped anyway as the pair spec.md's runtime-helper list
        // names.
        writeln!(self.out, "PenguinPush:")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::PUSH_VALUE))?;
        writeln!(self.out, "    ld l, a")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::PUSH_VALUE + 1))?;
        writeln!(self.out, "    ld h, a")?;
        writeln!(self.out, "    push hl")?;
        writeln!(self.out, "    ret")?;
        writeln!(self.out)?;

        writeln!(self.out, "PenguinPop:")?;
        writeln!(self.out, "    pop hl")?;
        writeln!(self.out, "    ld a, l")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::PUSH_VALUE))?;
        writeln!(self.out, "    ld a, h")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::PUSH_VALUE + 1))?;
        writeln!(self.out, "    ret")?;
        writeln!(self.out)?;

        writeln!(self.out, "waitVBlank:")?;
        writeln!(self.out, ".wait:")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::IO_LY))?;
        writeln!(self.out, "    cp a, 144")?;
        writeln!(self.out, "    jp c, .wait")?;
        writeln!(self.out, "    ret")?;
        writeln!(self.out)?;

        writeln!(self.out, "LCDon:")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::IO_LCDC))?;
        writeln!(self.out, "    or a, %10000001")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::IO_LCDC))?;
        writeln!(self.out, "    ret")?;
        writeln!(self.out)?;

        writeln!(self.out, "LCDoff:")?;
        writeln!(self.out, "    call waitVBlank")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::IO_LCDC))?;
        writeln!(self.out, "    and a, %01111110")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::IO_LCDC))?;
        writeln!(self.out, "    ret")?;
        writeln!(self.out)?;

        self.emit_mul_u16()?;
        writeln!(self.out)?;
        self.emit_update_input()?;
        Ok(())
    }

    /// Shift-and-add 16-bit multiply: LSB-first, shifting the
    /// multiplier right and the multiplicand left until the multiplier
    /// reaches zero, which happens in at most 16 iterations and needs no
    /// separate loop counter (every register is already spoken for).
    fn emit_mul_u16(&mut self) -> Result<(), CodeGenError> {
        writeln!(self.out, "; de*bc via mulArg0/mulArg1, result to the return slot")?;
        writeln!(self.out, "__mul_u16:")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::MUL_ARG0))?;
        writeln!(self.out, "    ld e, a")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::MUL_ARG0 + 1))?;
        writeln!(self.out, "    ld d, a")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::MUL_ARG1))?;
        writeln!(self.out, "    ld c, a")?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::MUL_ARG1 + 1))?;
        writeln!(self.out, "    ld b, a")?;
        writeln!(self.out, "    ld hl, 0")?;
        writeln!(self.out, ".mulLoop:")?;
        writeln!(self.out, "    ld a, b")?;
        writeln!(self.out, "    or a, c")?;
        writeln!(self.out, "    jp z, .mulDone")?;
        writeln!(self.out, "    ld a, c")?;
        writeln!(self.out, "    and a, 1")?;
        writeln!(self.out, "    jp z, .mulSkip")?;
        writeln!(self.out, "    add hl, de")?;
        writeln!(self.out, ".mulSkip:")?;
        writeln!(self.out, "    sla e")?;
        writeln!(self.out, "    rl d")?;
        writeln!(self.out, "    srl b")?;
        writeln!(self.out, "    rr c")?;
        writeln!(self.out, "    jp .mulLoop")?;
        writeln!(self.out, ".mulDone:")?;
        writeln!(self.out, "    ld a, l")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::RETURN_SLOT))?;
        writeln!(self.out, "    ld a, h")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::RETURN_SLOT + 1))?;
        writeln!(self.out, "    ret")?;
        Ok(())
    }

    /// Refreshes the fixed joypad mirror one button at a time, reusing
    /// [`JoypadButton`]'s row/bit model rather than hardcoding masks.
    fn emit_update_input(&mut self) -> Result<(), CodeGenError> {
        writeln!(self.out, "PenguinUpdateInput:")?;
        writeln!(self.out, "    ld a, %00100000")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::IO_JOYPAD))?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::IO_JOYPAD))?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::IO_JOYPAD))?;
        writeln!(self.out, "    cpl")?;
        writeln!(self.out, "    and a, $0f")?;
        writeln!(self.out, "    ld b, a")?;
        writeln!(self.out, "    ld a, %00010000")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::IO_JOYPAD))?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::IO_JOYPAD))?;
        writeln!(self.out, "    ld a, [{}]", hex16(target::IO_JOYPAD))?;
        writeln!(self.out, "    cpl")?;
        writeln!(self.out, "    and a, $0f")?;
        writeln!(self.out, "    ld c, a")?;
        writeln!(self.out, "    ld a, %00110000")?;
        writeln!(self.out, "    ld [{}], a", hex16(target::IO_JOYPAD))?;

        let buttons = [
            JoypadButton::Right,
            JoypadButton::Left,
            JoypadButton::Up,
            JoypadButton::Down,
            JoypadButton::A,
            JoypadButton::B,
            JoypadButton::Select,
            JoypadButton::Start,
        ];
        for button in buttons {
            let row = if button.is_direction() { "b" } else { "c" };
            writeln!(self.out, "    ld a, {row}")?;
            writeln!(self.out, "    and a, {}", hex8(1u8 << button.bit()))?;
            for _ in 0..button.bit() {
                writeln!(self.out, "    srl a")?;
            }
            writeln!(self.out, "    ld [{}], a", hex16(target::input_mirror_addr(button)))?;
        }
        writeln!(self.out, "    ret")?;
        Ok(())
    }

    fn emit_procedure(&mut self, proc: &Procedure) -> Result<(), CodeGenError> {
        writeln!(self.out, "\nSECTION \"{}\", ROM0", proc.label)?;
        writeln!(self.out, "{}:", proc.label)?;
        for inst in &proc.body {
            self.emit_inst(inst)?;
        }
        Ok(())
    }

    fn emit_inst(&mut self, inst: &Inst) -> Result<(), CodeGenError> {
        match inst {
            Inst::Const { dst, imm } => self.emit_store_operand_to(self.vreg_addr(*dst), Operand::Imm(*imm)),
            Inst::Load { dst, addr } => {
                let dst_addr = self.vreg_addr(*dst);
                self.load_a(ByteRef::Mem(*addr))?;
                self.store_a(dst_addr)?;
                self.load_a(ByteRef::Mem(*addr + 1))?;
                self.store_a(dst_addr + 1)
            }
            Inst::Store { addr, src } => self.emit_store_operand_to(*addr, *src),
            Inst::Move { dst, src } => {
                let dst_addr = self.vreg_addr(*dst);
                self.emit_store_operand_to(dst_addr, *src)
            }
            Inst::BinOp { dst, op, lhs, rhs } => {
                let dst_addr = self.vreg_addr(*dst);
                self.emit_binop(dst_addr, *op, *lhs, *rhs)
            }
            Inst::UnOp { dst, op, src } => {
                let dst_addr = self.vreg_addr(*dst);
                self.emit_unop(dst_addr, *op, *src)
            }
            Inst::LoadIndirect { dst, base, index, stride } => {
                let dst_addr = self.vreg_addr(*dst);
                self.materialize_effective_address(*base, *index, *stride)?;
                writeln!(self.out, "    ld a, [hl]")?;
                self.store_a(dst_addr)?;
                writeln!(self.out, "    inc hl")?;
                writeln!(self.out, "    ld a, [hl]")?;
                self.store_a(dst_addr + 1)
            }
            Inst::StoreIndirect { base, index, stride, src } => {
                self.materialize_effective_address(*base, *index, *stride)?;
                let (lo, hi) = self.operand_bytes(*src);
                self.load_a(lo)?;
                writeln!(self.out, "    ld [hl], a")?;
                writeln!(self.out, "    inc hl")?;
                self.load_a(hi)?;
                writeln!(self.out, "    ld [hl], a")?;
                Ok(())
            }
            Inst::Call { dst, target, args } => self.emit_call(*dst, target, args),
            Inst::Return { src } => {
                if let Some(src) = src {
                    self.emit_store_operand_to(target::RETURN_SLOT, *src)?;
                }
                writeln!(self.out, "    ret")?;
                Ok(())
            }
            Inst::BranchIfZero { cond, false_label } => {
                let (lo, hi) = self.operand_bytes(*cond);
                self.load_a(lo)?;
                writeln!(self.out, "    ld b, a")?;
                self.load_a(hi)?;
                writeln!(self.out, "    or a, b")?;
                writeln!(self.out, "    jp z, {false_label}")?;
                Ok(())
            }
            Inst::Jump { label } => {
                writeln!(self.out, "    jp {label}")?;
                Ok(())
            }
            Inst::Label { name } => {
                writeln!(self.out, "{name}:")?;
                Ok(())
            }
        }
    }

    fn emit_call(&mut self, dst: Option<VReg>, target_label: &str, args: &[Operand]) -> Result<(), CodeGenError> {
        if target_label == "__mul_u16" {
            if args.len() != 2 {
                return Err(CodeGenError::Logic(format!("__mul_u16 expects 2 arguments, found {}", args.len())));
            }
            self.emit_store_operand_to(target::MUL_ARG0, args[0])?;
            self.emit_store_operand_to(target::MUL_ARG1, args[1])?;
        } else if let Some(proc) = self.ir.procedures.iter().find(|p| p.label == target_label) {
            if proc.param_addrs.len() != args.len() {
                return Err(CodeGenError::Logic(format!(
                    "call to `{target_label}` passes {} argument(s), the procedure declares {}",
                    args.len(),
                    proc.param_addrs.len()
                )));
            }
            let param_addrs = proc.param_addrs.clone();
            for (addr, arg) in param_addrs.iter().zip(args.iter()) {
                self.emit_store_operand_to(*addr, *arg)?;
            }
        } else if !args.is_empty() {
            return Err(CodeGenError::Logic(format!("builtin call `{target_label}` takes no arguments, found {}", args.len())));
        }

        writeln!(self.out, "    call {target_label}")?;

        if let Some(d) = dst {
            let dst_addr = self.vreg_addr(d);
            self.load_a(ByteRef::Mem(target::RETURN_SLOT))?;
            self.store_a(dst_addr)?;
            self.load_a(ByteRef::Mem(target::RETURN_SLOT + 1))?;
            self.store_a(dst_addr + 1)?;
        }
        Ok(())
    }

    /// Computes `base + index*stride` into `HL` so the caller can follow
    /// with `ld a, [hl]` / `ld [hl], a` — the only way SM83 dereferences
    /// a runtime-computed address.
    fn materialize_effective_address(&mut self, base: u16, index: Operand, stride: u16) -> Result<(), CodeGenError> {
        let (idx_lo, idx_hi) = self.operand_bytes(index);
        self.load_a(idx_lo)?;
        self.store_a(target::INDIRECT_SCRATCH)?;
        self.load_a(idx_hi)?;
        self.store_a(target::INDIRECT_SCRATCH + 1)?;

        if stride == 2 {
            self.load_a(ByteRef::Mem(target::INDIRECT_SCRATCH))?;
            writeln!(self.out, "    sla a")?;
            self.store_a(target::INDIRECT_SCRATCH)?;
            self.load_a(ByteRef::Mem(target::INDIRECT_SCRATCH + 1))?;
            writeln!(self.out, "    rl a")?;
            self.store_a(target::INDIRECT_SCRATCH + 1)?;
        } else if stride != 1 {
            return Err(CodeGenError::Logic(format!("unsupported indirect-access stride {stride}")));
        }

        if base != 0 {
            self.load_a(ByteRef::Mem(target::INDIRECT_SCRATCH))?;
            writeln!(self.out, "    add a, {}", hex8((base & 0xff) as u8))?;
            self.store_a(target::INDIRECT_SCRATCH)?;
            self.load_a(ByteRef::Mem(target::INDIRECT_SCRATCH + 1))?;
            writeln!(self.out, "    adc a, {}", hex8((base >> 8) as u8))?;
            self.store_a(target::INDIRECT_SCRATCH + 1)?;
        }

        self.load_a(ByteRef::Mem(target::INDIRECT_SCRATCH))?;
        writeln!(self.out, "    ld l, a")?;
        self.load_a(ByteRef::Mem(target::INDIRECT_SCRATCH + 1))?;
        writeln!(self.out, "    ld h, a")?;
        Ok(())
    }

    fn emit_binop(&mut self, dst: u16, op: IrBinOp, lhs: Operand, rhs: Operand) -> Result<(), CodeGenError> {
        match op {
            IrBinOp::Add => self.emit_add_sub(dst, lhs, rhs, "add", "adc"),
            IrBinOp::Sub => self.emit_add_sub(dst, lhs, rhs, "sub", "sbc"),
            IrBinOp::BitAnd => self.emit_bitwise(dst, lhs, rhs, "and"),
            IrBinOp::BitXor => self.emit_bitwise(dst, lhs, rhs, "xor"),
            IrBinOp::BitOr => self.emit_bitwise(dst, lhs, rhs, "or"),
            IrBinOp::Shl => self.emit_shift(dst, lhs, rhs, true),
            IrBinOp::Shr => self.emit_shift(dst, lhs, rhs, false),
            IrBinOp::Lt => self.emit_relational(dst, lhs, rhs, false, "c"),
            IrBinOp::Ge => self.emit_relational(dst, lhs, rhs, false, "nc"),
            IrBinOp::Gt => self.emit_relational(dst, lhs, rhs, true, "c"),
            IrBinOp::Le => self.emit_relational(dst, lhs, rhs, true, "nc"),
            IrBinOp::Eq => self.emit_equality(dst, lhs, rhs, true),
            IrBinOp::Ne => self.emit_equality(dst, lhs, rhs, false),
        }
    }

    /// Low byte uses `lo_mnem` (sets carry/borrow), high byte uses
    /// `hi_mnem` (`adc`/`sbc`) so the borrow/carry chains across the
    /// 16-bit value. The `ld b, a` / reload between them never touches
    /// flags, so the chain survives intact.
    fn emit_add_sub(&mut self, dst: u16, lhs: Operand, rhs: Operand, lo_mnem: &str, hi_mnem: &str) -> Result<(), CodeGenError> {
        let (lhs_lo, lhs_hi) = self.operand_bytes(lhs);
        let (rhs_lo, rhs_hi) = self.operand_bytes(rhs);
        self.load_a(rhs_lo)?;
        writeln!(self.out, "    ld b, a")?;
        self.load_a(lhs_lo)?;
        writeln!(self.out, "    {lo_mnem} a, b")?;
        self.store_a(dst)?;
        self.load_a(rhs_hi)?;
        writeln!(self.out, "    ld b, a")?;
        self.load_a(lhs_hi)?;
        writeln!(self.out, "    {hi_mnem} a, b")?;
        self.store_a(dst + 1)
    }

    fn emit_bitwise(&mut self, dst: u16, lhs: Operand, rhs: Operand, mnem: &str) -> Result<(), CodeGenError> {
        let (lhs_lo, lhs_hi) = self.operand_bytes(lhs);
        let (rhs_lo, rhs_hi) = self.operand_bytes(rhs);
        self.load_a(rhs_lo)?;
        writeln!(self.out, "    ld b, a")?;
        self.load_a(lhs_lo)?;
        writeln!(self.out, "    {mnem} a, b")?;
        self.store_a(dst)?;
        self.load_a(rhs_hi)?;
        writeln!(self.out, "    ld b, a")?;
        self.load_a(lhs_hi)?;
        writeln!(self.out, "    {mnem} a, b")?;
        self.store_a(dst + 1)
    }

    /// Runtime variable-count shift: copies the value into `dst`, then
    /// shifts it there in place `amount` times (a logical shift either
    /// way — `>>` never sign-extends, there being no signed `int`).
    fn emit_shift(&mut self, dst: u16, value: Operand, amount: Operand, left: bool) -> Result<(), CodeGenError> {
        let (v_lo, v_hi) = self.operand_bytes(value);
        self.load_a(v_lo)?;
        self.store_a(dst)?;
        self.load_a(v_hi)?;
        self.store_a(dst + 1)?;
        let (amt_lo, _) = self.operand_bytes(amount);
        self.load_a(amt_lo)?;
        writeln!(self.out, "    ld c, a")?;
        let top = self.fresh_label("shift");
        let done = self.fresh_label("shiftDone");
        writeln!(self.out, "{top}:")?;
        writeln!(self.out, "    ld a, c")?;
        writeln!(self.out, "    or a, a")?;
        writeln!(self.out, "    jp z, {done}")?;
        if left {
            self.load_a(ByteRef::Mem(dst))?;
            writeln!(self.out, "    sla a")?;
            self.store_a(dst)?;
            self.load_a(ByteRef::Mem(dst + 1))?;
            writeln!(self.out, "    rl a")?;
            self.store_a(dst + 1)?;
        } else {
            self.load_a(ByteRef::Mem(dst + 1))?;
            writeln!(self.out, "    srl a")?;
            self.store_a(dst + 1)?;
            self.load_a(ByteRef::Mem(dst))?;
            writeln!(self.out, "    rr a")?;
            self.store_a(dst)?;
        }
        writeln!(self.out, "    dec c")?;
        writeln!(self.out, "    jp {top}")?;
        writeln!(self.out, "{done}:")?;
        Ok(())
    }

    /// `first - second` via `sub`/`sbc`; the carry after the high-byte
    /// `sbc` is exactly "first < second" (unsigned, standard 16-bit
    /// borrow-chain comparison). `Gt`/`Le` reuse this by swapping the
    /// operands; `Ge`/`Le` reuse it by testing `nc` instead of `c`.
    fn emit_relational(&mut self, dst: u16, lhs: Operand, rhs: Operand, swap: bool, cond: &str) -> Result<(), CodeGenError> {
        let (first, second) = if swap { (rhs, lhs) } else { (lhs, rhs) };
        let (f_lo, f_hi) = self.operand_bytes(first);
        let (s_lo, s_hi) = self.operand_bytes(second);
        self.load_a(s_lo)?;
        writeln!(self.out, "    ld b, a")?;
        self.load_a(f_lo)?;
        writeln!(self.out, "    sub a, b")?;
        self.load_a(s_hi)?;
        writeln!(self.out, "    ld b, a")?;
        self.load_a(f_hi)?;
        writeln!(self.out, "    sbc a, b")?;
        self.emit_bool_from_condition(dst, cond)
    }

    /// Equal iff every byte's XOR is zero; `or`s the two byte-diffs
    /// together so one `z`/`nz` test covers both bytes at once.
    fn emit_equality(&mut self, dst: u16, lhs: Operand, rhs: Operand, want_eq: bool) -> Result<(), CodeGenError> {
        let (l_lo, l_hi) = self.operand_bytes(lhs);
        let (r_lo, r_hi) = self.operand_bytes(rhs);
        self.load_a(r_lo)?;
        writeln!(self.out, "    ld b, a")?;
        self.load_a(l_lo)?;
        writeln!(self.out, "    xor a, b")?;
        writeln!(self.out, "    ld c, a")?;
        self.load_a(r_hi)?;
        writeln!(self.out, "    ld b, a")?;
        self.load_a(l_hi)?;
        writeln!(self.out, "    xor a, b")?;
        writeln!(self.out, "    or a, c")?;
        self.emit_bool_from_condition(dst, if want_eq { "z" } else { "nz" })
    }

    /// Writes `1` to `dst` (zero-extended to 16 bits) if the flags set
    /// by the caller satisfy `cond`, else `0`.
    fn emit_bool_from_condition(&mut self, dst: u16, cond: &str) -> Result<(), CodeGenError> {
        let true_label = self.fresh_label("boolTrue");
        let done_label = self.fresh_label("boolDone");
        writeln!(self.out, "    jp {cond}, {true_label}")?;
        writeln!(self.out, "    xor a, a")?;
        writeln!(self.out, "    jp {done_label}")?;
        writeln!(self.out, "{true_label}:")?;
        writeln!(self.out, "    ld a, 1")?;
        writeln!(self.out, "{done_label}:")?;
        self.store_a(dst)?;
        writeln!(self.out, "    xor a, a")?;
        self.store_a(dst + 1)
    }

    fn emit_unop(&mut self, dst: u16, op: IrUnOp, src: Operand) -> Result<(), CodeGenError> {
        match op {
            IrUnOp::BitNot => {
                let (lo, hi) = self.operand_bytes(src);
                self.load_a(lo)?;
                writeln!(self.out, "    cpl")?;
                self.store_a(dst)?;
                self.load_a(hi)?;
                writeln!(self.out, "    cpl")?;
                self.store_a(dst + 1)
            }
            IrUnOp::Neg => {
                // Two's complement: bitwise-not, then add 1.
                self.emit_unop(dst, IrUnOp::BitNot, src)?;
                self.load_a(ByteRef::Mem(dst))?;
                writeln!(self.out, "    add a, 1")?;
                self.store_a(dst)?;
                self.load_a(ByteRef::Mem(dst + 1))?;
                writeln!(self.out, "    adc a, 0")?;
                self.store_a(dst + 1)
            }
            IrUnOp::Normalize | IrUnOp::LogicalNot => {
                let (lo, hi) = self.operand_bytes(src);
                self.load_a(lo)?;
                writeln!(self.out, "    ld b, a")?;
                self.load_a(hi)?;
                writeln!(self.out, "    or a, b")?;
                let cond = if matches!(op, IrUnOp::LogicalNot) { "z" } else { "nz" };
                self.emit_bool_from_condition(dst, cond)
            }
        }
    }

    fn emit_assets(&mut self) -> Result<(), CodeGenError> {
        writeln!(self.out, "\nSECTION \"Assets\", ROMX")?;
        for asset in &self.analysis.assets {
            writeln!(self.out, "{}:", asset.label)?;
            writeln!(self.out, "    INCBIN \"{}\"", asset.path)?;
            writeln!(self.out, "{}_end:", asset.label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::ir;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::sema;

    fn generate_src(src: &str) -> String {
        let mut sink = DiagnosticSink::new();
        let tokens = tokenize(src, &mut sink);
        let program = parse(tokens, &mut sink);
        let analysis = sema::analyze(&program, &mut sink, None);
        assert!(!sink.has_errors(), "{:?}", sink.iter().collect::<Vec<_>>());
        let ir = ir::lower(&analysis, &mut sink);
        generate(&ir, &analysis).expect("codegen should succeed on a clean program")
    }

    #[test]
    fn output_carries_the_fixed_section_skeleton() {
        let asm = generate_src("int a = 5; int b = a + 3;");
        assert!(asm.contains("SECTION \"Header\", ROM0[$100]"));
        assert!(asm.contains("Start:"));
        assert!(asm.contains("call __entry"));
        assert!(asm.contains("SECTION \"Assets\", ROMX"));
    }

    #[test]
    fn every_procedure_gets_its_own_section_and_label() {
        let asm = generate_src("procedure int sq(int x) { return x * x; }");
        assert!(asm.contains("SECTION \"proc_sq\", ROM0"));
        assert!(asm.contains("proc_sq:"));
    }

    #[test]
    fn multiplication_calls_the_shift_and_add_helper() {
        let asm = generate_src("procedure int sq(int x) { return x * x; }");
        assert!(asm.contains("call __mul_u16"));
        assert!(asm.contains("__mul_u16:"));
        assert!(asm.contains(".mulLoop:"));
    }

    #[test]
    fn push_and_pop_helpers_are_shipped_as_a_balanced_pair() {
        let asm = generate_src("int a = 1;");
        let pushes = asm.matches("    push hl").count();
        let pops = asm.matches("    pop hl").count();
        assert_eq!(pushes, 1);
        assert_eq!(pops, 1);
    }

    #[test]
    fn every_basic_block_invariant_holds_before_codegen_runs() {
        let mut sink = DiagnosticSink::new();
        let src = "int n = 0; loop (n < 4) { n = n + 1; } if (n) { n = 1; } else { n = 2; }";
        let tokens = tokenize(src, &mut sink);
        let program = parse(tokens, &mut sink);
        let analysis = sema::analyze(&program, &mut sink, None);
        let irp = ir::lower(&analysis, &mut sink);
        for proc in &irp.procedures {
            assert!(ir::every_block_has_one_terminator(proc));
        }
        assert!(generate(&irp, &analysis).is_ok());
    }

    #[test]
    fn comparison_lowers_to_a_borrow_chain_and_a_conditional_jump() {
        let asm = generate_src("int a = 1; int b = 2; int c = a < b;");
        assert!(asm.contains("sbc a, b"));
        assert!(asm.contains("jp c,"));
    }

    #[test]
    fn oversized_program_is_reported_as_a_logic_error_not_a_panic() {
        let mut sink = DiagnosticSink::new();
        let program = crate::parser::parse(tokenize("int a = 1;", &mut sink), &mut sink);
        let mut analysis = sema::analyze(&program, &mut sink, None);
        analysis.next_free_wram = target::WRAM_END;
        let irp = ir::lower(&analysis, &mut sink);
        assert!(matches!(generate(&irp, &analysis), Err(CodeGenError::Logic(_))));
    }
}
