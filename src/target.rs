//! SM83 (Game Boy CPU) target model: the fixed memory map, hardware
//! register addresses, and the scratch-register abstraction codegen uses.
//!
//! Nothing here does register allocation in the compiler-theory sense —
//! the target model simply names the fixed addresses and registers the
//! code generator is allowed to touch, per spec.md §3's "invariant,
//! target-dictated" memory map.

/// ROM bank 0, where the cartridge header and startup stub live.
pub const ROM0_START: u16 = 0x0000;
/// Cartridge header entry point, fixed by the hardware boot ROM contract.
pub const HEADER_ENTRY: u16 = 0x0100;

/// VRAM tile data blocks.
pub const VRAM_TILES_8000: u16 = 0x8000;
pub const VRAM_TILES_8800: u16 = 0x8800;
/// VRAM background tilemaps.
pub const VRAM_TILEMAP_9800: u16 = 0x9800;
pub const VRAM_TILEMAP_9C00: u16 = 0x9c00;

/// Work RAM: variable and virtual-register storage lives here, one
/// word-aligned cell per symbol, strictly increasing (see
/// [`crate::symbol::WramAllocator`]).
pub const WRAM_START: u16 = 0xc000;
pub const WRAM_END: u16 = 0xdfff;
/// Initial stack pointer; the stack grows downward from here.
pub const STACK_INIT: u16 = 0xdfff;

/// Bytes at the bottom of WRAM reserved for engine-internal state (the
/// joypad mirror, the call return slot, and codegen's scratch cells)
/// rather than user variables. [`crate::symbol::WramAllocator`] starts
/// handing out addresses after this reserved block so the two never
/// collide.
pub const ENGINE_RESERVED_BYTES: u16 = 18;
/// Base address of the 8-byte joypad mirror `control.updateInput()`
/// refreshes every call, one byte per [`JoypadButton`].
pub const INPUT_MIRROR_BASE: u16 = WRAM_START;

/// The fixed WRAM cell `input.<Button>` reads back from, mirrored by
/// `updateInput` (spec.md §6 "mirrored to WRAM by updateInput").
pub fn input_mirror_addr(button: JoypadButton) -> u16 {
    INPUT_MIRROR_BASE + button.mirror_index()
}

/// Every `call` (user procedure or runtime helper) writes its result
/// here before `ret`; the caller reads it back immediately after. Safe
/// to reuse across every call site because nothing survives a register
/// or this slot across a call boundary (codegen's fixed, non-stack
/// calling convention, spec.md §4.5).
pub const RETURN_SLOT: u16 = INPUT_MIRROR_BASE + 8;
/// Scratch cell codegen uses to compute an indirect effective address
/// (`base + index*stride`) before loading it into `HL`.
pub const INDIRECT_SCRATCH: u16 = RETURN_SLOT + 2;
/// Fixed argument cells for the `__mul_u16` runtime helper, which has no
/// `Procedure` of its own to own parameter storage.
pub const MUL_ARG0: u16 = INDIRECT_SCRATCH + 2;
pub const MUL_ARG1: u16 = MUL_ARG0 + 2;
/// Transfer cell `PenguinPush`/`PenguinPop` move a 16-bit value through
/// on their way to/from the real hardware stack.
pub const PUSH_VALUE: u16 = MUL_ARG1 + 2;

/// Object Attribute Memory: 40 sprite slots of 4 bytes each.
pub const OAM_BASE: u16 = 0xfe00;
pub const OAM_SLOT_COUNT: u16 = 40;
pub const OAM_SLOT_BYTES: u16 = 4;

/// Byte offsets of the four fields within one OAM slot, fixed by the
/// hardware's sprite attribute table layout.
pub const OAM_OFFSET_Y: u16 = 0;
pub const OAM_OFFSET_X: u16 = 1;
pub const OAM_OFFSET_TILE: u16 = 2;
pub const OAM_OFFSET_ATTR: u16 = 3;

/// Returns the absolute OAM byte address for `slot`'s `field`, or `None`
/// if `slot` is out of the hardware's 0..40 range.
pub fn oam_field_address(slot: u16, field_offset: u16) -> Option<u16> {
    if slot >= OAM_SLOT_COUNT {
        return None;
    }
    Some(OAM_BASE + slot * OAM_SLOT_BYTES + field_offset)
}

/// I/O registers.
pub const IO_JOYPAD: u16 = 0xff00;
pub const IO_LCDC: u16 = 0xff40;
pub const IO_LY: u16 = 0xff44;

/// Joypad button-select bit assignment within the direction/button rows
/// the hardware multiplexes onto `$FF00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoypadButton {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl JoypadButton {
    /// Bit position within its row (direction keys share a row, action
    /// keys share another); codegen selects the row via bit 4/5 of
    /// `$FF00` before reading.
    pub fn bit(self) -> u8 {
        match self {
            JoypadButton::Right | JoypadButton::A => 0,
            JoypadButton::Left | JoypadButton::B => 1,
            JoypadButton::Up | JoypadButton::Select => 2,
            JoypadButton::Down | JoypadButton::Start => 3,
        }
    }

    pub fn is_direction(self) -> bool {
        matches!(self, JoypadButton::Right | JoypadButton::Left | JoypadButton::Up | JoypadButton::Down)
    }

    /// Index into the fixed 8-byte joypad mirror block, stable and
    /// independent of `bit()`'s row-relative numbering.
    pub fn mirror_index(self) -> u16 {
        match self {
            JoypadButton::Right => 0,
            JoypadButton::Left => 1,
            JoypadButton::Up => 2,
            JoypadButton::Down => 3,
            JoypadButton::A => 4,
            JoypadButton::B => 5,
            JoypadButton::Select => 6,
            JoypadButton::Start => 7,
        }
    }
}

/// 8-bit scratch registers codegen is free to clobber within the
/// emission of a single IR instruction; nothing survives a register
/// across instruction boundaries, so there is no allocator to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

impl Reg8 {
    pub fn name(self) -> &'static str {
        match self {
            Reg8::A => "a",
            Reg8::B => "b",
            Reg8::C => "c",
            Reg8::D => "d",
            Reg8::E => "e",
            Reg8::H => "h",
            Reg8::L => "l",
        }
    }
}

/// 16-bit register pairs used to address WRAM/VRAM/OAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    Bc,
    De,
    Hl,
}

impl Reg16 {
    pub fn name(self) -> &'static str {
        match self {
            Reg16::Bc => "bc",
            Reg16::De => "de",
            Reg16::Hl => "hl",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oam_field_offsets_match_the_fixed_layout() {
        assert_eq!(oam_field_address(0, OAM_OFFSET_Y).unwrap(), 0xfe00);
        assert_eq!(oam_field_address(0, OAM_OFFSET_X).unwrap(), 0xfe01);
        assert_eq!(oam_field_address(0, OAM_OFFSET_TILE).unwrap(), 0xfe02);
        assert_eq!(oam_field_address(0, OAM_OFFSET_ATTR).unwrap(), 0xfe03);
        assert_eq!(oam_field_address(1, OAM_OFFSET_Y).unwrap(), 0xfe04);
    }

    #[test]
    fn oam_slot_out_of_range_is_rejected() {
        assert!(oam_field_address(40, OAM_OFFSET_Y).is_none());
    }

    #[test]
    fn wram_window_is_8k_word_aligned() {
        assert_eq!(WRAM_END - WRAM_START + 1, 0x2000);
    }

    #[test]
    fn engine_reserved_cells_fit_inside_the_reserved_block_without_overlapping() {
        assert_eq!(PUSH_VALUE + 2, WRAM_START + ENGINE_RESERVED_BYTES);
    }
}
