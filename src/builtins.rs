//! The fixed, compiler-owned builtin namespace: `display`, `input`, and
//! `control`. These three root names are reserved — they cannot be
//! redeclared, rebound, or passed as values (spec.md §9) — and every
//! member under them has a fixed type and a fixed target-level meaning
//! that the semantic analyzer and code generator both consult from this
//! single table, instead of re-deriving it ad hoc in each phase.

use crate::target::JoypadButton;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRoot {
    Display,
    Input,
    Control,
}

impl BuiltinRoot {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinRoot::Display => "display",
            BuiltinRoot::Input => "input",
            BuiltinRoot::Control => "control",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "display" => BuiltinRoot::Display,
            "input" => BuiltinRoot::Input,
            "control" => BuiltinRoot::Control,
            _ => return None,
        })
    }
}

/// `true` for any identifier that is compiler-reserved regardless of
/// what a user program tries to do with it.
pub fn is_reserved_root(name: &str) -> bool {
    BuiltinRoot::from_name(name).is_some()
}

/// An OAM slot field, named the way spec.md §6 names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OamField {
    Tile,
    X,
    Y,
}

/// One resolved member of the builtin namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    /// `display.tileset0 = someTileset;`
    DisplayTileset0,
    /// `display.tilemap0 = someTilemap;`
    DisplayTilemap0,
    /// `display.oam[i].tile|x|y`
    DisplayOam(OamField),
    /// `input.Right|Left|Up|Down|A|B|Start|Select`
    InputButton(JoypadButton),
    /// `control.LCDon()`
    ControlLcdOn,
    /// `control.LCDoff()`
    ControlLcdOff,
    /// `control.waitVBlank()`
    ControlWaitVBlank,
    /// `control.updateInput()`
    ControlUpdateInput,
}

impl Builtin {
    pub fn ty(&self) -> Type {
        match self {
            Builtin::DisplayTileset0 => Type::Tileset,
            Builtin::DisplayTilemap0 => Type::Tilemap,
            Builtin::DisplayOam(OamField::Tile) => Type::Sprite,
            Builtin::DisplayOam(OamField::X) | Builtin::DisplayOam(OamField::Y) => Type::Int,
            Builtin::InputButton(_) => Type::Int,
            Builtin::ControlLcdOn
            | Builtin::ControlLcdOff
            | Builtin::ControlWaitVBlank
            | Builtin::ControlUpdateInput => Type::Unit,
        }
    }

    /// `true` for members that can appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Builtin::DisplayTileset0 | Builtin::DisplayTilemap0 | Builtin::DisplayOam(_)
        )
    }
}

fn input_button(name: &str) -> Option<JoypadButton> {
    Some(match name {
        "Right" => JoypadButton::Right,
        "Left" => JoypadButton::Left,
        "Up" => JoypadButton::Up,
        "Down" => JoypadButton::Down,
        "A" => JoypadButton::A,
        "B" => JoypadButton::B,
        "Start" => JoypadButton::Start,
        "Select" => JoypadButton::Select,
        _ => return None,
    })
}

fn control_member(name: &str) -> Option<Builtin> {
    Some(match name {
        "LCDon" => Builtin::ControlLcdOn,
        "LCDoff" => Builtin::ControlLcdOff,
        "waitVBlank" => Builtin::ControlWaitVBlank,
        "updateInput" => Builtin::ControlUpdateInput,
        _ => return None,
    })
}

fn oam_field(name: &str) -> Option<OamField> {
    Some(match name {
        "tile" => OamField::Tile,
        "x" => OamField::X,
        "y" => OamField::Y,
        _ => return None,
    })
}

/// Resolves `display.X`/`input.X`/`control.X()` (everything except the
/// `display.oam[i].field` form, which needs an index and is resolved by
/// [`resolve_oam_member`]).
pub fn resolve_member(root: BuiltinRoot, member: &str) -> Option<Builtin> {
    match root {
        BuiltinRoot::Display => match member {
            "tileset0" => Some(Builtin::DisplayTileset0),
            "tilemap0" => Some(Builtin::DisplayTilemap0),
            _ => None,
        },
        BuiltinRoot::Input => input_button(member).map(Builtin::InputButton),
        BuiltinRoot::Control => control_member(member),
    }
}

/// Resolves `display.oam[i].field`.
pub fn resolve_oam_member(field: &str) -> Option<Builtin> {
    oam_field(field).map(Builtin::DisplayOam)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_roots_cannot_be_shadowed() {
        assert!(is_reserved_root("display"));
        assert!(is_reserved_root("input"));
        assert!(is_reserved_root("control"));
        assert!(!is_reserved_root("player"));
    }

    #[test]
    fn oam_tile_field_is_sprite_typed_and_assignable() {
        let b = Builtin::DisplayOam(OamField::Tile);
        assert_eq!(b.ty(), Type::Sprite);
        assert!(b.is_assignable());
    }

    #[test]
    fn input_buttons_are_int_typed_and_not_assignable() {
        let b = Builtin::InputButton(JoypadButton::A);
        assert_eq!(b.ty(), Type::Int);
        assert!(!b.is_assignable());
    }

    #[test]
    fn control_methods_are_unit_typed() {
        assert_eq!(resolve_member(BuiltinRoot::Control, "waitVBlank").unwrap().ty(), Type::Unit);
    }

    #[test]
    fn unknown_member_resolves_to_none() {
        assert!(resolve_member(BuiltinRoot::Display, "nope").is_none());
    }
}
