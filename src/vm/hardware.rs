//! The console's memory map.
//!
//! Fixed addresses known to both the CPU and the assembler: the mouse
//! registers and the tile map. Writes inside the tile-map region are
//! decoded by the CPU into tile-change events for the display front end.

use crate::ternary::{Trit, Tryte};
use serde::{Deserialize, Serialize};

/// Execution begins at the most negative address, `---------`.
pub const ENTRY_ADDRESS: Tryte = Tryte::MIN;

/// First cell of the tile map.
pub const TILEMAP_BASE: i32 = -3118;

/// Tile-map length in trytes: 27 x 27 tiles of the 243 x 243 display.
pub const TILEMAP_SIZE: i32 = 729;

/// Mouse X position register.
pub const MOUSE_X: i32 = -202;

/// Mouse Y position register.
pub const MOUSE_Y: i32 = -201;

/// Mouse button register: three 3-trit fields, one per button.
pub const MOUSE_BTN: i32 = -200;

/// True when the address falls inside the tile-map region.
pub fn in_tilemap(address: i32) -> bool {
    (TILEMAP_BASE..TILEMAP_BASE + TILEMAP_SIZE).contains(&address)
}

/// Mask selecting the tile tryte's `u` field (middle tribble).
pub const TILE_U_MASK: Tryte = Tryte::from_trits([
    Trit::O,
    Trit::O,
    Trit::O,
    Trit::N,
    Trit::N,
    Trit::N,
    Trit::O,
    Trit::O,
    Trit::O,
]);

/// Mask selecting the tile tryte's `v` field (low tribble).
pub const TILE_V_MASK: Tryte = Tryte::from_trits([
    Trit::O,
    Trit::O,
    Trit::O,
    Trit::O,
    Trit::O,
    Trit::O,
    Trit::N,
    Trit::N,
    Trit::N,
]);

/// A decoded write into the tile-map region.
///
/// `u` and `v` are the raw signed tribble values (-13..=13); mapping them
/// into tileset coordinates is the display's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEvent {
    /// Offset of the written cell from [`TILEMAP_BASE`].
    pub index: usize,
    pub u: i32,
    pub v: i32,
}

/// A mouse button, in the order its field sits in the button register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Trit positions of this button's 3-trit field in the register, most
    /// significant first: right, middle, left.
    pub fn field(self) -> std::ops::Range<usize> {
        match self {
            MouseButton::Right => 0..3,
            MouseButton::Middle => 3..6,
            MouseButton::Left => 6..9,
        }
    }
}

/// The hardware-defined symbols merged into every assembled program:
/// (name with sigil, value, reserved size in trytes).
pub fn builtin_symbols() -> [(&'static str, i32, Option<u32>); 6] {
    [
        ("$ZERO", 0, None),
        ("$MOUSE_X", MOUSE_X, None),
        ("$MOUSE_Y", MOUSE_Y, None),
        ("$MOUSE_BTN", MOUSE_BTN, None),
        ("$TILEMAP", TILEMAP_BASE, Some(TILEMAP_SIZE as u32)),
        ("$TILEMAP_SIZE", TILEMAP_SIZE, None),
    ]
}
