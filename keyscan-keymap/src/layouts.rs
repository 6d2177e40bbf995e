//! Built-in mapping tables.

use crate::{KeyMapping, Keycode};

/// Shorthand aliases for readability.
const ESC: Keycode = Keycode::Escape;
const BSP: Keycode = Keycode::Backspace;
const TAB: Keycode = Keycode::Tab;
const NLK: Keycode = Keycode::NumLock;
const ENT: Keycode = Keycode::KpEnter;

/// 4×5 macropad, the 20-key matrix this driver was first written for.
///
/// ```text
/// NumLk  /  *  -  Esc
///   7    8  9  +  Bksp
///   4    5  6  .  Tab
///   1    2  3  0  Enter
/// ```
pub static MACROPAD_4X5: [[Keycode; 5]; 4] = [
    [NLK, Keycode::KpSlash, Keycode::KpAsterisk, Keycode::KpMinus, ESC],
    [Keycode::Kp7, Keycode::Kp8, Keycode::Kp9, Keycode::KpPlus, BSP],
    [Keycode::Kp4, Keycode::Kp5, Keycode::Kp6, Keycode::KpDot, TAB],
    [Keycode::Kp1, Keycode::Kp2, Keycode::Kp3, Keycode::Kp0, ENT],
];

/// The macropad table as a [`KeyMapping`].
pub fn macropad_4x5() -> KeyMapping {
    KeyMapping {
        rows: MACROPAD_4X5.len(),
        columns: MACROPAD_4X5[0].len(),
        keys: MACROPAD_4X5.iter().flatten().copied().collect(),
    }
}
