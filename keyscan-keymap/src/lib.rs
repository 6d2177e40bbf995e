//! Key symbols and matrix-position mappings for keyscan.
//!
//! This crate is `no_std` (with `alloc`) so mapping tables can be shared
//! between a host-side driver and a sampler running on the device itself.

#![no_std]

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;

pub mod layouts;

/// A single matrix intersection. Ordering is row-major ascending.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// USB HID keycodes.
/// See USB HID Usage Tables, Section 10 (Keyboard/Keypad Page 0x07).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Keycode {
    // Letters
    A = 0x04,
    B = 0x05,
    C = 0x06,
    D = 0x07,
    E = 0x08,
    F = 0x09,
    G = 0x0A,
    H = 0x0B,
    I = 0x0C,
    J = 0x0D,
    K = 0x0E,
    L = 0x0F,
    M = 0x10,
    N = 0x11,
    O = 0x12,
    P = 0x13,
    Q = 0x14,
    R = 0x15,
    S = 0x16,
    T = 0x17,
    U = 0x18,
    V = 0x19,
    W = 0x1A,
    X = 0x1B,
    Y = 0x1C,
    Z = 0x1D,

    // Numbers
    N1 = 0x1E,
    N2 = 0x1F,
    N3 = 0x20,
    N4 = 0x21,
    N5 = 0x22,
    N6 = 0x23,
    N7 = 0x24,
    N8 = 0x25,
    N9 = 0x26,
    N0 = 0x27,

    // Control keys
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equal = 0x2E,
    LBracket = 0x2F,
    RBracket = 0x30,
    Backslash = 0x31,
    Semicolon = 0x33,
    Quote = 0x34,
    Grave = 0x35,
    Comma = 0x36,
    Dot = 0x37,
    Slash = 0x38,
    CapsLock = 0x39,

    // Function keys
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,

    // Navigation
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    Right = 0x4F,
    Left = 0x50,
    Down = 0x51,
    Up = 0x52,

    // Keypad
    NumLock = 0x53,
    KpSlash = 0x54,
    KpAsterisk = 0x55,
    KpMinus = 0x56,
    KpPlus = 0x57,
    KpEnter = 0x58,
    Kp1 = 0x59,
    Kp2 = 0x5A,
    Kp3 = 0x5B,
    Kp4 = 0x5C,
    Kp5 = 0x5D,
    Kp6 = 0x5E,
    Kp7 = 0x5F,
    Kp8 = 0x60,
    Kp9 = 0x61,
    Kp0 = 0x62,
    KpDot = 0x63,

    // Modifiers
    LCtrl = 0xE0,
    LShift = 0xE1,
    LAlt = 0xE2,
    LGui = 0xE3,
    RCtrl = 0xE4,
    RShift = 0xE5,
    RAlt = 0xE6,
    RGui = 0xE7,
}

impl Keycode {
    /// Every keycode, in usage order.
    pub const ALL: [Keycode; 103] = {
        use Keycode::*;
        [
            A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
            N1, N2, N3, N4, N5, N6, N7, N8, N9, N0,
            Enter, Escape, Backspace, Tab, Space, Minus, Equal, LBracket, RBracket, Backslash,
            Semicolon, Quote, Grave, Comma, Dot, Slash, CapsLock,
            F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
            PrintScreen, ScrollLock, Pause, Insert, Home, PageUp, Delete, End, PageDown,
            Right, Left, Down, Up,
            NumLock, KpSlash, KpAsterisk, KpMinus, KpPlus, KpEnter,
            Kp1, Kp2, Kp3, Kp4, Kp5, Kp6, Kp7, Kp8, Kp9, Kp0, KpDot,
            LCtrl, LShift, LAlt, LGui, RCtrl, RShift, RAlt, RGui,
        ]
    };

    /// Canonical name, as accepted in key mapping tables.
    pub fn name(self) -> &'static str {
        match self {
            Keycode::A => "A",
            Keycode::B => "B",
            Keycode::C => "C",
            Keycode::D => "D",
            Keycode::E => "E",
            Keycode::F => "F",
            Keycode::G => "G",
            Keycode::H => "H",
            Keycode::I => "I",
            Keycode::J => "J",
            Keycode::K => "K",
            Keycode::L => "L",
            Keycode::M => "M",
            Keycode::N => "N",
            Keycode::O => "O",
            Keycode::P => "P",
            Keycode::Q => "Q",
            Keycode::R => "R",
            Keycode::S => "S",
            Keycode::T => "T",
            Keycode::U => "U",
            Keycode::V => "V",
            Keycode::W => "W",
            Keycode::X => "X",
            Keycode::Y => "Y",
            Keycode::Z => "Z",
            Keycode::N1 => "1",
            Keycode::N2 => "2",
            Keycode::N3 => "3",
            Keycode::N4 => "4",
            Keycode::N5 => "5",
            Keycode::N6 => "6",
            Keycode::N7 => "7",
            Keycode::N8 => "8",
            Keycode::N9 => "9",
            Keycode::N0 => "0",
            Keycode::Enter => "Enter",
            Keycode::Escape => "Escape",
            Keycode::Backspace => "Backspace",
            Keycode::Tab => "Tab",
            Keycode::Space => "Space",
            Keycode::Minus => "Minus",
            Keycode::Equal => "Equal",
            Keycode::LBracket => "LBracket",
            Keycode::RBracket => "RBracket",
            Keycode::Backslash => "Backslash",
            Keycode::Semicolon => "Semicolon",
            Keycode::Quote => "Quote",
            Keycode::Grave => "Grave",
            Keycode::Comma => "Comma",
            Keycode::Dot => "Dot",
            Keycode::Slash => "Slash",
            Keycode::CapsLock => "CapsLock",
            Keycode::F1 => "F1",
            Keycode::F2 => "F2",
            Keycode::F3 => "F3",
            Keycode::F4 => "F4",
            Keycode::F5 => "F5",
            Keycode::F6 => "F6",
            Keycode::F7 => "F7",
            Keycode::F8 => "F8",
            Keycode::F9 => "F9",
            Keycode::F10 => "F10",
            Keycode::F11 => "F11",
            Keycode::F12 => "F12",
            Keycode::PrintScreen => "PrintScreen",
            Keycode::ScrollLock => "ScrollLock",
            Keycode::Pause => "Pause",
            Keycode::Insert => "Insert",
            Keycode::Home => "Home",
            Keycode::PageUp => "PageUp",
            Keycode::Delete => "Delete",
            Keycode::End => "End",
            Keycode::PageDown => "PageDown",
            Keycode::Right => "Right",
            Keycode::Left => "Left",
            Keycode::Down => "Down",
            Keycode::Up => "Up",
            Keycode::NumLock => "NumLock",
            Keycode::KpSlash => "KpSlash",
            Keycode::KpAsterisk => "KpAsterisk",
            Keycode::KpMinus => "KpMinus",
            Keycode::KpPlus => "KpPlus",
            Keycode::KpEnter => "KpEnter",
            Keycode::Kp1 => "Kp1",
            Keycode::Kp2 => "Kp2",
            Keycode::Kp3 => "Kp3",
            Keycode::Kp4 => "Kp4",
            Keycode::Kp5 => "Kp5",
            Keycode::Kp6 => "Kp6",
            Keycode::Kp7 => "Kp7",
            Keycode::Kp8 => "Kp8",
            Keycode::Kp9 => "Kp9",
            Keycode::Kp0 => "Kp0",
            Keycode::KpDot => "KpDot",
            Keycode::LCtrl => "LCtrl",
            Keycode::LShift => "LShift",
            Keycode::LAlt => "LAlt",
            Keycode::LGui => "LGui",
            Keycode::RCtrl => "RCtrl",
            Keycode::RShift => "RShift",
            Keycode::RAlt => "RAlt",
            Keycode::RGui => "RGui",
        }
    }

    /// Short spellings accepted in addition to the canonical name.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Keycode::Enter => &["Ent", "Return"],
            Keycode::Escape => &["Esc"],
            Keycode::Backspace => &["Bksp", "BSpace"],
            Keycode::Space => &["Spc"],
            Keycode::Delete => &["Del"],
            Keycode::Insert => &["Ins"],
            Keycode::PageUp => &["PgUp"],
            Keycode::PageDown => &["PgDn"],
            Keycode::PrintScreen => &["PrtSc"],
            Keycode::CapsLock => &["Caps"],
            Keycode::NumLock => &["NumLk"],
            Keycode::Dot => &["Period"],
            Keycode::LCtrl => &["Ctrl"],
            Keycode::LShift => &["Shift"],
            Keycode::LAlt => &["Alt"],
            Keycode::LGui => &["Gui", "Super"],
            _ => &[],
        }
    }

    /// Look up a keycode by canonical name or alias, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Keycode> {
        let name = name.trim();
        Self::ALL.iter().copied().find(|kc| {
            kc.name().eq_ignore_ascii_case(name)
                || kc.aliases().iter().any(|a| a.eq_ignore_ascii_case(name))
        })
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A position outside the mapping's R×C bounds was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("position {position} is outside the {rows}x{columns} matrix")]
pub struct OutOfRange {
    pub position: Position,
    pub rows: usize,
    pub columns: usize,
}

/// Reasons a mapping table cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("mapping must have at least one row and one column")]
    Empty,

    #[error("row {row} has {found} entries, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("no key mapped at {position}")]
    Missing { position: Position },

    #[error("unknown key name {name:?} at {position}")]
    UnknownKey {
        position: Position,
        name: alloc::string::String,
    },

    #[error("mapping has {found} rows, matrix has {expected}")]
    RowCount { expected: usize, found: usize },

    #[error("{positions} positions but only {available} sequential keys are available")]
    TooLarge { positions: usize, available: usize },
}

/// Immutable R×C table from matrix position to key symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapping {
    rows: usize,
    columns: usize,
    keys: Vec<Keycode>,
}

impl KeyMapping {
    /// Build from a rectangular table of keycodes.
    pub fn from_rows(table: Vec<Vec<Keycode>>) -> Result<Self, MappingError> {
        let rows = table.len();
        let columns = table.first().map_or(0, Vec::len);
        if rows == 0 || columns == 0 {
            return Err(MappingError::Empty);
        }

        let mut keys = Vec::with_capacity(rows * columns);
        for (row, entries) in table.into_iter().enumerate() {
            if entries.len() != columns {
                return Err(MappingError::Ragged {
                    row,
                    expected: columns,
                    found: entries.len(),
                });
            }
            keys.extend(entries);
        }

        Ok(Self {
            rows,
            columns,
            keys,
        })
    }

    /// Build an R×C mapping from key names. Every position must name a
    /// known key; blank names count as unmapped.
    pub fn from_names<S: AsRef<str>>(
        rows: usize,
        columns: usize,
        names: &[Vec<S>],
    ) -> Result<Self, MappingError> {
        if rows == 0 || columns == 0 {
            return Err(MappingError::Empty);
        }
        if names.len() > rows {
            return Err(MappingError::RowCount {
                expected: rows,
                found: names.len(),
            });
        }

        let mut keys = Vec::with_capacity(rows * columns);
        for row in 0..rows {
            let entries = names.get(row).map_or(&[][..], Vec::as_slice);
            if entries.len() > columns {
                return Err(MappingError::Ragged {
                    row,
                    expected: columns,
                    found: entries.len(),
                });
            }
            for col in 0..columns {
                let position = Position::new(row, col);
                let name = match entries.get(col) {
                    Some(name) if !name.as_ref().trim().is_empty() => name.as_ref(),
                    _ => return Err(MappingError::Missing { position }),
                };
                let kc = Keycode::from_name(name).ok_or_else(|| MappingError::UnknownKey {
                    position,
                    name: name.into(),
                })?;
                keys.push(kc);
            }
        }

        Ok(Self {
            rows,
            columns,
            keys,
        })
    }

    /// Assign keys in usage order, row-major: position `(r, c)` gets
    /// `Keycode::ALL[r * columns + c]`.
    pub fn sequential(rows: usize, columns: usize) -> Result<Self, MappingError> {
        if rows == 0 || columns == 0 {
            return Err(MappingError::Empty);
        }
        let positions = rows * columns;
        if positions > Keycode::ALL.len() {
            return Err(MappingError::TooLarge {
                positions,
                available: Keycode::ALL.len(),
            });
        }

        Ok(Self {
            rows,
            columns,
            keys: Keycode::ALL[..positions].to_vec(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Look up the key symbol for a matrix position.
    pub fn resolve(&self, position: Position) -> Result<Keycode, OutOfRange> {
        if position.row >= self.rows || position.col >= self.columns {
            return Err(OutOfRange {
                position,
                rows: self.rows,
                columns: self.columns,
            });
        }
        Ok(self.keys[position.row * self.columns + position.col])
    }

    /// All positions in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        let columns = self.columns;
        (0..self.rows).flat_map(move |row| (0..columns).map(move |col| Position::new(row, col)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec;

    #[test]
    fn test_name_lookup_is_case_insensitive() {
        assert_eq!(Keycode::from_name("esc"), Some(Keycode::Escape));
        assert_eq!(Keycode::from_name("ESCAPE"), Some(Keycode::Escape));
        assert_eq!(Keycode::from_name(" kp7 "), Some(Keycode::Kp7));
        assert_eq!(Keycode::from_name("1"), Some(Keycode::N1));
        assert_eq!(Keycode::from_name("Hyper"), None);
    }

    #[test]
    fn test_every_name_round_trips() {
        for kc in Keycode::ALL {
            assert_eq!(Keycode::from_name(kc.name()), Some(kc), "{}", kc.name());
        }
    }

    #[test]
    fn test_resolve_bounds() {
        let mapping = KeyMapping::sequential(4, 5).unwrap();
        assert_eq!(mapping.resolve(Position::new(0, 0)), Ok(Keycode::A));
        assert_eq!(mapping.resolve(Position::new(1, 2)), Ok(Keycode::H));
        assert_eq!(mapping.resolve(Position::new(3, 4)), Ok(Keycode::T));

        let err = mapping.resolve(Position::new(4, 0)).unwrap_err();
        assert_eq!(err.rows, 4);
        assert!(mapping.resolve(Position::new(0, 5)).is_err());
    }

    #[test]
    fn test_from_names_reports_missing_position() {
        let names = vec![vec!["A", "B"], vec!["C"]];
        assert_eq!(
            KeyMapping::from_names(2, 2, &names),
            Err(MappingError::Missing {
                position: Position::new(1, 1)
            })
        );

        let blank = vec![vec!["A", ""], vec!["C", "D"]];
        assert!(matches!(
            KeyMapping::from_names(2, 2, &blank),
            Err(MappingError::Missing { .. })
        ));
    }

    #[test]
    fn test_from_names_rejects_unknown_and_oversized() {
        let names = vec![vec![String::from("A"), String::from("Nope")]];
        assert!(matches!(
            KeyMapping::from_names(1, 2, &names),
            Err(MappingError::UnknownKey { .. })
        ));

        let wide = vec![vec!["A", "B", "C"]];
        assert!(matches!(
            KeyMapping::from_names(1, 2, &wide),
            Err(MappingError::Ragged { row: 0, .. })
        ));

        let tall = vec![vec!["A"], vec!["B"]];
        assert!(matches!(
            KeyMapping::from_names(1, 1, &tall),
            Err(MappingError::RowCount { .. })
        ));
    }

    #[test]
    fn test_from_rows_rejects_ragged_table() {
        let table = vec![vec![Keycode::A, Keycode::B], vec![Keycode::C]];
        assert!(matches!(
            KeyMapping::from_rows(table),
            Err(MappingError::Ragged { row: 1, .. })
        ));
        assert_eq!(KeyMapping::from_rows(vec![]), Err(MappingError::Empty));
    }

    #[test]
    fn test_positions_are_row_major() {
        let mapping = KeyMapping::sequential(2, 3).unwrap();
        let positions: Vec<Position> = mapping.positions().collect();
        assert_eq!(positions.len(), 6);
        assert_eq!(positions[0], Position::new(0, 0));
        assert_eq!(positions[3], Position::new(1, 0));
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
