use serde::{Deserialize, Serialize};

/// One cell of the mining automaton. Each variant is a single byte so whole
/// rows can be shipped through the shared-memory coordinator and the final
/// gather without any re-encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// Solid ground. Settles downward when undermined.
    Earth = b'e',
    /// Open sky above the ground line.
    Air = b'a',
    /// The material of interest; drills chew through it.
    Coal = b'c',
    /// A drill head sitting inside the coal seam.
    Drill = b'd',
    /// A rising bubble left behind by drilling.
    Void = b'v',
    /// A bubble that collapsed in place and no longer moves.
    StaticVoid = b's',
    /// Sentinel produced by reads resolved under `BoundPolicy::Ignore`.
    /// Never stored in a grid; inert under every update rule.
    Boundary = b'?',
}

impl Cell {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Cell> {
        match byte {
            b'e' => Some(Cell::Earth),
            b'a' => Some(Cell::Air),
            b'c' => Some(Cell::Coal),
            b'd' => Some(Cell::Drill),
            b'v' => Some(Cell::Void),
            b's' => Some(Cell::StaticVoid),
            b'?' => Some(Cell::Boundary),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip() {
        for cell in [
            Cell::Earth,
            Cell::Air,
            Cell::Coal,
            Cell::Drill,
            Cell::Void,
            Cell::StaticVoid,
            Cell::Boundary,
        ] {
            assert_eq!(Cell::from_byte(cell.as_byte()), Some(cell));
        }
    }

    #[test]
    fn unknown_byte_is_rejected() {
        assert_eq!(Cell::from_byte(b'x'), None);
        assert_eq!(Cell::from_byte(0), None);
    }
}
