//! The nine chapters of the game and the resources each one needs.

/// A named chapter of the game. Each part maps to a bytecode program, a
/// palette set, a polygon segment and, for gameplay parts, the shared
/// sprite-polygon segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePart {
    CopyProtection,
    Intro,
    Lake,
    Jail,
    City,
    Arena,
    Baths,
    Final,
    Password,
}

/// Resource ids for one game part.
pub struct PartResources {
    pub palettes: u8,
    pub bytecode: u8,
    pub polygons: u8,
    pub animations: Option<u8>,
}

/// Request ids 16..=24 address the parts directly; the shipped bytecode
/// uses the legacy 0x3E80-based range for the same purpose.
const PART_ID_BASE: u16 = 0x10;
const LEGACY_PART_ID_BASE: u16 = 0x3e80;

impl GamePart {
    pub const ALL: [GamePart; 9] = [
        GamePart::CopyProtection,
        GamePart::Intro,
        GamePart::Lake,
        GamePart::Jail,
        GamePart::City,
        GamePart::Arena,
        GamePart::Baths,
        GamePart::Final,
        GamePart::Password,
    ];

    /// Resolve a load-resource request id naming a game part.
    pub fn from_request_id(id: u16) -> Option<GamePart> {
        let index = match id {
            PART_ID_BASE..=0x18 => id - PART_ID_BASE,
            LEGACY_PART_ID_BASE..=0x3e88 => id - LEGACY_PART_ID_BASE,
            _ => return None,
        };
        Some(Self::ALL[index as usize])
    }

    pub fn resources(self) -> PartResources {
        // The sprite-polygon segment 0x11 is shared by all gameplay parts.
        match self {
            GamePart::CopyProtection => PartResources {
                palettes: 0x14,
                bytecode: 0x15,
                polygons: 0x16,
                animations: None,
            },
            GamePart::Intro => PartResources {
                palettes: 0x17,
                bytecode: 0x18,
                polygons: 0x19,
                animations: None,
            },
            GamePart::Lake => PartResources {
                palettes: 0x1a,
                bytecode: 0x1b,
                polygons: 0x1c,
                animations: Some(0x11),
            },
            GamePart::Jail => PartResources {
                palettes: 0x1d,
                bytecode: 0x1e,
                polygons: 0x1f,
                animations: Some(0x11),
            },
            GamePart::City => PartResources {
                palettes: 0x20,
                bytecode: 0x21,
                polygons: 0x22,
                animations: Some(0x11),
            },
            GamePart::Arena => PartResources {
                palettes: 0x23,
                bytecode: 0x24,
                polygons: 0x25,
                animations: None,
            },
            GamePart::Baths => PartResources {
                palettes: 0x26,
                bytecode: 0x27,
                polygons: 0x28,
                animations: Some(0x11),
            },
            GamePart::Final => PartResources {
                palettes: 0x29,
                bytecode: 0x2a,
                polygons: 0x2b,
                animations: Some(0x11),
            },
            GamePart::Password => PartResources {
                palettes: 0x7d,
                bytecode: 0x7e,
                polygons: 0x7f,
                animations: None,
            },
        }
    }

    /// Whether the password screen may be requested from this part.
    pub fn allows_password_screen(self) -> bool {
        !matches!(self, GamePart::CopyProtection | GamePart::Password)
    }
}
