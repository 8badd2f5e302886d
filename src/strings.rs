//! Static table of the strings the bytecode can draw.
//!
//! The original interpreter kept these in the executable rather than in
//! the bank files, so they live here as a sorted table keyed by the id the
//! draw-string instruction carries.

use crate::errors::{Error, Result};

/// Look up the text for `id`.
pub fn lookup(id: u16) -> Result<&'static str> {
    STRINGS
        .binary_search_by_key(&id, |&(id, _)| id)
        .map(|index| STRINGS[index].1)
        .map_err(|_| Error::InvalidStringId(id))
}

/// Sorted by id.
const STRINGS: &[(u16, &str)] = &[
    (0x001, "P E A N U T  3000"),
    (0x002, "Copyright  \u{7f} 1990 Peanut Computer, Inc.\nAll rights reserved.\n\nCDOS Version 5.01"),
    (0x003, "2"),
    (0x004, "3"),
    (0x005, "."),
    (0x006, "A"),
    (0x007, "@"),
    (0x008, "<left>"),
    (0x009, "<right>"),
    (0x00a, "<up>"),
    (0x00b, "<down>"),
    (0x00c, "<pause>"),
    (0x00d, "<break>"),
    (0x00e, "NOTE: This disk is the property of the Great Authority of Delphine.\nAnyone caught copying it will be sentenced to death!"),
    (0x00f, "WAIT..."),
    (0x010, " COPY PROTECTION "),
    (0x011, "PLEASE ENTER THE CODE\nCORRESPONDING TO THE SYMBOLS\nDISPLAYED ON THE WHEEL"),
    (0x012, "    CODE:"),
    (0x013, "WRONG CODE.\nTRY AGAIN."),
    (0x014, "LOADING..."),
    (0x015, "              ERROR"),
    (0x016, "PRESS THE ACTION KEY"),
    (0x060, "ACCESS CODE:"),
    (0x061, "PRESS BUTTON OR RETURN TO CONTINUE"),
    (0x062, "   ENTER ACCESS CODE"),
    (0x063, "   INVALID PASSWORD !"),
    (0x064, "ANNULE"),
    (0x15e, "PROCESSING DATA"),
    (0x15f, "RUN PROGRAM"),
    (0x160, "SECTION  9"),
    (0x161, "EXCAVATION SITE"),
    (0x162, "ANALYSIS IN PROGRESS"),
    (0x163, "POWER: 0.03 TW"),
    (0x164, "PARTICLE ACCELERATOR ON"),
    (0x165, "TARGET: 147 GEV"),
    (0x166, "ANOMALY DETECTED"),
    (0x190, "GOOD EVENING PROFESSOR."),
    (0x191, "IDENTIFICATION POSITIVE."),
    (0x192, "STARTING EXPERIMENT SEQUENCE."),
    (0x193, "COUNTDOWN ENGAGED."),
    (0x194, "T MINUS TEN SECONDS."),
    (0x195, "INJECTION COMPLETE."),
    (0x196, "COLLISION IMMINENT."),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_id_resolves() {
        assert_eq!(lookup(0x001).unwrap(), "P E A N U T  3000");
        assert_eq!(lookup(0x160).unwrap(), "SECTION  9");
    }

    #[test]
    fn unknown_id_is_an_error() {
        assert!(matches!(lookup(0xdead), Err(Error::InvalidStringId(0xdead))));
    }

    #[test]
    fn table_is_sorted_and_unique() {
        for pair in STRINGS.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }
}
