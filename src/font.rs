//! The 8×8 bitmap font used by the string-drawing instruction.
//!
//! One byte per row, most significant bit leftmost. Glyphs cover the
//! printable ASCII range; the game text is uppercase-only, so the
//! lowercase slots reuse the uppercase shapes.

pub const CHAR_WIDTH: usize = 8;
pub const CHAR_HEIGHT: usize = 8;

pub const FONT_FIRST_CHAR: u8 = 0x20;
pub const FONT_LAST_CHAR: u8 = 0x7f;

/// The glyph rows for `c`, or `None` when the font does not cover it.
pub fn glyph(c: u8) -> Option<&'static [u8; CHAR_HEIGHT]> {
    if !(FONT_FIRST_CHAR..=FONT_LAST_CHAR).contains(&c) {
        return None;
    }
    let offset = (c - FONT_FIRST_CHAR) as usize * CHAR_HEIGHT;
    FONT[offset..offset + CHAR_HEIGHT].try_into().ok()
}

#[rustfmt::skip]
pub static FONT: [u8; (FONT_LAST_CHAR - FONT_FIRST_CHAR + 1) as usize * CHAR_HEIGHT] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //  
    0x40, 0x40, 0x40, 0x40, 0x00, 0x40, 0x00, 0x00, // !
    0xa0, 0xa0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // "
    0x50, 0xf0, 0x50, 0x50, 0xf0, 0x50, 0x00, 0x00, // #
    0x20, 0x78, 0xa0, 0x70, 0x28, 0xf0, 0x20, 0x00, // $
    0xc8, 0xc8, 0x10, 0x20, 0x4c, 0x8c, 0x00, 0x00, // %
    0x60, 0x90, 0x90, 0x60, 0x98, 0x90, 0x68, 0x00, // &
    0x40, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // '
    0x20, 0x40, 0x80, 0x80, 0x80, 0x40, 0x20, 0x00, // (
    0x80, 0x40, 0x20, 0x20, 0x20, 0x40, 0x80, 0x00, // )
    0xa8, 0x70, 0xf8, 0x70, 0xa8, 0x00, 0x00, 0x00, // *
    0x20, 0x20, 0xf8, 0x20, 0x20, 0x00, 0x00, 0x00, // +
    0x40, 0x40, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, // ,
    0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // -
    0xc0, 0xc0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // .
    0x08, 0x10, 0x20, 0x40, 0x80, 0x00, 0x00, 0x00, // /
    0x70, 0x88, 0x98, 0xa8, 0xc8, 0x88, 0x70, 0x00, // 0
    0x20, 0x60, 0x20, 0x20, 0x20, 0x20, 0x70, 0x00, // 1
    0x70, 0x88, 0x08, 0x30, 0x40, 0x80, 0xf8, 0x00, // 2
    0x70, 0x88, 0x08, 0x30, 0x08, 0x88, 0x70, 0x00, // 3
    0x10, 0x30, 0x50, 0x90, 0xf8, 0x10, 0x10, 0x00, // 4
    0xf8, 0x80, 0xf0, 0x08, 0x08, 0x88, 0x70, 0x00, // 5
    0x70, 0x80, 0x80, 0xf0, 0x88, 0x88, 0x70, 0x00, // 6
    0xf8, 0x08, 0x10, 0x20, 0x40, 0x40, 0x40, 0x00, // 7
    0x70, 0x88, 0x88, 0x70, 0x88, 0x88, 0x70, 0x00, // 8
    0x70, 0x88, 0x88, 0x78, 0x08, 0x08, 0x70, 0x00, // 9
    0xc0, 0xc0, 0x00, 0xc0, 0xc0, 0x00, 0x00, 0x00, // :
    0x40, 0x40, 0x00, 0x40, 0x40, 0x80, 0x00, 0x00, // ;
    0x10, 0x20, 0x40, 0x80, 0x40, 0x20, 0x10, 0x00, // <
    0xf0, 0x00, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, // =
    0x80, 0x40, 0x20, 0x10, 0x20, 0x40, 0x80, 0x00, // >
    0x70, 0x88, 0x08, 0x30, 0x20, 0x00, 0x20, 0x00, // ?
    0x70, 0x88, 0xb8, 0xa8, 0xb8, 0x80, 0x70, 0x00, // @
    0x70, 0x88, 0x88, 0xf8, 0x88, 0x88, 0x88, 0x00, // A
    0xf0, 0x88, 0x88, 0xf0, 0x88, 0x88, 0xf0, 0x00, // B
    0x70, 0x88, 0x80, 0x80, 0x80, 0x88, 0x70, 0x00, // C
    0xf0, 0x88, 0x88, 0x88, 0x88, 0x88, 0xf0, 0x00, // D
    0xf8, 0x80, 0x80, 0xf0, 0x80, 0x80, 0xf8, 0x00, // E
    0xf8, 0x80, 0x80, 0xf0, 0x80, 0x80, 0x80, 0x00, // F
    0x70, 0x88, 0x80, 0xb8, 0x88, 0x88, 0x70, 0x00, // G
    0x88, 0x88, 0x88, 0xf8, 0x88, 0x88, 0x88, 0x00, // H
    0xe0, 0x40, 0x40, 0x40, 0x40, 0x40, 0xe0, 0x00, // I
    0x38, 0x10, 0x10, 0x10, 0x10, 0x90, 0x60, 0x00, // J
    0x88, 0x90, 0xa0, 0xc0, 0xa0, 0x90, 0x88, 0x00, // K
    0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0xf8, 0x00, // L
    0x88, 0xd8, 0xa8, 0xa8, 0x88, 0x88, 0x88, 0x00, // M
    0x88, 0xc8, 0xa8, 0x98, 0x88, 0x88, 0x88, 0x00, // N
    0x70, 0x88, 0x88, 0x88, 0x88, 0x88, 0x70, 0x00, // O
    0xf0, 0x88, 0x88, 0xf0, 0x80, 0x80, 0x80, 0x00, // P
    0x70, 0x88, 0x88, 0x88, 0xa8, 0x90, 0x68, 0x00, // Q
    0xf0, 0x88, 0x88, 0xf0, 0xa0, 0x90, 0x88, 0x00, // R
    0x78, 0x80, 0x80, 0x70, 0x08, 0x08, 0xf0, 0x00, // S
    0xf8, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x00, // T
    0x88, 0x88, 0x88, 0x88, 0x88, 0x88, 0x70, 0x00, // U
    0x88, 0x88, 0x88, 0x88, 0x88, 0x50, 0x20, 0x00, // V
    0x88, 0x88, 0x88, 0xa8, 0xa8, 0xd8, 0x88, 0x00, // W
    0x88, 0x88, 0x50, 0x20, 0x50, 0x88, 0x88, 0x00, // X
    0x88, 0x88, 0x50, 0x20, 0x20, 0x20, 0x20, 0x00, // Y
    0xf8, 0x08, 0x10, 0x20, 0x40, 0x80, 0xf8, 0x00, // Z
    0x70, 0x40, 0x40, 0x40, 0x40, 0x40, 0x70, 0x00, // [
    0x80, 0x40, 0x20, 0x10, 0x08, 0x00, 0x00, 0x00, // backslash
    0xe0, 0x20, 0x20, 0x20, 0x20, 0x20, 0xe0, 0x00, // ]
    0x20, 0x50, 0x88, 0x00, 0x00, 0x00, 0x00, 0x00, // ^
    0xf8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // _
    0x80, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // `
    0x70, 0x88, 0x88, 0xf8, 0x88, 0x88, 0x88, 0x00, // a
    0xf0, 0x88, 0x88, 0xf0, 0x88, 0x88, 0xf0, 0x00, // b
    0x70, 0x88, 0x80, 0x80, 0x80, 0x88, 0x70, 0x00, // c
    0xf0, 0x88, 0x88, 0x88, 0x88, 0x88, 0xf0, 0x00, // d
    0xf8, 0x80, 0x80, 0xf0, 0x80, 0x80, 0xf8, 0x00, // e
    0xf8, 0x80, 0x80, 0xf0, 0x80, 0x80, 0x80, 0x00, // f
    0x70, 0x88, 0x80, 0xb8, 0x88, 0x88, 0x70, 0x00, // g
    0x88, 0x88, 0x88, 0xf8, 0x88, 0x88, 0x88, 0x00, // h
    0xe0, 0x40, 0x40, 0x40, 0x40, 0x40, 0xe0, 0x00, // i
    0x38, 0x10, 0x10, 0x10, 0x10, 0x90, 0x60, 0x00, // j
    0x88, 0x90, 0xa0, 0xc0, 0xa0, 0x90, 0x88, 0x00, // k
    0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0xf8, 0x00, // l
    0x88, 0xd8, 0xa8, 0xa8, 0x88, 0x88, 0x88, 0x00, // m
    0x88, 0xc8, 0xa8, 0x98, 0x88, 0x88, 0x88, 0x00, // n
    0x70, 0x88, 0x88, 0x88, 0x88, 0x88, 0x70, 0x00, // o
    0xf0, 0x88, 0x88, 0xf0, 0x80, 0x80, 0x80, 0x00, // p
    0x70, 0x88, 0x88, 0x88, 0xa8, 0x90, 0x68, 0x00, // q
    0xf0, 0x88, 0x88, 0xf0, 0xa0, 0x90, 0x88, 0x00, // r
    0x78, 0x80, 0x80, 0x70, 0x08, 0x08, 0xf0, 0x00, // s
    0xf8, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x00, // t
    0x88, 0x88, 0x88, 0x88, 0x88, 0x88, 0x70, 0x00, // u
    0x88, 0x88, 0x88, 0x88, 0x88, 0x50, 0x20, 0x00, // v
    0x88, 0x88, 0x88, 0xa8, 0xa8, 0xd8, 0x88, 0x00, // w
    0x88, 0x88, 0x50, 0x20, 0x50, 0x88, 0x88, 0x00, // x
    0x88, 0x88, 0x50, 0x20, 0x20, 0x20, 0x20, 0x00, // y
    0xf8, 0x08, 0x10, 0x20, 0x40, 0x80, 0xf8, 0x00, // z
    0x30, 0x40, 0x40, 0x80, 0x40, 0x40, 0x30, 0x00, // {
    0x40, 0x40, 0x40, 0x40, 0x40, 0x40, 0x40, 0x00, // |
    0xc0, 0x20, 0x20, 0x10, 0x20, 0x20, 0xc0, 0x00, // }
    0x48, 0xa8, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00, // ~
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // DEL
];
