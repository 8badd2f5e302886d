//! The video model: four indexed 320×200 buffers, palettes, buffer
//! selection with symbolic front/back aliases, and the draw operations the
//! bytecode can trigger.
//!
//! Draws always work on raw 4-bit color indices; the active palette is
//! only consulted when a buffer is presented to the host.

pub mod polygon;
pub mod raster;

use std::cell::Ref;
use std::cell::RefCell;

use tracing::{debug, trace, warn};

use crate::errors::{Error, Result};
use crate::font::{CHAR_HEIGHT, CHAR_WIDTH};
use crate::strings;

use self::raster::IndexedImage;

/// Native screen resolution of the game.
pub const SCREEN_RESOLUTION: [usize; 2] = [320, 200];

pub const PALETTE_SIZE: usize = 16;

/// Palettes per palette resource. The resource actually holds a second set
/// of 32 legacy EGA palettes behind these; it is ignored.
pub const NUM_PALETTES: usize = 32;

/// Bytes of one palette within a palette resource.
const PALETTE_STRIDE: usize = PALETTE_SIZE * 2;

/// Zoom factor meaning 1×. Polygon coordinates are multiplied by the zoom
/// and divided by this.
pub const DEFAULT_ZOOM: u16 = 0x40;

/// A single color from a game palette, components widened to cover the u8
/// range.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Default, Clone)]
pub struct Palette([Color; PALETTE_SIZE]);

impl Palette {
    /// Set the palette from its 32-byte resource form: 16 colors of 2
    /// bytes each, holding a 12-bit R4G4B4 triple.
    pub fn set(&mut self, palette: &[u8; PALETTE_STRIDE]) {
        for i in 0..PALETTE_SIZE {
            let c1 = palette[i * 2];
            let c2 = palette[i * 2 + 1];

            let r = c1 & 0x0f;
            let g = (c2 & 0xf0) >> 4;
            let b = c2 & 0x0f;

            let col = &mut self.0[i];
            // Only 4 significant bits per channel; replicate them into the
            // low bits so full intensity maps to 0xff.
            col.r = (r << 4) | r;
            col.g = (g << 4) | g;
            col.b = (b << 4) | b;
        }
    }

    /// The RGB color for `color_idx` ∈ 0..16.
    pub fn lookup(&self, color_idx: u8) -> &Color {
        &self.0[color_idx as usize & 0xf]
    }
}

/// How a buffer operand of a video instruction designates its buffer.
/// `Front` and `Back` resolve to concrete indices at use time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferId {
    Front,
    Back,
    Specific(u8),
}

impl BufferId {
    pub fn parse(raw: u8) -> Result<BufferId> {
        match raw {
            0xff => Ok(BufferId::Back),
            0xfe => Ok(BufferId::Front),
            0..=3 => Ok(BufferId::Specific(raw)),
            // The "restore touched areas" flag of the original renderer;
            // the low bits still name the buffer.
            raw if raw & 0xfc == 0x40 => Ok(BufferId::Specific(raw & 0x3)),
            _ => Err(Error::InvalidBufferId(raw)),
        }
    }
}

/// Per-pixel color strategy of a polygon or span draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    /// Write the color index as-is.
    Solid(u8),
    /// OR 0x8 into the pixel, mapping colors 0..8 into 8..16.
    Highlight,
    /// Copy the corresponding pixel of buffer 0.
    Mask,
}

impl DrawMode {
    /// Interpret a color byte embedded in polygon data.
    pub fn from_polygon_color(color: u8) -> DrawMode {
        match color {
            0x00..=0x0f => DrawMode::Solid(color),
            0x10 => DrawMode::Highlight,
            _ => DrawMode::Mask,
        }
    }
}

/// The two polygon segments draws can source from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PolySegment {
    /// The per-part polygon resource.
    Polygons,
    /// The shared sprite-polygon resource of gameplay parts.
    Animations,
}

/// The whole video subsystem: buffers, selection state, palettes and the
/// polygon segments of the current game part.
pub struct Video {
    buffers: Box<[RefCell<IndexedImage>; 4]>,
    /// Target of draw operations.
    target: usize,
    /// Buffer currently on display.
    front: usize,
    /// Buffer being prepared for display.
    back: usize,
    /// Raw palette resource of the current part.
    palettes: Vec<u8>,
    /// Palette applied when presenting.
    palette: Palette,
    polygons: Vec<u8>,
    animations: Vec<u8>,
}

impl Video {
    pub fn new() -> Video {
        Video {
            buffers: Box::new([
                RefCell::new(Default::default()),
                RefCell::new(Default::default()),
                RefCell::new(Default::default()),
                RefCell::new(Default::default()),
            ]),
            target: 2,
            front: 2,
            back: 1,
            palettes: Vec::new(),
            palette: Default::default(),
            polygons: Vec::new(),
            animations: Vec::new(),
        }
    }

    /// Install the video resources of a freshly-loaded game part.
    pub fn set_part_data(
        &mut self,
        palettes: Vec<u8>,
        polygons: Vec<u8>,
        animations: Option<Vec<u8>>,
    ) {
        self.palettes = palettes;
        self.polygons = polygons;
        self.animations = animations.unwrap_or_default();
    }

    fn resolve(&self, id: BufferId) -> usize {
        match id {
            BufferId::Front => self.front,
            BufferId::Back => self.back,
            BufferId::Specific(n) => n as usize,
        }
    }

    pub fn resolve_raw(&self, raw: u8) -> Result<usize> {
        Ok(self.resolve(BufferId::parse(raw)?))
    }

    /// Select the buffer that subsequent draws target.
    pub fn select_target(&mut self, raw: u8) -> Result<usize> {
        self.target = self.resolve_raw(raw)?;
        trace!("select_target {:x} ({:x})", raw, self.target);
        Ok(self.target)
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Set every pixel of a buffer to `color`.
    pub fn fill(&mut self, raw: u8, color: u8) -> Result<usize> {
        if color > 0xf {
            return Err(Error::InvalidColorId(color));
        }
        let index = self.resolve_raw(raw)?;
        trace!("fill {:x} ({:x}) <- {:02x}", raw, index, color);
        self.buffers[index].borrow_mut().fill(color);
        Ok(index)
    }

    /// Copy buffer `src` into `dst`, shifted down by `vscroll` rows.
    /// Out-of-bounds rows are dropped.
    pub fn copy(&mut self, src: usize, dst: usize, vscroll: i16) {
        if src == dst {
            warn!("cannot copy video buffer into itself");
            return;
        }
        if !(-199..=199).contains(&vscroll) {
            warn!("out-of-range vscroll for buffer copy: {}", vscroll);
            return;
        }

        let src = self.buffers[src].borrow();
        let mut dst = self.buffers[dst].borrow_mut();
        dst.copy_from(&src, vscroll);
    }

    /// Make the palette `id` the one used for presentation.
    pub fn select_palette(&mut self, id: u8) -> Result<()> {
        if id as usize >= NUM_PALETTES {
            return Err(Error::InvalidPaletteId(id));
        }
        let start = id as usize * PALETTE_STRIDE;
        let end = start + PALETTE_STRIDE;
        if end > self.palettes.len() {
            return Err(Error::TruncatedData);
        }
        let raw: &[u8; PALETTE_STRIDE] = self.palettes[start..end]
            .try_into()
            .map_err(|_| Error::TruncatedData)?;
        self.palette.set(raw);
        debug!("select_palette {}", id);
        Ok(())
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Resolve the buffer to present next, rotating the front/back aliases
    /// when the back buffer is the one being shown.
    pub fn render(&mut self, raw: u8) -> Result<usize> {
        match BufferId::parse(raw)? {
            BufferId::Front => (),
            BufferId::Back => std::mem::swap(&mut self.front, &mut self.back),
            BufferId::Specific(n) => self.front = n as usize,
        }
        trace!("render {:x} -> front {:x}", raw, self.front);
        Ok(self.front)
    }

    /// Draw string `id` with its top-left corner at column `x`, row `y`.
    /// Returns the buffer drawn into.
    pub fn draw_string(&mut self, id: u16, x: u8, y: u8, color: u8) -> Result<usize> {
        if color > 0xf {
            return Err(Error::InvalidColorId(color));
        }
        let string = strings::lookup(id)?;

        let start_x = x as i32 * CHAR_WIDTH as i32;
        let mut x = start_x;
        let mut y = y as i32;
        let mut dst = self.buffers[self.target].borrow_mut();
        for c in string.chars() {
            match c {
                '\n' => {
                    y += CHAR_HEIGHT as i32;
                    x = start_x;
                }
                c if c.is_ascii() => {
                    dst.draw_char((x, y), color, c as u8);
                    x += CHAR_WIDTH as i32;
                }
                c => warn!("non-ASCII character {:?} in string {:#06x}", c, id),
            }
        }

        Ok(self.target)
    }

    /// Expand a raw planar bitmap resource into buffer 0.
    pub fn blit_bitmap(&mut self, data: &[u8]) -> Result<()> {
        self.buffers[0].borrow_mut().set_content(data)
    }

    /// Draw the polygon tree rooted at `addr` of `segment`, centered on
    /// `pos` and scaled by `zoom`/64. Returns the buffer drawn into.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn draw_polygons(
        &mut self,
        segment: PolySegment,
        addr: u16,
        pos: (i16, i16),
        zoom: u16,
    ) -> Result<usize> {
        let Video {
            buffers,
            target,
            polygons,
            animations,
            ..
        } = self;
        let data: &[u8] = match segment {
            PolySegment::Polygons => polygons,
            PolySegment::Animations => {
                if animations.is_empty() {
                    warn!("draw from missing animations segment");
                    return Ok(*target);
                }
                animations
            }
        };

        let target = *target;
        let buffers: &[RefCell<IndexedImage>; 4] = buffers;
        polygon::walk(
            data,
            addr,
            (pos.0 as i32, pos.1 as i32),
            zoom,
            &mut |poly, color| {
                raster::fill_polygon(buffers, target, poly, DrawMode::from_polygon_color(color));
            },
        )?;
        Ok(target)
    }

    /// Read access to a buffer, for presentation and tests.
    pub fn buffer(&self, index: usize) -> Ref<'_, IndexedImage> {
        self.buffers[index].borrow()
    }
}

impl Default for Video {
    fn default() -> Self {
        Video::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_unpacks_r4g4b4() {
        let mut raw = [0u8; PALETTE_STRIDE];
        // Color 1: r = 0xf, g = 0xa, b = 0x5.
        raw[2] = 0x0f;
        raw[3] = 0xa5;

        let mut palette = Palette::default();
        palette.set(&raw);

        assert_eq!(palette.lookup(0), &Color { r: 0, g: 0, b: 0 });
        assert_eq!(
            palette.lookup(1),
            &Color {
                r: 0xff,
                g: 0xaa,
                b: 0x55
            }
        );
    }

    #[test]
    fn buffer_id_parsing() {
        assert_eq!(BufferId::parse(0xff).unwrap(), BufferId::Back);
        assert_eq!(BufferId::parse(0xfe).unwrap(), BufferId::Front);
        assert_eq!(BufferId::parse(2).unwrap(), BufferId::Specific(2));
        assert_eq!(BufferId::parse(0x41).unwrap(), BufferId::Specific(1));
        assert!(matches!(
            BufferId::parse(0x17),
            Err(Error::InvalidBufferId(0x17))
        ));
    }

    #[test]
    fn render_rotates_back_and_front() {
        let mut video = Video::new();
        assert_eq!(video.front, 2);
        assert_eq!(video.back, 1);

        // Presenting the back buffer swaps the aliases.
        assert_eq!(video.render(0xff).unwrap(), 1);
        assert_eq!(video.back, 2);

        // Presenting the front buffer changes nothing.
        assert_eq!(video.render(0xfe).unwrap(), 1);
        assert_eq!(video.back, 2);

        // Presenting a specific buffer retargets the front only.
        assert_eq!(video.render(0x03).unwrap(), 3);
        assert_eq!(video.back, 2);
    }

    #[test]
    fn fill_is_idempotent() {
        let mut video = Video::new();
        video.fill(0, 0x7).unwrap();
        let once: Vec<u8> = video.buffer(0).pixels().to_vec();
        video.fill(0, 0x7).unwrap();
        assert_eq!(video.buffer(0).pixels()[..], once[..]);
    }

    #[test]
    fn fill_rejects_bad_color() {
        let mut video = Video::new();
        assert!(matches!(
            video.fill(0, 0x10),
            Err(Error::InvalidColorId(0x10))
        ));
    }

    #[test]
    fn copy_with_vscroll_drops_out_of_bounds_rows() {
        let mut video = Video::new();
        video.fill(0, 0x5).unwrap();
        video.copy(0, 1, 10);

        let dst = video.buffer(1);
        let pixels = dst.pixels();
        // The first ten rows were outside the source and stay blank.
        assert_eq!(pixels[9 * SCREEN_RESOLUTION[0]], 0);
        assert_eq!(pixels[10 * SCREEN_RESOLUTION[0]], 0x5);
        assert_eq!(pixels[199 * SCREEN_RESOLUTION[0] + 319], 0x5);
    }

    #[test]
    fn draw_string_renders_glyph_pixels() {
        let mut video = Video::new();
        video.select_target(0).unwrap();
        // 0x003 is "2".
        video.draw_string(0x003, 2, 40, 0xf).unwrap();

        let touched = video
            .buffer(0)
            .pixels()
            .iter()
            .filter(|&&p| p == 0xf)
            .count();
        assert!(touched > 0);
    }

    #[test]
    fn draw_string_unknown_id() {
        let mut video = Video::new();
        assert!(matches!(
            video.draw_string(0xbeef, 0, 0, 1),
            Err(Error::InvalidStringId(0xbeef))
        ));
    }
}
