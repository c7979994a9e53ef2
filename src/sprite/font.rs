//! Bitmap font atlas layout (§4 "SpriteBatch + Font (HUD)").
//!
//! Mirrors the two shapes a bitmap-font HUD API usually exposes: a
//! monospace font (every glyph the same cell size) and a variable-width font
//! (a per-glyph width table, constant cell height). Both read glyphs left to
//! right, top to bottom out of a single atlas texture already resident at a
//! bindless slot -- rasterizing glyphs from a `.ttf` is out of scope, same as
//! the rest of asset decoding.

use super::SpriteBatch;

enum Widths {
    Fixed(u32),
    Variable(Vec<u8>),
}

/// A loaded bitmap font: atlas slot, glyph grid geometry, and widths.
pub struct Font {
    atlas_slot: u32,
    atlas_columns: u32,
    glyph_width_px: u32,
    glyph_height_px: u32,
    first_codepoint: u32,
    glyph_count: u32,
    widths: Widths,
}

impl Font {
    /// A fixed-width (monospace) bitmap font: every cell is
    /// `glyph_width_px x glyph_height_px`, laid out row-major in the atlas
    /// starting at `first_codepoint`.
    #[must_use]
    pub fn fixed_width(atlas_slot: u32, atlas_columns: u32, glyph_width_px: u32, glyph_height_px: u32, first_codepoint: u32, glyph_count: u32) -> Self {
        Self {
            atlas_slot,
            atlas_columns,
            glyph_width_px,
            glyph_height_px,
            first_codepoint,
            glyph_count,
            widths: Widths::Fixed(glyph_width_px),
        }
    }

    /// A variable-width bitmap font: glyph cells share `glyph_height_px` but
    /// each has its own advance width in `widths`, one byte per glyph.
    #[must_use]
    pub fn variable_width(atlas_slot: u32, atlas_columns: u32, cell_width_px: u32, glyph_height_px: u32, first_codepoint: u32, widths: Vec<u8>) -> Self {
        let glyph_count = widths.len() as u32;
        Self {
            atlas_slot,
            atlas_columns,
            glyph_width_px: cell_width_px,
            glyph_height_px,
            first_codepoint,
            glyph_count,
            widths: Widths::Variable(widths),
        }
    }

    fn glyph_index(&self, codepoint: u32) -> Option<u32> {
        let index = codepoint.checked_sub(self.first_codepoint)?;
        (index < self.glyph_count).then_some(index)
    }

    fn advance_px(&self, index: u32) -> f32 {
        match &self.widths {
            Widths::Fixed(w) => *w as f32,
            Widths::Variable(widths) => f32::from(widths[index as usize]),
        }
    }

    /// Atlas-space UV rect for glyph `index`, assuming a row-major grid of
    /// `atlas_columns` cells each `glyph_width_px x glyph_height_px`.
    fn uv_rect(&self, index: u32, atlas_width_px: u32, atlas_height_px: u32) -> [f32; 4] {
        let col = index % self.atlas_columns;
        let row = index / self.atlas_columns;
        let u = (col * self.glyph_width_px) as f32 / atlas_width_px as f32;
        let v = (row * self.glyph_height_px) as f32 / atlas_height_px as f32;
        let uw = self.glyph_width_px as f32 / atlas_width_px as f32;
        let vh = self.glyph_height_px as f32 / atlas_height_px as f32;
        [u, v, uw, vh]
    }

    /// Width in pixels `text` would occupy when drawn at `size_px` (a
    /// target glyph cell height; glyphs scale uniformly from their native
    /// `glyph_height_px`).
    #[must_use]
    pub fn measure(&self, text: &str, size_px: f32) -> f32 {
        let scale = size_px / self.glyph_height_px as f32;
        let mut width = 0.0;
        for ch in text.chars() {
            let Some(index) = self.glyph_index(ch as u32) else {
                log::warn!("[Font] codepoint {:?} not in atlas range, skipped", ch);
                continue;
            };
            width += self.advance_px(index) * scale;
        }
        width
    }

    /// Appends one [`crate::sprite::SpriteInstance`] per glyph of `text`
    /// into `batch`, advancing left to right from `(x, y)` at cell height
    /// `size_px`. `atlas_width_px`/`atlas_height_px` are the loaded atlas
    /// texture's dimensions, needed to convert grid cells to normalized UVs.
    pub fn layout(&self, batch: &mut SpriteBatch, text: &str, x: f32, y: f32, size_px: f32, color: [f32; 4], atlas_width_px: u32, atlas_height_px: u32) {
        let scale = size_px / self.glyph_height_px as f32;
        let mut cursor_x = x;
        for ch in text.chars() {
            let Some(index) = self.glyph_index(ch as u32) else {
                log::warn!("[Font] codepoint {:?} not in atlas range, skipped", ch);
                continue;
            };
            let advance = self.advance_px(index) * scale;
            if !ch.is_whitespace() {
                let uv_rect = self.uv_rect(index, atlas_width_px, atlas_height_px);
                let rect = [cursor_x, y, self.glyph_width_px as f32 * scale, size_px];
                batch.enqueue(rect, uv_rect, color, self.atlas_slot);
            }
            cursor_x += advance;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_measure_is_linear_in_length() {
        let font = Font::fixed_width(1, 16, 8, 8, 32, 96);
        assert_eq!(font.measure("....", 8.0), 32.0);
        assert_eq!(font.measure("........", 16.0), 128.0);
    }

    #[test]
    fn variable_width_sums_per_glyph_advances() {
        let widths = vec![4, 6, 8];
        let font = Font::variable_width(1, 16, 8, 8, b'a' as u32, widths);
        assert_eq!(font.measure("ab", 8.0), 10.0);
    }

    #[test]
    fn codepoint_outside_range_is_skipped_not_panicking() {
        let font = Font::fixed_width(1, 16, 8, 8, b'a' as u32, 26);
        assert_eq!(font.measure("1", 8.0), 0.0);
    }
}
