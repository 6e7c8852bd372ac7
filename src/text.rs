use image::Rgba;

use crate::raster::RasterBuffer;

pub const GLYPH_WIDTH: u32 = 3;
pub const GLYPH_HEIGHT: u32 = 5;

/// Gap between glyphs, in font cells.
const SPACING: u32 = 1;

/// Rows top to bottom, bit 2 is the leftmost column.
type Glyph = [u8; GLYPH_HEIGHT as usize];

const UNKNOWN: Glyph = [0b111; 5];

fn glyph(c: char) -> Glyph {
    match c.to_ascii_uppercase() {
        ' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b110, 0b001, 0b010, 0b100, 0b111],
        '3' => [0b110, 0b001, 0b010, 0b001, 0b110],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b110, 0b001, 0b110],
        '6' => [0b011, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b110],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '!' => [0b010, 0b010, 0b010, 0b000, 0b010],
        '?' => [0b110, 0b001, 0b010, 0b000, 0b010],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '\'' => [0b010, 0b010, 0b000, 0b000, 0b000],
        _ => UNKNOWN,
    }
}

/// Size in pixels of `text` drawn at `scale` with `margin` on every side.
/// `None` if it doesn't fit in `u32`.
pub fn measure(text: &str, scale: u32, margin: u32) -> Option<(u32, u32)> {
    let chars = u32::try_from(text.chars().count()).ok()?;
    let (cells_x, cells_y) = match chars {
        0 => (0, 0),
        _ => (
            chars
                .checked_mul(GLYPH_WIDTH)?
                .checked_add((chars - 1).checked_mul(SPACING)?)?,
            GLYPH_HEIGHT,
        ),
    };

    let border = margin.checked_mul(2)?;
    Some((
        cells_x.checked_mul(scale)?.checked_add(border)?,
        cells_y.checked_mul(scale)?.checked_add(border)?,
    ))
}

/// Draws `text` with its top left corner at (x, y). Pixels falling outside
/// the buffer are clipped.
pub fn draw_text(buffer: &mut RasterBuffer, text: &str, x: u32, y: u32, scale: u32, color: Rgba<u8>) {
    let step = (GLYPH_WIDTH + SPACING).saturating_mul(scale);

    for (i, c) in text.chars().enumerate() {
        let origin_x = x.saturating_add((i as u32).saturating_mul(step));
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }

                let cell_x = origin_x.saturating_add(col.saturating_mul(scale));
                let cell_y = y.saturating_add((row as u32).saturating_mul(scale));
                if cell_x >= buffer.width() || cell_y >= buffer.height() {
                    continue;
                }

                for dy in 0..scale.min(buffer.height() - cell_y) {
                    for dx in 0..scale.min(buffer.width() - cell_x) {
                        buffer.put_pixel(cell_x + dx, cell_y + dy, color);
                    }
                }
            }
        }
    }
}

/// Transparent buffer sized to `text` plus `margin` on every side, with the
/// text drawn in the middle. `None` if the size overflows `u32`.
pub fn render_text(text: &str, scale: u32, margin: u32, color: Rgba<u8>) -> Option<RasterBuffer> {
    let (width, height) = measure(text, scale, margin)?;
    let mut buffer = RasterBuffer::new(width, height);
    draw_text(&mut buffer, text, margin, margin, scale, color);
    Some(buffer)
}
