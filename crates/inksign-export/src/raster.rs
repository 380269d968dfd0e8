//! RGBA bitmaps: decoding and the handful of painting primitives the
//! compositor needs
//!
//! Every primitive is expressed as a coverage function over a box in the
//! box's own (unrotated) coordinates. [`Bitmap::paint`] walks the pixels of
//! the rotated box and asks the shader for a color per pixel.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use inksign_core::{Color, PageBitmap, Rect, SignatureImage};

use crate::error::ExportError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, 4 bytes per pixel
    pub pixels: Vec<u8>,
}

impl Bitmap {
    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn white(width: u32, height: u32) -> Self {
        Self::filled(width, height, Color::WHITE)
    }

    /// Decode PNG bytes into 8-bit RGBA
    pub fn decode_png(bytes: &[u8]) -> Result<Self, ExportError> {
        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder.read_info()?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf)?;
        let data = &buf[..info.buffer_size()];

        let pixel_count = info.width as usize * info.height as usize;
        let mut pixels = Vec::with_capacity(pixel_count * 4);
        match info.color_type {
            png::ColorType::Rgba => pixels.extend_from_slice(data),
            png::ColorType::Rgb => {
                for px in data.chunks_exact(3) {
                    pixels.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            png::ColorType::GrayscaleAlpha => {
                for px in data.chunks_exact(2) {
                    pixels.extend_from_slice(&[px[0], px[0], px[0], px[1]]);
                }
            }
            png::ColorType::Grayscale => {
                for &g in data {
                    pixels.extend_from_slice(&[g, g, g, 255]);
                }
            }
            png::ColorType::Indexed => {
                return Err(ExportError::Decode(
                    "indexed PNG was not expanded".to_string(),
                ))
            }
        }

        if pixels.len() != pixel_count * 4 {
            return Err(ExportError::Decode(format!(
                "expected {} pixels, decoded {} bytes",
                pixel_count,
                pixels.len()
            )));
        }
        Ok(Self {
            width: info.width,
            height: info.height,
            pixels,
        })
    }

    pub fn decode_page(bitmap: &PageBitmap) -> Result<Self, ExportError> {
        match bitmap {
            PageBitmap::Png(bytes) => Self::decode_png(bytes),
            PageBitmap::DataUrl(url) => Self::decode_png(&data_url_bytes(url)?),
        }
    }

    pub fn decode_signature(image: &SignatureImage) -> Result<Self, ExportError> {
        match image {
            SignatureImage::Png(bytes) => Self::decode_png(bytes),
            SignatureImage::DataUrl(url) => Self::decode_png(&data_url_bytes(url)?),
        }
    }

    fn pixel_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.pixel_index(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Source-over blend of one RGBA color
    pub fn blend(&mut self, x: u32, y: u32, src: [u8; 4]) {
        if x >= self.width || y >= self.height || src[3] == 0 {
            return;
        }
        let i = self.pixel_index(x, y);
        let a = src[3] as u32;
        if a == 255 {
            self.pixels[i..i + 4].copy_from_slice(&src);
            return;
        }
        let inv = 255 - a;
        for c in 0..3 {
            let d = self.pixels[i + c] as u32;
            self.pixels[i + c] = ((src[c] as u32 * a + d * inv + 127) / 255) as u8;
        }
        let da = self.pixels[i + 3] as u32;
        self.pixels[i + 3] = (a + (da * inv + 127) / 255).min(255) as u8;
    }

    /// Composite onto white and drop alpha
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for px in self.pixels.chunks_exact(4) {
            let a = px[3] as u32;
            let inv = 255 - a;
            for &c in &px[..3] {
                out.push(((c as u32 * a + 255 * inv + 127) / 255) as u8);
            }
        }
        out
    }

    /// Paint `shader` over `bounds` rotated by `degrees` about its center.
    /// The shader gets box-local coordinates and returns a color or nothing.
    pub fn paint<F>(&mut self, bounds: Rect, degrees: f64, shader: F)
    where
        F: Fn(f64, f64) -> Option<[u8; 4]>,
    {
        if bounds.width <= 0.0 || bounds.height <= 0.0 {
            return;
        }
        let center = bounds.center();
        let (sin, cos) = (-degrees.to_radians()).sin_cos();

        // Axis-aligned hull of the rotated box
        let hw = bounds.width / 2.0;
        let hh = bounds.height / 2.0;
        let ext_x = (hw * cos).abs() + (hh * sin).abs();
        let ext_y = (hw * sin).abs() + (hh * cos).abs();
        let x0 = (center.x - ext_x).floor().max(0.0) as u32;
        let y0 = (center.y - ext_y).floor().max(0.0) as u32;
        let x1 = ((center.x + ext_x).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((center.y + ext_y).ceil().max(0.0) as u32).min(self.height);

        for py in y0..y1 {
            for px in x0..x1 {
                // Pixel center, rotated back into the box frame
                let dx = px as f64 + 0.5 - center.x;
                let dy = py as f64 + 0.5 - center.y;
                let lx = dx * cos - dy * sin + hw;
                let ly = dx * sin + dy * cos + hh;
                if lx < 0.0 || ly < 0.0 || lx >= bounds.width || ly >= bounds.height {
                    continue;
                }
                if let Some(color) = shader(lx, ly) {
                    self.blend(px, py, color);
                }
            }
        }
    }

    /// Nearest-neighbour rescale to `width`x`height`
    pub fn resample(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let (w, h) = (width as f64, height as f64);
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&self.sample(x as f64 + 0.5, y as f64 + 0.5, w, h));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Nearest-neighbour sample at box-local coordinates of a box `w`x`h`
    pub fn sample(&self, lx: f64, ly: f64, w: f64, h: f64) -> [u8; 4] {
        let sx = ((lx / w) * self.width as f64).floor().clamp(0.0, (self.width - 1) as f64) as u32;
        let sy = ((ly / h) * self.height as f64).floor().clamp(0.0, (self.height - 1) as f64) as u32;
        self.pixel(sx, sy)
    }
}

/// Payload bytes of a base64 `data:` URL
pub fn data_url_bytes(url: &str) -> Result<Vec<u8>, ExportError> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| ExportError::Decode("data URL has no payload".to_string()))?;
    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return Err(ExportError::Decode(format!(
            "unsupported data URL header: {}",
            header
        )));
    }
    BASE64
        .decode(payload.trim())
        .map_err(|e| ExportError::Decode(e.to_string()))
}

pub fn rgba(color: Color) -> [u8; 4] {
    [color.r, color.g, color.b, color.a]
}

// ============ Coverage tests in box-local coordinates ============

/// Inside a rounded rectangle of size `w`x`h` inset by `inset`
pub fn in_rounded_rect(x: f64, y: f64, w: f64, h: f64, radius: f64, inset: f64) -> bool {
    let (x, y) = (x - inset, y - inset);
    let (w, h) = (w - 2.0 * inset, h - 2.0 * inset);
    if w <= 0.0 || h <= 0.0 || x < 0.0 || y < 0.0 || x > w || y > h {
        return false;
    }
    let r = (radius - inset).max(0.0).min(w / 2.0).min(h / 2.0);
    if r == 0.0 {
        return true;
    }
    let cx = x.clamp(r, w - r);
    let cy = y.clamp(r, h - r);
    (x - cx).powi(2) + (y - cy).powi(2) <= r * r
}

/// Inside the ellipse inscribed in `w`x`h`, inset by `inset`
pub fn in_ellipse(x: f64, y: f64, w: f64, h: f64, inset: f64) -> bool {
    let rx = w / 2.0 - inset;
    let ry = h / 2.0 - inset;
    if rx <= 0.0 || ry <= 0.0 {
        return false;
    }
    let nx = (x - w / 2.0) / rx;
    let ny = (y - h / 2.0) / ry;
    nx * nx + ny * ny <= 1.0
}

/// Distance from `(x, y)` to the segment `a`-`b`
pub fn segment_distance(x: f64, y: f64, a: (f64, f64), b: (f64, f64)) -> f64 {
    let (vx, vy) = (b.0 - a.0, b.1 - a.1);
    let len2 = vx * vx + vy * vy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((x - a.0) * vx + (y - a.1) * vy) / len2).clamp(0.0, 1.0)
    };
    let (px, py) = (a.0 + t * vx, a.1 + t * vy);
    ((x - px).powi(2) + (y - py).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(color);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(data).unwrap();
        }
        out
    }

    #[test]
    fn test_decode_rgb_png() {
        let bytes = encode_png(2, 1, png::ColorType::Rgb, &[255, 0, 0, 0, 255, 0]);
        let bmp = Bitmap::decode_png(&bytes).unwrap();
        assert_eq!((bmp.width, bmp.height), (2, 1));
        assert_eq!(bmp.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(bmp.pixel(1, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn test_decode_gray_alpha_png() {
        let bytes = encode_png(1, 1, png::ColorType::GrayscaleAlpha, &[100, 50]);
        let bmp = Bitmap::decode_png(&bytes).unwrap();
        assert_eq!(bmp.pixel(0, 0), [100, 100, 100, 50]);
    }

    #[test]
    fn test_decode_data_url() {
        let bytes = encode_png(1, 1, png::ColorType::Rgba, &[1, 2, 3, 4]);
        let url = format!("data:image/png;base64,{}", BASE64.encode(&bytes));
        let bmp = Bitmap::decode_signature(&SignatureImage::DataUrl(url)).unwrap();
        assert_eq!(bmp.pixel(0, 0), [1, 2, 3, 4]);
    }

    #[test]
    fn test_bad_payloads_rejected() {
        assert!(Bitmap::decode_png(b"not a png").is_err());
        assert!(data_url_bytes("data:image/png,raw").is_err());
        assert!(data_url_bytes("no comma").is_err());
        assert!(data_url_bytes("data:image/png;base64,!!!").is_err());
    }

    #[test]
    fn test_blend_half_alpha_over_white() {
        let mut bmp = Bitmap::white(1, 1);
        bmp.blend(0, 0, [0, 0, 0, 128]);
        let px = bmp.pixel(0, 0);
        assert!(px[0] > 120 && px[0] < 130, "got {:?}", px);
        assert_eq!(px[3], 255);
        // out of bounds is ignored
        bmp.blend(5, 5, [0, 0, 0, 255]);
    }

    #[test]
    fn test_to_rgb_composites_on_white() {
        let bmp = Bitmap::filled(1, 1, Color::rgba(0, 0, 0, 0));
        assert_eq!(bmp.to_rgb(), vec![255, 255, 255]);
    }

    #[test]
    fn test_paint_unrotated_rect() {
        let mut bmp = Bitmap::white(10, 10);
        bmp.paint(Rect::new(2.0, 2.0, 3.0, 3.0), 0.0, |_, _| Some([0, 0, 0, 255]));
        assert_eq!(bmp.pixel(2, 2), [0, 0, 0, 255]);
        assert_eq!(bmp.pixel(4, 4), [0, 0, 0, 255]);
        assert_eq!(bmp.pixel(5, 5), [255, 255, 255, 255]);
        assert_eq!(bmp.pixel(1, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn test_paint_rotated_quarter_turn() {
        let mut bmp = Bitmap::white(20, 20);
        // 10x2 bar centered at (10, 10) turned upright
        bmp.paint(Rect::new(5.0, 9.0, 10.0, 2.0), 90.0, |_, _| Some([0, 0, 0, 255]));
        assert_eq!(bmp.pixel(10, 6), [0, 0, 0, 255]);
        assert_eq!(bmp.pixel(6, 10), [255, 255, 255, 255]);
    }

    #[test]
    fn test_coverage_helpers() {
        assert!(in_rounded_rect(5.0, 5.0, 10.0, 10.0, 0.0, 0.0));
        // corner cut by the radius
        assert!(!in_rounded_rect(0.2, 0.2, 10.0, 10.0, 4.0, 0.0));
        assert!(in_ellipse(5.0, 5.0, 10.0, 10.0, 0.0));
        assert!(!in_ellipse(0.5, 0.5, 10.0, 10.0, 0.0));
        assert!((segment_distance(5.0, 3.0, (0.0, 0.0), (10.0, 0.0)) - 3.0).abs() < 1e-9);
        assert!((segment_distance(13.0, 4.0, (0.0, 0.0), (10.0, 0.0)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_resample_doubles_each_pixel() {
        let mut bm = Bitmap::white(2, 1);
        bm.blend(1, 0, [0, 0, 0, 255]);
        let up = bm.resample(4, 2);
        assert_eq!((up.width, up.height), (4, 2));
        assert_eq!(up.pixel(0, 1), [255, 255, 255, 255]);
        assert_eq!(up.pixel(1, 0), [255, 255, 255, 255]);
        assert_eq!(up.pixel(2, 0), [0, 0, 0, 255]);
        assert_eq!(up.pixel(3, 1), [0, 0, 0, 255]);
        assert_eq!(bm.resample(2, 1), bm);
    }
}
