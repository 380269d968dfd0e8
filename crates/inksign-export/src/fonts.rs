//! Mapping CSS font families onto the PDF base-14 fonts
//!
//! Exported text is drawn with standard fonts only, so nothing has to be
//! embedded.

use inksign_core::{FontStyle, FontWeight, TextStyle};

/// Base-14 families that carry weight/slant variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseFamily {
    Helvetica,
    Times,
    Courier,
}

impl BaseFamily {
    /// Pick a family from a CSS `font-family` value. Only the first entry
    /// of a fallback list is considered.
    pub fn from_css(family: &str) -> Self {
        let first = family
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches(|c| c == '"' || c == '\'');
        let lower = first.to_lowercase();

        match lower.as_str() {
            "serif" => return BaseFamily::Times,
            "monospace" => return BaseFamily::Courier,
            "sans-serif" | "cursive" | "fantasy" => return BaseFamily::Helvetica,
            _ => {}
        }

        if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
            return BaseFamily::Times;
        }
        if lower.contains("courier")
            || lower.contains("mono")
            || lower.contains("consolas")
            || lower.contains("monaco")
        {
            return BaseFamily::Courier;
        }
        BaseFamily::Helvetica
    }

    /// Average advance width as a fraction of the font size
    fn average_advance(self) -> f64 {
        match self {
            BaseFamily::Helvetica => 0.52,
            BaseFamily::Times => 0.47,
            BaseFamily::Courier => 0.6,
        }
    }
}

/// PostScript name of the base-14 font for this style
pub fn pdf_font_name(style: &TextStyle) -> &'static str {
    let bold = style.font_weight == FontWeight::Bold;
    let italic = style.font_style == FontStyle::Italic;
    match BaseFamily::from_css(&style.font_family) {
        BaseFamily::Times => match (bold, italic) {
            (true, true) => "Times-BoldItalic",
            (true, false) => "Times-Bold",
            (false, true) => "Times-Italic",
            (false, false) => "Times-Roman",
        },
        BaseFamily::Helvetica => match (bold, italic) {
            (true, true) => "Helvetica-BoldOblique",
            (true, false) => "Helvetica-Bold",
            (false, true) => "Helvetica-Oblique",
            (false, false) => "Helvetica",
        },
        BaseFamily::Courier => match (bold, italic) {
            (true, true) => "Courier-BoldOblique",
            (true, false) => "Courier-Bold",
            (false, true) => "Courier-Oblique",
            (false, false) => "Courier",
        },
    }
}

/// Approximate width of `text` set at `size` points. Used for alignment and
/// decoration lines, where an estimate is good enough.
pub fn text_width(text: &str, style: &TextStyle, size: f64) -> f64 {
    let mut advance = BaseFamily::from_css(&style.font_family).average_advance();
    if style.font_weight == FontWeight::Bold {
        advance *= 1.06;
    }
    text.chars().count() as f64 * advance * size
}

/// Bytes for a base-14 string operand. Latin-1 characters map directly,
/// anything else becomes `?`. Delimiter escaping is left to the writer.
pub fn encode_win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(family: &str, bold: bool, italic: bool) -> TextStyle {
        TextStyle {
            font_family: family.to_string(),
            font_weight: if bold { FontWeight::Bold } else { FontWeight::Normal },
            font_style: if italic { FontStyle::Italic } else { FontStyle::Normal },
            ..TextStyle::default()
        }
    }

    #[test]
    fn test_generic_families() {
        assert_eq!(pdf_font_name(&style("serif", false, false)), "Times-Roman");
        assert_eq!(pdf_font_name(&style("monospace", false, false)), "Courier");
        assert_eq!(pdf_font_name(&style("sans-serif", false, false)), "Helvetica");
    }

    #[test]
    fn test_named_families_with_variants() {
        assert_eq!(pdf_font_name(&style("Georgia", true, false)), "Times-Bold");
        assert_eq!(
            pdf_font_name(&style("\"Courier New\", monospace", true, true)),
            "Courier-BoldOblique"
        );
        assert_eq!(pdf_font_name(&style("Arial", false, true)), "Helvetica-Oblique");
        assert_eq!(pdf_font_name(&style("Comic Sans", false, false)), "Helvetica");
    }

    #[test]
    fn test_text_width_scales() {
        let s = style("Courier", false, false);
        assert!((text_width("abcd", &s, 10.0) - 24.0).abs() < 1e-9);
        assert_eq!(text_width("", &s, 10.0), 0.0);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("a(b)"), b"a(b)".to_vec());
        assert_eq!(encode_win_ansi("café"), vec![b'c', b'a', b'f', 0xe9]);
        assert_eq!(encode_win_ansi("\u{2713}\n"), b"??".to_vec());
    }
}
