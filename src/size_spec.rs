//! Target sizing and the size annotations on buffer uniform declarations.
//!
//! A buffer uniform declaration may carry a trailing comment that sizes the
//! buffer's target:
//!
//! ```glsl
//! uniform sampler2D u_buffer0;       // 512x512   -> 512 x 512 pixels
//! uniform sampler2D u_buffer1;       // 0.5       -> half the viewport on both axes
//! uniform sampler2D u_doubleBuffer0; // 0.5 0.25  -> half width, quarter height
//! uniform sampler2D u_doubleBuffer1;              -> the full viewport
//! ```
//!
//! Values that are both at most 1.0 are always a fraction of the viewport,
//! so `// 1x1` means "full viewport", never a single pixel.

use crate::backend::Extent;

/// Requested size of an off-screen target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeSpec {
    /// Fraction of the viewport on each axis, tracked across resizes.
    Relative { width: f32, height: f32 },
    /// Fixed pixel size.
    Absolute { width: u32, height: u32 },
}

impl Default for SizeSpec {
    fn default() -> Self {
        Self::FULL_VIEWPORT
    }
}

impl SizeSpec {
    pub const FULL_VIEWPORT: SizeSpec = SizeSpec::Relative {
        width: 1.0,
        height: 1.0,
    };

    /// Classifies a width/height pair: both ≤ 1.0 is relative, anything else
    /// is absolute pixels (fractional pixels are truncated).
    pub fn from_dimensions(width: f32, height: f32) -> Self {
        if width <= 1.0 && height <= 1.0 {
            SizeSpec::Relative { width, height }
        } else {
            SizeSpec::Absolute {
                width: width.max(0.0).floor() as u32,
                height: height.max(0.0).floor() as u32,
            }
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, SizeSpec::Relative { .. })
    }

    /// Pixel size of a target with this spec inside `viewport`.
    ///
    /// Relative sizes are `floor(fraction * viewport)`. Both forms are
    /// raised to at least one pixel per axis.
    pub fn resolve(&self, viewport: Extent) -> Extent {
        match *self {
            SizeSpec::Relative { width, height } => Extent::new(
                scale_axis(width, viewport.width),
                scale_axis(height, viewport.height),
            ),
            SizeSpec::Absolute { width, height } => Extent::new(width, height),
        }
        .at_least_one()
    }
}

fn scale_axis(fraction: f32, pixels: u32) -> u32 {
    (f64::from(fraction) * f64::from(pixels)).floor() as u32
}

/// Looks up the size annotation of `uniform` in `source`.
///
/// Only the first line declaring `uniform` is consulted. A missing or
/// unparseable annotation yields [`SizeSpec::FULL_VIEWPORT`].
pub fn resolve_size(source: &str, uniform: &str) -> SizeSpec {
    source
        .lines()
        .find_map(|line| declaration_comment(line, uniform))
        .and_then(parse_annotation)
        .unwrap_or_default()
}

/// If `line` declares `uniform`, returns its trailing comment (possibly empty).
fn declaration_comment<'a>(line: &'a str, uniform: &str) -> Option<&'a str> {
    let (code, comment) = match line.find("//") {
        Some(at) => (&line[..at], &line[at..]),
        None => (line, ""),
    };

    if !code.split_whitespace().any(|word| word == "uniform") {
        return None;
    }

    let declares = code.match_indices(uniform).any(|(at, _)| {
        let before = code[..at].chars().next_back();
        let after = code[at + uniform.len()..].trim_start();
        !before.is_some_and(is_ident_char) && after.starts_with(';')
    });

    declares.then(|| comment.trim_start_matches('/').trim())
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_annotation(comment: &str) -> Option<SizeSpec> {
    let mut tokens = comment.split_whitespace();
    let first = tokens.next()?;

    if let Some((w, h)) = first.split_once('x') {
        let width: u32 = parse_digits(w)?;
        let height: u32 = parse_digits(h)?;
        return Some(SizeSpec::from_dimensions(width as f32, height as f32));
    }

    let width = parse_decimal(first)?;
    let height = tokens.next().and_then(parse_decimal).unwrap_or(width);
    Some(SizeSpec::from_dimensions(width, height))
}

fn parse_digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_decimal(text: &str) -> Option<f32> {
    let valid = text.bytes().any(|b| b.is_ascii_digit())
        && text.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && text.bytes().filter(|b| *b == b'.').count() <= 1;
    if !valid {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pixel_annotation_is_absolute() {
        let src = "uniform sampler2D u_buffer0; // 256x256\n";
        assert_eq!(
            resolve_size(src, "u_buffer0"),
            SizeSpec::Absolute {
                width: 256,
                height: 256
            }
        );
    }

    #[test]
    fn single_scale_applies_to_both_axes() {
        let src = "uniform sampler2D   u_doubleBuffer0;   // 0.5";
        assert_eq!(
            resolve_size(src, "u_doubleBuffer0"),
            SizeSpec::Relative {
                width: 0.5,
                height: 0.5
            }
        );
    }

    #[test]
    fn scale_pair_sets_each_axis() {
        let src = "uniform sampler2D u_buffer1; // 0.5 0.25";
        assert_eq!(
            resolve_size(src, "u_buffer1"),
            SizeSpec::Relative {
                width: 0.5,
                height: 0.25
            }
        );
    }

    #[test]
    fn missing_annotation_defaults_to_full_viewport() {
        let src = "uniform sampler2D u_buffer0;\nvoid main() {}";
        assert_eq!(resolve_size(src, "u_buffer0"), SizeSpec::FULL_VIEWPORT);
        assert_eq!(resolve_size(src, "u_buffer7"), SizeSpec::FULL_VIEWPORT);
    }

    #[test]
    fn one_by_one_is_relative() {
        let src = "uniform sampler2D u_buffer0; // 1x1";
        assert_eq!(resolve_size(src, "u_buffer0"), SizeSpec::FULL_VIEWPORT);
    }

    #[test]
    fn first_declaration_wins() {
        let src = "uniform sampler2D u_buffer0;\nuniform sampler2D u_buffer0; // 64x64\n";
        assert_eq!(resolve_size(src, "u_buffer0"), SizeSpec::FULL_VIEWPORT);
    }

    #[test]
    fn name_must_match_whole_identifier() {
        let src = "uniform sampler2D u_buffer10; // 64x64\nuniform sampler2D u_buffer1; // 32x16\n";
        assert_eq!(
            resolve_size(src, "u_buffer1"),
            SizeSpec::Absolute {
                width: 32,
                height: 16
            }
        );
    }

    #[test]
    fn usage_lines_are_not_declarations() {
        let src = "vec4 c = texture2D(u_buffer0, st); // 64x64\nuniform sampler2D u_buffer0; // 0.5\n";
        assert_eq!(
            resolve_size(src, "u_buffer0"),
            SizeSpec::Relative {
                width: 0.5,
                height: 0.5
            }
        );
    }

    #[test]
    fn vulkan_style_declarations_are_recognized() {
        let src = "layout(set = 0, binding = 3) uniform texture2D u_doubleBuffer0; // 128x64";
        assert_eq!(
            resolve_size(src, "u_doubleBuffer0"),
            SizeSpec::Absolute {
                width: 128,
                height: 64
            }
        );
    }

    #[test]
    fn garbage_annotation_falls_back() {
        let src = "uniform sampler2D u_buffer0; // feedback trail";
        assert_eq!(resolve_size(src, "u_buffer0"), SizeSpec::FULL_VIEWPORT);
    }

    #[test]
    fn large_decimal_is_absolute() {
        assert_eq!(
            SizeSpec::from_dimensions(2.0, 0.5),
            SizeSpec::Absolute {
                width: 2,
                height: 0
            }
        );
    }

    #[test]
    fn relative_resolve_floors() {
        let spec = SizeSpec::Relative {
            width: 0.5,
            height: 0.25,
        };
        assert_eq!(spec.resolve(Extent::new(801, 603)), Extent::new(400, 150));
    }

    proptest! {
        #[test]
        fn relative_resolve_matches_floor(
            f in 0.05f32..=1.0,
            w in 20u32..4096,
            h in 20u32..4096,
        ) {
            let size = SizeSpec::from_dimensions(f, f).resolve(Extent::new(w, h));
            let expect_w = ((f as f64) * (w as f64)).floor().max(1.0) as u32;
            let expect_h = ((f as f64) * (h as f64)).floor().max(1.0) as u32;
            prop_assert_eq!(size, Extent::new(expect_w, expect_h));
        }
    }
}
