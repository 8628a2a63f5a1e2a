//! PDF export options.
//!
//! Callers send [`PdfOptions`] where every field is optional; the renderer
//! resolves them against the service defaults into [`ExportOptions`], which is
//! what engines consume. Lengths in [`ExportOptions`] are CSS pixels
//! (96 per inch).

use serde::{Deserialize, Serialize};

use crate::{RenderError, Result};

const PX_PER_INCH: f64 = 96.0;
const MIN_SCALE: f64 = 0.1;
const MAX_SCALE: f64 = 2.0;

/// Caller-supplied overrides, as found under `pdfOptions` in the request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfOptions {
    #[serde(default)]
    pub print_background: Option<bool>,
    #[serde(default, rename = "preferCSSPageSize")]
    pub prefer_css_page_size: Option<bool>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub margin: Option<MarginOptions>,
    #[serde(default)]
    pub landscape: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub page_ranges: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginOptions {
    #[serde(default)]
    pub top: Option<Length>,
    #[serde(default)]
    pub right: Option<Length>,
    #[serde(default)]
    pub bottom: Option<Length>,
    #[serde(default)]
    pub left: Option<Length>,
}

/// A length given either as a bare number of CSS pixels or as a string with a
/// unit (`px`, `in`, `cm`, `mm`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Length {
    Pixels(f64),
    Text(String),
}

impl Length {
    pub fn to_px(&self) -> Result<f64> {
        let px = match self {
            Length::Pixels(value) => *value,
            Length::Text(raw) => parse_length(raw)?,
        };
        if !px.is_finite() || px < 0.0 {
            return Err(RenderError::validation(format!(
                "margin must be a non-negative length, got {}",
                px
            )));
        }
        Ok(px)
    }
}

const UNITS: [(&str, f64); 4] = [
    ("px", 1.0),
    ("in", PX_PER_INCH),
    ("cm", PX_PER_INCH / 2.54),
    ("mm", PX_PER_INCH / 25.4),
];

/// Parse `<number><unit>`; a bare number is pixels. The unit is matched as a
/// suffix so exponents like `1e1px` stay part of the number.
fn parse_length(raw: &str) -> Result<f64> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let (number, factor) = UNITS
        .iter()
        .find_map(|(unit, factor)| trimmed.strip_suffix(unit).map(|n| (n, *factor)))
        .unwrap_or((trimmed.as_str(), 1.0));
    let number = number.trim_end();

    match number.parse::<f64>() {
        Ok(value) => Ok(value * factor),
        Err(_) => {
            let unit_start = number
                .rfind(|c: char| c.is_ascii_digit() || c == '.')
                .map(|i| i + 1)
                .unwrap_or(0);
            let unit = &number[unit_start..];
            if unit_start > 0 && !unit.is_empty() && unit.chars().all(|c| c.is_ascii_alphabetic()) {
                Err(RenderError::validation(format!(
                    "unsupported margin unit {:?} (expected px, in, cm or mm)",
                    unit
                )))
            } else {
                Err(RenderError::validation(format!("invalid margin length {:?}", raw)))
            }
        }
    }
}

/// Margins in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Paper size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaperSize {
    pub width: f64,
    pub height: f64,
}

impl PaperSize {
    fn inches(width: f64, height: f64) -> Self {
        Self {
            width: width * PX_PER_INCH,
            height: height * PX_PER_INCH,
        }
    }

    /// Look up a named paper format, ignoring case.
    pub fn from_format(name: &str) -> Option<Self> {
        let size = match name.trim().to_ascii_lowercase().as_str() {
            "letter" => Self::inches(8.5, 11.0),
            "legal" => Self::inches(8.5, 14.0),
            "tabloid" => Self::inches(11.0, 17.0),
            "ledger" => Self::inches(17.0, 11.0),
            "a0" => Self::inches(33.1, 46.8),
            "a1" => Self::inches(23.4, 33.1),
            "a2" => Self::inches(16.54, 23.4),
            "a3" => Self::inches(11.7, 16.54),
            "a4" => Self::inches(8.27, 11.7),
            "a5" => Self::inches(5.83, 8.27),
            "a6" => Self::inches(4.13, 5.83),
            _ => return None,
        };
        Some(size)
    }

    pub fn width_inches(&self) -> f64 {
        self.width / PX_PER_INCH
    }

    pub fn height_inches(&self) -> f64 {
        self.height / PX_PER_INCH
    }
}

/// Fully resolved export options handed to an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportOptions {
    pub print_background: bool,
    pub prefer_css_page_size: bool,
    pub scale: f64,
    pub margin: Margin,
    pub landscape: bool,
    /// `None` leaves the engine default (Letter).
    pub paper: Option<PaperSize>,
    pub page_ranges: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            print_background: true,
            prefer_css_page_size: true,
            scale: 1.0,
            margin: Margin::default(),
            landscape: false,
            paper: None,
            page_ranges: None,
        }
    }
}

impl ExportOptions {
    /// Overlay caller options on the defaults. Any field the caller leaves
    /// out, including a single margin side, keeps its default value.
    pub fn resolve(overrides: Option<&PdfOptions>) -> Result<Self> {
        let mut options = Self::default();
        let Some(overrides) = overrides else {
            return Ok(options);
        };

        if let Some(print_background) = overrides.print_background {
            options.print_background = print_background;
        }
        if let Some(prefer) = overrides.prefer_css_page_size {
            options.prefer_css_page_size = prefer;
        }
        if let Some(scale) = overrides.scale {
            if !scale.is_finite() || !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
                return Err(RenderError::validation(format!(
                    "scale must be between {} and {}, got {}",
                    MIN_SCALE, MAX_SCALE, scale
                )));
            }
            options.scale = scale;
        }
        if let Some(margin) = &overrides.margin {
            let side = |value: &Option<Length>| -> Result<f64> {
                value.as_ref().map(Length::to_px).transpose().map(|v| v.unwrap_or(0.0))
            };
            options.margin = Margin {
                top: side(&margin.top)?,
                right: side(&margin.right)?,
                bottom: side(&margin.bottom)?,
                left: side(&margin.left)?,
            };
        }
        if let Some(landscape) = overrides.landscape {
            options.landscape = landscape;
        }
        if let Some(format) = &overrides.format {
            options.paper = Some(PaperSize::from_format(format).ok_or_else(|| {
                RenderError::validation(format!("unknown paper format {:?}", format))
            })?);
        }
        if let Some(ranges) = &overrides.page_ranges {
            validate_page_ranges(ranges)?;
            options.page_ranges = Some(ranges.trim().to_string()).filter(|r| !r.is_empty());
        }

        Ok(options)
    }
}

/// Accepts the print dialog syntax: comma separated pages or `a-b` ranges.
/// A blank string means every page.
fn validate_page_ranges(raw: &str) -> Result<()> {
    if raw.trim().is_empty() {
        return Ok(());
    }
    let invalid = || RenderError::validation(format!("invalid pageRanges {:?}", raw));
    let mut parts = 0;
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        parts += 1;
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (part, part),
        };
        if start.is_empty() && end.is_empty() {
            return Err(invalid());
        }
        for bound in [start, end] {
            if !bound.is_empty() {
                let page: u32 = bound.parse().map_err(|_| invalid())?;
                if page == 0 {
                    return Err(invalid());
                }
            }
        }
        if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
            if start > end {
                return Err(invalid());
            }
        }
    }
    if parts == 0 {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_options_given() {
        let options = ExportOptions::resolve(None).unwrap();
        assert!(options.print_background);
        assert!(options.prefer_css_page_size);
        assert_eq!(options.scale, 1.0);
        assert_eq!(options.margin, Margin::default());
        assert!(!options.landscape);
        assert!(options.paper.is_none());
    }

    #[test]
    fn request_json_uses_wire_names() {
        let options: PdfOptions = serde_json::from_value(serde_json::json!({
            "printBackground": false,
            "preferCSSPageSize": false,
            "scale": 0.5,
            "margin": {"top": 10, "right": "1in", "bottom": "2.54cm"},
            "pageRanges": "1-2"
        }))
        .unwrap();

        let resolved = ExportOptions::resolve(Some(&options)).unwrap();
        assert!(!resolved.print_background);
        assert!(!resolved.prefer_css_page_size);
        assert_eq!(resolved.scale, 0.5);
        assert_eq!(resolved.margin.top, 10.0);
        assert_eq!(resolved.margin.right, 96.0);
        assert!((resolved.margin.bottom - 96.0).abs() < 1e-9);
        assert_eq!(resolved.margin.left, 0.0);
        assert_eq!(resolved.page_ranges.as_deref(), Some("1-2"));
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let options = PdfOptions {
            scale: Some(1.5),
            ..PdfOptions::default()
        };
        let resolved = ExportOptions::resolve(Some(&options)).unwrap();
        assert_eq!(resolved.scale, 1.5);
        assert!(resolved.print_background);
        assert!(resolved.prefer_css_page_size);
    }

    #[test]
    fn scale_outside_supported_range_is_rejected() {
        for scale in [0.0, 2.5, f64::NAN] {
            let options = PdfOptions {
                scale: Some(scale),
                ..PdfOptions::default()
            };
            let err = ExportOptions::resolve(Some(&options)).unwrap_err();
            assert!(matches!(err, RenderError::Validation(_)), "scale {scale}");
        }
    }

    #[test]
    fn negative_or_unknown_margins_are_rejected() {
        assert!(Length::Pixels(-1.0).to_px().is_err());
        assert!(Length::Text("3pt".to_string()).to_px().is_err());
        assert!(Length::Text("abc".to_string()).to_px().is_err());
        assert_eq!(Length::Text("10mm".to_string()).to_px().unwrap().round(), 38.0);
        assert_eq!(Length::Text(" 12 ".to_string()).to_px().unwrap(), 12.0);
    }

    #[test]
    fn exponents_are_part_of_the_number() {
        assert_eq!(Length::Text("1e1px".to_string()).to_px().unwrap(), 10.0);
        assert_eq!(Length::Text("1E1".to_string()).to_px().unwrap(), 10.0);
        assert_eq!(Length::Text("5e-1in".to_string()).to_px().unwrap(), 48.0);
        assert_eq!(Length::Text("2 in".to_string()).to_px().unwrap(), 192.0);

        let err = Length::Text("3pt".to_string()).to_px().unwrap_err().to_string();
        assert!(err.contains("unsupported margin unit \"pt\""), "{err}");
        assert!(Length::Text("px".to_string()).to_px().is_err());
    }

    #[test]
    fn paper_formats_are_case_insensitive() {
        let a4 = PaperSize::from_format("A4").unwrap();
        assert_eq!(PaperSize::from_format("a4"), Some(a4));
        assert!((a4.width_inches() - 8.27).abs() < 1e-9);
        assert!(PaperSize::from_format("B5").is_none());

        let options = PdfOptions {
            format: Some("folio".to_string()),
            ..PdfOptions::default()
        };
        assert!(ExportOptions::resolve(Some(&options)).is_err());
    }

    #[test]
    fn page_ranges_follow_print_dialog_syntax() {
        assert!(validate_page_ranges("1-3, 5, 8-").is_ok());
        assert!(validate_page_ranges("0").is_err());
        assert!(validate_page_ranges("4-2").is_err());
        assert!(validate_page_ranges("one").is_err());
        assert!(validate_page_ranges("-3").is_ok());
        assert!(validate_page_ranges("").is_ok());
        for empty in ["-", ",", " , - ", ",,"] {
            assert!(validate_page_ranges(empty).is_err(), "{empty:?}");
        }
    }

    #[test]
    fn blank_page_ranges_mean_all_pages() {
        let options = PdfOptions {
            page_ranges: Some("  ".to_string()),
            ..PdfOptions::default()
        };
        let resolved = ExportOptions::resolve(Some(&options)).unwrap();
        assert!(resolved.page_ranges.is_none());

        let options = PdfOptions {
            page_ranges: Some(",".to_string()),
            ..PdfOptions::default()
        };
        assert!(ExportOptions::resolve(Some(&options)).is_err());
    }
}
