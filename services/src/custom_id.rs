//! Custom item ID generator.
//!
//! An inventory may configure an ordered list of [`CustomIdElement`]s. A new
//! item's ID is the concatenation of every element rendered in position order.
//! Without any elements the ID falls back to `ITEM-000042` style sequences.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Fixed,
    Random20,
    Random32,
    Random6,
    Random9,
    Guid,
    DateTime,
    Sequence,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Fixed => "Fixed",
            ElementType::Random20 => "Random20",
            ElementType::Random32 => "Random32",
            ElementType::Random6 => "Random6",
            ElementType::Random9 => "Random9",
            ElementType::Guid => "Guid",
            ElementType::DateTime => "DateTime",
            ElementType::Sequence => "Sequence",
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown custom ID element type: {0}")]
pub struct UnknownElementType(pub String);

/// Widest zero-padding a numeric element may request.
pub const MAX_NUMBER_WIDTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Number format width must be at most {MAX_NUMBER_WIDTH}")]
pub struct WidthTooLarge;

impl FromStr for ElementType {
    type Err = UnknownElementType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let element = match s {
            "Fixed" => ElementType::Fixed,
            "Random20" => ElementType::Random20,
            "Random32" => ElementType::Random32,
            "Random6" => ElementType::Random6,
            "Random9" => ElementType::Random9,
            "Guid" => ElementType::Guid,
            "DateTime" => ElementType::DateTime,
            "Sequence" => ElementType::Sequence,
            other => return Err(UnknownElementType(other.to_owned())),
        };
        Ok(element)
    }
}

/// One part of a custom ID format. `value` holds fixed text or format options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomIdElement {
    pub position: i32,
    pub element_type: ElementType,
    #[serde(default)]
    pub value: Option<String>,
}

impl CustomIdElement {
    pub fn new(position: i32, element_type: ElementType, value: Option<&str>) -> Self {
        Self {
            position,
            element_type,
            value: value.map(str::to_owned),
        }
    }

    /// Rejects numeric format options that ask for more than [`MAX_NUMBER_WIDTH`].
    pub fn check_options(&self) -> Result<(), WidthTooLarge> {
        match self.element_type {
            ElementType::Random20 | ElementType::Random32 | ElementType::Sequence => {
                NumberFormat::parse(self.value.as_deref()).map(|_| ())
            }
            _ => Ok(()),
        }
    }
}

const PREVIEW_RANDOM20: &str = "A7E3A";
const PREVIEW_RANDOM32: &str = "E74FA329";
const PREVIEW_RANDOM6: &str = "123456";
const PREVIEW_RANDOM9: &str = "987654321";
const PREVIEW_GUID: &str = "550e8400-e29b-41d4-a716-446655440000";
const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd";

/// Renders a new custom ID.
///
/// `sequence` is the next sequence number for the inventory (item count + 1).
pub fn generate<R: Rng + ?Sized>(
    elements: &[CustomIdElement],
    sequence: u64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> String {
    if elements.is_empty() {
        return format!("ITEM-{sequence:06}");
    }

    let mut id = String::new();
    for element in ordered(elements) {
        let value = element.value.as_deref();
        let part = match element.element_type {
            ElementType::Fixed => value.unwrap_or_default().to_owned(),
            ElementType::Random20 => {
                NumberFormat::lenient(value).render(u64::from(rng.gen_range(0..1_048_576u32)))
            }
            ElementType::Random32 => NumberFormat::lenient(value).render(u64::from(rng.r#gen::<u32>())),
            ElementType::Random6 => format!("{:06}", rng.gen_range(0..1_000_000u32)),
            ElementType::Random9 => format!("{:09}", rng.gen_range(0..1_000_000_000u32)),
            ElementType::Guid => {
                let uuid = uuid::Builder::from_random_bytes(rng.r#gen()).into_uuid();
                GuidFormat::parse(value).render(uuid)
            }
            ElementType::DateTime => format_date(now, value),
            ElementType::Sequence => NumberFormat::lenient(value).render(sequence),
        };
        id.push_str(&part);
    }
    id
}

/// Renders an example ID using fixed sample values for the random parts.
pub fn preview(elements: &[CustomIdElement], now: DateTime<Utc>) -> String {
    ordered(elements)
        .into_iter()
        .map(|element| {
            let value = element.value.as_deref();
            match element.element_type {
                ElementType::Fixed => value.unwrap_or_default().to_owned(),
                ElementType::Random20 => PREVIEW_RANDOM20.to_owned(),
                ElementType::Random32 => PREVIEW_RANDOM32.to_owned(),
                ElementType::Random6 => PREVIEW_RANDOM6.to_owned(),
                ElementType::Random9 => PREVIEW_RANDOM9.to_owned(),
                ElementType::Guid => PREVIEW_GUID.to_owned(),
                ElementType::DateTime => format_date(now, value),
                ElementType::Sequence => NumberFormat::lenient(value).render(1),
            }
        })
        .collect()
}

/// Checks a user-supplied ID against the fixed parts of the format.
///
/// Only fixed text is verified: each non-empty fixed value must appear at the
/// position reached by the fixed values before it.
pub fn matches_format(elements: &[CustomIdElement], candidate: &str) -> bool {
    let mut position = 0;
    for element in ordered(elements) {
        if element.element_type != ElementType::Fixed {
            continue;
        }
        let Some(fixed) = element.value.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        match candidate.get(position..) {
            Some(rest) if rest.starts_with(fixed) => position += fixed.len(),
            _ => return false,
        }
    }
    true
}

fn ordered(elements: &[CustomIdElement]) -> Vec<&CustomIdElement> {
    let mut sorted: Vec<&CustomIdElement> = elements.iter().collect();
    sorted.sort_by_key(|element| element.position);
    sorted
}

#[derive(Deserialize)]
struct FormatOptions {
    #[serde(rename = "Format", alias = "format")]
    format: Option<String>,
}

/// Reads the `Format` option: JSON `{"Format": ...}` or the raw string itself.
fn format_option(value: Option<&str>) -> Option<String> {
    let value = value.filter(|v| !v.is_empty())?;
    match serde_json::from_str::<FormatOptions>(value) {
        Ok(options) => options.format,
        Err(_) => Some(value.to_owned()),
    }
}

/// Numeric format: `D`/`Dn` decimal, `X`/`Xn` upper hex, `x`/`xn` lower hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberFormat {
    Decimal(usize),
    UpperHex(usize),
    LowerHex(usize),
}

impl NumberFormat {
    /// A suffix that is not a number means no padding.
    fn parse(value: Option<&str>) -> Result<Self, WidthTooLarge> {
        let Some(format) = format_option(value) else {
            return Ok(NumberFormat::Decimal(0));
        };
        let mut chars = format.chars();
        let specifier = chars.next();
        let width = match chars.as_str() {
            digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => digits
                .parse::<usize>()
                .ok()
                .filter(|width| *width <= MAX_NUMBER_WIDTH)
                .ok_or(WidthTooLarge)?,
            _ => 0,
        };
        Ok(match specifier {
            Some('X') => NumberFormat::UpperHex(width),
            Some('x') => NumberFormat::LowerHex(width),
            _ => NumberFormat::Decimal(width),
        })
    }

    /// Stored formats predating the width cap render unpadded.
    fn lenient(value: Option<&str>) -> Self {
        Self::parse(value).unwrap_or(NumberFormat::Decimal(0))
    }

    fn render(self, value: u64) -> String {
        match self {
            NumberFormat::Decimal(width) => format!("{value:0width$}"),
            NumberFormat::UpperHex(width) => format!("{value:0width$X}"),
            NumberFormat::LowerHex(width) => format!("{value:0width$x}"),
        }
    }
}

/// GUID rendering options.
///
/// `Length` truncates the rendered GUID when positive; `0` keeps all of it and
/// values past the end are capped at the full length.
#[derive(Deserialize)]
#[serde(default)]
struct GuidFormat {
    #[serde(rename = "Format", alias = "format")]
    format: String,
    #[serde(rename = "Length", alias = "length")]
    length: usize,
    #[serde(rename = "Uppercase", alias = "uppercase")]
    uppercase: bool,
}

impl Default for GuidFormat {
    fn default() -> Self {
        Self {
            format: "N".to_owned(),
            length: 8,
            uppercase: true,
        }
    }
}

impl GuidFormat {
    fn parse(value: Option<&str>) -> Self {
        value
            .filter(|v| !v.is_empty())
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or_default()
    }

    fn render(&self, uuid: Uuid) -> String {
        let full = match self.format.as_str() {
            "D" => uuid.hyphenated().to_string(),
            "B" => uuid.braced().to_string(),
            "P" => format!("({})", uuid.hyphenated()),
            _ => uuid.simple().to_string(),
        };
        let truncated: String = if self.length > 0 {
            full.chars().take(self.length).collect()
        } else {
            full
        };
        if self.uppercase {
            truncated.to_uppercase()
        } else {
            truncated.to_lowercase()
        }
    }
}

fn format_date(now: DateTime<Utc>, value: Option<&str>) -> String {
    let pattern = value
        .filter(|v| !v.is_empty())
        .and_then(|v| serde_json::from_str::<FormatOptions>(v).ok())
        .and_then(|options| options.format)
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_owned());
    now.format(&to_strftime(&pattern)).to_string()
}

/// Translates a `yyyy-MM-dd HH:mm:ss` style pattern into a chrono format string.
fn to_strftime(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&next| next == c).count();
        let (token, consumed) = match (c, run) {
            ('y', n) if n >= 4 => ("%Y", 4),
            ('y', n) if n >= 2 => ("%y", 2),
            ('M', n) if n >= 4 => ("%B", 4),
            ('M', 3) => ("%b", 3),
            ('M', n) if n >= 2 => ("%m", 2),
            ('M', _) => ("%-m", 1),
            ('d', n) if n >= 4 => ("%A", 4),
            ('d', 3) => ("%a", 3),
            ('d', n) if n >= 2 => ("%d", 2),
            ('d', _) => ("%-d", 1),
            ('H', n) if n >= 2 => ("%H", 2),
            ('H', _) => ("%-H", 1),
            ('h', n) if n >= 2 => ("%I", 2),
            ('h', _) => ("%-I", 1),
            ('m', n) if n >= 2 => ("%M", 2),
            ('m', _) => ("%-M", 1),
            ('s', n) if n >= 2 => ("%S", 2),
            ('s', _) => ("%-S", 1),
            ('t', n) if n >= 2 => ("%p", 2),
            ('%', _) => ("%%", 1),
            _ => {
                out.push(c);
                i += 1;
                continue;
            }
        };
        out.push_str(token);
        i += consumed;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 14, 5, 9).unwrap()
    }

    #[test]
    fn no_elements_falls_back_to_item_sequence() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(generate(&[], 42, fixed_now(), &mut rng), "ITEM-000042");
    }

    #[test]
    fn elements_render_in_position_order() {
        let elements = vec![
            CustomIdElement::new(2, ElementType::Sequence, Some(r#"{"Format":"D4"}"#)),
            CustomIdElement::new(1, ElementType::DateTime, Some(r#"{"Format":"yyyyMMdd"}"#)),
            CustomIdElement::new(0, ElementType::Fixed, Some("INV-")),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            generate(&elements, 12, fixed_now(), &mut rng),
            "INV-202503070012"
        );
    }

    #[test]
    fn random_elements_respect_width_and_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let six = generate(
                &[CustomIdElement::new(0, ElementType::Random6, None)],
                1,
                fixed_now(),
                &mut rng,
            );
            assert_eq!(six.len(), 6);
            assert!(six.chars().all(|c| c.is_ascii_digit()));

            let hex = generate(
                &[CustomIdElement::new(0, ElementType::Random20, Some("X5"))],
                1,
                fixed_now(),
                &mut rng,
            );
            assert_eq!(hex.len(), 5);
            assert!(u32::from_str_radix(&hex, 16).unwrap() < 1_048_576);
        }
    }

    #[test]
    fn guid_defaults_to_short_uppercase() {
        let mut rng = StdRng::seed_from_u64(3);
        let id = generate(
            &[CustomIdElement::new(0, ElementType::Guid, None)],
            1,
            fixed_now(),
            &mut rng,
        );
        assert_eq!(id.len(), 8);
        assert_eq!(id, id.to_uppercase());
    }

    #[test]
    fn guid_options_are_honored() {
        let mut rng = StdRng::seed_from_u64(3);
        let id = generate(
            &[CustomIdElement::new(
                0,
                ElementType::Guid,
                Some(r#"{"Format":"D","Length":0,"Uppercase":false}"#),
            )],
            1,
            fixed_now(),
            &mut rng,
        );
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn preview_uses_samples() {
        let elements = vec![
            CustomIdElement::new(0, ElementType::Fixed, Some("EQ-")),
            CustomIdElement::new(1, ElementType::Random20, None),
            CustomIdElement::new(2, ElementType::Fixed, Some("_")),
            CustomIdElement::new(3, ElementType::Sequence, Some("D3")),
        ];
        assert_eq!(preview(&elements, fixed_now()), "EQ-A7E3A_001");
    }

    #[test]
    fn invalid_date_options_fall_back_to_default() {
        let elements = vec![CustomIdElement::new(
            0,
            ElementType::DateTime,
            Some("not json"),
        )];
        assert_eq!(preview(&elements, fixed_now()), "2025-03-07");
    }

    #[test]
    fn date_tokens_translate() {
        assert_eq!(to_strftime("yyyy-MM-dd HH:mm:ss"), "%Y-%m-%d %H:%M:%S");
        assert_eq!(to_strftime("ddd MMM yy"), "%a %b %y");
        assert_eq!(to_strftime("100%"), "100%%");
    }

    #[test]
    fn matches_format_checks_fixed_prefixes() {
        let elements = vec![
            CustomIdElement::new(0, ElementType::Fixed, Some("INV-")),
            CustomIdElement::new(1, ElementType::Random6, None),
            CustomIdElement::new(2, ElementType::Fixed, Some("-X")),
        ];
        assert!(matches_format(&elements, "INV--X123456"));
        assert!(!matches_format(&elements, "INV-123456-X"));
        assert!(!matches_format(&elements, "ABC-"));
        assert!(matches_format(&[], "anything goes"));
    }

    #[test]
    fn oversized_widths_are_rejected_and_never_rendered() {
        for format in ["D70000", "X33", r#"{"Format":"D99999999999999999999999"}"#] {
            let element = CustomIdElement::new(0, ElementType::Sequence, Some(format));
            assert_eq!(element.check_options(), Err(WidthTooLarge));
            assert_eq!(preview(&[element], fixed_now()), "1");
        }

        let widest = CustomIdElement::new(0, ElementType::Sequence, Some("D32"));
        assert_eq!(widest.check_options(), Ok(()));
        assert_eq!(preview(&[widest], fixed_now()).len(), MAX_NUMBER_WIDTH);

        let fixed = CustomIdElement::new(0, ElementType::Fixed, Some("D70000"));
        assert_eq!(fixed.check_options(), Ok(()));
    }

    #[test]
    fn guid_length_zero_keeps_full_guid() {
        let mut rng = StdRng::seed_from_u64(5);
        let id = generate(
            &[CustomIdElement::new(
                0,
                ElementType::Guid,
                Some(r#"{"Format":"D","Length":0,"Uppercase":false}"#),
            )],
            1,
            fixed_now(),
            &mut rng,
        );
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn element_type_parses_known_names() {
        assert_eq!("Random32".parse::<ElementType>(), Ok(ElementType::Random32));
        assert!("Random64".parse::<ElementType>().is_err());
    }
}
