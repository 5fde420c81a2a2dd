use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The eight ratios offered to users. Only five are accepted by the backend;
/// see [`AspectRatio::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "21:9")]
    Ultrawide21x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Square,
        AspectRatio::Portrait2x3,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
        AspectRatio::Ultrawide21x9,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Ultrawide21x9 => "21:9",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().replace(|ch: char| ch == 'x' || ch == 'X', ":");
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == normalized)
    }

    pub fn is_backend_supported(self) -> bool {
        matches!(
            self,
            AspectRatio::Square
                | AspectRatio::Portrait3x4
                | AspectRatio::Landscape4x3
                | AspectRatio::Portrait9x16
                | AspectRatio::Landscape16x9
        )
    }

    /// Nearest backend-accepted ratio with the same orientation.
    pub fn normalized(self) -> AspectRatio {
        match self {
            AspectRatio::Portrait2x3 => AspectRatio::Portrait3x4,
            AspectRatio::Landscape3x2 => AspectRatio::Landscape4x3,
            AspectRatio::Ultrawide21x9 => AspectRatio::Landscape16x9,
            supported => supported,
        }
    }

    /// Pixel dimensions for a given long edge, used by offline rendering.
    pub fn dimensions(self, long_edge: u32) -> (u32, u32) {
        let (w, h) = match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Portrait2x3 => (2, 3),
            AspectRatio::Landscape3x2 => (3, 2),
            AspectRatio::Portrait3x4 => (3, 4),
            AspectRatio::Landscape4x3 => (4, 3),
            AspectRatio::Portrait9x16 => (9, 16),
            AspectRatio::Landscape16x9 => (16, 9),
            AspectRatio::Ultrawide21x9 => (21, 9),
        };
        if w >= h {
            (long_edge, (long_edge * h / w).max(1))
        } else {
            ((long_edge * w / h).max(1), long_edge)
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw).ok_or_else(|| format!("unsupported aspect ratio '{raw}'"))
    }
}

/// Total mapping from any ratio string to one of the five backend ratios.
/// Unknown input becomes `1:1`.
pub fn normalize_aspect_ratio(raw: &str) -> &'static str {
    AspectRatio::parse(raw)
        .map(AspectRatio::normalized)
        .unwrap_or(AspectRatio::Square)
        .as_str()
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ImageResolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageResolution::OneK => "1K",
            ImageResolution::TwoK => "2K",
            ImageResolution::FourK => "4K",
        }
    }

    pub fn long_edge(self) -> u32 {
        match self {
            ImageResolution::OneK => 1024,
            ImageResolution::TwoK => 2048,
            ImageResolution::FourK => 4096,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "1K" => Some(ImageResolution::OneK),
            "2K" => Some(ImageResolution::TwoK),
            "4K" => Some(ImageResolution::FourK),
            _ => None,
        }
    }
}

impl fmt::Display for ImageResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageResolution {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw).ok_or_else(|| format!("unsupported resolution '{raw}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCEPTED: [&str; 5] = ["1:1", "3:4", "4:3", "9:16", "16:9"];

    #[test]
    fn every_ratio_normalizes_into_accepted_set() {
        for ratio in AspectRatio::ALL {
            let normalized = ratio.normalized();
            assert!(ACCEPTED.contains(&normalized.as_str()), "{ratio}");
            assert!(normalized.is_backend_supported());
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        for ratio in AspectRatio::ALL {
            assert_eq!(ratio.normalized().normalized(), ratio.normalized());
        }
        for accepted in ACCEPTED {
            assert_eq!(normalize_aspect_ratio(accepted), accepted);
        }
    }

    #[test]
    fn unsupported_ratios_snap_by_orientation() {
        assert_eq!(normalize_aspect_ratio("2:3"), "3:4");
        assert_eq!(normalize_aspect_ratio("3:2"), "4:3");
        assert_eq!(normalize_aspect_ratio("21:9"), "16:9");
    }

    #[test]
    fn unknown_ratio_defaults_to_square() {
        assert_eq!(normalize_aspect_ratio("5:4"), "1:1");
        assert_eq!(normalize_aspect_ratio(""), "1:1");
        assert_eq!(normalize_aspect_ratio("wide"), "1:1");
    }

    #[test]
    fn ratio_parse_accepts_x_separator() {
        assert_eq!(AspectRatio::parse("16x9"), Some(AspectRatio::Landscape16x9));
        assert!("7:5".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn dimensions_follow_orientation() {
        assert_eq!(AspectRatio::Landscape16x9.dimensions(1024), (1024, 576));
        assert_eq!(AspectRatio::Portrait3x4.dimensions(1024), (768, 1024));
        assert_eq!(AspectRatio::Square.dimensions(64), (64, 64));
    }

    #[test]
    fn resolution_ordering_and_parsing() {
        assert!(ImageResolution::OneK < ImageResolution::TwoK);
        assert!(ImageResolution::TwoK < ImageResolution::FourK);
        assert_eq!(ImageResolution::parse("4k"), Some(ImageResolution::FourK));
        assert_eq!(
            serde_json::to_value(ImageResolution::TwoK).unwrap(),
            serde_json::json!("2K")
        );
    }
}
