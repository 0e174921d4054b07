//! Type definitions for trash scanning

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trash categories shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrashCategory {
    Organic,
    Anorganic,
    Miscellaneous,
    Unknown,
}

impl TrashCategory {
    /// Keyword buckets in match priority order
    const KEYWORDS: &'static [(TrashCategory, &'static [&'static str])] = &[
        (
            TrashCategory::Organic,
            &["paper", "cardboard", "food", "organic"],
        ),
        (TrashCategory::Anorganic, &["glass", "metal", "plastic"]),
        (TrashCategory::Miscellaneous, &["miscellaneous", "trash"]),
    ];

    /// Map a raw classifier label to a category (case-insensitive substring match).
    ///
    /// The first bucket with a matching keyword wins, so "paper in glass jar"
    /// is Organic.
    pub fn categorize(label: &str) -> Self {
        let lowered = label.to_lowercase();

        Self::KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(category, _)| *category)
            .unwrap_or(TrashCategory::Unknown)
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Organic => "Organic",
            Self::Anorganic => "Anorganic",
            Self::Miscellaneous => "Miscellaneous",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TrashCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One ranked entry of classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    /// Confidence score (0-1)
    pub confidence: f32,
}

impl Classification {
    pub fn new<S: Into<String>>(label: S, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Item surfaced to the popup
#[derive(Debug, Clone)]
pub struct DetectedItem {
    /// Label with every word capitalized
    pub name: String,
    pub category: TrashCategory,
    /// Confidence score, clamped to 0-1
    pub confidence: f32,
    /// Cropped frame the classifier saw
    pub captured_image: Option<RgbImage>,
}

impl DetectedItem {
    /// Build from the top classification
    pub fn from_classification(top: &Classification, captured_image: Option<RgbImage>) -> Self {
        Self {
            name: capitalize_words(top.label.trim()),
            category: TrashCategory::categorize(&top.label),
            confidence: top.confidence.clamp(0.0, 1.0),
            captured_image,
        }
    }

    /// Popup copy
    pub fn headline(&self) -> String {
        format!(
            "We think this might be a {}! and it's {}",
            self.name, self.category
        )
    }
}

impl PartialEq for DetectedItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.category == other.category
            && self.confidence == other.confidence
            && self.captured_image.as_ref().map(|i| i.as_raw())
                == other.captured_image.as_ref().map(|i| i.as_raw())
    }
}

/// Uppercase the first letter of every whitespace-separated word, lowercase the rest
pub fn capitalize_words(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Popup visibility and countdown as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupState {
    pub visible: bool,
    pub countdown_remaining: u32,
    pub total_duration_secs: u32,
}

/// Why the popup closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DismissReason {
    Expired,
    Dismissed,
    SessionStopped,
}

/// State change notifications delivered to the UI boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    SessionStarted,
    SessionStopped,
    PopupShown(DetectedItem),
    CountdownChanged { remaining: u32, total: u32 },
    PopupHidden { reason: DismissReason },
    Error(String),
}

/// Observable scanner state
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerSnapshot {
    pub popup: PopupState,
    pub active_item: Option<DetectedItem>,
    pub error_message: Option<String>,
    pub session_running: bool,
}

/// Pixel format of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    RGB,
    BGR,
    RGBA,
    BGRA,
    Grayscale,
}

impl ImageFormat {
    /// Bytes per pixel
    pub fn channels(&self) -> u32 {
        match self {
            Self::RGB | Self::BGR => 3,
            Self::RGBA | Self::BGRA => 4,
            Self::Grayscale => 1,
        }
    }
}

/// Raw frame buffer
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Bytes per row, may include padding past `width * channels`
    pub bytes_per_row: usize,
    /// Pixel format
    pub format: ImageFormat,
}

impl ImageData {
    /// Create tightly packed image data
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: ImageFormat) -> Self {
        let bytes_per_row = (width * format.channels()) as usize;
        Self {
            data,
            width,
            height,
            bytes_per_row,
            format,
        }
    }

    /// Create image data with padded rows
    pub fn with_stride(
        data: Vec<u8>,
        width: u32,
        height: u32,
        bytes_per_row: usize,
        format: ImageFormat,
    ) -> Self {
        Self {
            data,
            width,
            height,
            bytes_per_row,
            format,
        }
    }

    /// Get number of channels
    pub fn channels(&self) -> u32 {
        self.format.channels()
    }

    /// Validate image data consistency
    pub fn validate(&self) -> bool {
        let row_bytes = (self.width * self.channels()) as usize;
        row_bytes > 0
            && self.height > 0
            && self.bytes_per_row >= row_bytes
            && self.data.len() >= self.bytes_per_row * self.height as usize
    }
}
