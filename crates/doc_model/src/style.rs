//! Character and paragraph formatting properties
//!
//! Every field is optional: `None` means "not set here, inherit". Merging
//! layers one property set over another with the overlay winning wherever it
//! has a value.

use serde::{Deserialize, Serialize};

/// Text alignment options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

/// Character-level formatting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterProperties {
    /// Font family name
    pub font_family: Option<String>,
    /// Font size in points
    pub font_size: Option<f32>,
    /// Bold formatting
    pub bold: Option<bool>,
    /// Italic formatting
    pub italic: Option<bool>,
    /// Underline formatting
    pub underline: Option<bool>,
    /// Strikethrough formatting
    pub strikethrough: Option<bool>,
    /// Text color (CSS color string)
    pub color: Option<String>,
    /// Highlight/background color (CSS color string)
    pub highlight: Option<String>,
}

impl CharacterProperties {
    /// Create new empty character properties
    pub fn new() -> Self {
        Self::default()
    }

    /// Bold-only property set
    pub fn bold() -> Self {
        Self {
            bold: Some(true),
            ..Self::default()
        }
    }

    /// Merge another set of properties on top of this one
    /// Properties from `other` override properties from `self` when present
    pub fn merge(&self, other: &CharacterProperties) -> CharacterProperties {
        CharacterProperties {
            font_family: other.font_family.clone().or_else(|| self.font_family.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            underline: other.underline.or(self.underline),
            strikethrough: other.strikethrough.or(self.strikethrough),
            color: other.color.clone().or_else(|| self.color.clone()),
            highlight: other.highlight.clone().or_else(|| self.highlight.clone()),
        }
    }

    /// Check if all properties are None
    pub fn is_empty(&self) -> bool {
        self.font_family.is_none()
            && self.font_size.is_none()
            && self.bold.is_none()
            && self.italic.is_none()
            && self.underline.is_none()
            && self.strikethrough.is_none()
            && self.color.is_none()
            && self.highlight.is_none()
    }
}

/// Paragraph-level formatting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParagraphProperties {
    /// Text alignment
    pub alignment: Option<Alignment>,
}

impl ParagraphProperties {
    /// Create new empty paragraph properties
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another set of properties on top of this one
    pub fn merge(&self, other: &ParagraphProperties) -> ParagraphProperties {
        ParagraphProperties {
            alignment: other.alignment.or(self.alignment),
        }
    }

    /// Check if all properties are None
    pub fn is_empty(&self) -> bool {
        self.alignment.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overlay_wins() {
        let base = CharacterProperties {
            bold: Some(true),
            color: Some("#000000".into()),
            ..Default::default()
        };
        let overlay = CharacterProperties {
            bold: Some(false),
            italic: Some(true),
            ..Default::default()
        };

        let merged = base.merge(&overlay);
        assert_eq!(merged.bold, Some(false));
        assert_eq!(merged.italic, Some(true));
        assert_eq!(merged.color.as_deref(), Some("#000000"));
    }

    #[test]
    fn test_empty_properties() {
        assert!(CharacterProperties::new().is_empty());
        assert!(!CharacterProperties::bold().is_empty());
        assert!(ParagraphProperties::new().is_empty());
    }
}
