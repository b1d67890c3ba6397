//! Active-format persistence inside tables
//!
//! While the caret is inside a table the tracker accumulates the formats it
//! sees at the caret. Text typed in the table and cells created by row or
//! column insertion get those formats, minus any the user explicitly turned
//! off. Leaving the table, or moving to a different one, ends the session.

use doc_model::{
    Alignment, CharacterProperties, DocumentTree, ParagraphProperties, Selection, TableId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Formats that persist across edits inside a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FormatKey {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    FontFamily,
    FontSize,
    Color,
    Background,
    Alignment,
}

/// Value carried by an active format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormatValue {
    /// A switch-style format that is on
    On,
    Text(String),
    Size(f32),
    Align(Alignment),
}

/// Mapping of active formats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveFormats(BTreeMap<FormatKey, FormatValue>);

impl ActiveFormats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats present in a pair of property sets
    pub fn from_properties(chars: &CharacterProperties, para: &ParagraphProperties) -> Self {
        let mut formats = Self::new();
        let switches = [
            (FormatKey::Bold, chars.bold),
            (FormatKey::Italic, chars.italic),
            (FormatKey::Underline, chars.underline),
            (FormatKey::Strikethrough, chars.strikethrough),
        ];
        for (key, value) in switches {
            if value == Some(true) {
                formats.insert(key, FormatValue::On);
            }
        }
        if let Some(family) = &chars.font_family {
            formats.insert(FormatKey::FontFamily, FormatValue::Text(family.clone()));
        }
        if let Some(size) = chars.font_size {
            formats.insert(FormatKey::FontSize, FormatValue::Size(size));
        }
        if let Some(color) = &chars.color {
            formats.insert(FormatKey::Color, FormatValue::Text(color.clone()));
        }
        if let Some(background) = &chars.highlight {
            formats.insert(FormatKey::Background, FormatValue::Text(background.clone()));
        }
        if let Some(alignment) = para.alignment {
            formats.insert(FormatKey::Alignment, FormatValue::Align(alignment));
        }
        formats
    }

    pub fn get(&self, key: FormatKey) -> Option<&FormatValue> {
        self.0.get(&key)
    }

    pub fn contains(&self, key: FormatKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn insert(&mut self, key: FormatKey, value: FormatValue) {
        self.0.insert(key, value);
    }

    pub fn remove(&mut self, key: FormatKey) -> Option<FormatValue> {
        self.0.remove(&key)
    }

    /// Layer another mapping over this one
    pub fn merge(&mut self, other: &ActiveFormats) {
        for (key, value) in &other.0 {
            self.0.insert(*key, value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = FormatKey> + '_ {
        self.0.keys().copied()
    }

    /// Character properties for this mapping, leaving out `excluded` keys
    pub fn to_character_properties(&self, excluded: &BTreeSet<FormatKey>) -> CharacterProperties {
        let mut props = CharacterProperties::default();
        for (key, value) in self.0.iter().filter(|(k, _)| !excluded.contains(k)) {
            match (key, value) {
                (FormatKey::Bold, FormatValue::On) => props.bold = Some(true),
                (FormatKey::Italic, FormatValue::On) => props.italic = Some(true),
                (FormatKey::Underline, FormatValue::On) => props.underline = Some(true),
                (FormatKey::Strikethrough, FormatValue::On) => props.strikethrough = Some(true),
                (FormatKey::FontFamily, FormatValue::Text(family)) => {
                    props.font_family = Some(family.clone())
                }
                (FormatKey::FontSize, FormatValue::Size(size)) => props.font_size = Some(*size),
                (FormatKey::Color, FormatValue::Text(color)) => props.color = Some(color.clone()),
                (FormatKey::Background, FormatValue::Text(color)) => {
                    props.highlight = Some(color.clone())
                }
                _ => {}
            }
        }
        props
    }

    /// Alignment, if active
    pub fn alignment(&self) -> Option<Alignment> {
        match self.0.get(&FormatKey::Alignment) {
            Some(FormatValue::Align(alignment)) => Some(*alignment),
            _ => None,
        }
    }
}

/// Tracks formats for one table editing session
#[derive(Debug, Clone, Default)]
pub struct FormatTracker {
    active: ActiveFormats,
    toggled_off: BTreeSet<FormatKey>,
    session: Option<TableId>,
}

impl FormatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of the current session
    pub fn session(&self) -> Option<&TableId> {
        self.session.as_ref()
    }

    pub fn in_session(&self) -> bool {
        self.session.is_some()
    }

    /// The active-format mapping
    pub fn active(&self) -> &ActiveFormats {
        &self.active
    }

    /// Formats the user explicitly turned off in this session
    pub fn toggled_off(&self) -> &BTreeSet<FormatKey> {
        &self.toggled_off
    }

    /// Look at the caret. Inside a table, formats found there join the
    /// mapping; outside every table the session ends.
    pub fn observe(&mut self, tree: &DocumentTree, selection: &Selection) {
        let position = selection.focus;
        let Some(para) = tree.get_paragraph(position.node_id) else {
            self.end_session();
            return;
        };
        let Some(tag) = para.cell.as_ref() else {
            self.end_session();
            return;
        };
        if self.session.as_ref() != Some(&tag.table_id) {
            self.end_session();
            tracing::trace!("Format session started in table {}", tag.table_id);
            self.session = Some(tag.table_id.clone());
        }
        let chars = tree.character_format_at(&position);
        let found = ActiveFormats::from_properties(&chars, &para.direct_formatting);
        self.active.merge(&found);
    }

    /// Explicitly turn a format on (with a value) or off (with None)
    pub fn toggle(&mut self, key: FormatKey, value: Option<FormatValue>) {
        match value {
            Some(value) => {
                self.toggled_off.remove(&key);
                self.active.insert(key, value);
            }
            None => {
                self.active.remove(key);
                self.toggled_off.insert(key);
            }
        }
        tracing::trace!("Format {:?} toggled, now active: {}", key, self.active.contains(key));
    }

    /// Formatting for text typed inside the session's table
    pub fn restamp_formatting(&self) -> Option<CharacterProperties> {
        self.session
            .as_ref()
            .map(|_| self.active.to_character_properties(&self.toggled_off))
    }

    /// Formats to reapply to newly created cells
    pub fn captured(&self) -> (CharacterProperties, ParagraphProperties) {
        let chars = self.active.to_character_properties(&self.toggled_off);
        let alignment = if self.toggled_off.contains(&FormatKey::Alignment) {
            None
        } else {
            self.active.alignment()
        };
        (chars, ParagraphProperties { alignment })
    }

    /// Drop formats the user turned off in this session from a captured
    /// pair, for deferred work that runs after the toggle
    pub fn without_toggled_off(
        &self,
        characters: &CharacterProperties,
        paragraph: &ParagraphProperties,
    ) -> (CharacterProperties, ParagraphProperties) {
        let kept = ActiveFormats::from_properties(characters, paragraph);
        let chars = kept.to_character_properties(&self.toggled_off);
        let alignment = paragraph
            .alignment
            .filter(|_| !self.toggled_off.contains(&FormatKey::Alignment));
        (chars, ParagraphProperties { alignment })
    }

    /// Clear the mapping and the toggled-off set
    pub fn end_session(&mut self) {
        if let Some(table_id) = self.session.take() {
            tracing::trace!("Format session ended in table {}", table_id);
        }
        self.active = ActiveFormats::new();
        self.toggled_off.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Node, NodeId, Position, TableSpec};

    fn doc_with_table() -> (DocumentTree, NodeId, NodeId) {
        let mut tree = DocumentTree::with_empty_paragraph();
        let at = Position::start_of(tree.document.children()[0]);
        let table = tree.insert_table(&TableSpec::new(1, 2), &at).unwrap();
        let blocks = tree.table_blocks(table);
        (tree, blocks[0], blocks[1])
    }

    #[test]
    fn test_observation_merges_and_persists() {
        let (mut tree, a, b) = doc_with_table();
        let bold = CharacterProperties::bold();
        tree.insert_text(&Position::start_of(a), "bold", Some(&bold)).unwrap();

        let mut tracker = FormatTracker::new();
        tracker.observe(&tree, &Selection::collapsed(Position::new(a, 2)));
        assert!(tracker.active().contains(FormatKey::Bold));

        // Plain cell: bold stays in the mapping
        tracker.observe(&tree, &Selection::at_start_of(b));
        assert_eq!(tracker.restamp_formatting().unwrap().bold, Some(true));
    }

    #[test]
    fn test_explicit_toggle_off_wins() {
        let (mut tree, a, _) = doc_with_table();
        let bold = CharacterProperties::bold();
        tree.insert_text(&Position::start_of(a), "bold", Some(&bold)).unwrap();
        let mut tracker = FormatTracker::new();
        tracker.observe(&tree, &Selection::collapsed(Position::new(a, 2)));

        tracker.toggle(FormatKey::Bold, None);
        tracker.observe(&tree, &Selection::collapsed(Position::new(a, 3)));
        assert_eq!(tracker.restamp_formatting().unwrap().bold, None);

        tracker.toggle(FormatKey::Bold, Some(FormatValue::On));
        assert_eq!(tracker.restamp_formatting().unwrap().bold, Some(true));
    }

    #[test]
    fn test_leaving_table_ends_session() {
        let (tree, a, _) = doc_with_table();
        let body = *tree.document.children().last().unwrap();
        let mut tracker = FormatTracker::new();
        tracker.observe(&tree, &Selection::at_start_of(a));
        tracker.toggle(FormatKey::Italic, Some(FormatValue::On));
        assert!(tracker.in_session());

        tracker.observe(&tree, &Selection::at_start_of(body));
        assert!(!tracker.in_session());
        assert!(tracker.active().is_empty());
        assert!(tracker.restamp_formatting().is_none());
    }

    #[test]
    fn test_captured_includes_alignment() {
        let mut tracker = FormatTracker::new();
        tracker.toggle(FormatKey::Alignment, Some(FormatValue::Align(Alignment::Right)));
        tracker.toggle(FormatKey::Color, Some(FormatValue::Text("#333".into())));
        let (chars, para) = tracker.captured();
        assert_eq!(chars.color.as_deref(), Some("#333"));
        assert_eq!(para.alignment, Some(Alignment::Right));
    }

    #[test]
    fn test_captured_formats_lose_later_toggle_off() {
        let mut tracker = FormatTracker::new();
        tracker.toggle(FormatKey::Bold, Some(FormatValue::On));
        tracker.toggle(FormatKey::Alignment, Some(FormatValue::Align(Alignment::Center)));
        let (chars, para) = tracker.captured();

        tracker.toggle(FormatKey::Bold, None);
        let (chars, para) = tracker.without_toggled_off(&chars, &para);
        assert_eq!(chars.bold, None);
        assert_eq!(para.alignment, Some(Alignment::Center));
    }

    #[test]
    fn test_from_properties_ignores_explicit_false() {
        let chars = CharacterProperties {
            bold: Some(false),
            font_size: Some(14.0),
            ..Default::default()
        };
        let formats = ActiveFormats::from_properties(&chars, &ParagraphProperties::default());
        assert!(!formats.contains(FormatKey::Bold));
        assert_eq!(formats.get(FormatKey::FontSize), Some(&FormatValue::Size(14.0)));
    }
}
