use serde::{Deserialize, Serialize};

/// One candidate identification for a letter slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub letter: String,
    pub confidence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Letter {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub matches: Vec<Match>,
}

impl Letter {
    /// Best candidate glyph, or `_` when the engine had no guess.
    pub fn best_glyph(&self) -> &str {
        self.matches
            .first()
            .map(|m| m.letter.as_str())
            .unwrap_or("_")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub height: u32,
    pub letters: Vec<Letter>,
}

impl Line {
    /// Line text as the engine prints it: best glyph per letter.
    pub fn text(&self) -> String {
        self.letters.iter().map(Letter::best_glyph).collect()
    }
}

/// A text block with its bounding box in source-image pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub lines: Vec<Line>,
}

/// Parsed verbose report. `lines` and `letters` repeat the entries of
/// `blocks` flattened in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub blocks: Vec<Block>,
    pub lines: Vec<Line>,
    pub letters: Vec<Letter>,
}

/// Output of one recognition call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Recognition {
    /// Plain text, or the raw report when raw output was requested.
    Text(String),
    Structured(StructuredResult),
}

impl Recognition {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Recognition::Text(text) => Some(text),
            Recognition::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&StructuredResult> {
        match self {
            Recognition::Structured(result) => Some(result),
            Recognition::Text(_) => None,
        }
    }

    pub fn into_structured(self) -> Option<StructuredResult> {
        match self {
            Recognition::Structured(result) => Some(result),
            Recognition::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter(glyphs: &[&str]) -> Letter {
        Letter {
            x: 0,
            y: 0,
            width: 4,
            height: 8,
            matches: glyphs
                .iter()
                .map(|g| Match {
                    letter: g.to_string(),
                    confidence: 10,
                })
                .collect(),
        }
    }

    #[test]
    fn test_line_text_uses_best_glyph() {
        let line = Line {
            height: 8,
            letters: vec![letter(&["H", "N"]), letter(&["i"]), letter(&[])],
        };
        assert_eq!(line.text(), "Hi_");
    }

    #[test]
    fn test_recognition_accessors() {
        let text = Recognition::Text("abc".to_string());
        assert_eq!(text.as_text(), Some("abc"));
        assert!(text.as_structured().is_none());

        let structured = Recognition::Structured(StructuredResult::default());
        assert!(structured.as_text().is_none());
        assert_eq!(
            structured.into_structured(),
            Some(StructuredResult::default())
        );
    }

    #[test]
    fn test_recognition_serializes_untagged() {
        let json = serde_json::to_value(Recognition::Text("hi".into())).unwrap();
        assert_eq!(json, serde_json::json!("hi"));

        let json =
            serde_json::to_value(Recognition::Structured(StructuredResult::default())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "blocks": [], "lines": [], "letters": [] })
        );
    }
}
