//! Question catalog — the fixed ordered survey the bot walks users through.
//!
//! Loaded once at startup (built-in defaults or a JSON file) and validated;
//! a malformed catalog is a fatal configuration error. Never mutated after
//! load.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A single survey question: stable id, prompt text, and the literal answer
/// labels offered as a reply keyboard. Option order is presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDefinition {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

/// The ordered, immutable set of survey questions.
#[derive(Debug, Clone)]
pub struct Catalog {
    questions: Vec<QuestionDefinition>,
}

impl Catalog {
    /// Build a catalog from explicit definitions, validating them.
    pub fn new(questions: Vec<QuestionDefinition>) -> Result<Self, ConfigError> {
        validate(&questions)?;
        Ok(Self { questions })
    }

    /// Load a catalog from a JSON file (an array of question definitions).
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let questions: Vec<QuestionDefinition> = serde_json::from_str(&data)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        Self::new(questions)
    }

    /// The built-in question set: genre, length, and mood.
    pub fn default_set() -> Self {
        let questions = vec![
            QuestionDefinition {
                id: "genre".to_string(),
                text: "چه ژانری رو بیشتر دوست داری؟".to_string(),
                options: vec![
                    "کمدی".to_string(),
                    "درام".to_string(),
                    "اکشن".to_string(),
                    "علمی تخیلی".to_string(),
                    "ترسناک".to_string(),
                    "عاشقانه".to_string(),
                ],
            },
            QuestionDefinition {
                id: "length".to_string(),
                text: "چقدر وقت برای تماشا داری؟".to_string(),
                options: vec![
                    "یک فیلم کوتاه".to_string(),
                    "یک فیلم بلند".to_string(),
                    "یک مینی سریال".to_string(),
                    "یک سریال بلند".to_string(),
                ],
            },
            QuestionDefinition {
                id: "mood".to_string(),
                text: "الان چه حال و هوایی داری؟".to_string(),
                options: vec![
                    "شاد".to_string(),
                    "غمگین".to_string(),
                    "هیجان‌زده".to_string(),
                    "آرام".to_string(),
                ],
            },
        ];
        Self { questions }
    }

    /// All questions, in presentation order.
    pub fn definitions(&self) -> &[QuestionDefinition] {
        &self.questions
    }

    /// Question at `index`, if any.
    pub fn by_index(&self, index: usize) -> Option<&QuestionDefinition> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

fn validate(questions: &[QuestionDefinition]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for q in questions {
        if q.id.trim().is_empty() {
            return Err(ConfigError::InvalidCatalog("question with empty id".into()));
        }
        if q.text.trim().is_empty() {
            return Err(ConfigError::InvalidCatalog(format!(
                "question {} has empty text",
                q.id
            )));
        }
        if q.options.is_empty() {
            return Err(ConfigError::InvalidCatalog(format!(
                "question {} has no options",
                q.id
            )));
        }
        if q.options.iter().any(|o| o.trim().is_empty()) {
            return Err(ConfigError::InvalidCatalog(format!(
                "question {} has an empty option label",
                q.id
            )));
        }
        if !seen.insert(q.id.as_str()) {
            return Err(ConfigError::InvalidCatalog(format!(
                "duplicate question id: {}",
                q.id
            )));
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str, text: &str, options: &[&str]) -> QuestionDefinition {
        QuestionDefinition {
            id: id.into(),
            text: text.into(),
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn default_set_order_is_genre_length_mood() {
        let catalog = Catalog::default_set();
        let ids: Vec<&str> = catalog.definitions().iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, ["genre", "length", "mood"]);
    }

    #[test]
    fn by_index_in_and_out_of_range() {
        let catalog = Catalog::default_set();
        assert_eq!(catalog.by_index(0).unwrap().id, "genre");
        assert_eq!(catalog.by_index(2).unwrap().id, "mood");
        assert!(catalog.by_index(3).is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = Catalog::new(vec![
            q("genre", "ژانر؟", &["کمدی"]),
            q("genre", "باز هم ژانر؟", &["درام"]),
        ]);
        assert!(matches!(result, Err(ConfigError::InvalidCatalog(_))));
    }

    #[test]
    fn rejects_empty_options() {
        let result = Catalog::new(vec![q("genre", "ژانر؟", &[])]);
        assert!(matches!(result, Err(ConfigError::InvalidCatalog(_))));
    }

    #[test]
    fn rejects_empty_id_and_text() {
        assert!(Catalog::new(vec![q("", "متن", &["الف"])]).is_err());
        assert!(Catalog::new(vec![q("x", "  ", &["الف"])]).is_err());
    }

    #[test]
    fn empty_catalog_is_valid() {
        let catalog = Catalog::new(vec![]).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
    }

    #[test]
    fn parses_catalog_json() {
        let json = r#"[{"id":"genre","text":"ژانر؟","options":["کمدی","درام"]}]"#;
        let questions: Vec<QuestionDefinition> = serde_json::from_str(json).unwrap();
        let catalog = Catalog::new(questions).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.by_index(0).unwrap().options, ["کمدی", "درام"]);
    }
}
