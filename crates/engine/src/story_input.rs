//! The structured story "pitch" fed to Phase A: a logline, a cast of
//! characters the author wants to see (the planner is free to add more,
//! which is why character portraits are also submitted reactively as
//! `<character>` elements are observed rather than solely from this
//! list), and free-form theme tags.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSeed {
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryInput {
    pub logline: String,
    #[serde(default)]
    pub characters: Vec<CharacterSeed>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl StoryInput {
    /// True if `name` was one of the characters the caller pitched
    /// (vs. one the planner introduced on its own).
    pub fn has_character(&self, name: &str) -> bool {
        self.characters.iter().any(|c| c.name == name)
    }

    pub fn character(&self, name: &str) -> Option<&CharacterSeed> {
        self.characters.iter().find(|c| c.name == name)
    }

    /// Renders the pitch into the single text prompt the prompt
    /// service's `plan_story` consumes.
    pub fn render(&self) -> String {
        let mut out = format!("Logline: {}\n", self.logline);
        if !self.characters.is_empty() {
            out.push_str("Characters: ");
            out.push_str(
                &self
                    .characters
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            out.push('\n');
        }
        if !self.tags.is_empty() {
            out.push_str("Tags: ");
            out.push_str(&self.tags.join(", "));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_character_checks_seed_list() {
        let input = StoryInput {
            logline: "A lab at night.".into(),
            characters: vec![CharacterSeed {
                name: "Alice".into(),
                gender: None,
                age: None,
            }],
            tags: vec![],
        };
        assert!(input.has_character("Alice"));
        assert!(!input.has_character("Bob"));
    }

    #[test]
    fn render_includes_logline_characters_and_tags() {
        let input = StoryInput {
            logline: "A lab at night.".into(),
            characters: vec![CharacterSeed {
                name: "Alice".into(),
                gender: None,
                age: None,
            }],
            tags: vec!["scifi".into()],
        };
        let rendered = input.render();
        assert!(rendered.contains("A lab at night."));
        assert!(rendered.contains("Alice"));
        assert!(rendered.contains("scifi"));
    }
}
