use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vocabulary normalization
//
// The planner emits free-text labels (emotion words, age bands, times
// of day, both English and Chinese). These map onto closed enums so
// the rest of the pipeline never pattern-matches on raw strings.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBand {
    Child,
    Teen,
    Youth,
    Adult,
    Elderly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Noon,
    Afternoon,
    Evening,
    Night,
    Midnight,
    Unknown,
}

pub fn normalize_emotion(raw: &str) -> Emotion {
    match raw.trim().to_lowercase().as_str() {
        "happy" | "高兴" => Emotion::Happy,
        "sad" | "悲伤" => Emotion::Sad,
        "angry" | "愤怒" => Emotion::Angry,
        "fearful" | "害怕" => Emotion::Fearful,
        "disgusted" | "厌恶" => Emotion::Disgusted,
        "surprised" | "惊讶" => Emotion::Surprised,
        "calm" | "neutral" | "normal" | "中性" | "正常" | "镇定" => Emotion::Normal,
        _ => Emotion::Normal,
    }
}

/// Empty/unrecognized input defaults to `Youth`, matching the source's
/// default of `"青年"` rather than an error.
pub fn normalize_age(raw: &str) -> AgeBand {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return AgeBand::Youth;
    }
    match trimmed.to_lowercase().as_str() {
        "童年" | "儿童" | "child" => AgeBand::Child,
        "少年" | "teenager" => AgeBand::Teen,
        "青年" | "youth" => AgeBand::Youth,
        "成年" | "中年" | "adult" | "middle age" | "middle aged" | "mid-life" => AgeBand::Adult,
        "老年" | "old" | "elderly" => AgeBand::Elderly,
        _ => AgeBand::Youth,
    }
}

/// Splits on `/` or `-` and normalizes the last segment, so planner
/// output like `"现代/晚上"` or a date-prefixed time resolves correctly.
pub fn normalize_time(raw: &str) -> TimeOfDay {
    let last = raw.split(['/', '-']).last().unwrap_or(raw).trim();
    match last.to_lowercase().as_str() {
        "清晨" | "早上" | "上午" | "morning" => TimeOfDay::Morning,
        "中午" | "noon" => TimeOfDay::Noon,
        "下午" | "afternoon" => TimeOfDay::Afternoon,
        "傍晚" | "evening" => TimeOfDay::Evening,
        "夜晚" | "晚上" | "凌晨" | "night" => TimeOfDay::Night,
        "午夜" | "midnight" => TimeOfDay::Midnight,
        _ => TimeOfDay::Unknown,
    }
}

/// A deterministic, stable identifier for a character, derived from
/// their name. Strips parenthetical asides and whitespace/slashes, then
/// slugs the remainder; names with no ASCII-alphanumeric remainder (the
/// common case for Chinese names) fall back to a hash-derived slug
/// rather than transliterating, since no pinyin crate is part of this
/// stack — see the character-tag open question in DESIGN.md. Always
/// suffixed with the last two hex characters of the name's MD5 digest
/// to keep distinct names from colliding after slugging.
pub fn character_tag(name: &str) -> String {
    let digest = Md5::digest(name.as_bytes());
    let hex = format!("{digest:x}");
    let suffix = &hex[hex.len() - 2..];

    let cleaned = strip_parentheticals(name)
        .replace('/', "")
        .replace(' ', "");

    let slug = if !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_alphanumeric()) {
        cleaned.to_lowercase()
    } else {
        format!("char{}", &hex[..6])
    };

    format!("{slug}{suffix}")
}

fn strip_parentheticals(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth: u32 = 0;
    for c in s.chars() {
        match c {
            '(' | '（' => depth += 1,
            ')' | '）' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_maps_english_and_chinese_synonyms() {
        assert_eq!(normalize_emotion("Happy"), Emotion::Happy);
        assert_eq!(normalize_emotion("高兴"), Emotion::Happy);
        assert_eq!(normalize_emotion("calm"), Emotion::Normal);
        assert_eq!(normalize_emotion("镇定"), Emotion::Normal);
    }

    #[test]
    fn emotion_unrecognized_defaults_to_normal() {
        assert_eq!(normalize_emotion("ecstatic"), Emotion::Normal);
    }

    #[test]
    fn age_empty_defaults_to_youth() {
        assert_eq!(normalize_age(""), AgeBand::Youth);
        assert_eq!(normalize_age("   "), AgeBand::Youth);
    }

    #[test]
    fn age_middle_variants_collapse_to_adult() {
        assert_eq!(normalize_age("中年"), AgeBand::Adult);
        assert_eq!(normalize_age("middle aged"), AgeBand::Adult);
        assert_eq!(normalize_age("mid-life"), AgeBand::Adult);
    }

    #[test]
    fn time_splits_on_slash_or_dash_and_takes_last_segment() {
        assert_eq!(normalize_time("现代/晚上"), TimeOfDay::Night);
        assert_eq!(normalize_time("2024-morning"), TimeOfDay::Morning);
    }

    #[test]
    fn time_unrecognized_is_unknown() {
        assert_eq!(normalize_time("teatime"), TimeOfDay::Unknown);
    }

    #[test]
    fn character_tag_strips_parens_and_slashes() {
        let tag = character_tag("Alice (the Scientist)/");
        assert!(tag.starts_with("alicethescientist") || tag.len() >= 8);
    }

    #[test]
    fn character_tag_is_deterministic() {
        assert_eq!(character_tag("Alice"), character_tag("Alice"));
    }

    #[test]
    fn character_tag_differs_for_different_names() {
        assert_ne!(character_tag("Alice"), character_tag("Bob"));
    }

    #[test]
    fn character_tag_non_latin_name_falls_back_to_hash_slug() {
        let tag = character_tag("爱丽丝");
        assert!(tag.starts_with("char"));
    }
}
