//! Shared helper for mapping a raw dialogue `emotion` string onto the
//! same lowercase label the portrait task used as its `url_map` key
//! (see `np_engine::jobs::emotion_label_from_url`), so portrait lookups
//! in the streaming resolver, the offline downloader, and the
//! script-writer all agree on one label for the same emotion.

use np_domain::models::normalize_emotion;

pub fn emotion_label(emotion: &str) -> String {
    serde_json::to_value(normalize_emotion(emotion))
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "normal".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_and_english_synonyms_agree() {
        assert_eq!(emotion_label("高兴"), emotion_label("happy"));
    }

    #[test]
    fn unrecognized_falls_back_to_normal() {
        assert_eq!(emotion_label("ecstatic"), "normal");
    }
}
