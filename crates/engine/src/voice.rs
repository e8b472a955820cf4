//! Voice selection. For a given (description, gender, age) the engine
//! wants a stable voice id: check the request-scoped cache first, then
//! ask the media library, falling back to an unfiltered search if the
//! filtered one comes up empty.
//!
//! `match_voice` then picks the first candidate not already assigned to
//! a different character-role, so two characters who share a
//! gender/age band don't end up reading in the identical voice. If
//! every candidate collides, the first result is reused anyway (the
//! original's fallback once it runs out of fresh candidates).

use np_domain::error::{Error, Result};
use np_providers::{AudioHit, AudioSearch};
use std::collections::{HashMap, HashSet};

pub async fn select_voice(
    audio_search: &dyn AudioSearch,
    cache: &mut HashMap<String, String>,
    assigned: &HashSet<String>,
    description: &str,
    gender: Option<&str>,
    age: Option<&str>,
) -> Result<String> {
    let cache_key = format!("{description}|{}|{}", gender.unwrap_or(""), age.unwrap_or(""));
    if let Some(existing) = cache.get(&cache_key) {
        return Ok(existing.clone());
    }

    let candidates = audio_search.search_voice(description, gender, age).await?;
    let candidates = if candidates.is_empty() && (gender.is_some() || age.is_some()) {
        audio_search.search_voice(description, None, None).await?
    } else {
        candidates
    };
    if candidates.is_empty() {
        return Err(no_results_error());
    }

    let voice_id = match_voice(&candidates, assigned);
    cache.insert(cache_key, voice_id.clone());
    Ok(voice_id)
}

/// The first candidate not already in `assigned`, or the first result
/// if every candidate collides.
fn match_voice(candidates: &[AudioHit], assigned: &HashSet<String>) -> String {
    candidates
        .iter()
        .find(|hit| !assigned.contains(&hit.id))
        .or_else(|| candidates.first())
        .expect("candidates is non-empty")
        .id
        .clone()
}

fn no_results_error() -> Error {
    Error::Provider {
        provider: "mediahub".into(),
        message: "voice search returned no results".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use np_providers::AudioSearchQuery;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeSearch {
        calls: AtomicUsize,
        responses: Mutex<Vec<Vec<AudioHit>>>,
        queries: Mutex<Vec<String>>,
    }

    fn hit(id: &str) -> AudioHit {
        AudioHit {
            id: id.into(),
            name: "voice".into(),
            duration: None,
            distance: None,
        }
    }

    impl FakeSearch {
        fn new(responses: Vec<Vec<AudioHit>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AudioSearch for FakeSearch {
        async fn search(&self, _query: &str, _opts: AudioSearchQuery) -> Result<Option<AudioHit>> {
            unimplemented!()
        }

        async fn search_voice(&self, query: &str, _gender: Option<&str>, _age: Option<&str>) -> Result<Vec<AudioHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.responses.lock().unwrap().remove(0))
        }

        async fn download_url(&self, _id: &str) -> Result<String> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_search() {
        let search = FakeSearch::new(vec![]);
        let mut cache = HashMap::new();
        cache.insert("d|m|youth".to_string(), "v1".to_string());
        let assigned = HashSet::new();
        let voice = select_voice(&search, &mut cache, &assigned, "d", Some("m"), Some("youth"))
            .await
            .unwrap();
        assert_eq!(voice, "v1");
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn description_is_forwarded_as_the_search_query() {
        let search = FakeSearch::new(vec![vec![hit("v1")]]);
        let mut cache = HashMap::new();
        let assigned = HashSet::new();
        select_voice(&search, &mut cache, &assigned, "a gruff old sailor", Some("m"), Some("youth"))
            .await
            .unwrap();
        assert_eq!(search.queries.lock().unwrap().as_slice(), ["a gruff old sailor"]);
    }

    #[tokio::test]
    async fn retries_without_filters_on_empty_first_search() {
        let search = FakeSearch::new(vec![vec![], vec![hit("v2")]]);
        let mut cache = HashMap::new();
        let assigned = HashSet::new();
        let voice = select_voice(&search, &mut cache, &assigned, "d", Some("m"), Some("youth"))
            .await
            .unwrap();
        assert_eq!(voice, "v2");
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_filters_and_empty_result_is_an_error() {
        let search = FakeSearch::new(vec![vec![]]);
        let mut cache = HashMap::new();
        let assigned = HashSet::new();
        let err = select_voice(&search, &mut cache, &assigned, "d", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[tokio::test]
    async fn picks_first_candidate_not_already_assigned() {
        let search = FakeSearch::new(vec![vec![hit("v1"), hit("v2"), hit("v3")]]);
        let mut cache = HashMap::new();
        let mut assigned = HashSet::new();
        assigned.insert("v1".to_string());
        let voice = select_voice(&search, &mut cache, &assigned, "d", None, None)
            .await
            .unwrap();
        assert_eq!(voice, "v2");
    }

    #[tokio::test]
    async fn falls_back_to_first_result_when_every_candidate_collides() {
        let search = FakeSearch::new(vec![vec![hit("v1"), hit("v2")]]);
        let mut cache = HashMap::new();
        let mut assigned = HashSet::new();
        assigned.insert("v1".to_string());
        assigned.insert("v2".to_string());
        let voice = select_voice(&search, &mut cache, &assigned, "d", None, None)
            .await
            .unwrap();
        assert_eq!(voice, "v1");
    }
}
