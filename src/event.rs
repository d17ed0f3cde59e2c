// Relaymux Event & Filter Model (NIP-01).
//
// `id == sha256(json([0, pubkey, created_at, kind, tags, content]))` and
// `sig` is a valid BIP-340 schnorr signature of `id` under `pubkey`. The
// core only verifies inbound events from relays (outbound client `EVENT`
// publishes are forwarded verbatim — see crate::router).

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::atoms::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Recompute the canonical id and compare against the stored one.
    pub fn computed_id(&self) -> RelayResult<String> {
        let serialized = json!([0, self.pubkey, self.created_at, self.kind, self.tags, self.content]);
        let bytes = serde_json::to_vec(&serialized).map_err(RelayError::Serialization)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Verify `id` matches the canonical hash and `sig` is a valid
    /// schnorr signature of `id` under `pubkey`. Performed once per
    /// inbound event from a relay, before enqueueing.
    pub fn verify(&self) -> RelayResult<bool> {
        let computed = self.computed_id()?;
        if computed != self.id {
            return Ok(false);
        }

        let pubkey_bytes = hex::decode(&self.pubkey).map_err(|e| RelayError::Crypto(e.to_string()))?;
        if pubkey_bytes.len() != 32 {
            return Ok(false);
        }
        let sig_bytes = hex::decode(&self.sig).map_err(|e| RelayError::Crypto(e.to_string()))?;
        if sig_bytes.len() != 64 {
            return Ok(false);
        }
        let id_bytes = hex::decode(&self.id).map_err(|e| RelayError::Crypto(e.to_string()))?;

        let verifying_key = match k256::schnorr::VerifyingKey::from_bytes(&pubkey_bytes) {
            Ok(k) => k,
            Err(_) => return Ok(false),
        };
        let signature = match k256::schnorr::Signature::try_from(sig_bytes.as_slice()) {
            Ok(s) => s,
            Err(_) => return Ok(false),
        };

        use k256::schnorr::signature::Verifier;
        Ok(verifying_key.verify(&id_bytes, &signature).is_ok())
    }
}

/// A single filter. An empty filter (all fields `None`) matches every
/// event; a filter SET with no filters matches nothing (see `FilterSet`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(rename = "#e", default, skip_serializing_if = "Option::is_none")]
    pub e: Option<Vec<String>>,
    #[serde(rename = "#p", default, skip_serializing_if = "Option::is_none")]
    pub p: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Filter {
    /// AND across fields; OR within each list. A field that is absent is
    /// vacuously satisfied.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &event.id) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| a == &event.pubkey) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        if let Some(e_refs) = &self.e {
            if !has_tag_match(&event.tags, "e", e_refs) {
                return false;
            }
        }
        if let Some(p_refs) = &self.p {
            if !has_tag_match(&event.tags, "p", p_refs) {
                return false;
            }
        }
        true
    }
}

fn has_tag_match(tags: &[Vec<String>], name: &str, wanted: &[String]) -> bool {
    tags.iter().any(|tag| {
        tag.first().map(|t| t.as_str()) == Some(name)
            && tag.get(1).map(|v| wanted.iter().any(|w| w == v)).unwrap_or(false)
    })
}

/// A `REQ`'s list of filters. The union applies: an event is accepted if
/// any filter matches. An empty set matches nothing.
#[derive(Debug, Clone, Default)]
pub struct FilterSet(pub Vec<Filter>);

impl FilterSet {
    pub fn matches(&self, event: &Event) -> bool {
        self.0.iter().any(|f| f.matches(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: "e1".into(),
            pubkey: "deadbeef".into(),
            created_at: 1000,
            kind: 1,
            tags: vec![vec!["e".into(), "parent1".into()], vec!["p".into(), "alice".into()]],
            content: "hi".into(),
            sig: "sig".into(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::default();
        assert!(filter.matches(&sample_event()));
    }

    #[test]
    fn empty_filter_set_matches_nothing() {
        let set = FilterSet(vec![]);
        assert!(!set.matches(&sample_event()));
    }

    #[test]
    fn kind_filter_is_or_within_list() {
        let filter = Filter { kinds: Some(vec![0, 1, 2]), ..Default::default() };
        assert!(filter.matches(&sample_event()));
        let filter = Filter { kinds: Some(vec![99]), ..Default::default() };
        assert!(!filter.matches(&sample_event()));
    }

    #[test]
    fn since_until_inclusive_range() {
        let event = sample_event();
        assert!(Filter { since: Some(1000), ..Default::default() }.matches(&event));
        assert!(Filter { until: Some(1000), ..Default::default() }.matches(&event));
        assert!(!Filter { since: Some(1001), ..Default::default() }.matches(&event));
        assert!(!Filter { until: Some(999), ..Default::default() }.matches(&event));
    }

    #[test]
    fn tag_filter_matches_first_and_second_element() {
        let event = sample_event();
        assert!(Filter { e: Some(vec!["parent1".into()]), ..Default::default() }.matches(&event));
        assert!(!Filter { e: Some(vec!["other".into()]), ..Default::default() }.matches(&event));
        assert!(Filter { p: Some(vec!["alice".into(), "bob".into()]), ..Default::default() }.matches(&event));
    }

    #[test]
    fn and_across_fields() {
        let event = sample_event();
        // kind matches, author doesn't -> overall false
        let filter = Filter {
            kinds: Some(vec![1]),
            authors: Some(vec!["someoneelse".into()]),
            ..Default::default()
        };
        assert!(!filter.matches(&event));
    }

    #[test]
    fn filter_set_union_accepts_if_any_filter_matches() {
        let event = sample_event();
        let set = FilterSet(vec![
            Filter { kinds: Some(vec![99]), ..Default::default() },
            Filter { kinds: Some(vec![1]), ..Default::default() },
        ]);
        assert!(set.matches(&event));
    }

    #[test]
    fn computed_id_is_deterministic_sha256_of_canonical_fields() {
        let event = Event {
            id: String::new(),
            pubkey: "ab".repeat(32),
            created_at: 1700000000,
            kind: 1,
            tags: vec![],
            content: "hello nostr".into(),
            sig: String::new(),
        };
        let id1 = event.computed_id().unwrap();
        let id2 = event.computed_id().unwrap();
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 64);
    }

    #[test]
    fn verify_fails_when_id_does_not_match_content() {
        let mut event = sample_event();
        event.sig = "00".repeat(64);
        event.pubkey = "11".repeat(32);
        event.id = "ff".repeat(32);
        assert!(!event.verify().unwrap());
    }
}
