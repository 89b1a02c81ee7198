//! Deterministic dedupe keys: `channel:eventId:targetKey`.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::channels::Channel;

/// Hex characters of the target digest kept in the key
const TARGET_KEY_LEN: usize = 16;

/// Order-independent digest of a delivery target set.
///
/// Targets are trimmed, deduplicated and sorted before hashing, so the same
/// recipients in any order (or repeated) yield the same key.
pub fn target_key<I, S>(targets: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let targets: BTreeSet<String> = targets
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let joined = targets.into_iter().collect::<Vec<_>>().join(",");

    let mut digest = hex::encode(Sha256::digest(joined.as_bytes()));
    digest.truncate(TARGET_KEY_LEN);
    digest
}

pub fn dedupe_key(channel: Channel, event_id: &str, target_key: &str) -> String {
    format!("{}:{}:{}", channel, event_id, target_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_key_is_order_independent() {
        let a = target_key(["b@ngo.org", "a@ngo.org"]);
        let b = target_key(["a@ngo.org", " b@ngo.org", "a@ngo.org"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        assert_ne!(a, target_key(["a@ngo.org"]));
    }

    #[test]
    fn test_target_key_matches_sha256_prefix() {
        // sha256("a@ngo.org,b@ngo.org")
        let expected = hex::encode(Sha256::digest(b"a@ngo.org,b@ngo.org"));
        assert_eq!(target_key(["b@ngo.org", "a@ngo.org"]), &expected[..16]);
    }

    #[test]
    fn test_dedupe_key_format() {
        assert_eq!(
            dedupe_key(Channel::Chat, "evt-1", "0123456789abcdef"),
            "chat:evt-1:0123456789abcdef"
        );
    }
}
