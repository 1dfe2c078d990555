//! Short-hash resolution

use crate::model::Hash;
use crate::{Error, Result};
use tracing::debug;

/// Resolve a hex prefix against a set of known instance hashes.
///
/// Fails with `NotFound` when nothing matches and with `Ambiguous` when
/// several do; the ambiguous candidates are always reported in sorted order.
pub fn resolve_prefix<I>(prefix: &str, candidates: I) -> Result<Hash>
where
    I: IntoIterator<Item = Hash>,
{
    let prefix = prefix.to_ascii_lowercase();
    if prefix.is_empty() || prefix.len() > Hash::HEX_LEN || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidHash(prefix));
    }

    let mut matches: Vec<Hash> = candidates
        .into_iter()
        .filter(|h| h.has_prefix(&prefix))
        .collect();
    matches.sort();
    matches.dedup();

    match matches.len() {
        0 => Err(Error::NotFound(format!("Hash {}", prefix))),
        1 => Ok(matches[0]),
        n => {
            debug!(%prefix, matches = n, "ambiguous hash prefix");
            Err(Error::Ambiguous {
                prefix,
                candidates: matches,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn h(s: &str) -> Hash {
        Hash::from_hex(s).unwrap()
    }

    fn fixture() -> Vec<Hash> {
        vec![
            h("885696c6e40613b3c601e95037caf4e43bda58c39f67ab5d5e56beefb3662ff4"),
            h("795a7bc9e40613b3c601e95037caf4e43bda58c39f67ab5d5e56beefb3662ff4"),
            h("795a7bc6e40613b3c601e95037caf4e43bda58c39f67ab5d5e56beefb3662ff4"),
            h("2501a6c6e40a7b355901fc5037caf4e43bda58c39f67ab5d5e56beefb3662ff4"),
        ]
    }

    #[test]
    fn test_ambiguous_candidates_sorted() {
        match resolve_prefix("795a7b", fixture()) {
            Err(Error::Ambiguous { prefix, candidates }) => {
                assert_eq!(prefix, "795a7b");
                assert_eq!(
                    candidates,
                    vec![
                        h("795a7bc6e40613b3c601e95037caf4e43bda58c39f67ab5d5e56beefb3662ff4"),
                        h("795a7bc9e40613b3c601e95037caf4e43bda58c39f67ab5d5e56beefb3662ff4"),
                    ]
                );
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_message_lists_in_order() {
        let message = resolve_prefix("795a7b", fixture()).unwrap_err().to_string();
        let first = message.find("795a7bc6").unwrap();
        let second = message.find("795a7bc9").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_unique_prefix() {
        let found = resolve_prefix("8856", fixture()).unwrap();
        assert!(found.to_hex().starts_with("885696c6"));
        assert_eq!(resolve_prefix("2501A6", fixture()).unwrap(), fixture()[3]);
    }

    #[test]
    fn test_full_length_prefix() {
        let full = fixture()[1].to_hex();
        assert_eq!(resolve_prefix(&full, fixture()).unwrap(), fixture()[1]);
    }

    #[test]
    fn test_no_match() {
        assert!(matches!(
            resolve_prefix("ffff", fixture()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            resolve_prefix("ffff", Vec::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(matches!(resolve_prefix("", fixture()), Err(Error::InvalidHash(_))));
        assert!(matches!(resolve_prefix("xyz", fixture()), Err(Error::InvalidHash(_))));
    }

    proptest! {
        #[test]
        fn prop_every_full_hash_resolves_to_itself(seeds in proptest::collection::vec(any::<u64>(), 1..20)) {
            let hashes: Vec<Hash> = seeds.iter().map(|s| Hash::digest(&s.to_le_bytes())).collect();
            for hash in &hashes {
                prop_assert_eq!(resolve_prefix(&hash.to_hex(), hashes.clone()).unwrap(), *hash);
            }
        }
    }
}
