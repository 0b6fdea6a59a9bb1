//! Solution variant selection.
//!
//! A catalog holds one or more named variants of a canned submission. The
//! requested label is resolved by walking an ordered strategy chain; the
//! first strategy that yields a variant wins.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Label requesting a random pick from the catalog.
pub const RANDOM_VARIANT: &str = "random";

/// Preferred fallback when the requested label is absent.
pub const PREFERRED_VARIANT: &str = "good";

/// Variant label used when a solution folder has no variant subdirectories.
pub const DEFAULT_VARIANT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStrategy {
    /// Request `random` picks uniformly among available variants.
    Random,
    /// Request names an available variant.
    Exact,
    /// A fixed fallback label, if available.
    Fallback(String),
    /// First variant in catalog order.
    FirstAvailable,
}

impl VariantStrategy {
    /// Random, then exact match, then `good`, then the first available.
    pub fn default_chain() -> Vec<VariantStrategy> {
        vec![
            VariantStrategy::Random,
            VariantStrategy::Exact,
            VariantStrategy::Fallback(PREFERRED_VARIANT.to_string()),
            VariantStrategy::FirstAvailable,
        ]
    }

    fn pick<'a, R: Rng + ?Sized>(
        &self,
        requested: &str,
        available: &'a [String],
        rng: &mut R,
    ) -> Option<&'a str> {
        match self {
            VariantStrategy::Random if requested == RANDOM_VARIANT => {
                available.choose(rng).map(String::as_str)
            }
            VariantStrategy::Random => None,
            VariantStrategy::Exact => find(available, requested),
            VariantStrategy::Fallback(label) => find(available, label),
            VariantStrategy::FirstAvailable => available.first().map(String::as_str),
        }
    }
}

fn find<'a>(available: &'a [String], label: &str) -> Option<&'a str> {
    available
        .iter()
        .find(|v| v.eq_ignore_ascii_case(label))
        .map(String::as_str)
}

/// Resolve `requested` against `available`. Returns `None` only when the
/// chain exhausts without a match (e.g. an empty catalog).
///
/// The request is trimmed and lowercased before matching.
pub fn choose_variant<'a, R: Rng + ?Sized>(
    requested: Option<&str>,
    available: &'a [String],
    strategies: &[VariantStrategy],
    rng: &mut R,
) -> Option<&'a str> {
    let requested = requested.unwrap_or_default().trim().to_lowercase();
    strategies
        .iter()
        .find_map(|s| s.pick(&requested, available, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_wins() {
        let mut rng = StdRng::seed_from_u64(7);
        let available = catalog(&["bad", "good"]);
        let chain = VariantStrategy::default_chain();
        assert_eq!(
            choose_variant(Some(" BAD "), &available, &chain, &mut rng),
            Some("bad")
        );
    }

    #[test]
    fn test_falls_back_to_good_then_first() {
        let mut rng = StdRng::seed_from_u64(7);
        let chain = VariantStrategy::default_chain();
        let with_good = catalog(&["bad", "good"]);
        assert_eq!(
            choose_variant(Some("missing"), &with_good, &chain, &mut rng),
            Some("good")
        );
        let without_good = catalog(&["alpha", "beta"]);
        assert_eq!(
            choose_variant(None, &without_good, &chain, &mut rng),
            Some("alpha")
        );
    }

    #[test]
    fn test_random_stays_within_catalog() {
        let mut rng = StdRng::seed_from_u64(42);
        let available = catalog(&["bad", "good", "partial"]);
        let chain = VariantStrategy::default_chain();
        for _ in 0..20 {
            let picked = choose_variant(Some("random"), &available, &chain, &mut rng).unwrap();
            assert!(available.iter().any(|v| v == picked));
        }
    }

    #[test]
    fn test_empty_catalog() {
        let mut rng = StdRng::seed_from_u64(1);
        let chain = VariantStrategy::default_chain();
        assert_eq!(choose_variant(Some("good"), &[], &chain, &mut rng), None);
    }

    #[test]
    fn test_custom_chain_without_fallback() {
        let mut rng = StdRng::seed_from_u64(1);
        let available = catalog(&["bad"]);
        let chain = vec![VariantStrategy::Exact];
        assert_eq!(choose_variant(Some("good"), &available, &chain, &mut rng), None);
    }
}
