//! Human-readable run names (`brave-otter-42`).

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "agile", "amber", "bold", "brave", "bright", "calm", "clever", "cosmic", "crisp", "daring",
    "eager", "fancy", "gentle", "golden", "happy", "jolly", "keen", "lively", "lucky", "mellow",
    "nimble", "polite", "quiet", "rapid", "silent", "sunny", "swift", "tidy", "vivid", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "canyon", "comet", "cedar", "dolphin", "ember", "falcon", "fjord", "gecko",
    "harbor", "heron", "island", "lagoon", "lynx", "maple", "meadow", "nebula", "otter", "panda",
    "pebble", "quasar", "raven", "river", "sparrow", "summit", "tiger", "tundra", "walrus", "zephyr",
];

/// Random `adjective-noun-NN` name.
#[must_use]
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

/// [`generate`] with a caller-supplied RNG (deterministic in tests).
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("swift");
    let noun = NOUNS.choose(rng).copied().unwrap_or("otter");
    let suffix: u8 = rng.gen_range(0..100);
    format!("{adjective}-{noun}-{suffix:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_name_shape() {
        let name = generate();
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(NOUNS.contains(&parts[1]));
        assert_eq!(parts[2].len(), 2);
    }

    #[test]
    fn test_seeded_names_repeat() {
        let a = generate_with(&mut StdRng::seed_from_u64(7));
        let b = generate_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
