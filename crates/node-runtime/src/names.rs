//! Random human-readable names for nodes and keys.

use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "amber", "ancient", "bold", "brave", "bright", "calm", "clever", "cosmic", "crimson",
    "curious", "daring", "dusty", "eager", "electric", "fancy", "fierce", "frosty", "gentle",
    "golden", "hidden", "humble", "icy", "jolly", "lucky", "mellow", "misty", "nimble",
    "noble", "polar", "quiet", "rapid", "rustic", "shiny", "silent", "silver", "solar",
    "swift", "tidy", "vivid", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "canyon", "comet", "coral", "delta", "ember", "falcon", "fjord",
    "forest", "galaxy", "glacier", "harbor", "heron", "island", "jaguar", "lagoon", "lantern",
    "meadow", "meteor", "nebula", "otter", "panda", "pebble", "pine", "prairie", "quasar",
    "raven", "reef", "river", "summit", "thunder", "tiger", "tundra", "valley", "volcano",
    "walrus", "willow", "zephyr", "zenith",
];

/// Generate a phrase of `words` random words joined by `sep`.
///
/// All words but the last are adjectives, the last is a noun
/// (e.g. `"swift-amber-falcon"`).
pub fn random_phrase(words: usize, sep: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut parts: Vec<&str> = Vec::with_capacity(words);
    for i in 0..words {
        let pool = if i + 1 == words { NOUNS } else { ADJECTIVES };
        if let Some(word) = pool.choose(&mut rng) {
            parts.push(*word);
        }
    }
    parts.join(sep)
}
