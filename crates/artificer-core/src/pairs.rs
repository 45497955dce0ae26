//! Serde adapter storing ordered maps as sequences of `(key, value)` pairs.
//!
//! Maps keyed by slot-map handles or composite key structs cannot be written as JSON
//! objects; use `#[serde(with = "artificer_core::pairs")]` on such fields.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    K: Serialize,
    V: Serialize,
    S: Serializer,
{
    serializer.collect_seq(map.iter())
}

pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    K: Deserialize<'de> + Ord,
    V: Deserialize<'de>,
    D: Deserializer<'de>,
{
    let pairs = Vec::<(K, V)>::deserialize(deserializer)?;
    Ok(pairs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
    struct Key {
        a: u8,
        b: u8,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super")]
        map: BTreeMap<Key, f32>,
    }

    #[test]
    fn struct_keys_survive_json() {
        let mut map = BTreeMap::new();
        map.insert(Key { a: 1, b: 2 }, 0.5);
        map.insert(Key { a: 0, b: 9 }, 1.5);
        let holder = Holder { map };
        let json = serde_json::to_string(&holder).expect("serialize");
        let back: Holder = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, holder);
    }
}
