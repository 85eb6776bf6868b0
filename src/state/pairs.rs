//! Serde adapter writing ordered maps as `[[key, value], ...]`
//!
//! Use with `#[serde(with = "crate::state::pairs")]` on `BTreeMap` fields.
//! Pairs are emitted in key order; on read, a repeated key keeps its last value.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;

pub fn serialize<S, K, V>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    K: Serialize,
    V: Serialize,
{
    serializer.collect_seq(map.iter())
}

pub fn deserialize<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    D: Deserializer<'de>,
    K: Deserialize<'de> + Ord,
    V: Deserialize<'de>,
{
    let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
    Ok(pairs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super")]
        map: BTreeMap<String, u32>,
    }

    #[test]
    fn test_written_as_sorted_pair_list() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        let json = serde_json::to_string(&Holder { map }).unwrap();
        assert_eq!(json, r#"{"map":[["a",1],["b",2]]}"#);
    }

    #[test]
    fn test_duplicate_keys_keep_last() {
        let holder: Holder = serde_json::from_str(r#"{"map":[["a",1],["a",5]]}"#).unwrap();
        assert_eq!(holder.map.get("a"), Some(&5));
        assert_eq!(holder.map.len(), 1);
    }

    #[test]
    fn test_object_form_is_rejected() {
        assert!(serde_json::from_str::<Holder>(r#"{"map":{"a":1}}"#).is_err());
    }
}
