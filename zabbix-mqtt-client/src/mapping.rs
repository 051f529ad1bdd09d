//! Topic to metric key mapping.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// How a topic's payload becomes metric values.
///
/// Decided once while the configuration is parsed:
/// a string in the config is [`KeySpec::Single`], an object is
/// [`KeySpec::Fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// The whole payload text is the value of this item key.
    Single(String),

    /// The payload is a JSON object; each `(field, key)` pair sends the
    /// field's value to the item key. Pairs keep their declaration order.
    Fields(Vec<(String, String)>),
}

impl KeySpec {
    /// Item keys this spec can produce, in order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            KeySpec::Single(key) => vec![key.as_str()],
            KeySpec::Fields(fields) => fields.iter().map(|(_, key)| key.as_str()).collect(),
        }
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keys().join(","))
    }
}

impl<'de> Deserialize<'de> for KeySpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeySpecVisitor;

        impl<'de> Visitor<'de> for KeySpecVisitor {
            type Value = KeySpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an item key string or an object mapping JSON fields to item keys")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<KeySpec, E> {
                Ok(KeySpec::Single(value.to_string()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<KeySpec, E> {
                Ok(KeySpec::Single(value))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<KeySpec, A::Error> {
                let mut fields: Vec<(String, String)> = Vec::new();

                while let Some((field, key)) = map.next_entry::<String, String>()? {
                    // Duplicate field: last one wins, first position kept.
                    match fields.iter_mut().find(|(existing, _)| *existing == field) {
                        Some(entry) => entry.1 = key,
                        None => fields.push((field, key)),
                    }
                }

                Ok(KeySpec::Fields(fields))
            }
        }

        deserializer.deserialize_any(KeySpecVisitor)
    }
}

impl Serialize for KeySpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            KeySpec::Single(key) => serializer.serialize_str(key),
            KeySpec::Fields(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (field, key) in fields {
                    map.serialize_entry(field, key)?;
                }
                map.end()
            }
        }
    }
}

/// Topic name to [`KeySpec`], immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicMapping(BTreeMap<String, KeySpec>);

impl TopicMapping {
    /// Look up the spec for a topic.
    pub fn get(&self, topic: &str) -> Option<&KeySpec> {
        self.0.get(topic)
    }

    /// Topics with their specs, sorted by topic.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeySpec)> {
        self.0.iter().map(|(topic, spec)| (topic.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Into<String>> FromIterator<(T, KeySpec)> for TopicMapping {
    fn from_iter<I: IntoIterator<Item = (T, KeySpec)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(t, spec)| (t.into(), spec)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_is_single_key() {
        let mapping: TopicMapping =
            json5::from_str(r#"{"sensor/temp": "temp.key"}"#).unwrap();

        assert_eq!(
            mapping.get("sensor/temp"),
            Some(&KeySpec::Single("temp.key".to_string()))
        );
    }

    #[test]
    fn test_object_keeps_declaration_order() {
        let mapping: TopicMapping = json5::from_str(
            r#"{"sensor/multi": {"t": "temp.key", "h": "hum.key", "a": "alt.key"}}"#,
        )
        .unwrap();

        let spec = mapping.get("sensor/multi").unwrap();
        assert_eq!(
            spec,
            &KeySpec::Fields(vec![
                ("t".to_string(), "temp.key".to_string()),
                ("h".to_string(), "hum.key".to_string()),
                ("a".to_string(), "alt.key".to_string()),
            ])
        );
        assert_eq!(spec.keys(), vec!["temp.key", "hum.key", "alt.key"]);
        assert_eq!(spec.to_string(), "temp.key,hum.key,alt.key");
    }

    #[test]
    fn test_duplicate_field_last_wins() {
        let spec: KeySpec = json5::from_str(r#"{"t": "first", "h": "hum", "t": "second"}"#).unwrap();

        assert_eq!(
            spec,
            KeySpec::Fields(vec![
                ("t".to_string(), "second".to_string()),
                ("h".to_string(), "hum".to_string()),
            ])
        );
    }

    #[test]
    fn test_rejects_other_types() {
        assert!(json5::from_str::<KeySpec>("42").is_err());
        assert!(json5::from_str::<KeySpec>(r#"["temp.key"]"#).is_err());
        assert!(json5::from_str::<KeySpec>(r#"{"t": 1}"#).is_err());
    }

    #[test]
    fn test_serialize_matches_config_shape() {
        let mapping: TopicMapping = [
            ("a/b", KeySpec::Single("ab.key".to_string())),
            (
                "c/d",
                KeySpec::Fields(vec![("x".to_string(), "x.key".to_string())]),
            ),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"a/b": "ab.key", "c/d": {"x": "x.key"}})
        );
    }

    #[test]
    fn test_topics_are_unique_and_sorted() {
        let mapping: TopicMapping =
            json5::from_str(r#"{"b/2": "b", "a/1": "a", "b/2": "b2"}"#).unwrap();

        let topics: Vec<&str> = mapping.iter().map(|(topic, _)| topic).collect();
        assert_eq!(topics, vec!["a/1", "b/2"]);
        assert_eq!(mapping.len(), 2);
        assert_eq!(
            mapping.get("b/2"),
            Some(&KeySpec::Single("b2".to_string()))
        );
    }
}
