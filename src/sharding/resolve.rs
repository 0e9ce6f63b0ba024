//! Shard specification resolution
//!
//! Normalizes the `shards` option into a concrete ordered ID list and
//! splits ID lists into per-worker groups.

use crate::error::SwarmError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// How the shard space is specified.
///
/// Exactly one of: a positive count, an explicit list of non-negative IDs,
/// or `auto` (the gateway's recommended count). Numeric strings normalize
/// to [`ShardSpec::Count`]; every other shape is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardSpec {
    Count(u64),
    List(Vec<u64>),
    Auto,
}

impl ShardSpec {
    /// Normalize a JSON-shaped `shards` value.
    pub fn from_value(value: &Value) -> Result<Self, SwarmError> {
        match value {
            Value::Number(n) => match n.as_u64() {
                Some(count) => Ok(Self::Count(count)),
                None => Err(SwarmError::Config(format!(
                    "invalid \"shards\" option: {n} is not a non-negative integer"
                ))),
            },
            Value::Array(items) => {
                let ids = items
                    .iter()
                    .map(|item| {
                        item.as_u64().ok_or_else(|| {
                            SwarmError::Config(format!(
                                "invalid \"shards\" option: {item} is not a non-negative shard ID"
                            ))
                        })
                    })
                    .collect::<Result<Vec<u64>, SwarmError>>()?;
                Ok(Self::List(ids))
            }
            Value::String(s) => {
                if s == "auto" {
                    Ok(Self::Auto)
                } else if let Ok(count) = s.parse::<u64>() {
                    Ok(Self::Count(count))
                } else {
                    Err(SwarmError::Config(format!(
                        "invalid \"shards\" option: if it is a string, it must be \"auto\" or a number, got \"{s}\""
                    )))
                }
            }
            other => Err(SwarmError::Config(format!(
                "invalid \"shards\" option: received disallowed type: {}",
                type_name(other)
            ))),
        }
    }

    /// Expand into the concrete ordered ID list.
    ///
    /// `recommended` is the gateway's recommended shard count, only consulted
    /// for [`ShardSpec::Auto`]; callers fetch it through the gateway API seam.
    pub fn expand(&self, recommended: u64) -> Vec<u64> {
        match self {
            Self::Count(n) => (0..*n).collect(),
            Self::List(ids) => ids.clone(),
            Self::Auto => (0..recommended).collect(),
        }
    }

    /// True when expansion needs the gateway's recommended count.
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl FromStr for ShardSpec {
    type Err = SwarmError;

    /// Environment-variable form: `auto`, a JSON scalar or array, or a bare
    /// comma-separated ID list (`"0,1,2"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "auto" {
            return Ok(Self::Auto);
        }
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Self::from_value(&value);
        }
        if trimmed.contains(',') {
            let ids = trimmed
                .split(',')
                .map(|part| {
                    part.trim().parse::<u64>().map_err(|_| {
                        SwarmError::Config(format!(
                            "invalid \"shards\" option: \"{part}\" is not a shard ID"
                        ))
                    })
                })
                .collect::<Result<Vec<u64>, SwarmError>>()?;
            return Ok(Self::List(ids));
        }
        Err(SwarmError::Config(format!(
            "invalid \"shards\" option: \"{trimmed}\""
        )))
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::List(ids) => {
                let parts: Vec<String> = ids.iter().map(u64::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
            Self::Auto => write!(f, "auto"),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Split `ids` into ordered contiguous groups of at most `size` elements.
///
/// The final group may be shorter. Pure; the returned iterator can be
/// rebuilt from the same input. A zero size behaves as 1.
pub fn into_chunks(ids: &[u64], size: usize) -> impl Iterator<Item = &[u64]> + '_ {
    ids.chunks(size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn count_expands_to_zero_based_range() {
        assert_eq!(ShardSpec::Count(5).expand(0), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn explicit_list_is_returned_as_is() {
        let spec = ShardSpec::from_value(&json!([2, 7, 9])).unwrap();
        assert_eq!(spec, ShardSpec::List(vec![2, 7, 9]));
        assert_eq!(spec.expand(0), vec![2, 7, 9]);
    }

    #[test]
    fn auto_expands_from_the_recommended_count() {
        let spec = ShardSpec::from_value(&json!("auto")).unwrap();
        assert!(spec.is_auto());
        assert_eq!(spec.expand(3), vec![0, 1, 2]);
    }

    #[test]
    fn numeric_string_parses_as_count() {
        let spec = ShardSpec::from_value(&json!("5")).unwrap();
        assert_eq!(spec, ShardSpec::Count(5));
    }

    #[test]
    fn disallowed_shapes_are_config_errors() {
        for value in [json!("abc"), json!({}), json!(null), json!(true), json!(-3), json!(1.5)] {
            let err = ShardSpec::from_value(&value).unwrap_err();
            assert!(matches!(err, SwarmError::Config(_)), "{value}");
        }
    }

    #[test]
    fn list_entries_must_be_non_negative_integers() {
        for value in [json!([1, -2]), json!([1, "two"]), json!([1.5])] {
            let err = ShardSpec::from_value(&value).unwrap_err();
            assert!(matches!(err, SwarmError::Config(_)), "{value}");
        }
    }

    #[test]
    fn from_str_accepts_env_forms() {
        assert_eq!("auto".parse::<ShardSpec>().unwrap(), ShardSpec::Auto);
        assert_eq!("12".parse::<ShardSpec>().unwrap(), ShardSpec::Count(12));
        assert_eq!(
            "[2, 7, 9]".parse::<ShardSpec>().unwrap(),
            ShardSpec::List(vec![2, 7, 9])
        );
        assert_eq!(
            "0, 1, 2".parse::<ShardSpec>().unwrap(),
            ShardSpec::List(vec![0, 1, 2])
        );
        assert!("abc".parse::<ShardSpec>().is_err());
        assert!("0,x".parse::<ShardSpec>().is_err());
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        for spec in [
            ShardSpec::Auto,
            ShardSpec::Count(7),
            ShardSpec::List(vec![0, 4, 8]),
        ] {
            assert_eq!(spec.to_string().parse::<ShardSpec>().unwrap(), spec);
        }
    }

    #[test]
    fn chunks_preserve_order_with_a_short_tail() {
        let ids: Vec<u64> = (0..10).collect();
        let chunks: Vec<Vec<u64>> = into_chunks(&ids, 3).map(<[u64]>::to_vec).collect();
        assert_eq!(
            chunks,
            vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8], vec![9]]
        );
    }

    #[test]
    fn chunking_is_restartable() {
        let ids: Vec<u64> = (0..6).collect();
        let first: Vec<&[u64]> = into_chunks(&ids, 2).collect();
        let second: Vec<&[u64]> = into_chunks(&ids, 2).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_chunk_size_behaves_as_one() {
        let ids: Vec<u64> = vec![1, 2];
        let chunks: Vec<&[u64]> = into_chunks(&ids, 0).collect();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn empty_list_yields_no_chunks() {
        let ids: Vec<u64> = Vec::new();
        assert_eq!(into_chunks(&ids, 4).count(), 0);
    }
}
