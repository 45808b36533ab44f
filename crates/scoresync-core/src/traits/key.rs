//! Resource keys

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::SyncError;

/// Trait for types that can be used as cache keys
pub trait CacheKey: Send + Sync {
    /// Generate the key string
    fn cache_key(&self) -> String;
}

impl CacheKey for String {
    fn cache_key(&self) -> String {
        self.clone()
    }
}

impl CacheKey for &str {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl CacheKey for &String {
    fn cache_key(&self) -> String {
        (*self).clone()
    }
}

impl<T1: Display + Send + Sync, T2: Display + Send + Sync> CacheKey for (T1, T2) {
    fn cache_key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

impl<T1: Display + Send + Sync, T2: Display + Send + Sync, T3: Display + Send + Sync> CacheKey
    for (T1, T2, T3)
{
    fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.0, self.1, self.2)
    }
}

/// Stable identifier of one cacheable, pollable feed
///
/// Renders as `{category}:{identifier}[:{params}]` where params are
/// `name=value` pairs sorted by name and joined with `&`, so two logically
/// identical requests always land in the same cache slot no matter the
/// order their parameters were added in. `%`, `:`, `&` and `=` inside a
/// component are percent-encoded so distinct keys never render alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    category: String,
    identifier: String,
    params: BTreeMap<String, String>,
}

impl ResourceKey {
    /// Create a key without parameters
    pub fn new(category: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            identifier: identifier.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter, replacing an earlier value with the same name
    pub fn param(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Add multiple parameters
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Display,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Get the category
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Get the identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Look up a parameter
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", escape(&self.category), escape(&self.identifier))?;
        if !self.params.is_empty() {
            let joined = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
                .collect::<Vec<_>>()
                .join("&");
            write!(f, ":{joined}")?;
        }
        Ok(())
    }
}

impl FromStr for ResourceKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let category = parts.next().filter(|c| !c.is_empty());
        let identifier = parts.next().filter(|i| !i.is_empty());
        let (Some(category), Some(identifier)) = (category, identifier) else {
            return Err(SyncError::Deserialization(format!(
                "resource key must be category:identifier, got {s:?}"
            )));
        };

        let mut key = ResourceKey::new(unescape(category)?, unescape(identifier)?);
        if let Some(params) = parts.next() {
            for pair in params.split('&').filter(|p| !p.is_empty()) {
                let (name, value) = pair.split_once('=').ok_or_else(|| {
                    SyncError::Deserialization(format!("malformed key parameter {pair:?}"))
                })?;
                key = key.param(unescape(name)?, unescape(value)?);
            }
        }
        Ok(key)
    }
}

fn escape(component: &str) -> Cow<'_, str> {
    if !component.contains(['%', ':', '&', '=']) {
        return Cow::Borrowed(component);
    }
    let mut out = String::with_capacity(component.len() + 6);
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape(component: &str) -> Result<String, SyncError> {
    let mut out = String::with_capacity(component.len());
    let mut rest = component;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3).unwrap_or_default();
        let decoded = match code {
            "25" => '%',
            "3A" | "3a" => ':',
            "26" => '&',
            "3D" | "3d" => '=',
            _ => {
                return Err(SyncError::Deserialization(format!(
                    "invalid escape in key component {component:?}"
                )));
            }
        };
        out.push(decoded);
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

impl CacheKey for ResourceKey {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl CacheKey for &ResourceKey {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_key() {
        let key = "my_key".to_string();
        assert_eq!(key.cache_key(), "my_key");
    }

    #[test]
    fn test_tuple_key() {
        assert_eq!(("team", 123).cache_key(), "team:123");
        assert_eq!(("nfl", "game", 7).cache_key(), "nfl:game:7");
    }

    #[test]
    fn test_resource_key_without_params() {
        let key = ResourceKey::new("nba", "scoreboard");
        assert_eq!(key.cache_key(), "nba:scoreboard");
    }

    #[test]
    fn test_params_are_order_independent() {
        let a = ResourceKey::new("nfl", "scoreboard")
            .param("week", 7)
            .param("date", "20261018");
        let b = ResourceKey::new("nfl", "scoreboard")
            .param("date", "20261018")
            .param("week", 7);

        assert_eq!(a, b);
        assert_eq!(a.cache_key(), "nfl:scoreboard:date=20261018&week=7");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_parse_round_trip() {
        let key: ResourceKey = "mlb:team:season=2026&id=14".parse().unwrap();
        assert_eq!(key.category(), "mlb");
        assert_eq!(key.identifier(), "team");
        assert_eq!(key.get_param("id"), Some("14"));
        assert_eq!(key.to_string(), "mlb:team:id=14&season=2026");
    }

    #[test]
    fn test_reserved_characters_do_not_collide() {
        let packed = ResourceKey::new("nfl", "scoreboard").param("team", "KC&week=7");
        let split = ResourceKey::new("nfl", "scoreboard")
            .param("team", "KC")
            .param("week", 7);
        assert_ne!(packed.cache_key(), split.cache_key());

        let a = ResourceKey::new("nfl:scoreboard", "x");
        let b = ResourceKey::new("nfl", "scoreboard:x");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "nfl%3Ascoreboard:x");
    }

    #[test]
    fn test_escaped_key_parses_back() {
        let key = ResourceKey::new("nfl:pre", "100%")
            .param("team", "KC&week=7")
            .param("a=b", "c");
        let parsed: ResourceKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.get_param("team"), Some("KC&week=7"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("nhl:games%zz".parse::<ResourceKey>().is_err());
        assert!("nhl".parse::<ResourceKey>().is_err());
        assert!(":games".parse::<ResourceKey>().is_err());
        assert!("nhl:games:week".parse::<ResourceKey>().is_err());
    }
}
