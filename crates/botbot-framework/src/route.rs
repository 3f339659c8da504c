//! Route classes and match results.

use std::collections::BTreeMap;
use std::fmt;

use regex::Captures;
use serde::Serialize;

/// When a route is considered for a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteClass {
    /// Every line in a channel where the plugin is active, no pattern test.
    Firehose,
    /// Chat messages whose text matches the pattern.
    Message,
    /// Chat messages addressed to the bot whose stripped text matches.
    Mention,
}

impl RouteClass {
    pub const ALL: [RouteClass; 3] = [Self::Firehose, Self::Message, Self::Mention];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Firehose => "firehose",
            Self::Message => "message",
            Self::Mention => "mention",
        }
    }

    /// Whether handler results on this route are sent back to IRC.
    pub fn replies(self) -> bool {
        !matches!(self, Self::Firehose)
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named capture groups of a route match, handed to the handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteArgs(BTreeMap<String, String>);

impl RouteArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the named groups that took part in the match.
    pub fn from_captures(regex: &regex::Regex, caps: &Captures<'_>) -> Self {
        let args = regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Self(args)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RouteArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_from_named_groups_only() {
        let regex = regex::Regex::new(r"^(?P<cmd>\w+) (\w+)(?: (?P<rest>.*))?").unwrap();
        let caps = regex.captures("remember this").unwrap();
        let args = RouteArgs::from_captures(&regex, &caps);
        assert_eq!(args.get("cmd"), Some("remember"));
        assert_eq!(args.get("rest"), None);
        assert_eq!(args.iter().count(), 1);
    }

    #[test]
    fn test_route_class_replies() {
        assert!(!RouteClass::Firehose.replies());
        assert!(RouteClass::Message.replies());
        assert_eq!(RouteClass::Mention.to_string(), "mention");
    }
}
