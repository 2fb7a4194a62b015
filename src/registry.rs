//! Subscription Registry
//!
//! Keeps the deduplicated set of folder paths this client wants messages
//! from, plus the default target used by sends that omit a destination.
//! Subscriptions are additive for the lifetime of a session.

use serde::Serialize;

use crate::topic::TopicPath;

/// Interest in messages from one folder.
///
/// Serializes to the legacy wire shape: `{"folder": "/a/b", "include_self": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    /// Folder path (leading slash)
    #[serde(rename = "folder")]
    pub topic: TopicPath,

    /// Echo messages this client sent back to it (legacy transport only)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_self: bool,

    /// Also receive messages from descendant folders (legacy server option)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_children: bool,

    /// Restrict to a single message type (legacy server option)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl Subscription {
    pub fn new(topic: impl Into<TopicPath>) -> Self {
        Self {
            topic: topic.into(),
            include_self: false,
            include_children: false,
            message_type: None,
        }
    }

    /// Builder: reflect own messages back
    pub fn include_self(mut self, include_self: bool) -> Self {
        self.include_self = include_self;
        self
    }

    /// Builder: include descendant folders
    pub fn include_children(mut self, include_children: bool) -> Self {
        self.include_children = include_children;
        self
    }

    /// Builder: only one message type
    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }
}

/// The set of subscriptions and the default send target
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
    default_target: Option<TopicPath>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription.
    ///
    /// Returns `false` without changing anything if the topic is already
    /// present (the first registration's flags are kept). The first topic
    /// ever subscribed becomes the default target unless one is already set.
    pub fn subscribe(&mut self, subscription: Subscription) -> bool {
        if self.contains(&subscription.topic) {
            return false;
        }

        if self.default_target.is_none() {
            self.default_target = Some(subscription.topic.clone());
        }
        self.entries.push(subscription);
        true
    }

    /// Full set, in subscription order, for (re)transmission on open
    pub fn current_set(&self) -> &[Subscription] {
        &self.entries
    }

    pub fn contains(&self, topic: &TopicPath) -> bool {
        self.entries.iter().any(|s| &s.topic == topic)
    }

    /// Explicitly set the default target, replacing any previous one
    pub fn set_default_target(&mut self, topic: TopicPath) {
        self.default_target = Some(topic);
    }

    pub fn default_target(&self) -> Option<&TopicPath> {
        self.default_target.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_subscribe_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.subscribe(Subscription::new("/a/b")));
        assert!(!registry.subscribe(Subscription::new("/a/b").include_self(true)));
        assert!(!registry.subscribe(Subscription::new("a/b")));

        assert_eq!(registry.len(), 1);
        assert!(!registry.current_set()[0].include_self);
    }

    #[test]
    fn test_first_subscription_becomes_default() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.default_target().is_none());

        registry.subscribe(Subscription::new("/first"));
        registry.subscribe(Subscription::new("/second"));
        assert_eq!(registry.default_target().unwrap().as_str(), "/first");
    }

    #[test]
    fn test_explicit_default_overrides() {
        let mut registry = SubscriptionRegistry::new();
        registry.set_default_target(TopicPath::new("/chosen"));
        registry.subscribe(Subscription::new("/other"));
        assert_eq!(registry.default_target().unwrap().as_str(), "/chosen");

        registry.set_default_target(TopicPath::new("/again"));
        assert_eq!(registry.default_target().unwrap().as_str(), "/again");
    }

    #[test]
    fn test_subscription_wire_shape() {
        let plain = serde_json::to_value(Subscription::new("/a")).unwrap();
        assert_eq!(plain, serde_json::json!({"folder": "/a"}));

        let flagged = serde_json::to_value(
            Subscription::new("/a")
                .include_self(true)
                .include_children(true)
                .message_type("sequence_update"),
        )
        .unwrap();
        assert_eq!(
            flagged,
            serde_json::json!({
                "folder": "/a",
                "include_self": true,
                "include_children": true,
                "message_type": "sequence_update"
            })
        );
    }
}
