//! Redaction of sensitive values before an entry reaches a transport.

use crate::domain::LogEntry;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

/// Where a redacted entry is headed. Redaction can be scoped per destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionTarget {
    Console,
    File,
    Webhook,
}

/// Pure transform over entries.
///
/// Implementations must return `Cow::Borrowed` when nothing was redacted so
/// callers can skip the copy.
pub trait Redactor: Send + Sync {
    fn apply<'a>(&self, entry: &'a LogEntry, target: RedactionTarget) -> Cow<'a, LogEntry>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Data keys whose values are replaced, matched case-insensitively.
    pub keys: Vec<String>,
    /// Regular expressions replaced inside the message, args and string data.
    pub patterns: Vec<String>,
    pub replacement: String,
    pub targets: Vec<RedactionTarget>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            keys: vec![
                "password".to_string(),
                "token".to_string(),
                "secret".to_string(),
                "authorization".to_string(),
            ],
            patterns: Vec::new(),
            replacement: "[REDACTED]".to_string(),
            targets: vec![
                RedactionTarget::Console,
                RedactionTarget::File,
                RedactionTarget::Webhook,
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyRedactor {
    keys: HashSet<String>,
    patterns: Vec<Regex>,
    replacement: String,
    targets: HashSet<RedactionTarget>,
}

impl KeyRedactor {
    pub fn new(config: &RedactionConfig) -> Result<Self, regex::Error> {
        let patterns = config
            .patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            keys: config.keys.iter().map(|k| k.to_lowercase()).collect(),
            patterns,
            replacement: config.replacement.clone(),
            targets: config.targets.iter().copied().collect(),
        })
    }

    fn scrub_text(&self, text: &str) -> Option<String> {
        if self.patterns.is_empty() {
            return None;
        }
        let mut current = text.to_string();
        let mut changed = false;
        for pattern in &self.patterns {
            let next = match pattern.replace_all(&current, self.replacement.as_str()) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if let Some(next) = next {
                current = next;
                changed = true;
            }
        }
        changed.then_some(current)
    }

    /// Returns a redacted copy, or `None` when the value is untouched.
    fn scrub_value(&self, value: &Value) -> Option<Value> {
        match value {
            Value::String(text) => self.scrub_text(text).map(Value::String),
            Value::Array(items) => {
                let scrubbed: Vec<Option<Value>> =
                    items.iter().map(|item| self.scrub_value(item)).collect();
                if scrubbed.iter().all(Option::is_none) {
                    return None;
                }
                Some(Value::Array(
                    scrubbed
                        .into_iter()
                        .zip(items)
                        .map(|(new, old)| new.unwrap_or_else(|| old.clone()))
                        .collect(),
                ))
            }
            Value::Object(map) => {
                let mut changed = false;
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, inner) in map {
                    let replaced = if self.keys.contains(&key.to_lowercase()) {
                        Some(Value::String(self.replacement.clone()))
                    } else {
                        self.scrub_value(inner)
                    };
                    changed |= replaced.is_some();
                    out.insert(key.clone(), replaced.unwrap_or_else(|| inner.clone()));
                }
                changed.then_some(Value::Object(out))
            }
            _ => None,
        }
    }
}

impl Redactor for KeyRedactor {
    fn apply<'a>(&self, entry: &'a LogEntry, target: RedactionTarget) -> Cow<'a, LogEntry> {
        if !self.targets.contains(&target) {
            return Cow::Borrowed(entry);
        }

        let message = self.scrub_text(&entry.message);
        let args: Vec<Option<String>> = entry.args.iter().map(|a| self.scrub_text(a)).collect();
        let data = entry.data.as_ref().and_then(|data| {
            let mut changed = false;
            let redacted: BTreeMap<String, Value> = data
                .iter()
                .map(|(key, value)| {
                    let replaced = if self.keys.contains(&key.to_lowercase()) {
                        Some(Value::String(self.replacement.clone()))
                    } else {
                        self.scrub_value(value)
                    };
                    changed |= replaced.is_some();
                    (key.clone(), replaced.unwrap_or_else(|| value.clone()))
                })
                .collect();
            changed.then_some(redacted)
        });

        if message.is_none() && args.iter().all(Option::is_none) && data.is_none() {
            return Cow::Borrowed(entry);
        }

        let mut redacted = entry.clone();
        if let Some(message) = message {
            redacted.message = message;
        }
        for (slot, new) in redacted.args.iter_mut().zip(args) {
            if let Some(new) = new {
                *slot = new;
            }
        }
        if data.is_some() {
            redacted.data = data;
        }
        Cow::Owned(redacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;
    use serde_json::json;

    fn redactor() -> KeyRedactor {
        KeyRedactor::new(&RedactionConfig {
            patterns: vec![r"\b\d{4}-\d{4}-\d{4}-\d{4}\b".to_string()],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_untouched_entry_is_borrowed() {
        let entry = LogEntry::new(LogLevel::Info, "nothing secret").with_field("user", "bob");
        assert!(matches!(
            redactor().apply(&entry, RedactionTarget::File),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_keys_are_case_insensitive_and_nested() {
        let entry = LogEntry::new(LogLevel::Info, "login")
            .with_field("Password", "hunter2")
            .with_field("request", json!({"headers": {"authorization": "Bearer x"}}));
        let redacted = redactor().apply(&entry, RedactionTarget::Webhook);
        let data = redacted.data.as_ref().unwrap();

        assert_eq!(data["Password"], json!("[REDACTED]"));
        assert_eq!(data["request"]["headers"]["authorization"], json!("[REDACTED]"));
        // the original is untouched
        assert_eq!(entry.data.as_ref().unwrap()["Password"], json!("hunter2"));
    }

    #[test]
    fn test_patterns_apply_to_message_and_args() {
        let entry = LogEntry::new(LogLevel::Warn, "card 1234-5678-9012-3456 declined")
            .with_args(["retry", "1111-2222-3333-4444"]);
        let redacted = redactor().apply(&entry, RedactionTarget::Console);

        assert_eq!(redacted.message, "card [REDACTED] declined");
        assert_eq!(redacted.args, vec!["retry", "[REDACTED]"]);
    }

    #[test]
    fn test_disabled_target_is_skipped() {
        let config = RedactionConfig {
            targets: vec![RedactionTarget::Webhook],
            ..Default::default()
        };
        let redactor = KeyRedactor::new(&config).unwrap();
        let entry = LogEntry::new(LogLevel::Info, "x").with_field("token", "abc");

        assert!(matches!(
            redactor.apply(&entry, RedactionTarget::File),
            Cow::Borrowed(_)
        ));
        assert!(matches!(
            redactor.apply(&entry, RedactionTarget::Webhook),
            Cow::Owned(_)
        ));
    }
}
