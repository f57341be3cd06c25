use std::collections::BTreeMap;

use crate::error::ValidationIssue;

/// Field-keyed error messages, shared by client-side validation and server
/// validation responses so both render the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.0.insert(key.into(), message.into());
    }

    /// Keep the first message reported for a field.
    pub fn insert_first(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.0.entry(key.into()).or_insert_with(|| message.into());
    }

    pub fn from_issues(issues: &[ValidationIssue]) -> Self {
        let mut errors = Self::new();
        for issue in issues {
            if let (Some(field), Some(message)) = (&issue.field, &issue.message) {
                errors.insert_first(field.as_str(), message.as_str());
            }
        }
        errors
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn clear_key(&mut self, key: &str) {
        self.0.remove(key);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Drop every key starting with `prefix`.
    pub fn clear_prefix(&mut self, prefix: &str) {
        self.0.retain(|k, _| !k.starts_with(prefix));
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Route an unstructured server message to the first field whose patterns it
/// mentions (case-insensitive).
pub fn classify_message<'a>(message: &str, rules: &[(&'a str, &[&str])]) -> Option<&'a str> {
    let lower = message.to_lowercase();
    rules
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
        .map(|(field, _)| *field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(field: &str, message: &str) -> ValidationIssue {
        ValidationIssue {
            field: Some(field.into()),
            message: Some(message.into()),
        }
    }

    #[test]
    fn first_message_per_field_wins() {
        let errors = FieldErrors::from_issues(&[
            issue("email", "Email is taken"),
            issue("email", "Email is invalid"),
            issue("password", "Too short"),
            ValidationIssue {
                field: None,
                message: Some("orphan".into()),
            },
        ]);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("email"), Some("Email is taken"));
        assert_eq!(errors.get("password"), Some("Too short"));
    }

    #[test]
    fn clear_prefix_keeps_other_keys() {
        let mut errors = FieldErrors::new();
        errors.set("title", "Required");
        errors.set("attributes.size", "Required");
        errors.set("attributes.fit", "Too loose");
        errors.clear_prefix("attributes.");
        assert!(errors.contains("title"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn classify_matches_case_insensitively_in_rule_order() {
        let rules: &[(&str, &[&str])] = &[("name", &["name"]), ("address", &["address", "location"])];
        assert_eq!(classify_message("Shop NAME already exists", rules), Some("name"));
        assert_eq!(classify_message("Invalid location", rules), Some("address"));
        assert_eq!(classify_message("Server exploded", rules), None);
    }
}
