use serde::{Deserialize, Serialize};

/// One decoded mail message: a few headers plus the flattened body text.
///
/// Every field defaults to an empty string so partially populated records
/// (for example from an offline JSON dump) are still classifiable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEmail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "from", default)]
    pub sender: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub body: String,
}

impl RawEmail {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let email: RawEmail = serde_json::from_str(r#"{"id": "abc", "from": "a@b.c"}"#).unwrap();
        assert_eq!(email.id, "abc");
        assert_eq!(email.sender, "a@b.c");
        assert_eq!(email.subject, "");
        assert_eq!(email.body, "");
    }
}
