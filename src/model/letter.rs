use serde::{Deserialize, Deserializer, Serialize};

pub const CHILD_NAME_REQUIRED: &str = "Child's name is required";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Boy,
    Girl,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl Gender {
    pub fn as_word(&self) -> Option<&'static str> {
        match self {
            Gender::Boy => Some("boy"),
            Gender::Girl => Some("girl"),
            Gender::Unset => None,
        }
    }
}

/// The form submission describing the child. Field names match the browser
/// form (`childName`, `isOnGoodList`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LetterRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub child_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub good_things: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bad_things: String,
    #[serde(default = "default_good_list")]
    pub is_on_good_list: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub additional_notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gifts: Option<String>,
}

fn default_good_list() -> bool {
    true
}

/// Form fields left unset arrive as `null`; they read as empty text.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for LetterRequest {
    fn default() -> Self {
        Self {
            child_name: String::new(),
            age: None,
            gender: Gender::Unset,
            good_things: String::new(),
            bad_things: String::new(),
            is_on_good_list: true,
            additional_notes: String::new(),
            gifts: None,
        }
    }
}

impl LetterRequest {
    pub fn named(child_name: impl Into<String>) -> Self {
        Self {
            child_name: child_name.into(),
            ..Self::default()
        }
    }

    pub fn child_name(&self) -> &str {
        self.child_name.trim()
    }

    pub fn has_child_name(&self) -> bool {
        !self.child_name().is_empty()
    }

    pub fn age(&self) -> Option<&str> {
        non_empty(self.age.as_deref())
    }

    /// Gifts only count for children on the good list.
    pub fn requested_gifts(&self) -> Option<&str> {
        if !self.is_on_good_list {
            return None;
        }
        non_empty(self.gifts.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A generated letter together with the draft that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LetterResponse {
    pub letter: String,
    pub form_data: LetterRequest,
}

impl LetterResponse {
    pub fn is_valid(&self) -> bool {
        !self.letter.trim().is_empty()
    }
}

/// One event on the generation stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LetterDelta {
    pub content: String,
}

/// JSON error body shared by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_browser_form_payload() {
        let raw = r#"{
            "childName": "Mia",
            "age": "7",
            "gender": "girl",
            "goodThings": "helped her brother",
            "badThings": "",
            "isOnGoodList": true,
            "additionalNotes": "",
            "gifts": "a bicycle"
        }"#;
        let req: LetterRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.child_name(), "Mia");
        assert_eq!(req.gender, Gender::Girl);
        assert_eq!(req.age(), Some("7"));
        assert_eq!(req.requested_gifts(), Some("a bicycle"));
    }

    #[test]
    fn missing_fields_take_form_defaults() {
        let req: LetterRequest = serde_json::from_str(r#"{"childName":"Leo","gender":""}"#).unwrap();
        assert!(req.is_on_good_list);
        assert_eq!(req.gender, Gender::Unset);
        assert_eq!(req.age(), None);
    }

    #[test]
    fn null_text_fields_read_as_empty() {
        let req: LetterRequest =
            serde_json::from_str(r#"{"childName":null,"goodThings":null,"badThings":null}"#)
                .unwrap();
        assert!(!req.has_child_name());
        assert_eq!(req.good_things, "");
        assert_eq!(req.bad_things, "");
    }

    #[test]
    fn gifts_ignored_on_naughty_list() {
        let req = LetterRequest {
            is_on_good_list: false,
            gifts: Some("a pony".into()),
            ..LetterRequest::named("Sam")
        };
        assert_eq!(req.requested_gifts(), None);
    }

    #[test]
    fn whitespace_name_is_missing() {
        assert!(!LetterRequest::named("   ").has_child_name());
    }

    #[test]
    fn blank_letter_is_invalid() {
        let resp = LetterResponse {
            letter: " \n".into(),
            form_data: LetterRequest::named("Mia"),
        };
        assert!(!resp.is_valid());
    }
}
