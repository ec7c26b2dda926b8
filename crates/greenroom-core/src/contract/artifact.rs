//! Named outputs attached to an assessment result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ValidationError;

/// Artifact body: free text or a structured JSON document.
///
/// Tagged on the wire (`{"kind": "text", "value": ...}`) so a structured
/// document that happens to be a JSON string stays structured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArtifactContent {
    Text(String),
    Structured(Value),
}

/// A named, typed output of an assessment (transcript, report, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub media_type: String,
    pub content: ArtifactContent,
}

impl Artifact {
    pub fn text(name: impl Into<String>, media_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            content: ArtifactContent::Text(body.into()),
        }
    }

    pub fn json(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            media_type: "application/json".to_string(),
            content: ArtifactContent::Structured(body),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("name", "must not be empty"));
        }
        if self.name.contains('/') {
            return Err(ValidationError::new("name", "must not contain '/'"));
        }
        match self.media_type.split_once('/') {
            Some((kind, sub)) if !kind.is_empty() && !sub.is_empty() && !sub.contains('/') => Ok(()),
            _ => Err(ValidationError::new(
                "media_type",
                format!("'{}' is not of the form type/subtype", self.media_type),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_media_type() {
        assert!(Artifact::text("log", "text/plain", "hi").validate().is_ok());
        assert!(Artifact::json("t", json!({})).validate().is_ok());

        let err = Artifact::text("log", "plain", "hi").validate().unwrap_err();
        assert_eq!(err.path, "media_type");
        let err = Artifact::text("a/b", "text/plain", "hi").validate().unwrap_err();
        assert_eq!(err.path, "name");
    }

    #[test]
    fn test_content_wire_shape_is_tagged() {
        let a = Artifact::text("notes", "text/markdown", "# ok");
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["content"], json!({"kind": "text", "value": "# ok"}));

        let s = Artifact::json("t", json!({"turns": 2}));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["content"]["kind"], "structured");
        assert_eq!(json["content"]["value"]["turns"], 2);
    }

    #[test]
    fn test_every_content_variant_survives_the_wire() {
        let artifacts = vec![
            Artifact::text("notes", "text/plain", "5"),
            Artifact::text("empty", "text/plain", ""),
            Artifact::json("answer.json", json!("5")),
            Artifact::json("count.json", json!(5)),
            Artifact::json("none.json", Value::Null),
            Artifact::json("turns.json", json!([{"role": "participant", "reply": "5"}])),
        ];
        for sent in artifacts {
            let wire = serde_json::to_string(&sent).unwrap();
            let received: Artifact = serde_json::from_str(&wire).unwrap();
            assert_eq!(received, sent, "{wire}");
        }
    }

    #[test]
    fn test_untagged_content_is_rejected() {
        let err = serde_json::from_value::<Artifact>(json!({
            "name": "notes",
            "media_type": "text/plain",
            "content": "5",
        }));
        assert!(err.is_err());
    }
}
