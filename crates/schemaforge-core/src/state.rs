//! UI-agnostic conversation data types
//!
//! Messages and artifacts shared between the controller, the exporter and
//! whatever view renders them. Nothing here depends on a UI framework.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chat message in the schema design conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    /// Content split into display lines. Empty lines are kept, so a message
    /// ending in `\n` renders a trailing blank line.
    pub fn display_lines(&self) -> impl Iterator<Item = &str> {
        self.content.split('\n')
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Rendered diagram document as returned by the agent. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramArtifact(String);

impl DiagramArtifact {
    /// Returns `None` for an empty document, which the backend sends to mean
    /// "nothing new".
    pub fn new(document: impl Into<String>) -> Option<Self> {
        let document = document.into();
        if document.is_empty() {
            None
        } else {
            Some(Self(document))
        }
    }

    pub fn document(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mermaid ER diagram source for the current schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MermaidArtifact(String);

impl MermaidArtifact {
    pub fn new(source: impl Into<String>) -> Option<Self> {
        let source = source.into();
        if source.is_empty() {
            None
        } else {
            Some(Self(source))
        }
    }

    pub fn source(&self) -> &str {
        &self.0
    }
}

/// Structured description of the designed schema.
///
/// Kept as raw JSON so that export reproduces exactly what the agent sent,
/// including fields this client does not know about.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaArtifact(Value);

impl SchemaArtifact {
    /// `null` is the backend's way of saying "no schema yet".
    pub fn new(value: Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// The `schema_name` field, if it is a non-empty string.
    pub fn schema_name(&self) -> Option<&str> {
        self.0
            .get("schema_name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Typed view for display. `None` if the record is not shaped like a schema.
    pub fn summary(&self) -> Option<SchemaSummary> {
        if !self.0.is_object() {
            return None;
        }
        serde_json::from_value(self.0.clone()).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchemaSummary {
    pub schema_name: Option<String>,
    pub entities: Vec<EntitySummary>,
    pub relationships: Vec<RelationshipSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EntitySummary {
    pub name: String,
    pub attributes: Vec<AttributeSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AttributeSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
}

impl Default for AttributeSummary {
    fn default() -> Self {
        Self {
            name: String::new(),
            data_type: String::new(),
            primary_key: false,
            nullable: true,
            unique: false,
        }
    }
}

impl AttributeSummary {
    /// "PK", "UK" or nothing, primary key taking precedence.
    pub fn key_marker(&self) -> Option<&'static str> {
        if self.primary_key {
            Some("PK")
        } else if self.unique {
            Some("UK")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelationshipSummary {
    pub name: String,
    pub from_entity: String,
    pub to_entity: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Artifacts reported by the agent, any of which may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactSnapshot {
    pub diagram: Option<DiagramArtifact>,
    pub schema: Option<SchemaArtifact>,
    pub mermaid: Option<MermaidArtifact>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_lines_keep_blank_lines() {
        let msg = ChatMessage::assistant("Hello\n\n• one\n• two");
        let lines: Vec<&str> = msg.display_lines().collect();
        assert_eq!(lines, vec!["Hello", "", "• one", "• two"]);
    }

    #[test]
    fn test_empty_diagram_is_absent() {
        assert!(DiagramArtifact::new("").is_none());
        assert_eq!(
            DiagramArtifact::new("<html></html>").map(|d| d.len()),
            Some(13)
        );
    }

    #[test]
    fn test_null_schema_is_absent() {
        assert!(SchemaArtifact::new(Value::Null).is_none());
        assert!(SchemaArtifact::new(json!({})).is_some());
    }

    #[test]
    fn test_schema_name_lookup() {
        let schema = SchemaArtifact::new(json!({"schema_name": "school"})).unwrap();
        assert_eq!(schema.schema_name(), Some("school"));

        let empty = SchemaArtifact::new(json!({"schema_name": ""})).unwrap();
        assert_eq!(empty.schema_name(), None);

        let numeric = SchemaArtifact::new(json!({"schema_name": 42})).unwrap();
        assert_eq!(numeric.schema_name(), None);

        let list = SchemaArtifact::new(json!(["schema_name"])).unwrap();
        assert_eq!(list.schema_name(), None);
    }

    #[test]
    fn test_summary_parses_backend_schema() {
        let schema = SchemaArtifact::new(json!({
            "schema_name": "library",
            "entities": [{
                "name": "Book",
                "attributes": [
                    {"name": "book_id", "type": "INT", "primary_key": true, "nullable": false},
                    {"name": "isbn", "type": "VARCHAR(13)", "unique": true},
                    {"name": "title", "type": "VARCHAR(255)"}
                ]
            }],
            "relationships": [{
                "name": "written_by",
                "from_entity": "Book",
                "to_entity": "Author",
                "type": "many-to-one"
            }]
        }))
        .unwrap();

        let summary = schema.summary().unwrap();
        assert_eq!(summary.schema_name.as_deref(), Some("library"));
        assert_eq!(summary.entities.len(), 1);

        let attrs = &summary.entities[0].attributes;
        assert_eq!(attrs[0].key_marker(), Some("PK"));
        assert!(!attrs[0].nullable);
        assert_eq!(attrs[1].key_marker(), Some("UK"));
        assert_eq!(attrs[2].key_marker(), None);
        assert!(attrs[2].nullable);

        assert_eq!(summary.relationships[0].kind, "many-to-one");
    }

    #[test]
    fn test_summary_rejects_non_object() {
        let schema = SchemaArtifact::new(json!("just text")).unwrap();
        assert!(schema.summary().is_none());

        let wrong_shape = SchemaArtifact::new(json!({"entities": "nope"})).unwrap();
        assert!(wrong_shape.summary().is_none());
    }
}
