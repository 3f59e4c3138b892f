//! Content part types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A content part within a message or artifact.
///
/// Exactly one variant is active per part. The persisted form carries an
/// explicit discriminator; see the store's part codec for the wire layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    /// Text content
    #[serde(rename = "text")]
    Text(TextPart),

    /// File content, inline or by reference
    #[serde(rename = "file")]
    File(FilePart),

    /// Structured data
    #[serde(rename = "data")]
    Data(DataPart),
}

impl Part {
    /// Create a text part
    pub fn text(content: impl Into<String>) -> Self {
        Part::Text(TextPart {
            text: content.into(),
            metadata: HashMap::new(),
        })
    }

    /// Create a file part referencing a URI
    pub fn file_uri(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Part::File(FilePart {
            file: FileContent {
                mime_type: Some(mime_type.into()),
                name: None,
                source: FileSource::Uri(uri.into()),
            },
            metadata: HashMap::new(),
        })
    }

    /// Create a file part carrying inline base64 bytes
    pub fn file_bytes(bytes: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Part::File(FilePart {
            file: FileContent {
                mime_type: Some(mime_type.into()),
                name: None,
                source: FileSource::Bytes(bytes.into()),
            },
            metadata: HashMap::new(),
        })
    }

    /// Create a structured data part
    pub fn data(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Part::Data(DataPart {
            data,
            metadata: HashMap::new(),
        })
    }

    /// Get the text content if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(t) => Some(&t.text),
            _ => None,
        }
    }

    /// The part's metadata map, whichever variant is active
    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        match self {
            Part::Text(p) => &p.metadata,
            Part::File(p) => &p.metadata,
            Part::Data(p) => &p.metadata,
        }
    }

    /// Mutable access to the part's metadata map
    pub fn metadata_mut(&mut self) -> &mut HashMap<String, serde_json::Value> {
        match self {
            Part::Text(p) => &mut p.metadata,
            Part::File(p) => &mut p.metadata,
            Part::Data(p) => &mut p.metadata,
        }
    }
}

/// Text content part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPart {
    /// The text content
    pub text: String,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// File content part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePart {
    /// The file payload
    pub file: FileContent,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// File payload: descriptive fields plus exactly one content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    /// MIME type of the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// File name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Inline bytes or a URI reference
    #[serde(flatten)]
    pub source: FileSource,
}

/// Where a file part's content lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileSource {
    /// Base64-encoded inline content
    #[serde(rename = "bytes")]
    Bytes(String),

    /// Reference to externally hosted content
    #[serde(rename = "uri")]
    Uri(String),
}

/// Structured data part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPart {
    /// The structured payload
    pub data: serde_json::Map<String, serde_json::Value>,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}
