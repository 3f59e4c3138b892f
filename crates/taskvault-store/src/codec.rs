//! JSON codec for the persisted row payloads.
//!
//! Parts are stored with an explicit `type` discriminator (`TEXT`/`FILE`/
//! `DATA`) and variant payloads; this layout predates this implementation
//! and must not change, or existing rows become unreadable. serde's enum
//! tagging cannot emit it, so the codec builds and walks
//! [`serde_json::Value`] trees by hand.
//!
//! Decoding is tolerant where the data allows it: parts with an unknown or
//! missing `type` are dropped with a warning rather than failing the whole
//! row. A file part with neither `bytes` nor `uri` is unrepresentable and
//! fails fatally.
//!
//! All JSON column reads pass through [`recover_tree`]: rows written by an
//! earlier schema revision were JSON-encoded twice, so a column that parses
//! to a JSON *string* gets one reparse before shape validation.

use serde_json::{Map, Value, json};
use std::collections::HashMap;

use taskvault_core::{
    FileContent, FilePart, FileSource, Message, Part, Role, TaskResult, TaskStoreError, TextPart,
};

const TYPE_FIELD: &str = "type";
const TEXT_TYPE: &str = "TEXT";
const FILE_TYPE: &str = "FILE";
const DATA_TYPE: &str = "DATA";
const TEXT_FIELD: &str = "text";
const FILE_FIELD: &str = "file";
const DATA_FIELD: &str = "data";
const METADATA_FIELD: &str = "metadata";
const MIME_TYPE_FIELD: &str = "mimeType";
const NAME_FIELD: &str = "name";
const BYTES_FIELD: &str = "bytes";
const URI_FIELD: &str = "uri";

/// Encode a part list into its wire tree.
pub fn encode_parts(parts: &[Part]) -> Value {
    Value::Array(parts.iter().map(encode_part).collect())
}

fn encode_part(part: &Part) -> Value {
    let mut node = Map::new();
    match part {
        Part::Text(text) => {
            node.insert(TYPE_FIELD.into(), json!(TEXT_TYPE));
            node.insert(TEXT_FIELD.into(), json!(text.text));
        }
        Part::File(file) => {
            node.insert(TYPE_FIELD.into(), json!(FILE_TYPE));
            node.insert(FILE_FIELD.into(), encode_file_content(&file.file));
        }
        Part::Data(data) => {
            node.insert(TYPE_FIELD.into(), json!(DATA_TYPE));
            node.insert(DATA_FIELD.into(), Value::Object(data.data.clone()));
        }
    }
    let metadata = part.metadata();
    if !metadata.is_empty() {
        node.insert(METADATA_FIELD.into(), metadata_to_tree(metadata));
    }
    Value::Object(node)
}

fn encode_file_content(content: &FileContent) -> Value {
    let mut node = Map::new();
    if let Some(mime_type) = &content.mime_type {
        node.insert(MIME_TYPE_FIELD.into(), json!(mime_type));
    }
    if let Some(name) = &content.name {
        node.insert(NAME_FIELD.into(), json!(name));
    }
    match &content.source {
        FileSource::Bytes(bytes) => node.insert(BYTES_FIELD.into(), json!(bytes)),
        FileSource::Uri(uri) => node.insert(URI_FIELD.into(), json!(uri)),
    };
    Value::Object(node)
}

/// Decode a part list from its wire tree. `context` names the column for
/// error messages.
pub fn decode_parts(tree: &Value, context: &str) -> TaskResult<Vec<Part>> {
    let Value::Array(nodes) = tree else {
        return Err(TaskStoreError::deserialization(
            context,
            "part content is not a JSON array",
        ));
    };

    let mut parts = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Some(part) = decode_part(node, context)? {
            parts.push(part);
        }
    }
    Ok(parts)
}

fn decode_part(node: &Value, context: &str) -> TaskResult<Option<Part>> {
    let Some(tag) = node.get(TYPE_FIELD).and_then(Value::as_str) else {
        tracing::warn!(context, "dropping part without a type tag");
        return Ok(None);
    };

    match tag {
        TEXT_TYPE => decode_text_part(node, context),
        FILE_TYPE => decode_file_part(node, context),
        DATA_TYPE => decode_data_part(node, context),
        other => {
            tracing::warn!(context, tag = other, "dropping part with unknown type tag");
            Ok(None)
        }
    }
}

fn decode_text_part(node: &Value, context: &str) -> TaskResult<Option<Part>> {
    let Some(text) = node.get(TEXT_FIELD).and_then(Value::as_str) else {
        tracing::warn!(context, "dropping text part without text field");
        return Ok(None);
    };
    Ok(Some(Part::Text(TextPart {
        text: text.to_string(),
        metadata: part_metadata(node, context)?,
    })))
}

fn decode_file_part(node: &Value, context: &str) -> TaskResult<Option<Part>> {
    let Some(file_node) = node.get(FILE_FIELD).filter(|n| n.is_object()) else {
        tracing::warn!(context, "dropping file part without file object");
        return Ok(None);
    };

    let source = if let Some(bytes) = file_node.get(BYTES_FIELD).and_then(Value::as_str) {
        FileSource::Bytes(bytes.to_string())
    } else if let Some(uri) = file_node.get(URI_FIELD).and_then(Value::as_str) {
        FileSource::Uri(uri.to_string())
    } else {
        return Err(TaskStoreError::deserialization(
            context,
            "file part must have either 'bytes' or 'uri'",
        ));
    };

    Ok(Some(Part::File(FilePart {
        file: FileContent {
            mime_type: file_node
                .get(MIME_TYPE_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string),
            name: file_node
                .get(NAME_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string),
            source,
        },
        metadata: part_metadata(node, context)?,
    })))
}

fn decode_data_part(node: &Value, context: &str) -> TaskResult<Option<Part>> {
    let Some(data_node) = node.get(DATA_FIELD) else {
        tracing::warn!(context, "dropping data part without data field");
        return Ok(None);
    };
    let Value::Object(data) = data_node else {
        return Err(TaskStoreError::deserialization(
            context,
            "data part payload is not a JSON object",
        ));
    };
    Ok(Some(Part::Data(taskvault_core::DataPart {
        data: data.clone(),
        metadata: part_metadata(node, context)?,
    })))
}

fn part_metadata(node: &Value, context: &str) -> TaskResult<HashMap<String, Value>> {
    match node.get(METADATA_FIELD) {
        None | Some(Value::Null) => Ok(HashMap::new()),
        Some(Value::Object(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Some(_) => Err(TaskStoreError::deserialization(
            context,
            "part metadata is not a JSON object",
        )),
    }
}

/// Encode a message (status message or history row payload) into its wire
/// tree: `{messageId?, role, parts, metadata?, contextId?, taskId?}`.
pub fn encode_message(message: &Message) -> Value {
    let mut node = Map::new();
    if let Some(id) = &message.id {
        node.insert("messageId".into(), json!(id));
    }
    node.insert("role".into(), json!(message.role.as_str()));
    node.insert("parts".into(), encode_parts(&message.parts));
    if !message.metadata.is_empty() {
        node.insert(METADATA_FIELD.into(), metadata_to_tree(&message.metadata));
    }
    if let Some(context_id) = &message.context_id {
        node.insert("contextId".into(), json!(context_id));
    }
    if let Some(task_id) = &message.task_id {
        node.insert("taskId".into(), json!(task_id));
    }
    Value::Object(node)
}

/// Decode a message from its wire tree.
pub fn decode_message(tree: &Value, context: &str) -> TaskResult<Message> {
    let Value::Object(node) = tree else {
        return Err(TaskStoreError::deserialization(
            context,
            "message is not a JSON object",
        ));
    };

    let role = node
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| TaskStoreError::deserialization(context, "message has no role"))?;
    let role = Role::parse(role).ok_or_else(|| {
        TaskStoreError::deserialization(context, format!("unrecognized role {role:?}"))
    })?;

    let parts = match node.get("parts") {
        None | Some(Value::Null) => Vec::new(),
        Some(parts) => decode_parts(parts, context)?,
    };

    Ok(Message {
        id: node
            .get("messageId")
            .and_then(Value::as_str)
            .map(str::to_string),
        role,
        parts,
        metadata: part_metadata(tree, context)?,
        context_id: node
            .get("contextId")
            .and_then(Value::as_str)
            .map(str::to_string),
        task_id: node
            .get("taskId")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Serialize a part list for a JSON column.
pub fn parts_json(parts: &[Part]) -> TaskResult<String> {
    serde_json::to_string(&encode_parts(parts))
        .map_err(|e| TaskStoreError::serialization("part content", e))
}

/// Serialize a message for a JSON column.
pub fn message_json(message: &Message) -> TaskResult<String> {
    serde_json::to_string(&encode_message(message))
        .map_err(|e| TaskStoreError::serialization("message", e))
}

/// Serialize a metadata map for a JSON column; empty maps persist as NULL.
pub fn metadata_json(metadata: &HashMap<String, Value>) -> TaskResult<Option<String>> {
    if metadata.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(&metadata_to_tree(metadata))
        .map(Some)
        .map_err(|e| TaskStoreError::serialization("metadata", e))
}

/// Serialize an extension list for a JSON column; empty lists persist as
/// NULL.
pub fn extensions_json(extensions: &[String]) -> TaskResult<Option<String>> {
    if extensions.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(extensions)
        .map(Some)
        .map_err(|e| TaskStoreError::serialization("extensions", e))
}

fn metadata_to_tree(metadata: &HashMap<String, Value>) -> Value {
    Value::Object(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

/// Unwrap one level of legacy double encoding.
///
/// Early schema revisions bound already-serialized JSON through a
/// string-serializing code path, so the column holds a JSON string whose
/// content is the real payload. None of this store's columns legitimately
/// hold a top-level string, so a string tree gets one reparse; if that
/// fails the original value is returned and shape validation produces the
/// final error.
pub fn recover_tree(tree: Value, context: &str) -> Value {
    let Value::String(inner) = &tree else {
        return tree;
    };
    match serde_json::from_str::<Value>(inner) {
        Ok(recovered) => {
            tracing::warn!(context, "recovered doubly-encoded JSON column");
            recovered
        }
        Err(_) => tree,
    }
}

/// Decode a metadata column: absent/NULL normalizes to an empty map.
pub fn metadata_from_tree(
    tree: Option<Value>,
    context: &str,
) -> TaskResult<HashMap<String, Value>> {
    match tree.map(|t| recover_tree(t, context)) {
        None | Some(Value::Null) => Ok(HashMap::new()),
        Some(Value::Object(map)) => Ok(map.into_iter().collect()),
        Some(_) => Err(TaskStoreError::deserialization(
            context,
            "metadata is not a JSON object",
        )),
    }
}

/// Decode an extensions column: absent/NULL normalizes to an empty list.
pub fn extensions_from_tree(tree: Option<Value>, context: &str) -> TaskResult<Vec<String>> {
    match tree.map(|t| recover_tree(t, context)) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(TaskStoreError::deserialization(
                    context,
                    format!("extension entry is not a string: {other}"),
                )),
            })
            .collect(),
        Some(_) => Err(TaskStoreError::deserialization(
            context,
            "extensions are not a JSON array",
        )),
    }
}
