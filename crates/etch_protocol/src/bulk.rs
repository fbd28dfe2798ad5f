//! Bulk upsert encoding for the search index.
//!
//! A bulk request body is NDJSON: one action line followed by one document
//! line per post.
//!
//! ```text
//! {"index":{"_index":"etch","_type":"post","_id":"board.example-thread-42:1"}}
//! {"name":"Alice","mail":"","meta":"","body_html":"Hello","title":""}
//! ```

use crate::error::ProtocolResult;
use crate::identity::DocumentId;
use crate::record::Post;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Default index name.
pub const DEFAULT_INDEX: &str = "etch";

/// Default document kind.
pub const DEFAULT_DOC_TYPE: &str = "post";

/// Where bulk actions are directed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    /// Index name.
    pub index: String,
    /// Document kind; `None` omits `_type` from actions.
    pub doc_type: Option<String>,
}

impl IndexTarget {
    /// Creates a target with an explicit document kind.
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: Some(doc_type.into()),
        }
    }

    /// Drops the document kind.
    pub fn without_doc_type(mut self) -> Self {
        self.doc_type = None;
        self
    }
}

impl Default for IndexTarget {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX, DEFAULT_DOC_TYPE)
    }
}

/// A parsed post paired with its document ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedPost {
    /// Document ID.
    pub id: DocumentId,
    /// Post content.
    pub post: Post,
}

impl IndexedPost {
    /// Pairs a post with its ID.
    pub fn new(id: DocumentId, post: Post) -> Self {
        Self { id, post }
    }
}

/// Indexed document body of a post.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PostDocument<'a> {
    /// Poster name.
    pub name: &'a str,
    /// Mail field.
    pub mail: &'a str,
    /// Metadata field.
    pub meta: &'a str,
    /// Post body.
    pub body_html: &'a str,
    /// Thread title.
    pub title: &'a str,
}

impl<'a> From<&'a Post> for PostDocument<'a> {
    fn from(post: &'a Post) -> Self {
        Self {
            name: &post.name,
            mail: &post.mail,
            meta: &post.meta,
            body_html: &post.body,
            title: &post.title,
        }
    }
}

#[derive(Serialize)]
struct ActionLine<'a> {
    index: ActionMeta<'a>,
}

#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
    #[serde(rename = "_id")]
    id: &'a str,
}

/// Encodes posts as an NDJSON bulk body of `index` (create-or-replace) actions.
///
/// The body ends with a newline, as the bulk API requires. No posts gives an
/// empty body.
pub fn encode_bulk(target: &IndexTarget, posts: &[IndexedPost]) -> ProtocolResult<String> {
    let mut body = String::new();

    for indexed in posts {
        let action = ActionLine {
            index: ActionMeta {
                index: &target.index,
                doc_type: target.doc_type.as_deref(),
                id: indexed.id.as_str(),
            },
        };
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&PostDocument::from(&indexed.post))?);
        body.push('\n');
    }

    Ok(body)
}

/// Decoded reply to a bulk request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponse {
    /// Milliseconds the index spent on the request.
    #[serde(default)]
    pub took: u64,
    /// Whether any item failed.
    #[serde(default)]
    pub errors: bool,
    /// One entry per action, keyed by action name.
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

/// Result of a single bulk action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkItem {
    /// Document ID.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    /// HTTP-style status of the action.
    #[serde(default)]
    pub status: u16,
    /// Error object when the action failed.
    #[serde(default)]
    pub error: Option<Value>,
}

/// A bulk action the index refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    /// Document ID, when reported.
    pub id: Option<String>,
    /// Status of the action.
    pub status: u16,
    /// Reason given by the index.
    pub reason: String,
}

impl BulkResponse {
    /// Decodes a bulk response body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Returns the actions that failed.
    pub fn failures(&self) -> Vec<BulkItemFailure> {
        self.items
            .iter()
            .flat_map(|item| item.values())
            .filter(|item| item.error.is_some() || item.status >= 300)
            .map(|item| BulkItemFailure {
                id: item.id.clone(),
                status: item.status,
                reason: item
                    .error
                    .as_ref()
                    .map(error_reason)
                    .unwrap_or_else(|| format!("status {}", item.status)),
            })
            .collect()
    }
}

fn error_reason(error: &Value) -> String {
    error
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alice() -> IndexedPost {
        IndexedPost::new(
            DocumentId::new("http://board.example/thread/42", 1).unwrap(),
            Post {
                name: "Alice".into(),
                mail: "alice@example.com".into(),
                meta: "sage".into(),
                body: "Hello <b>world</b>".into(),
                title: "My Title".into(),
            },
        )
    }

    #[test]
    fn encodes_action_and_document() {
        let body = encode_bulk(&IndexTarget::default(), &[alice()]).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(body.ends_with('\n'));

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            action,
            json!({"index": {
                "_index": "etch",
                "_type": "post",
                "_id": "board.example-thread-42:1",
            }})
        );

        let document: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(
            document,
            json!({
                "name": "Alice",
                "mail": "alice@example.com",
                "meta": "sage",
                "body_html": "Hello <b>world</b>",
                "title": "My Title",
            })
        );
    }

    #[test]
    fn omits_doc_type_when_unset() {
        let target = IndexTarget::default().without_doc_type();
        let body = encode_bulk(&target, &[alice()]).unwrap();
        let action: Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();
        assert!(action["index"].get("_type").is_none());
    }

    #[test]
    fn empty_batch_encodes_to_nothing() {
        assert_eq!(encode_bulk(&IndexTarget::default(), &[]).unwrap(), "");
    }

    #[test]
    fn reports_item_failures() {
        let response = BulkResponse::decode(
            json!({
                "took": 4,
                "errors": true,
                "items": [
                    {"index": {"_id": "a:1", "status": 201}},
                    {"index": {"_id": "a:2", "status": 400,
                        "error": {"type": "mapper_parsing_exception", "reason": "bad field"}}},
                    {"index": {"_id": "a:3", "status": 429}},
                ]
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        assert!(response.errors);
        let failures = response.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].id.as_deref(), Some("a:2"));
        assert_eq!(failures[0].reason, "bad field");
        assert_eq!(failures[1].reason, "status 429");
    }

    #[test]
    fn clean_response_has_no_failures() {
        let body = br#"{"took":1,"errors":false,"items":[{"index":{"_id":"x:1","status":200}}]}"#;
        let response = BulkResponse::decode(body).unwrap();
        assert!(response.failures().is_empty());
    }
}
