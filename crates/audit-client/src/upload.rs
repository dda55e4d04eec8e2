//! Payload encoding for multipart load job uploads.

use crate::error::Result;
use access_audit_core::AccessEntryRecord;
use serde::Serialize;

/// Encode records as newline-delimited JSON, one object per line.
pub fn encode_ndjson(records: &[AccessEntryRecord]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(records.len() * 64);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// A `multipart/related` body: JSON job metadata followed by the media part.
pub struct MultipartRelated {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartRelated {
    pub fn new<M: Serialize>(metadata: &M, media: &[u8]) -> Result<Self> {
        let boundary = format!("access_audit_{}", uuid::Uuid::new_v4().simple());
        let metadata = serde_json::to_vec(metadata)?;

        let mut body = Vec::with_capacity(metadata.len() + media.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(&metadata);
        body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(media);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Ok(Self { boundary, body })
    }

    pub fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndjson_one_line_per_record() {
        let records = vec![
            AccessEntryRecord::new("A", "alice@x.com", Some("READER".to_string())),
            AccessEntryRecord::new("B", "bob@x.com", None),
        ];

        let encoded = String::from_utf8(encode_ndjson(&records).unwrap()).unwrap();
        let lines: Vec<&str> = encoded.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"dataset":"A","entity_id":"alice@x.com","role":"READER"}"#
        );
        assert_eq!(lines[1], r#"{"dataset":"B","entity_id":"bob@x.com","role":null}"#);
    }

    #[test]
    fn test_ndjson_empty() {
        assert!(encode_ndjson(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_multipart_layout() {
        let metadata = serde_json::json!({"configuration": {"load": {}}});
        let multipart = MultipartRelated::new(&metadata, b"{\"a\":1}\n").unwrap();
        let boundary = multipart.boundary().to_string();
        assert_eq!(
            multipart.content_type(),
            format!("multipart/related; boundary={}", boundary)
        );

        let body = String::from_utf8(multipart.into_body()).unwrap();
        assert!(body.starts_with(&format!("--{}\r\n", boundary)));
        assert!(body.ends_with(&format!("\r\n--{}--\r\n", boundary)));
        assert_eq!(body.matches(&format!("--{}", boundary)).count(), 3);

        let metadata_at = body.find("\"configuration\"").unwrap();
        let media_at = body.find("{\"a\":1}").unwrap();
        assert!(metadata_at < media_at);
    }
}
