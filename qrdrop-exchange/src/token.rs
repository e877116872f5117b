//! Exchange tokens: the `{id, key, name, type}` payload behind a QR code.

use crate::error::TokenError;
use qrdrop_crypto::{is_valid_file_id, AccessKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Everything a recipient needs to fetch and decrypt one file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeToken {
    pub id: String,
    /// Access key, 64 hex characters.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl fmt::Debug for ExchangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeToken")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl ExchangeToken {
    /// Compact JSON, the string encoded into the QR image.
    pub fn to_payload(&self) -> String {
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), Value::String(self.id.clone()));
        obj.insert("key".into(), Value::String(self.key.clone()));
        if let Some(name) = &self.name {
            obj.insert("name".into(), Value::String(name.clone()));
        }
        if let Some(mime_type) = &self.mime_type {
            obj.insert("type".into(), Value::String(mime_type.clone()));
        }
        Value::Object(obj).to_string()
    }

    pub fn access_key(&self) -> Result<AccessKey, TokenError> {
        AccessKey::from_hex(&self.key).map_err(|_| TokenError::InvalidField("key"))
    }
}

/// Builds the token handed to the uploader.
///
/// Empty names and types are left out, as a scanned token would not carry
/// them either.
pub fn package_token(
    id: &str,
    key: &AccessKey,
    name: Option<&str>,
    mime_type: Option<&str>,
) -> ExchangeToken {
    let present = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
    ExchangeToken {
        id: id.to_string(),
        key: key.to_hex(),
        name: present(name),
        mime_type: present(mime_type),
    }
}

/// Parses a scanned or typed code.
///
/// `id` and `key` are required; `name` and `type` are kept only when they
/// are strings. `fileId` is accepted in place of `id`, so the JSON returned
/// by an upload can be pasted as-is.
pub fn unpackage_token(raw: &str) -> Result<ExchangeToken, TokenError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| TokenError::Malformed(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(TokenError::Malformed("expected a JSON object".into()));
    };

    let id = required_str(obj.get("id").or_else(|| obj.get("fileId")), "id")?;
    if !is_valid_file_id(id) {
        return Err(TokenError::InvalidField("id"));
    }

    let key = required_str(obj.get("key"), "key")?;
    let key = AccessKey::from_hex(key)
        .map_err(|_| TokenError::InvalidField("key"))?
        .to_hex();

    Ok(ExchangeToken {
        id: id.to_string(),
        key,
        name: optional_str(obj.get("name")),
        mime_type: optional_str(obj.get("type")),
    })
}

fn required_str<'a>(value: Option<&'a Value>, field: &'static str) -> Result<&'a str, TokenError> {
    match value {
        None | Some(Value::Null) => Err(TokenError::MissingField(field)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(Value::String(_)) => Err(TokenError::MissingField(field)),
        Some(_) => Err(TokenError::InvalidField(field)),
    }
}

fn optional_str(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use qrdrop_crypto::generate_access_key;

    const ID: &str = "0f8a3c2e9b1d4f6a8c0e2b4d6f8a0c2e";

    #[test]
    fn package_unpackage_roundtrip() {
        let key = generate_access_key();
        let token = package_token(ID, &key, Some("t.txt"), Some("text/plain"));
        let back = unpackage_token(&token.to_payload()).unwrap();
        assert_eq!(back, token);
        assert_eq!(back.access_key().unwrap(), key);
    }

    #[test]
    fn empty_optional_fields_roundtrip() {
        let key = generate_access_key();
        let token = package_token(ID, &key, Some(""), Some(""));
        assert_eq!(token.name, None);
        assert_eq!(token.mime_type, None);
        assert_eq!(unpackage_token(&token.to_payload()).unwrap(), token);
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let key = generate_access_key();
        let token = package_token(ID, &key, None, None);
        let payload = token.to_payload();
        assert!(!payload.contains("name"));
        assert!(!payload.contains("type"));
        assert_eq!(unpackage_token(&payload).unwrap(), token);
    }

    #[test]
    fn payload_uses_type_field() {
        let key = generate_access_key();
        let payload = package_token(ID, &key, Some("a"), Some("image/png")).to_payload();
        let v: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(v["type"], "image/png");
    }

    #[test]
    fn accepts_upload_response_shape() {
        let key = generate_access_key().to_hex();
        let raw = format!(
            r#"{{"success":true,"fileId":"{ID}","key":"{key}","name":"t.txt","type":"text/plain"}}"#
        );
        let token = unpackage_token(&raw).unwrap();
        assert_eq!(token.id, ID);
        assert_eq!(token.name.as_deref(), Some("t.txt"));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let key = generate_access_key();
        let payload = format!("\n  {}  \n", package_token(ID, &key, None, None).to_payload());
        assert!(unpackage_token(&payload).is_ok());
    }

    #[test]
    fn uppercase_key_is_normalized() {
        let key = generate_access_key();
        let raw = format!(r#"{{"id":"{ID}","key":"{}"}}"#, key.to_hex().to_uppercase());
        assert_eq!(unpackage_token(&raw).unwrap().key, key.to_hex());
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            unpackage_token("https://example.com/not-a-token"),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(unpackage_token(""), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn rejects_non_object() {
        assert!(matches!(
            unpackage_token(r#"["id","key"]"#),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_fields() {
        let key = generate_access_key().to_hex();
        assert_eq!(
            unpackage_token(&format!(r#"{{"key":"{key}"}}"#)),
            Err(TokenError::MissingField("id"))
        );
        assert_eq!(
            unpackage_token(&format!(r#"{{"id":"{ID}"}}"#)),
            Err(TokenError::MissingField("key"))
        );
        assert_eq!(
            unpackage_token(&format!(r#"{{"id":"","key":"{key}"}}"#)),
            Err(TokenError::MissingField("id"))
        );
    }

    #[test]
    fn rejects_malformed_fields() {
        let key = generate_access_key().to_hex();
        assert_eq!(
            unpackage_token(&format!(r#"{{"id":42,"key":"{key}"}}"#)),
            Err(TokenError::InvalidField("id"))
        );
        assert_eq!(
            unpackage_token(&format!(r#"{{"id":"../etc","key":"{key}"}}"#)),
            Err(TokenError::InvalidField("id"))
        );
        assert_eq!(
            unpackage_token(&format!(r#"{{"id":"{ID}","key":"short"}}"#)),
            Err(TokenError::InvalidField("key"))
        );
    }

    #[test]
    fn non_string_optional_fields_are_dropped() {
        let key = generate_access_key().to_hex();
        let raw = format!(r#"{{"id":"{ID}","key":"{key}","name":7,"type":null}}"#);
        let token = unpackage_token(&raw).unwrap();
        assert_eq!(token.name, None);
        assert_eq!(token.mime_type, None);
    }

    #[test]
    fn errors_read_as_invalid_code() {
        let err = unpackage_token("nope").unwrap_err();
        assert!(err.to_string().starts_with("invalid code"));
    }

    #[test]
    fn debug_hides_key() {
        let key = generate_access_key();
        let token = package_token(ID, &key, None, None);
        assert!(!format!("{token:?}").contains(&key.to_hex()));
    }
}
