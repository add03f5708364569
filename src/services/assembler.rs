//! Upload validation and metadata document assembly.
//!
//! Both steps are pure: nothing here touches storage, so a request that
//! fails validation never causes a blob write.

use crate::{
    hashing::ContentId,
    models::{
        metadata::{Attribute, NftMetadata},
        upload::UploadRequest,
    },
};
use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("`name` is required")]
    MissingName,
    #[error("`content` file is required")]
    MissingContent,
    #[error("invalid properties: {0}")]
    InvalidProperties(String),
    #[error("invalid attributes: {0}")]
    InvalidAttributes(String),
    #[error("`{field}` is not a valid URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("`background_color` must be six hexadecimal digits")]
    InvalidBackgroundColor,
}

/// Text fields that end up in `metadata.json`, already checked.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFields {
    pub name: String,
    pub description: Option<String>,
    pub external_url: Option<String>,
    pub animation_url: Option<String>,
    pub background_color: Option<String>,
    pub attributes: Vec<Attribute>,
    pub properties: Map<String, Value>,
}

/// An upload that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub fields: MetadataFields,
    pub content: Bytes,
    pub preview: Option<Bytes>,
}

/// Check every caller-supplied field.
pub fn validate(request: UploadRequest) -> Result<ValidatedUpload, AssemblyError> {
    if request.name.trim().is_empty() {
        return Err(AssemblyError::MissingName);
    }

    let content = match request.content {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(AssemblyError::MissingContent),
    };

    let properties = match request.properties.as_deref().map(str::trim) {
        None | Some("") => Map::new(),
        Some(raw) => parse_properties(raw)?,
    };

    let external_url = non_empty(request.external_url)
        .map(|url| check_url("external_url", url))
        .transpose()?;
    let animation_url = non_empty(request.animation_url)
        .map(|url| check_url("animation_url", url))
        .transpose()?;
    let background_color = non_empty(request.background_color)
        .map(check_background_color)
        .transpose()?;

    Ok(ValidatedUpload {
        fields: MetadataFields {
            name: request.name,
            description: request.description.filter(|d| !d.trim().is_empty()),
            external_url,
            animation_url,
            background_color,
            attributes: request.attributes,
            properties,
        },
        content,
        // An empty preview part is treated as no preview.
        preview: request.preview.filter(|bytes| !bytes.is_empty()),
    })
}

/// Parse the caller's `properties` JSON text. Only objects are accepted.
pub fn parse_properties(raw: &str) -> Result<Map<String, Value>, AssemblyError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AssemblyError::InvalidProperties(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
        Err(err) => Err(AssemblyError::InvalidProperties(err.to_string())),
    }
}

/// Parse an `attributes` JSON array, as sent by form clients.
pub fn parse_attributes(raw: &str) -> Result<Vec<Attribute>, AssemblyError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|err| AssemblyError::InvalidAttributes(err.to_string()))
}

/// Build the document for already stored blobs.
pub fn assemble(
    fields: &MetadataFields,
    content: &ContentId,
    preview: Option<&ContentId>,
) -> NftMetadata {
    NftMetadata {
        name: fields.name.clone(),
        description: fields.description.clone(),
        image: content.to_uri(),
        preview: preview.map(ContentId::to_uri),
        external_url: fields.external_url.clone(),
        animation_url: fields.animation_url.clone(),
        background_color: fields.background_color.clone(),
        attributes: fields.attributes.clone(),
        properties: fields.properties.clone(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_url(field: &'static str, value: String) -> Result<String, AssemblyError> {
    Url::parse(&value).map_err(|err| AssemblyError::InvalidUrl {
        field,
        reason: err.to_string(),
    })?;
    Ok(value)
}

fn check_background_color(value: String) -> Result<String, AssemblyError> {
    let hex = value.strip_prefix('#').unwrap_or(&value);
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hex.to_ascii_lowercase())
    } else {
        Err(AssemblyError::InvalidBackgroundColor)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> UploadRequest {
        UploadRequest {
            name: "Artwork1".into(),
            content: Some(Bytes::from_static(b"bytes A")),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_request_validates() {
        let validated = validate(request()).unwrap();
        assert_eq!(validated.fields.name, "Artwork1");
        assert!(validated.fields.properties.is_empty());
        assert!(validated.preview.is_none());
    }

    #[test]
    fn display_text_is_kept_verbatim() {
        let mut req = request();
        req.name = "  Artwork1 ".into();
        req.description = Some(" A piece\n".into());
        let fields = validate(req).unwrap().fields;
        assert_eq!(fields.name, "  Artwork1 ");
        assert_eq!(fields.description.as_deref(), Some(" A piece\n"));

        let mut req = request();
        req.description = Some("   ".into());
        assert!(validate(req).unwrap().fields.description.is_none());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut req = request();
        req.name = "   ".into();
        assert_eq!(validate(req).unwrap_err(), AssemblyError::MissingName);
    }

    #[test]
    fn missing_or_empty_content_is_rejected() {
        let mut req = request();
        req.content = None;
        assert_eq!(validate(req).unwrap_err(), AssemblyError::MissingContent);

        let mut req = request();
        req.content = Some(Bytes::new());
        assert_eq!(validate(req).unwrap_err(), AssemblyError::MissingContent);
    }

    #[test]
    fn unparsable_properties_fail_whole_request() {
        let mut req = request();
        req.properties = Some("{not json".into());
        assert!(matches!(
            validate(req),
            Err(AssemblyError::InvalidProperties(_))
        ));
    }

    #[test]
    fn non_object_properties_are_rejected() {
        let err = parse_properties("[1, 2]").unwrap_err();
        assert_eq!(
            err,
            AssemblyError::InvalidProperties("expected a JSON object, got an array".into())
        );
    }

    #[test]
    fn blank_properties_mean_none() {
        let mut req = request();
        req.properties = Some("  ".into());
        assert!(validate(req).unwrap().fields.properties.is_empty());
    }

    #[test]
    fn urls_and_colors_are_checked() {
        let mut req = request();
        req.external_url = Some("not a url".into());
        assert!(matches!(
            validate(req),
            Err(AssemblyError::InvalidUrl {
                field: "external_url",
                ..
            })
        ));

        let mut req = request();
        req.background_color = Some("#GG0000".into());
        assert_eq!(
            validate(req).unwrap_err(),
            AssemblyError::InvalidBackgroundColor
        );

        let mut req = request();
        req.background_color = Some("#FFAA00".into());
        assert_eq!(
            validate(req).unwrap().fields.background_color.as_deref(),
            Some("ffaa00")
        );
    }

    #[test]
    fn attributes_parse_from_json_text() {
        let attrs = parse_attributes(r#"[{"trait_type":"Rarity","value":"rare"}]"#).unwrap();
        assert_eq!(attrs[0].trait_type.as_deref(), Some("Rarity"));
        assert!(parse_attributes("").unwrap().is_empty());
        assert!(matches!(
            parse_attributes(r#"{"trait_type":"x"}"#),
            Err(AssemblyError::InvalidAttributes(_))
        ));
    }

    #[test]
    fn assemble_uses_internal_references() {
        let mut req = request();
        req.description = Some("A piece".into());
        req.properties = Some(r#"{"edition": 1, "artist": "anon"}"#.into());
        let validated = validate(req).unwrap();

        let content = ContentId::of(b"bytes A");
        let preview = ContentId::of(b"bytes B");
        let doc = assemble(&validated.fields, &content, Some(&preview));

        assert_eq!(doc.name, "Artwork1");
        assert_eq!(doc.description.as_deref(), Some("A piece"));
        assert_eq!(doc.image, format!("ipfs://{content}"));
        assert_eq!(doc.preview, Some(format!("ipfs://{preview}")));
        assert_eq!(doc.properties["edition"], json!(1));
    }

    #[test]
    fn assembly_is_deterministic() {
        let validated = validate(UploadRequest {
            properties: Some(r#"{"b": 2, "a": 1}"#.into()),
            ..request()
        })
        .unwrap();
        let content = ContentId::of(b"bytes A");
        let one = serde_json::to_vec(&assemble(&validated.fields, &content, None)).unwrap();
        let two = serde_json::to_vec(&assemble(&validated.fields, &content, None)).unwrap();
        assert_eq!(one, two);
    }
}
