//! HTTP handlers for entity upload and metadata lookup.
//! Form parsing lives here; everything else is delegated to `EntityService`.

use crate::{
    errors::AppError,
    models::upload::{MetadataReference, MetadataView, Slot, UploadRequest, UploadResult},
    services::{assembler, entity_service::EntityService},
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::debug;

/// Query params accepted by the metadata lookup.
#[derive(Debug, Deserialize)]
pub struct MetadataQuery {
    /// Include the gateway-URL view (default `true`).
    pub embed: Option<bool>,
}

/// `POST /entities`: multipart upload of one entity.
///
/// Text fields: `name`, `description`, `external_url`, `animation_url`,
/// `background_color`, `attributes` (JSON array), `properties` (JSON object).
/// File fields: `content` (required), `preview`.
pub async fn upload_entity(
    State(service): State<EntityService>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResult>), AppError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if let Some(slot) = Slot::uploading_field(&name) {
            let bytes = field.bytes().await?;
            let target = match slot {
                Slot::Content => &mut request.content,
                _ => &mut request.preview,
            };
            if target.replace(bytes).is_some() {
                return Err(AppError::invalid_argument(format!(
                    "file field `{}` supplied more than once",
                    name
                )));
            }
            continue;
        }

        match name.as_str() {
            "name" => request.name = field.text().await?,
            "description" => request.description = Some(field.text().await?),
            "external_url" => request.external_url = Some(field.text().await?),
            "animation_url" => request.animation_url = Some(field.text().await?),
            "background_color" => request.background_color = Some(field.text().await?),
            "properties" => request.properties = Some(field.text().await?),
            "attributes" => {
                let raw = field.text().await?;
                request.attributes = assembler::parse_attributes(&raw)
                    .map_err(|err| AppError::invalid_argument(err.to_string()))?;
            }
            other => debug!(field = other, "ignoring unknown upload field"),
        }
    }

    let result = service.upload_entity(request).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// `GET /entities/{reference}/metadata`: stored document, plus its
/// embed view unless `?embed=false`.
pub async fn get_entity_metadata(
    State(service): State<EntityService>,
    Path(reference): Path<String>,
    Query(q): Query<MetadataQuery>,
) -> Result<Json<MetadataView>, AppError> {
    let view = service
        .get_metadata(&MetadataReference::new(reference), q.embed.unwrap_or(true))
        .await?;
    Ok(Json(view))
}
