//! axum middleware applying the negotiation rules.
//!
//! Mount [`unwrap_upload`] on the upload route and [`archive_response`] on
//! the download route with [`axum::middleware::from_fn`].

use super::{
    TEXT_CSV, attachment_disposition, ensure_multipart, outbound_kind, resolve_inbound_kind,
};
use crate::archive::{self, ArchiveKind, ArchiveReader, ArchiveWriter, DEFAULT_MEMBER_LIMIT};
use crate::server::ApiError;
use crate::{Error, Result};
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{HeaderValue, Uri, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::io::Write;

/// Multipart field carrying the upload.
pub const UPLOAD_FIELD: &str = "file";

/// Member name of a wrapped response.
pub const RESPONSE_MEMBER: &str = "data.json";

/// Cap on the decompressed CSV member of an upload, in bytes.
///
/// Mounted as middleware state:
/// `from_fn_with_state(MemberLimit(limit), unwrap_upload)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberLimit(pub u64);

impl Default for MemberLimit {
    fn default() -> Self {
        Self(DEFAULT_MEMBER_LIMIT)
    }
}

/// Replaces a multipart archive upload with the CSV member it contains.
///
/// The downstream request carries `Content-Type: text/csv` and no
/// `Content-Length`. Envelope and archive errors, including a member larger
/// than `limit`, short-circuit with 400.
pub async fn unwrap_upload(
    State(limit): State<MemberLimit>,
    request: Request,
    next: Next,
) -> Response {
    match unwrap_request(request, limit).await {
        Ok(request) => next.run(request).await,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected upload");
            ApiError::from(e).into_response()
        },
    }
}

/// Wraps a successful response into a single-member archive when asked to.
///
/// Error responses pass through unchanged. The body is fully buffered before
/// anything is sent, so a failed wrap still yields one clean 500.
pub async fn archive_response(request: Request, next: Next) -> Response {
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    let kind = match outbound_kind(query_param(request.uri(), "archive").as_deref(), accept) {
        Ok(kind) => kind,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let response = next.run(request).await;
    let Some(kind) = kind else {
        return response;
    };
    if !response.status().is_success() {
        return response;
    }

    match wrap_response(response, kind).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, kind = %kind, "Failed to wrap response");
            ApiError::from(e).into_response()
        },
    }
}

/// Reads one query parameter, ignoring an unparsable query string.
fn query_param(uri: &Uri, key: &str) -> Option<String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(mut params)| params.remove(key))
}

struct Upload {
    content_type: Option<String>,
    file_name: Option<String>,
    data: Bytes,
}

async fn unwrap_request(request: Request, limit: MemberLimit) -> Result<Request> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    ensure_multipart(content_type)?;

    let query_type = query_param(request.uri(), "type");
    let (mut parts, body) = request.into_parts();

    // The extractor needs the boundary header and the body limit extension.
    let mut envelope = Request::new(body);
    *envelope.headers_mut() = parts.headers.clone();
    *envelope.extensions_mut() = parts.extensions.clone();
    let upload = read_upload_field(envelope).await?;

    let kind = resolve_inbound_kind(
        query_type.as_deref(),
        upload.content_type.as_deref(),
        upload.file_name.as_deref(),
    );
    tracing::debug!(
        kind = %kind,
        file_name = upload.file_name.as_deref().unwrap_or_default(),
        bytes = upload.data.len(),
        "Unwrapping upload"
    );
    let csv = unwrap_blocking(upload.data, kind, limit).await?;

    parts
        .headers
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_CSV));
    parts.headers.remove(header::CONTENT_LENGTH);
    Ok(Request::from_parts(parts, Body::from(csv)))
}

async fn read_upload_field(envelope: Request) -> Result<Upload> {
    let mut multipart = Multipart::from_request(envelope, &())
        .await
        .map_err(|e| Error::BadRequestFormat(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequestFormat(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(String::from);
        let file_name = field.file_name().map(String::from);
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::BadRequestFormat(e.body_text()))?;
        return Ok(Upload {
            content_type,
            file_name,
            data,
        });
    }

    Err(Error::BadRequestFormat(format!(
        "multipart form has no '{UPLOAD_FIELD}' field"
    )))
}

async fn unwrap_blocking(
    container: Bytes,
    kind: ArchiveKind,
    MemberLimit(limit): MemberLimit,
) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        archive::unwrap_limited(container.as_ref(), kind, limit).map(ArchiveReader::into_bytes)
    })
    .await
    .map_err(|e| Error::OperationFailed {
        operation: "archive_unwrap".to_string(),
        cause: e.to_string(),
    })?
}

async fn wrap_response(response: Response, kind: ArchiveKind) -> Result<Response> {
    let (mut parts, body) = response.into_parts();
    let payload = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "buffer_response".to_string(),
            cause: e.to_string(),
        })?;

    let container = tokio::task::spawn_blocking(move || {
        let mut writer = ArchiveWriter::new(kind, RESPONSE_MEMBER);
        writer
            .write_all(&payload)
            .map_err(|e| Error::OperationFailed {
                operation: "archive_wrap".to_string(),
                cause: e.to_string(),
            })?;
        writer.finish()
    })
    .await
    .map_err(|e| Error::OperationFailed {
        operation: "archive_wrap".to_string(),
        cause: e.to_string(),
    })??;

    let disposition = HeaderValue::from_str(&attachment_disposition(kind)).map_err(|e| {
        Error::OperationFailed {
            operation: "archive_headers".to_string(),
            cause: e.to_string(),
        }
    })?;
    parts
        .headers
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(kind.mime_type()));
    parts.headers.insert(header::CONTENT_DISPOSITION, disposition);
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(container.len()));

    Ok(Response::from_parts(parts, Body::from(container)))
}
