//! Transport negotiation.
//!
//! Decides, per request, whether bytes pass through an archive codec on the
//! way in (uploads) or on the way out (downloads). The decisions are plain
//! functions over header and query values; [`layer`] wires them into axum
//! middleware.
//!
//! # Inbound kind selection
//!
//! | Priority | Source | Example |
//! |----------|--------|---------|
//! | 1 | `?type=` query hint, invalid values mean zip | `?type=tar` |
//! | 2 | part `Content-Type` | `application/x-tar` |
//! | 3 | part file name suffix | `prices.tar` |
//! | 4 | default | zip |
//!
//! # Outbound wrapping
//!
//! Opt-in through `?archive=zip|tar` or an `Accept` header naming
//! `application/zip` or `application/x-tar`. The query wins over `Accept`.

pub mod layer;

use crate::archive::ArchiveKind;
use crate::{Error, Result};

pub use layer::{MemberLimit, RESPONSE_MEMBER, UPLOAD_FIELD, archive_response, unwrap_upload};

/// Media type every upload envelope must declare.
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Media type of the unwrapped payload handed downstream.
pub const TEXT_CSV: &str = "text/csv";

/// Checks that a request `Content-Type` declares a multipart form.
///
/// # Errors
///
/// Returns [`Error::BadRequestFormat`] for a missing or different media type.
pub fn ensure_multipart(content_type: Option<&str>) -> Result<()> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    if essence.eq_ignore_ascii_case(MULTIPART_FORM_DATA) {
        Ok(())
    } else {
        Err(Error::BadRequestFormat(format!(
            "Content-Type must be {MULTIPART_FORM_DATA}, got {:?}",
            content_type.unwrap_or("")
        )))
    }
}

/// Picks the archive kind for an upload.
#[must_use]
pub fn resolve_inbound_kind(
    query_type: Option<&str>,
    part_content_type: Option<&str>,
    file_name: Option<&str>,
) -> ArchiveKind {
    if let Some(hint) = query_type {
        return hint.parse().unwrap_or_else(|_| {
            tracing::debug!(hint, "Unknown type hint, using zip");
            ArchiveKind::Zip
        });
    }

    part_content_type
        .and_then(ArchiveKind::from_mime_type)
        .or_else(|| file_name.and_then(ArchiveKind::from_file_name))
        .unwrap_or_default()
}

/// Decides whether, and how, a response should be wrapped.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] if `?archive=` names an unknown kind.
pub fn outbound_kind(
    query_archive: Option<&str>,
    accept: Option<&str>,
) -> Result<Option<ArchiveKind>> {
    if let Some(hint) = query_archive {
        return hint.parse().map(Some);
    }

    Ok(accept.and_then(|value| value.split(',').find_map(ArchiveKind::from_mime_type)))
}

/// `Content-Disposition` value for a wrapped response.
#[must_use]
pub fn attachment_disposition(kind: ArchiveKind) -> String {
    format!("attachment; filename=\"data.{}\"", kind.extension())
}
