//! Multipart submission parsing and validation.
//!
//! Nothing here touches storage: a submission either comes out fully
//! validated or is rejected before any side effect.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

pub const NAME_FIELD: &str = "name";
pub const EMAIL_FIELD: &str = "email";
pub const JOINING_DATE_FIELD: &str = "joining_date";
pub const PHOTO_FIELD: &str = "image";

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Client-correctable submission errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File size exceeds the limit of {}", format_limit(.limit_bytes))]
    PhotoTooLarge { limit_bytes: usize },

    #[error("All fields are mandatory")]
    MissingField(&'static str),

    #[error("Joining date must be a date in YYYY-MM-DD format")]
    InvalidJoiningDate(String),

    #[error("Only one image may be uploaded")]
    MultiplePhotos,

    #[error("Malformed form submission: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Short machine-readable kind for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PhotoTooLarge { .. } => "photo_too_large",
            Self::MissingField(_) => "missing_field",
            Self::InvalidJoiningDate(_) => "invalid_joining_date",
            Self::MultiplePhotos => "multiple_photos",
            Self::Malformed(_) => "malformed",
        }
    }
}

fn format_limit(limit_bytes: &usize) -> String {
    const MIB: usize = 1024 * 1024;
    const KIB: usize = 1024;

    if *limit_bytes >= MIB && limit_bytes % MIB == 0 {
        format!("{}MB", limit_bytes / MIB)
    } else if *limit_bytes >= KIB && limit_bytes % KIB == 0 {
        format!("{}KB", limit_bytes / KIB)
    } else {
        format!("{} bytes", limit_bytes)
    }
}

/// Uploaded photo as received from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub filename: String,
}

/// A fully validated onboarding submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub name: String,
    pub email: String,
    pub joining_date: NaiveDate,
    pub photo: Photo,
}

/// Form fields collected so far; turned into a [`SubmissionRequest`] by [`SubmissionForm::validate`]
#[derive(Debug, Default)]
pub struct SubmissionForm {
    name: Option<String>,
    email: Option<String>,
    joining_date: Option<String>,
    photo: Option<Photo>,
}

impl SubmissionForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a text field; unknown fields are ignored
    pub fn set_text(&mut self, field: &str, value: String) {
        match field {
            NAME_FIELD => self.name = Some(value),
            EMAIL_FIELD => self.email = Some(value),
            JOINING_DATE_FIELD => self.joining_date = Some(value),
            _ => debug!(field = %field, "Ignoring unknown form field"),
        }
    }

    /// Record the photo; a second photo is rejected
    pub fn set_photo(&mut self, photo: Photo) -> Result<(), ValidationError> {
        if self.photo.is_some() {
            return Err(ValidationError::MultiplePhotos);
        }
        self.photo = Some(photo);
        Ok(())
    }

    /// Check presence of every field and parse the joining date
    pub fn validate(self) -> Result<SubmissionRequest, ValidationError> {
        let name = required_text(self.name, NAME_FIELD)?;
        let email = required_text(self.email, EMAIL_FIELD)?;
        let joining_date = required_text(self.joining_date, JOINING_DATE_FIELD)?;
        let photo = self
            .photo
            .filter(|photo| !photo.bytes.is_empty())
            .ok_or(ValidationError::MissingField(PHOTO_FIELD))?;

        let joining_date = NaiveDate::parse_from_str(&joining_date, "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidJoiningDate(joining_date.clone()))?;

        Ok(SubmissionRequest {
            name,
            email,
            joining_date,
            photo,
        })
    }
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

/// Read and validate a multipart submission.
///
/// The photo is streamed chunk by chunk so an oversize file is rejected as
/// soon as it crosses `max_photo_bytes`.
pub async fn read_submission(
    mut multipart: Multipart,
    max_photo_bytes: usize,
) -> Result<SubmissionRequest, ValidationError> {
    let mut form = SubmissionForm::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_photo_bytes))?
    {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();

        if field_name == PHOTO_FIELD {
            let photo = read_photo(field, max_photo_bytes).await?;
            form.set_photo(photo)?;
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| multipart_error(e, max_photo_bytes))?;
            form.set_text(&field_name, value);
        }
    }

    form.validate()
}

async fn read_photo(mut field: Field<'_>, max_photo_bytes: usize) -> Result<Photo, ValidationError> {
    let filename = field.file_name().map(|s| s.to_string()).unwrap_or_default();
    let media_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string());

    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_photo_bytes))?
    {
        if bytes.len() + chunk.len() > max_photo_bytes {
            return Err(ValidationError::PhotoTooLarge {
                limit_bytes: max_photo_bytes,
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(Photo {
        bytes,
        media_type,
        filename,
    })
}

/// A body that blows through the transport limit can only be the photo
fn multipart_error(e: MultipartError, max_photo_bytes: usize) -> ValidationError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::PhotoTooLarge {
            limit_bytes: max_photo_bytes,
        }
    } else {
        ValidationError::Malformed(e.body_text())
    }
}
