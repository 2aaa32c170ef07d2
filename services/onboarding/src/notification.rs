//! Welcome email rendering and SMTP dispatch.
//!
//! The same template backs two renderings: the delivered email, which points
//! at an inline attachment by content id, and the form preview, which embeds
//! the photo as a data URI.

use crate::config::{NotificationConfig, SmtpConfig};
use crate::employee_store::EmployeeRecord;
use crate::upload::Photo;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{info, instrument};

/// Content id the delivered HTML uses to reference the attached photo
pub const PHOTO_CONTENT_ID: &str = "employee-image";

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Template name; the `.html` suffix turns on Tera's autoescaping
const WELCOME_TEMPLATE: &str = "welcome_email.html";

/// Mail dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid {field} address {address:?}: {message}")]
    Address {
        field: &'static str,
        address: String,
        message: String,
    },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Photo attached inline and referenced from the HTML body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAttachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub media_type: String,
    pub content_id: String,
}

/// A rendered welcome email ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachment: InlineAttachment,
}

/// Outbound mail transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the message once; no retry
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), DispatchError>;
}

/// Renders welcome emails
#[derive(Clone)]
pub struct NotificationComposer {
    from: String,
    content: NotificationConfig,
    templates: Tera,
}

impl NotificationComposer {
    pub fn new(
        from: impl Into<String>,
        content: NotificationConfig,
    ) -> Result<Self, DispatchError> {
        let mut templates = Tera::default();
        templates.add_raw_template(WELCOME_TEMPLATE, include_str!("welcome_email.html"))?;

        Ok(Self {
            from: from.into(),
            content,
            templates,
        })
    }

    /// Build the delivered email for a persisted employee
    pub fn compose(
        &self,
        record: &EmployeeRecord,
        photo: Photo,
    ) -> Result<NotificationMessage, DispatchError> {
        let html = self.render(&record.name, &format!("cid:{}", PHOTO_CONTENT_ID))?;

        Ok(NotificationMessage {
            from: self.from.clone(),
            to: record.email.clone(),
            subject: self.content.subject.clone(),
            html,
            attachment: InlineAttachment {
                filename: photo.filename,
                content: photo.bytes,
                media_type: photo.media_type,
                content_id: PHOTO_CONTENT_ID.to_string(),
            },
        })
    }

    /// Render the preview shown next to the form, photo embedded as a data URI
    pub fn render_preview(&self, name: &str, photo: &Photo) -> Result<String, DispatchError> {
        let data_uri = format!(
            "data:{};base64,{}",
            data_uri_media_type(&photo.media_type),
            STANDARD.encode(&photo.bytes)
        );
        self.render(name, &data_uri)
    }

    fn render(&self, name: &str, image_src: &str) -> Result<String, DispatchError> {
        let mut context = Context::new();
        context.insert("organization", &self.content.organization);
        context.insert("name", name);
        context.insert("signature", &self.content.signature);
        // Inserted unescaped; callers only pass a cid reference or a data URI
        // built from a checked media type and base64 text
        context.insert("image_src", image_src);

        Ok(self.templates.render(WELCOME_TEMPLATE, &context)?)
    }
}

/// Media type for a data URI; anything that is not a plain `type/subtype`
/// token pair falls back to `application/octet-stream`
fn data_uri_media_type(media_type: &str) -> &str {
    let is_token = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&^_.+-".contains(c))
    };

    match media_type.split_once('/') {
        Some((kind, subtype)) if is_token(kind) && is_token(subtype) => media_type,
        _ => FALLBACK_MEDIA_TYPE,
    }
}

/// SMTP mailer backed by lettre
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, DispatchError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let transport = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
                .port(config.port)
                .credentials(credentials)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .credentials(credentials)
                .build()
        };

        info!(
            host = %config.host,
            port = config.port,
            starttls = config.starttls,
            "SMTP mailer initialized"
        );

        Ok(Self { transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), DispatchError> {
        let email = build_email(message)?;
        let response = self.transport.send(email).await?;

        info!(
            code = %response.code(),
            "Welcome email sent"
        );
        Ok(())
    }
}

/// Assemble a multipart/related message: HTML body plus the inline photo
fn build_email(message: &NotificationMessage) -> Result<Message, DispatchError> {
    let from = parse_mailbox("from", &message.from)?;
    let to = parse_mailbox("to", &message.to)?;

    let attachment = &message.attachment;
    let content_type = ContentType::parse(&attachment.media_type)
        .or_else(|_| ContentType::parse(FALLBACK_MEDIA_TYPE))
        .map_err(|e| DispatchError::Build(e.to_string()))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.clone())
        .multipart(
            MultiPart::related()
                .singlepart(SinglePart::html(message.html.clone()))
                .singlepart(
                    Attachment::new_inline_with_name(
                        attachment.content_id.clone(),
                        attachment.filename.clone(),
                    )
                        .body(attachment.content.clone(), content_type),
                ),
        )
        .map_err(|e| DispatchError::Build(e.to_string()))
}

fn parse_mailbox(field: &'static str, address: &str) -> Result<Mailbox, DispatchError> {
    address.parse().map_err(|e: lettre::address::AddressError| DispatchError::Address {
        field,
        address: address.to_string(),
        message: e.to_string(),
    })
}
