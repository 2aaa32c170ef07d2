//! Onboarding Notification Service
//!
//! Accepts new-hire submissions from a web form, keeps the photo in an
//! S3-compatible bucket, records the employee in PostgreSQL and sends a
//! personalized welcome email with the photo embedded inline.
//!
//! ## Features
//!
//! - **Validated Intake**: multipart form with name, email, joining date and
//!   a photo capped at 1MB by default; invalid input never causes side effects
//! - **Photo Storage**: bucket provisioned at startup, objects keyed by upload
//!   time and sanitized filename
//! - **Employee Records**: PostgreSQL table managed by sqlx migrations
//! - **Welcome Email**: HTML body with the photo as an inline related part,
//!   plus a side-effect free preview endpoint
//!
//! ## Architecture
//!
//! ```text
//!  Browser form
//!       │ multipart POST /submit
//!       ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Upload       │────▶│ Photo        │────▶│ Employee     │────▶│ Notification │
//! │ Validation   │     │ Store (S3)   │     │ Store (PG)   │     │ (SMTP)       │
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//!       │ 400                  │ 500                │ 500                │ 500
//!       ▼                      ▼                    ▼                    ▼
//!                       plain-text response to the form
//! ```

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod employee_store;
pub mod notification;
pub mod photo_store;
pub mod submission;
pub mod upload;

#[cfg(test)]
mod testing;

pub use api::{create_router, AppState};
pub use config::Config;
pub use employee_store::{EmployeeRecord, EmployeeRepository, PgEmployeeStore};
pub use notification::{Mailer, NotificationComposer, SmtpMailer};
pub use photo_store::{PhotoStore, S3PhotoStore};
pub use submission::{SubmissionError, SubmissionService};
pub use upload::{SubmissionRequest, ValidationError};
