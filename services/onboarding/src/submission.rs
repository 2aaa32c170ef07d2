//! The submission pipeline: photo upload, record persistence, welcome email.
//!
//! Steps run strictly in that order and stop at the first failure. Nothing
//! is rolled back: a failed insert leaves the uploaded photo behind as an
//! orphan, and a failed email leaves both the photo and the record in place.

use crate::employee_store::{EmployeeRecord, EmployeeRepository, NewEmployee, PersistenceError};
use crate::notification::{DispatchError, Mailer, NotificationComposer};
use crate::photo_store::{sanitize_filename, PhotoStore, StorageError, StoredPhotoReference};
use crate::upload::SubmissionRequest;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

/// Failure of one pipeline stage
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Failed to store photo")]
    Storage(#[source] StorageError),

    #[error("Failed to save employee record; photo {} left in bucket {}", .photo.key, .photo.bucket)]
    Persistence {
        photo: StoredPhotoReference,
        #[source]
        source: PersistenceError,
    },

    #[error("Failed to send welcome email to employee {}", .record.id)]
    Notification {
        record: EmployeeRecord,
        #[source]
        source: DispatchError,
    },
}

impl SubmissionError {
    /// Pipeline stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            Self::Persistence { .. } => "persistence",
            Self::Notification { .. } => "notification",
        }
    }
}

/// Result of a fully processed submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub record: EmployeeRecord,
    pub photo: StoredPhotoReference,
}

/// Object key for an uploaded photo: `uploads/<unix-millis>_<filename>`
pub fn object_key(timestamp_millis: i64, filename: &str) -> String {
    format!("uploads/{}_{}", timestamp_millis, sanitize_filename(filename))
}

/// Runs submissions against injected storage, persistence and mail handles
pub struct SubmissionService {
    photos: Arc<dyn PhotoStore>,
    employees: Arc<dyn EmployeeRepository>,
    mailer: Arc<dyn Mailer>,
    composer: NotificationComposer,
    bucket: String,
}

impl SubmissionService {
    pub fn new(
        photos: Arc<dyn PhotoStore>,
        employees: Arc<dyn EmployeeRepository>,
        mailer: Arc<dyn Mailer>,
        composer: NotificationComposer,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            photos,
            employees,
            mailer,
            composer,
            bucket: bucket.into(),
        }
    }

    pub fn composer(&self) -> &NotificationComposer {
        &self.composer
    }

    pub fn employees(&self) -> &dyn EmployeeRepository {
        self.employees.as_ref()
    }

    /// Process a validated submission end to end
    #[instrument(skip(self, request), fields(filename = %request.photo.filename))]
    pub async fn submit(&self, request: SubmissionRequest) -> Result<Confirmation, SubmissionError> {
        let photo_ref = StoredPhotoReference {
            bucket: self.bucket.clone(),
            key: object_key(Utc::now().timestamp_millis(), &request.photo.filename),
        };

        self.photos
            .put_object(
                &photo_ref.bucket,
                &photo_ref.key,
                request.photo.bytes.clone(),
                &request.photo.media_type,
            )
            .await
            .map_err(|e| {
                error!(key = %photo_ref.key, error = %e, "Photo upload failed");
                SubmissionError::Storage(e)
            })?;

        info!(
            key = %photo_ref.key,
            size_bytes = request.photo.bytes.len(),
            "Photo uploaded"
        );
        metrics::counter!("onboarding.photos.uploaded").increment(1);

        let new_employee = NewEmployee {
            name: request.name,
            email: request.email,
            joining_date: request.joining_date,
            image_url: photo_ref.key.clone(),
        };

        let record = match self.employees.insert(&new_employee).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    key = %photo_ref.key,
                    error = %e,
                    "Employee record not saved, photo left orphaned"
                );
                return Err(SubmissionError::Persistence {
                    photo: photo_ref,
                    source: e,
                });
            }
        };

        info!(employee_id = record.id, "Employee record saved");

        let dispatched = match self.composer.compose(&record, request.photo) {
            Ok(message) => self.mailer.dispatch(&message).await,
            Err(e) => Err(e),
        };

        if let Err(e) = dispatched {
            error!(
                employee_id = record.id,
                error = %e,
                "Welcome email not sent, record kept"
            );
            return Err(SubmissionError::Notification { record, source: e });
        }

        info!(employee_id = record.id, "Welcome email dispatched");

        Ok(Confirmation {
            record,
            photo: photo_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::employee_store::MockEmployeeRepository;
    use crate::notification::{MockMailer, PHOTO_CONTENT_ID};
    use crate::photo_store::MockPhotoStore;
    use crate::testing::{InMemoryEmployees, InMemoryPhotoStore, RecordingMailer};
    use crate::upload::Photo;
    use chrono::NaiveDate;
    use mockall::Sequence;

    fn request() -> SubmissionRequest {
        SubmissionRequest {
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            joining_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            photo: Photo {
                bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
                media_type: "image/jpeg".to_string(),
                filename: "jane.jpg".to_string(),
            },
        }
    }

    fn composer() -> NotificationComposer {
        NotificationComposer::new("hr@example.com", NotificationConfig::default()).unwrap()
    }

    fn service(
        photos: Arc<InMemoryPhotoStore>,
        employees: Arc<InMemoryEmployees>,
        mailer: Arc<RecordingMailer>,
    ) -> SubmissionService {
        SubmissionService::new(photos, employees, mailer, composer(), "image")
    }

    #[test]
    fn test_object_key_format() {
        assert_eq!(
            object_key(1719792000123, "jane.jpg"),
            "uploads/1719792000123_jane.jpg"
        );
    }

    #[test]
    fn test_object_key_cannot_escape_prefix() {
        assert_eq!(
            object_key(1, "../../secrets/jane.jpg"),
            "uploads/1_jane.jpg"
        );
    }

    #[tokio::test]
    async fn test_successful_submission_stores_photo_record_and_sends_email() {
        let photos = Arc::new(InMemoryPhotoStore::default());
        let employees = Arc::new(InMemoryEmployees::default());
        let mailer = Arc::new(RecordingMailer::default());
        let service = service(photos.clone(), employees.clone(), mailer.clone());

        let confirmation = service.submit(request()).await.unwrap();

        // Exactly one record, pointing at a stored object with the same bytes
        let records = employees.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], confirmation.record);
        assert_eq!(records[0].image_url, confirmation.photo.key);
        assert_eq!(
            photos.get_object("image", &records[0].image_url).await.unwrap(),
            request().photo.bytes
        );

        assert_eq!(
            employees
                .find_by_image_url(&confirmation.photo.key)
                .await
                .unwrap(),
            Some(confirmation.record.clone())
        );

        assert!(confirmation.photo.key.starts_with("uploads/"));
        assert!(confirmation.photo.key.ends_with("_jane.jpg"));
        assert_eq!(confirmation.photo.bucket, "image");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@example.com");
        assert_eq!(sent[0].attachment.content_id, PHOTO_CONTENT_ID);
        assert_eq!(sent[0].attachment.content, request().photo.bytes);
    }

    #[tokio::test]
    async fn test_storage_failure_creates_no_record_and_sends_nothing() {
        let photos = Arc::new(InMemoryPhotoStore::failing_uploads());
        let employees = Arc::new(InMemoryEmployees::default());
        let mailer = Arc::new(RecordingMailer::default());
        let service = service(photos.clone(), employees.clone(), mailer.clone());

        let err = service.submit(request()).await.unwrap_err();

        assert!(matches!(err, SubmissionError::Storage(_)));
        assert_eq!(err.stage(), "storage");
        assert_eq!(photos.object_count(), 0);
        assert!(employees.records().is_empty());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_orphaned_photo() {
        let photos = Arc::new(InMemoryPhotoStore::default());
        let employees = Arc::new(InMemoryEmployees::failing_inserts());
        let mailer = Arc::new(RecordingMailer::default());
        let service = service(photos.clone(), employees.clone(), mailer.clone());

        let err = service.submit(request()).await.unwrap_err();

        let orphan = match &err {
            SubmissionError::Persistence { photo, .. } => photo.clone(),
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(err.stage(), "persistence");

        // The photo is still in the store
        assert_eq!(photos.keys(), vec![orphan.key.clone()]);
        assert_eq!(
            photos.get_object("image", &orphan.key).await.unwrap(),
            request().photo.bytes
        );
        assert!(employees.records().is_empty());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_record_and_photo() {
        let photos = Arc::new(InMemoryPhotoStore::default());
        let employees = Arc::new(InMemoryEmployees::default());
        let mailer = Arc::new(RecordingMailer::failing());
        let service = service(photos.clone(), employees.clone(), mailer.clone());

        let err = service.submit(request()).await.unwrap_err();

        assert!(matches!(err, SubmissionError::Notification { .. }));
        assert_eq!(err.stage(), "notification");

        let records = employees.records();
        assert_eq!(records.len(), 1);
        assert_eq!(photos.object_count(), 1);
        assert_eq!(photos.keys(), vec![records[0].image_url.clone()]);
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let mut photos = MockPhotoStore::new();
        let mut employees = MockEmployeeRepository::new();
        let mut mailer = MockMailer::new();
        let mut seq = Sequence::new();

        photos
            .expect_put_object()
            .withf(|bucket, key, data, content_type| {
                bucket.to_string() == "image"
                    && key.starts_with("uploads/")
                    && data.len() == 6
                    && content_type.to_string() == "image/jpeg"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));
        employees
            .expect_insert()
            .withf(|employee| employee.image_url.starts_with("uploads/"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|employee| {
                Ok(EmployeeRecord {
                    id: 42,
                    name: employee.name.clone(),
                    email: employee.email.clone(),
                    joining_date: employee.joining_date,
                    image_url: employee.image_url.clone(),
                })
            });
        mailer
            .expect_dispatch()
            .withf(|message| message.to == "jane@example.com")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let service = SubmissionService::new(
            Arc::new(photos),
            Arc::new(employees),
            Arc::new(mailer),
            composer(),
            "image",
        );

        let confirmation = service.submit(request()).await.unwrap();
        assert_eq!(confirmation.record.id, 42);
    }

    #[tokio::test]
    async fn test_storage_failure_never_reaches_later_stages() {
        let mut photos = MockPhotoStore::new();
        let mut employees = MockEmployeeRepository::new();
        let mut mailer = MockMailer::new();

        photos.expect_put_object().returning(|_, key, _, _| {
            Err(StorageError::Upload {
                key: key.to_string(),
                message: "503 Slow Down".to_string(),
            })
        });
        employees.expect_insert().never();
        mailer.expect_dispatch().never();

        let service = SubmissionService::new(
            Arc::new(photos),
            Arc::new(employees),
            Arc::new(mailer),
            composer(),
            "image",
        );

        let err = service.submit(request()).await.unwrap_err();
        assert_eq!(err.stage(), "storage");
    }
}
