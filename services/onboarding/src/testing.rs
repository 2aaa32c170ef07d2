//! In-memory collaborators for tests.

use crate::employee_store::{EmployeeRecord, EmployeeRepository, NewEmployee, PersistenceError};
use crate::notification::{DispatchError, Mailer, NotificationMessage};
use crate::photo_store::{PhotoStore, StorageError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryPhotoStore {
    buckets: Mutex<HashSet<String>>,
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    fail_uploads: bool,
}

impl InMemoryPhotoStore {
    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl PhotoStore for InMemoryPhotoStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.lock().unwrap().contains(bucket))
    }

    async fn make_bucket(&self, bucket: &str, _region: &str) -> Result<(), StorageError> {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        if self.fail_uploads {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "simulated transport error".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryEmployees {
    records: Mutex<Vec<EmployeeRecord>>,
    fail_inserts: bool,
}

impl InMemoryEmployees {
    pub fn failing_inserts() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<EmployeeRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmployeeRepository for InMemoryEmployees {
    async fn insert(&self, employee: &NewEmployee) -> Result<EmployeeRecord, PersistenceError> {
        if self.fail_inserts {
            return Err(PersistenceError::Insert(sqlx::Error::PoolTimedOut));
        }
        let mut records = self.records.lock().unwrap();
        let record = EmployeeRecord {
            id: records.len() as i32 + 1,
            name: employee.name.clone(),
            email: employee.email.clone(),
            joining_date: employee.joining_date,
            image_url: employee.image_url.clone(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn find_by_image_url(
        &self,
        image_url: &str,
    ) -> Result<Option<EmployeeRecord>, PersistenceError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.image_url == image_url)
            .cloned())
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        if self.fail_inserts {
            return Err(PersistenceError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<NotificationMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Build("simulated SMTP outage".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
