use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Record persistence errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to insert employee record: {0}")]
    Insert(#[source] sqlx::Error),

    #[error("Failed to query employee records: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Database unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

/// Employee details to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    pub joining_date: NaiveDate,
    /// Object key of the stored photo
    pub image_url: String,
}

/// Persisted employee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EmployeeRecord {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub joining_date: NaiveDate,
    pub image_url: String,
}

/// System of record for onboarded employees
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    /// Insert a record; the photo it references must already be stored
    async fn insert(&self, employee: &NewEmployee) -> Result<EmployeeRecord, PersistenceError>;

    /// Read back the record pointing at a stored photo key.
    ///
    /// Together with [`PhotoStore::get_object`](crate::photo_store::PhotoStore::get_object)
    /// this resolves a submission from either side of the record/photo link.
    async fn find_by_image_url(
        &self,
        image_url: &str,
    ) -> Result<Option<EmployeeRecord>, PersistenceError>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> Result<(), PersistenceError>;
}

/// PostgreSQL-backed employee store
pub struct PgEmployeeStore {
    pool: PgPool,
}

impl PgEmployeeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl EmployeeRepository for PgEmployeeStore {
    #[instrument(skip(self, employee), fields(image_url = %employee.image_url))]
    async fn insert(&self, employee: &NewEmployee) -> Result<EmployeeRecord, PersistenceError> {
        let record = sqlx::query_as::<_, EmployeeRecord>(
            r#"
            INSERT INTO employees (name, email, joining_date, image_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, joining_date, image_url
            "#,
        )
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(employee.joining_date)
        .bind(&employee.image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(PersistenceError::Insert)?;

        debug!(employee_id = record.id, "Employee record saved");

        Ok(record)
    }

    async fn find_by_image_url(
        &self,
        image_url: &str,
    ) -> Result<Option<EmployeeRecord>, PersistenceError> {
        sqlx::query_as::<_, EmployeeRecord>(
            r#"
            SELECT id, name, email, joining_date, image_url
            FROM employees
            WHERE image_url = $1
            "#,
        )
        .bind(image_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(PersistenceError::Query)
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::Unavailable)?;
        Ok(())
    }
}
