//! Postgres-backed order, patient, test and task lookups.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::{OrderLookup, PatientLookup, TaskService, TestLookup, TestsWithMappings};
use crate::error::{Result, SampleError};
use crate::models::{OrderDetails, PatientDetails, Task, TestDetail, TestDetailUpdate, TestSampleMapping};

const ORDER_COLUMNS: &str = "id, oms_order_id, oms_request_id, uuid, city_code, \
     patient_details_id, trf_id, servicing_lab_id, collection_type, bulk_order_id, collected_on";

const TEST_COLUMNS: &str = "id, oms_order_id, oms_test_id, test_name, city_code, task_id, lab_id, \
     processing_lab_id, master_test_id, status, lab_eta, lab_tat";

const TASK_COLUMNS: &str = "id, oms_order_id, oms_request_id, lab_id, city_code, status, \
     previous_status, order_type, patient_details_id, is_active, created_at";

/// Write column-wise test updates; unset fields keep their current value
pub(crate) async fn apply_test_updates(
    conn: &mut PgConnection,
    oms_order_id: &str,
    updates: &[TestDetailUpdate],
) -> Result<()> {
    for update in updates {
        sqlx::query(
            r#"
            UPDATE test_details
            SET status = COALESCE($3, status),
                processing_lab_id = COALESCE($4, processing_lab_id),
                task_id = COALESCE($5, task_id),
                lab_eta = COALESCE($6, lab_eta),
                lab_tat = COALESCE($7, lab_tat),
                updated_at = NOW()
            WHERE oms_order_id = $1 AND oms_test_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(oms_order_id)
        .bind(&update.oms_test_id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.processing_lab_id)
        .bind(update.task_id)
        .bind(update.lab_eta)
        .bind(update.lab_tat)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgLookups {
    pool: PgPool,
}

impl PgLookups {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderLookup for PgLookups {
    async fn get_order_by_oms_order_id(&self, oms_order_id: &str) -> Result<Option<OrderDetails>> {
        let order = sqlx::query_as::<_, OrderDetails>(&format!(
            "SELECT {ORDER_COLUMNS} FROM order_details WHERE oms_order_id = $1 AND deleted_at IS NULL"
        ))
        .bind(oms_order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn get_order_by_trf_id(&self, trf_id: &str) -> Result<Option<OrderDetails>> {
        let order = sqlx::query_as::<_, OrderDetails>(&format!(
            "SELECT {ORDER_COLUMNS} FROM order_details WHERE trf_id = $1 AND deleted_at IS NULL"
        ))
        .bind(trf_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }
}

#[async_trait]
impl PatientLookup for PgLookups {
    async fn get_patient_details(&self, patient_details_id: i64) -> Result<PatientDetails> {
        sqlx::query_as::<_, PatientDetails>(
            "SELECT id, name, dob, expected_dob, gender FROM patient_details WHERE id = $1",
        )
        .bind(patient_details_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            SampleError::not_found(format!("patient details {patient_details_id} not found"))
        })
    }
}

#[async_trait]
impl TestLookup for PgLookups {
    async fn get_tests_by_order(&self, oms_order_id: &str) -> Result<Vec<TestDetail>> {
        let tests = sqlx::query_as::<_, TestDetail>(&format!(
            "SELECT {TEST_COLUMNS} FROM test_details \
             WHERE oms_order_id = $1 AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(oms_order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }

    async fn get_tests_by_oms_test_ids(&self, oms_test_ids: &[String]) -> Result<Vec<TestDetail>> {
        let tests = sqlx::query_as::<_, TestDetail>(&format!(
            "SELECT {TEST_COLUMNS} FROM test_details \
             WHERE oms_test_id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(oms_test_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }

    async fn get_tests_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<TestsWithMappings> {
        let mappings = sqlx::query_as::<_, TestSampleMapping>(
            r#"
            SELECT id, oms_order_id, city_code, oms_test_id, vial_type_id, sample_id,
                   sample_number, recollection_pending, is_rejected, rejection_reason, deleted_at
            FROM test_sample_mapping
            WHERE oms_order_id = $1 AND sample_number = ANY($2) AND deleted_at IS NULL
            ORDER BY sample_number, id
            "#,
        )
        .bind(oms_order_id)
        .bind(sample_numbers.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut test_ids: Vec<String> = mappings.iter().map(|m| m.oms_test_id.clone()).collect();
        test_ids.sort();
        test_ids.dedup();

        let tests = sqlx::query_as::<_, TestDetail>(&format!(
            "SELECT {TEST_COLUMNS} FROM test_details \
             WHERE oms_order_id = $1 AND oms_test_id = ANY($2) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(oms_order_id)
        .bind(test_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(TestsWithMappings { tests, mappings })
    }

    async fn update_test_details(
        &self,
        oms_order_id: &str,
        updates: Vec<TestDetailUpdate>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        apply_test_updates(&mut tx, oms_order_id, &updates).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TaskService for PgLookups {
    async fn get_task_by_oms_order_id(&self, oms_order_id: &str) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE oms_order_id = $1 AND is_active ORDER BY id DESC LIMIT 1"
        ))
        .bind(oms_order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }
}
