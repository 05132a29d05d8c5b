//! # Postgres Sample Store
//!
//! [`SampleStore`] over the `samples`, `sample_metadata` and `test_sample_mapping` tables.
//!
//! `apply` runs a single transaction. When it inserts samples it first takes a
//! transaction-scoped advisory lock on the order id, then reads `max(sample_number)` for
//! the order (deleted rows included, so numbers are never reused) and allocates upward
//! from there. The partial unique indexes on root samples back this up at the schema
//! level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use super::changes::{allocate_sample_numbers, AppliedChanges, ChangeSet, TaskRef};
use super::SampleStore;
use crate::error::{Result, SampleError};
use crate::lookups::postgres::apply_test_updates;
use crate::models::{
    LabId, MappingSelector, NewTask, Sample, SampleId, SampleMetadata, SampleRecord, SampleSlot,
    TaskId, TestSampleMapping, TASK_STATUS_PENDING,
};
use crate::state_machine::SampleStatus;

const SAMPLE_COLUMNS: &str = "id, oms_order_id, oms_request_id, city_code, vial_type_id, \
     sample_number, parent_sample_id, lab_id, destination_lab_id, visit_id, status, barcode, \
     rejection_reason, updated_by, created_at, updated_at, deleted_at";

const METADATA_COLUMNS: &str = "sample_id, oms_order_id, city_code, collection_sequence_number, \
     collected_at, received_at, accessioned_at, rejected_at, not_received_at, transferred_at, \
     outsourced_at, lis_sync_at, barcode_scanned_at, last_updated_at, task_sequence, \
     collect_later_reason, not_received_reason, barcode_image_url, rejecting_lab, \
     collected_volume, updated_by, deleted_at";

const MAPPING_COLUMNS: &str = "id, oms_order_id, city_code, oms_test_id, vial_type_id, sample_id, \
     sample_number, recollection_pending, is_rejected, rejection_reason, deleted_at";

fn id_values(ids: &[SampleId]) -> Vec<i64> {
    ids.iter().map(|id| id.get()).collect()
}

fn status_values(statuses: &[SampleStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct PgSampleStore {
    pool: PgPool,
}

impl PgSampleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Pair each sample with its metadata row, preserving the sample order
    async fn with_metadata(&self, samples: Vec<Sample>) -> Result<Vec<SampleRecord>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = samples.iter().map(|s| s.id.get()).collect();
        let metadata = sqlx::query_as::<_, SampleMetadata>(&format!(
            "SELECT {METADATA_COLUMNS} FROM sample_metadata WHERE sample_id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: std::collections::HashMap<SampleId, SampleMetadata> =
            metadata.into_iter().map(|m| (m.sample_id, m)).collect();
        samples
            .into_iter()
            .map(|sample| {
                let metadata = by_id.remove(&sample.id).ok_or_else(|| {
                    SampleError::internal(format!("metadata missing for sample {}", sample.id))
                })?;
                Ok(SampleRecord::new(sample, metadata))
            })
            .collect()
    }

    async fn fetch_samples(&self, query: QueryBuilder<'_, Postgres>) -> Result<Vec<SampleRecord>> {
        let mut query = query;
        query.push(" ORDER BY sample_number, id");
        let samples = query
            .build_query_as::<Sample>()
            .fetch_all(&self.pool)
            .await?;
        self.with_metadata(samples).await
    }

    fn select_live_samples<'a>() -> QueryBuilder<'a, Postgres> {
        QueryBuilder::new(format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples WHERE deleted_at IS NULL AND status <> 'deleted'"
        ))
    }
}

async fn update_sample_row(conn: &mut PgConnection, record: &SampleRecord) -> Result<()> {
    let sample = &record.sample;
    let result = sqlx::query(
        r#"
        UPDATE samples
        SET vial_type_id = $2, lab_id = $3, destination_lab_id = $4, visit_id = $5,
            status = $6, barcode = $7, rejection_reason = $8, updated_by = $9,
            updated_at = $10, deleted_at = $11
        WHERE id = $1
        "#,
    )
    .bind(sample.id)
    .bind(sample.vial_type_id)
    .bind(sample.lab_id)
    .bind(sample.destination_lab_id)
    .bind(&sample.visit_id)
    .bind(sample.status.as_str())
    .bind(&sample.barcode)
    .bind(&sample.rejection_reason)
    .bind(sample.updated_by)
    .bind(sample.updated_at)
    .bind(sample.deleted_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SampleError::not_found(format!("sample {} not found", sample.id)));
    }

    let metadata = &record.metadata;
    sqlx::query(
        r#"
        UPDATE sample_metadata
        SET collected_at = $2, received_at = $3, accessioned_at = $4, rejected_at = $5,
            not_received_at = $6, transferred_at = $7, outsourced_at = $8, lis_sync_at = $9,
            barcode_scanned_at = $10, last_updated_at = $11, task_sequence = $12,
            collect_later_reason = $13, not_received_reason = $14, barcode_image_url = $15,
            rejecting_lab = $16, collected_volume = $17, updated_by = $18, deleted_at = $19
        WHERE sample_id = $1
        "#,
    )
    .bind(sample.id)
    .bind(metadata.collected_at)
    .bind(metadata.received_at)
    .bind(metadata.accessioned_at)
    .bind(metadata.rejected_at)
    .bind(metadata.not_received_at)
    .bind(metadata.transferred_at)
    .bind(metadata.outsourced_at)
    .bind(metadata.lis_sync_at)
    .bind(metadata.barcode_scanned_at)
    .bind(metadata.last_updated_at)
    .bind(metadata.task_sequence)
    .bind(&metadata.collect_later_reason)
    .bind(&metadata.not_received_reason)
    .bind(&metadata.barcode_image_url)
    .bind(metadata.rejecting_lab)
    .bind(metadata.collected_volume)
    .bind(metadata.updated_by)
    .bind(metadata.deleted_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_sample_row(
    conn: &mut PgConnection,
    record: SampleRecord,
) -> Result<SampleRecord> {
    let SampleRecord { sample, metadata } = record;
    let inserted = sqlx::query_as::<_, Sample>(&format!(
        r#"
        INSERT INTO samples (
            oms_order_id, oms_request_id, city_code, vial_type_id, sample_number,
            parent_sample_id, lab_id, destination_lab_id, visit_id, status, barcode,
            rejection_reason, updated_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
        RETURNING {SAMPLE_COLUMNS}
        "#
    ))
    .bind(&sample.oms_order_id)
    .bind(&sample.oms_request_id)
    .bind(&sample.city_code)
    .bind(sample.vial_type_id)
    .bind(sample.sample_number)
    .bind(sample.parent_sample_id)
    .bind(sample.lab_id)
    .bind(sample.destination_lab_id)
    .bind(&sample.visit_id)
    .bind(sample.status.as_str())
    .bind(&sample.barcode)
    .bind(&sample.rejection_reason)
    .bind(sample.updated_by)
    .bind(sample.created_at)
    .fetch_one(&mut *conn)
    .await?;

    let metadata = sqlx::query_as::<_, SampleMetadata>(&format!(
        r#"
        INSERT INTO sample_metadata (
            sample_id, oms_order_id, city_code, collection_sequence_number, collected_at,
            received_at, accessioned_at, rejected_at, not_received_at, transferred_at,
            outsourced_at, lis_sync_at, barcode_scanned_at, last_updated_at, task_sequence,
            collect_later_reason, not_received_reason, barcode_image_url, rejecting_lab,
            collected_volume, updated_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21)
        RETURNING {METADATA_COLUMNS}
        "#
    ))
    .bind(inserted.id)
    .bind(&metadata.oms_order_id)
    .bind(&metadata.city_code)
    .bind(metadata.collection_sequence_number)
    .bind(metadata.collected_at)
    .bind(metadata.received_at)
    .bind(metadata.accessioned_at)
    .bind(metadata.rejected_at)
    .bind(metadata.not_received_at)
    .bind(metadata.transferred_at)
    .bind(metadata.outsourced_at)
    .bind(metadata.lis_sync_at)
    .bind(metadata.barcode_scanned_at)
    .bind(metadata.last_updated_at.unwrap_or(inserted.created_at))
    .bind(metadata.task_sequence)
    .bind(&metadata.collect_later_reason)
    .bind(&metadata.not_received_reason)
    .bind(&metadata.barcode_image_url)
    .bind(metadata.rejecting_lab)
    .bind(metadata.collected_volume)
    .bind(inserted.updated_by)
    .fetch_one(&mut *conn)
    .await?;

    Ok(SampleRecord::new(inserted, metadata))
}

fn push_selector(query: &mut QueryBuilder<'_, Postgres>, selector: &MappingSelector) {
    match selector {
        MappingSelector::BySample(sample_id) => {
            query.push(" WHERE sample_id = ").push_bind(sample_id.get());
        }
        MappingSelector::ByTestAndSampleNumber {
            oms_order_id,
            oms_test_id,
            sample_number,
        } => {
            query
                .push(" WHERE oms_order_id = ")
                .push_bind(oms_order_id.clone())
                .push(" AND oms_test_id = ")
                .push_bind(oms_test_id.clone())
                .push(" AND sample_number = ")
                .push_bind(*sample_number);
        }
        MappingSelector::ByTests {
            oms_order_id,
            oms_test_ids,
        } => {
            query
                .push(" WHERE oms_order_id = ")
                .push_bind(oms_order_id.clone())
                .push(" AND oms_test_id = ANY(")
                .push_bind(oms_test_ids.clone())
                .push(")");
        }
    }
    query.push(" AND deleted_at IS NULL");
}

async fn delete_mappings(
    conn: &mut PgConnection,
    selector: &MappingSelector,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut query = QueryBuilder::<Postgres>::new("UPDATE test_sample_mapping SET deleted_at = ");
    query.push_bind(now).push(", updated_at = ").push_bind(now);
    push_selector(&mut query, selector);
    query.build().execute(&mut *conn).await?;
    Ok(())
}

async fn reject_mappings(
    conn: &mut PgConnection,
    selector: &MappingSelector,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut query = QueryBuilder::<Postgres>::new(
        "UPDATE test_sample_mapping SET is_rejected = TRUE, rejection_reason = ",
    );
    query
        .push_bind(reason.map(str::to_string))
        .push(", updated_at = ")
        .push_bind(now);
    push_selector(&mut query, selector);
    query.build().execute(&mut *conn).await?;
    Ok(())
}

async fn insert_task(conn: &mut PgConnection, task: &NewTask, now: DateTime<Utc>) -> Result<TaskId> {
    let task_id: TaskId = sqlx::query_scalar(
        r#"
        INSERT INTO tasks (
            oms_order_id, oms_request_id, lab_id, city_code, status, previous_status,
            order_type, patient_details_id, is_active, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $5, $6, $7, TRUE, $8, $8)
        RETURNING id
        "#,
    )
    .bind(&task.oms_order_id)
    .bind(&task.oms_request_id)
    .bind(task.lab_id)
    .bind(&task.city_code)
    .bind(TASK_STATUS_PENDING)
    .bind(&task.order_type)
    .bind(task.patient_details_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO task_metadata (task_id) VALUES ($1)")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
    Ok(task_id)
}

#[async_trait]
impl SampleStore for PgSampleStore {
    async fn get_sample(&self, id: SampleId) -> Result<SampleRecord> {
        self.get_samples_by_ids(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SampleError::not_found(format!("sample {id} not found")))
    }

    async fn get_samples_by_ids(&self, ids: &[SampleId]) -> Result<Vec<SampleRecord>> {
        let mut query = Self::select_live_samples();
        query.push(" AND id = ANY(").push_bind(id_values(ids)).push(")");
        self.fetch_samples(query).await
    }

    async fn get_samples_by_order(&self, oms_order_id: &str) -> Result<Vec<SampleRecord>> {
        let mut query = Self::select_live_samples();
        query
            .push(" AND oms_order_id = ")
            .push_bind(oms_order_id.to_string());
        self.fetch_samples(query).await
    }

    async fn get_samples_by_request(&self, oms_request_id: &str) -> Result<Vec<SampleRecord>> {
        let mut query = Self::select_live_samples();
        query
            .push(" AND oms_request_id = ")
            .push_bind(oms_request_id.to_string());
        self.fetch_samples(query).await
    }

    async fn get_samples_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<Vec<SampleRecord>> {
        let mut query = Self::select_live_samples();
        query
            .push(" AND oms_order_id = ")
            .push_bind(oms_order_id.to_string())
            .push(" AND sample_number = ANY(")
            .push_bind(sample_numbers.to_vec())
            .push(")");
        self.fetch_samples(query).await
    }

    async fn get_samples_by_barcode(
        &self,
        barcode: &str,
        statuses: &[SampleStatus],
    ) -> Result<Vec<SampleRecord>> {
        let mut query = Self::select_live_samples();
        query.push(" AND barcode = ").push_bind(barcode.to_string());
        if !statuses.is_empty() {
            query
                .push(" AND status = ANY(")
                .push_bind(status_values(statuses))
                .push(")");
        }
        self.fetch_samples(query).await
    }

    async fn get_collected_samples(
        &self,
        oms_order_id: &str,
        destination_lab_id: LabId,
        statuses: &[SampleStatus],
    ) -> Result<Vec<SampleRecord>> {
        let mut query = Self::select_live_samples();
        query
            .push(" AND oms_order_id = ")
            .push_bind(oms_order_id.to_string())
            .push(" AND destination_lab_id = ")
            .push_bind(destination_lab_id.get())
            .push(" AND status = ANY(")
            .push_bind(status_values(statuses))
            .push(")");
        self.fetch_samples(query).await
    }

    async fn find_existing_barcodes(&self, barcodes: &[String]) -> Result<Vec<(String, SampleId)>> {
        if barcodes.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String, SampleId)> = sqlx::query_as(
            r#"
            SELECT barcode, id FROM samples
            WHERE barcode = ANY($1) AND deleted_at IS NULL AND status <> 'deleted'
            "#,
        )
        .bind(barcodes.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_interlab_samples_by_parent(
        &self,
        parent_id: SampleId,
    ) -> Result<Vec<SampleRecord>> {
        let mut query = Self::select_live_samples();
        query
            .push(" AND parent_sample_id = ")
            .push_bind(parent_id.get());
        self.fetch_samples(query).await
    }

    async fn get_mappings_by_order(&self, oms_order_id: &str) -> Result<Vec<TestSampleMapping>> {
        let mappings = sqlx::query_as::<_, TestSampleMapping>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM test_sample_mapping \
             WHERE oms_order_id = $1 AND deleted_at IS NULL ORDER BY sample_number, id"
        ))
        .bind(oms_order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(mappings)
    }

    async fn get_mappings_by_sample_numbers(
        &self,
        oms_order_id: &str,
        sample_numbers: &[i32],
    ) -> Result<Vec<TestSampleMapping>> {
        let mappings = sqlx::query_as::<_, TestSampleMapping>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM test_sample_mapping \
             WHERE oms_order_id = $1 AND sample_number = ANY($2) AND deleted_at IS NULL \
             ORDER BY sample_number, id"
        ))
        .bind(oms_order_id)
        .bind(sample_numbers.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(mappings)
    }

    #[instrument(skip(self, changes), fields(order_id = %changes.oms_order_id))]
    async fn apply(&self, changes: ChangeSet) -> Result<AppliedChanges> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut applied = AppliedChanges::default();

        if !changes.new_samples.is_empty() {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&changes.oms_order_id)
                .execute(&mut *tx)
                .await?;
        }

        for record in &changes.sample_updates {
            update_sample_row(&mut tx, record).await?;
        }

        if !changes.new_samples.is_empty() {
            let current_max: i32 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(sample_number), 0) FROM samples WHERE oms_order_id = $1",
            )
            .bind(&changes.oms_order_id)
            .fetch_one(&mut *tx)
            .await?;

            let numbers = allocate_sample_numbers(&changes.new_samples, current_max);
            for (planned, sample_number) in changes.new_samples.iter().zip(numbers) {
                let sample = planned
                    .sample
                    .clone()
                    .into_sample(SampleId::default(), sample_number, now);
                let record = SampleRecord::new(sample, planned.metadata.clone());
                applied
                    .created_samples
                    .push(insert_sample_row(&mut tx, record).await?);
            }
        }

        for selector in &changes.mapping_deletions {
            delete_mappings(&mut tx, selector, now).await?;
        }

        for rejection in &changes.mapping_rejections {
            reject_mappings(&mut tx, &rejection.selector, rejection.reason.as_deref(), now).await?;
        }

        for mapping in &changes.new_mappings {
            let (sample_id, sample_number) = match mapping.slot {
                SampleSlot::Existing {
                    sample_id,
                    sample_number,
                } => (sample_id, sample_number),
                slot @ SampleSlot::Planned(_) => {
                    let index = changes.planned_index(slot).ok_or_else(|| {
                        SampleError::internal(format!("mapping refers to unknown slot {slot:?}"))
                    })?;
                    let created = &applied.created_samples[index];
                    (created.id(), created.sample.sample_number)
                }
            };
            sqlx::query(
                r#"
                INSERT INTO test_sample_mapping (
                    oms_order_id, city_code, oms_test_id, vial_type_id, sample_id,
                    sample_number, recollection_pending, is_rejected, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $8)
                "#,
            )
            .bind(&mapping.oms_order_id)
            .bind(&mapping.city_code)
            .bind(&mapping.oms_test_id)
            .bind(mapping.vial_type_id)
            .bind(sample_id)
            .bind(sample_number)
            .bind(mapping.recollection_pending)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let task_id = match changes.task_assignment.as_ref().map(|a| &a.task) {
            Some(TaskRef::Existing(id)) => Some(*id),
            Some(TaskRef::New(new_task)) => Some(insert_task(&mut tx, new_task, now).await?),
            None => None,
        };

        apply_test_updates(&mut tx, &changes.oms_order_id, &changes.test_updates).await?;

        if let (Some(task_id), Some(assignment)) = (task_id, changes.task_assignment.as_ref()) {
            if !assignment.oms_test_ids.is_empty() {
                sqlx::query(
                    r#"
                    UPDATE test_details SET task_id = $1, updated_at = NOW()
                    WHERE oms_order_id = $2 AND oms_test_id = ANY($3) AND deleted_at IS NULL
                    "#,
                )
                .bind(task_id)
                .bind(&changes.oms_order_id)
                .bind(assignment.oms_test_ids.clone())
                .execute(&mut *tx)
                .await?;
            }
        }
        applied.task_id = task_id;

        tx.commit().await?;
        debug!(
            created = applied.created_samples.len(),
            task_id = ?applied.task_id,
            "Committed sample change set"
        );
        Ok(applied)
    }
}
