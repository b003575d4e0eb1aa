//! Record-level verification of API payloads against database rows

use crate::compare::{compare_record, display_value, id_key, instant};
use crate::query::normalize_query_params;
use crate::source::{Record, RecordSource};
use probe_core::{ProbeError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{info, instrument};

/// Upper bound on ids listed for a count mismatch.
pub const MAX_SAMPLE_IDS: usize = 50;

#[derive(Debug, Clone)]
pub struct VerifyRequest<'a> {
    pub resource_name: &'a str,
    pub id_field: &'a str,
    pub database: &'a str,
    pub table: &'a str,
    pub api_records: &'a [Value],
    pub query_params: Option<&'a Map<String, Value>>,
    /// Also require the same number of rows on both sides.
    pub check_count: bool,
}

fn as_record<'v>(value: &'v Value, resource_name: &str) -> Result<&'v Record> {
    value.as_object().ok_or_else(|| {
        ProbeError::invalid(format!(
            "Response is not an array of {} objects",
            resource_name
        ))
    })
}

fn ids_of<'r>(records: impl Iterator<Item = &'r Record>, id_field: &str) -> BTreeSet<String> {
    records
        .filter_map(|record| record.get(id_field))
        .map(id_key)
        .collect()
}

fn sample(ids: &BTreeSet<String>, other: &BTreeSet<String>) -> Vec<String> {
    ids.difference(other).take(MAX_SAMPLE_IDS).cloned().collect()
}

fn finish(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProbeError::VerificationFailed { failures: errors })
    }
}

/// Checks every API record against its database row. All mismatches are
/// collected and returned as one `VerificationFailed`.
#[instrument(skip_all, fields(resource = request.resource_name, table = request.table))]
pub async fn verify_records(source: &dyn RecordSource, request: VerifyRequest<'_>) -> Result<()> {
    let filter = request
        .query_params
        .map(normalize_query_params)
        .unwrap_or_default();
    let db_rows = source
        .fetch_rows(request.database, request.table, &filter)
        .await?;

    let api_records = request
        .api_records
        .iter()
        .map(|value| as_record(value, request.resource_name))
        .collect::<Result<Vec<_>>>()?;

    let mut errors = Vec::new();

    if request.check_count && db_rows.len() != api_records.len() {
        let api_ids = ids_of(api_records.iter().copied(), request.id_field);
        let db_ids = ids_of(db_rows.iter(), request.id_field);
        errors.push(format!(
            "{} count mismatch: API returned {} records, DB has {}",
            request.resource_name,
            api_records.len(),
            db_rows.len()
        ));

        let only_db = sample(&db_ids, &api_ids);
        if !only_db.is_empty() {
            errors.push(format!(
                "{} ids missing from API (up to {}): {}",
                request.resource_name,
                MAX_SAMPLE_IDS,
                only_db.join(", ")
            ));
        }
        let only_api = sample(&api_ids, &db_ids);
        if !only_api.is_empty() {
            errors.push(format!(
                "{} ids missing from DB (up to {}): {}",
                request.resource_name,
                MAX_SAMPLE_IDS,
                only_api.join(", ")
            ));
        }
    }

    for api in &api_records {
        let Some(api_id) = api.get(request.id_field) else {
            errors.push(format!(
                "{} record has no {}",
                request.resource_name, request.id_field
            ));
            continue;
        };
        let key = id_key(api_id);

        match db_rows
            .iter()
            .find(|row| row.get(request.id_field).map(id_key).as_deref() == Some(key.as_str()))
        {
            Some(db) => compare_record(api, db, request.id_field, request.resource_name, &mut errors),
            None => errors.push(format!(
                "{} {} not found in DB",
                request.resource_name,
                display_value(api_id)
            )),
        }
    }

    finish(errors)?;
    info!(
        "All {} {} records match database",
        api_records.len(),
        request.resource_name
    );
    Ok(())
}

/// Verifies one freshly created record: field comparison plus
/// `created_at == updated_at` on the stored row.
#[instrument(skip(source, api_record))]
pub async fn verify_single(
    source: &dyn RecordSource,
    resource_name: &str,
    id_field: &str,
    database: &str,
    table: &str,
    api_record: &Value,
    id: &Value,
) -> Result<()> {
    let mut filter = Map::new();
    filter.insert(id_field.to_string(), id.clone());
    let rows = source.fetch_rows(database, table, &filter).await?;

    let Some(db) = rows.first() else {
        return Err(ProbeError::VerificationFailed {
            failures: vec![format!("{} {} not found in DB", resource_name, display_value(id))],
        });
    };

    let mut errors = Vec::new();
    compare_record(as_record(api_record, resource_name)?, db, id_field, resource_name, &mut errors);

    let created = db.get("created_at").and_then(instant);
    let updated = db.get("updated_at").and_then(instant);
    if created.is_some() && created != updated {
        errors.push("updated_at should match created_at".to_string());
    }

    finish(errors)?;
    info!("{} {} verified successfully", resource_name, display_value(id));
    Ok(())
}

/// Fails when any row with `id_field = id` is still present.
pub async fn verify_deleted(
    source: &dyn RecordSource,
    resource_name: &str,
    database: &str,
    table: &str,
    id_field: &str,
    id: &Value,
) -> Result<()> {
    let mut filter = Map::new();
    filter.insert(id_field.to_string(), id.clone());
    let rows = source.fetch_rows(database, table, &filter).await?;

    if !rows.is_empty() {
        return Err(ProbeError::VerificationFailed {
            failures: vec![format!(
                "{} with {} \"{}\" was not deleted from database",
                resource_name,
                id_field,
                display_value(id)
            )],
        });
    }
    info!("{} {} no longer in database", resource_name, display_value(id));
    Ok(())
}
