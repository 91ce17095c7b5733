use super::traits::{MappingStore, NormalizedPricingStore, RawPricingStore};
use crate::common::error::{CoreError, Result};
use crate::domain::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS raw_pricing (
        id              INTEGER PRIMARY KEY,
        provider        TEXT NOT NULL,
        service_code    TEXT NOT NULL,
        region          TEXT NOT NULL,
        service_family  TEXT,
        payload         TEXT NOT NULL,
        collection_id   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS service_mappings (
        provider                TEXT NOT NULL,
        vendor_service_name     TEXT NOT NULL,
        vendor_service_code     TEXT,
        canonical_service_type  TEXT NOT NULL,
        service_category        TEXT NOT NULL,
        service_family          TEXT NOT NULL,
        PRIMARY KEY (provider, vendor_service_name)
    );
    CREATE TABLE IF NOT EXISTS normalized_regions (
        canonical_code  TEXT PRIMARY KEY,
        aws_region      TEXT,
        azure_region    TEXT,
        display_name    TEXT NOT NULL,
        country         TEXT,
        continent       TEXT
    );
    CREATE TABLE IF NOT EXISTS normalized_pricing (
        id                      TEXT PRIMARY KEY,
        provider                TEXT NOT NULL,
        provider_service_code   TEXT NOT NULL,
        provider_sku            TEXT,
        service_category        TEXT NOT NULL,
        service_family          TEXT NOT NULL,
        service_type            TEXT NOT NULL,
        normalized_region       TEXT NOT NULL,
        provider_region         TEXT NOT NULL,
        resource_name           TEXT NOT NULL,
        resource_description    TEXT,
        resource_specs          TEXT NOT NULL,
        price_per_unit          REAL NOT NULL,
        unit                    TEXT NOT NULL,
        currency                TEXT NOT NULL,
        pricing_model           TEXT NOT NULL,
        pricing_details         TEXT NOT NULL,
        effective_date          TEXT,
        minimum_commitment      REAL NOT NULL,
        source_raw_id           INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_raw_pricing_provider ON raw_pricing (provider, region, service_code);
    CREATE INDEX IF NOT EXISTS idx_normalized_lookup
        ON normalized_pricing (provider, service_category, normalized_region, pricing_model);
"#;

const NORMALIZED_COLUMNS: &str = "id, provider, provider_service_code, provider_sku, service_category, \
     service_family, service_type, normalized_region, provider_region, resource_name, \
     resource_description, resource_specs, price_per_unit, unit, currency, pricing_model, \
     pricing_details, effective_date, minimum_commitment, source_raw_id";

/// SQLite-backed storage for raw rows, reference mappings and normalized output.
///
/// rusqlite is blocking, so every call hops onto the blocking pool.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        info!("Opened pricing database at {}", path.as_ref().display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| CoreError::Database {
                message: "sqlite connection mutex poisoned".to_string(),
            })?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| CoreError::Database {
            message: format!("blocking database task failed: {e}"),
        })?
    }

    pub async fn insert_raw_record(&self, record: RawPricingRecord) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO raw_pricing \
                 (id, provider, service_code, region, service_family, payload, collection_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.provider,
                    record.service_code,
                    record.region,
                    record.service_family,
                    record.payload,
                    record.collection_id
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_service_mapping(&self, mapping: ServiceMapping) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO service_mappings \
                 (provider, vendor_service_name, vendor_service_code, canonical_service_type, \
                  service_category, service_family) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    mapping.provider.as_str(),
                    mapping.vendor_service_name,
                    mapping.vendor_service_code,
                    mapping.canonical_service_type,
                    mapping.service_category,
                    mapping.service_family
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_region(&self, region: NormalizedRegion) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO normalized_regions \
                 (canonical_code, aws_region, azure_region, display_name, country, continent) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    region.canonical_code,
                    region.aws_region,
                    region.azure_region,
                    region.display_name,
                    region.country,
                    region.continent
                ],
            )?;
            Ok(())
        })
        .await
    }
}

fn push_in_clause(clauses: &mut Vec<String>, values: &mut Vec<Value>, column: &str, items: Vec<String>) {
    if items.is_empty() {
        return;
    }
    let placeholders = vec!["?"; items.len()].join(", ");
    clauses.push(format!("{column} IN ({placeholders})"));
    values.extend(items.into_iter().map(Value::Text));
}

fn raw_where(filter: &RawRecordFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    push_in_clause(
        &mut clauses,
        &mut values,
        "LOWER(provider)",
        filter.providers.iter().map(|p| p.as_str().to_string()).collect(),
    );
    push_in_clause(&mut clauses, &mut values, "region", filter.regions.clone());
    push_in_clause(&mut clauses, &mut values, "service_code", filter.services.clone());
    (where_sql(&clauses), values)
}

fn normalized_where(filter: &NormalizedPricingFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    let mut eq = |column: &str, value: Option<String>| {
        if let Some(v) = value {
            clauses.push(format!("{column} = ?"));
            values.push(Value::Text(v));
        }
    };
    eq("provider", filter.provider.map(|p| p.as_str().to_string()));
    eq("service_category", filter.service_category.clone());
    eq("service_family", filter.service_family.clone());
    eq("service_type", filter.service_type.clone());
    eq("normalized_region", filter.normalized_region.clone());
    eq("pricing_model", filter.pricing_model.map(|m| m.as_str().to_string()));
    eq("currency", filter.currency.clone());
    if let Some(min) = filter.min_price {
        clauses.push("price_per_unit >= ?".to_string());
        values.push(Value::Real(min));
    }
    if let Some(max) = filter.max_price {
        clauses.push("price_per_unit <= ?".to_string());
        values.push(Value::Real(max));
    }
    if let Some(vcpu) = filter.vcpu {
        clauses.push("json_extract(resource_specs, '$.vcpu') = ?".to_string());
        values.push(Value::Integer(i64::from(vcpu)));
    }
    (where_sql(&clauses), values)
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawPricingRecord> {
    Ok(RawPricingRecord {
        id: row.get(0)?,
        provider: row.get(1)?,
        service_code: row.get(2)?,
        region: row.get(3)?,
        service_family: row.get(4)?,
        payload: row.get(5)?,
        collection_id: row.get(6)?,
    })
}

/// Column values as stored; JSON and enum columns are decoded afterwards
struct NormalizedRow {
    id: String,
    provider: String,
    provider_service_code: String,
    provider_sku: Option<String>,
    service_category: String,
    service_family: String,
    service_type: String,
    normalized_region: String,
    provider_region: String,
    resource_name: String,
    resource_description: Option<String>,
    resource_specs: String,
    price_per_unit: f64,
    unit: String,
    currency: String,
    pricing_model: String,
    pricing_details: String,
    effective_date: Option<String>,
    minimum_commitment: f64,
    source_raw_id: i64,
}

impl NormalizedRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            provider: row.get(1)?,
            provider_service_code: row.get(2)?,
            provider_sku: row.get(3)?,
            service_category: row.get(4)?,
            service_family: row.get(5)?,
            service_type: row.get(6)?,
            normalized_region: row.get(7)?,
            provider_region: row.get(8)?,
            resource_name: row.get(9)?,
            resource_description: row.get(10)?,
            resource_specs: row.get(11)?,
            price_per_unit: row.get(12)?,
            unit: row.get(13)?,
            currency: row.get(14)?,
            pricing_model: row.get(15)?,
            pricing_details: row.get(16)?,
            effective_date: row.get(17)?,
            minimum_commitment: row.get(18)?,
            source_raw_id: row.get(19)?,
        })
    }

    fn decode(self) -> Result<NormalizedPricing> {
        let id = Uuid::parse_str(&self.id).map_err(|e| CoreError::InvalidData {
            message: format!("invalid normalized pricing id '{}': {e}", self.id),
        })?;
        let effective_date = match self.effective_date {
            Some(text) => Some(
                DateTime::parse_from_rfc3339(&text)
                    .map_err(|e| CoreError::InvalidData {
                        message: format!("invalid effective date '{text}': {e}"),
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        Ok(NormalizedPricing {
            id,
            provider: self.provider.parse()?,
            provider_service_code: self.provider_service_code,
            provider_sku: self.provider_sku,
            service_category: self.service_category,
            service_family: self.service_family,
            service_type: self.service_type,
            normalized_region: self.normalized_region,
            provider_region: self.provider_region,
            resource_name: self.resource_name,
            resource_description: self.resource_description,
            resource_specs: serde_json::from_str(&self.resource_specs)?,
            price_per_unit: self.price_per_unit,
            unit: self.unit,
            currency: self.currency,
            pricing_model: self.pricing_model.parse()?,
            pricing_details: serde_json::from_str(&self.pricing_details)?,
            effective_date,
            minimum_commitment: self.minimum_commitment,
            source_raw_id: self.source_raw_id,
        })
    }
}

/// Pre-serialized insert parameters so the blocking closure owns plain values
struct NormalizedInsert {
    record: NormalizedPricing,
    specs_json: String,
    details_json: String,
}

#[async_trait]
impl RawPricingStore for SqliteStorage {
    async fn count_raw_records(&self, filter: &RawRecordFilter) -> Result<u64> {
        let (where_clause, values) = raw_where(filter);
        self.with_conn(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM raw_pricing{where_clause}");
            let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn fetch_raw_batch(
        &self,
        filter: &RawRecordFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawPricingRecord>> {
        let (where_clause, mut values) = raw_where(filter);
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT id, provider, service_code, region, service_family, payload, collection_id \
                 FROM raw_pricing{where_clause} ORDER BY id LIMIT ? OFFSET ?"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), raw_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl MappingStore for SqliteStorage {
    async fn find_service_mapping(
        &self,
        provider: Provider,
        vendor_service_name: &str,
    ) -> Result<Option<ServiceMapping>> {
        let name = vendor_service_name.to_string();
        self.with_conn(move |conn| {
            let mapping = conn
                .query_row(
                    "SELECT vendor_service_name, vendor_service_code, canonical_service_type, \
                     service_category, service_family FROM service_mappings \
                     WHERE provider = ?1 AND vendor_service_name = ?2",
                    params![provider.as_str(), name],
                    |row| {
                        Ok(ServiceMapping {
                            provider,
                            vendor_service_name: row.get(0)?,
                            vendor_service_code: row.get(1)?,
                            canonical_service_type: row.get(2)?,
                            service_category: row.get(3)?,
                            service_family: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(mapping)
        })
        .await
    }

    async fn find_region(
        &self,
        provider: Provider,
        vendor_region: &str,
    ) -> Result<Option<NormalizedRegion>> {
        let vendor_region = vendor_region.to_string();
        let column = match provider {
            Provider::Aws => "aws_region",
            Provider::Azure => "azure_region",
        };
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT canonical_code, aws_region, azure_region, display_name, country, continent \
                 FROM normalized_regions WHERE {column} = ?1 LIMIT 1"
            );
            let region = conn
                .query_row(&sql, params![vendor_region], |row| {
                    Ok(NormalizedRegion {
                        canonical_code: row.get(0)?,
                        aws_region: row.get(1)?,
                        azure_region: row.get(2)?,
                        display_name: row.get(3)?,
                        country: row.get(4)?,
                        continent: row.get(5)?,
                    })
                })
                .optional()?;
            Ok(region)
        })
        .await
    }
}

#[async_trait]
impl NormalizedPricingStore for SqliteStorage {
    async fn insert_normalized_batch(&self, records: &[NormalizedPricing]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let inserts = records
            .iter()
            .map(|record| {
                Ok(NormalizedInsert {
                    specs_json: serde_json::to_string(&record.resource_specs)?,
                    details_json: serde_json::to_string(&record.pricing_details)?,
                    record: record.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let sql = format!(
                    "INSERT OR REPLACE INTO normalized_pricing ({NORMALIZED_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
                );
                let mut stmt = tx.prepare_cached(&sql)?;
                for insert in &inserts {
                    let r = &insert.record;
                    stmt.execute(params![
                        r.id.to_string(),
                        r.provider.as_str(),
                        r.provider_service_code,
                        r.provider_sku,
                        r.service_category,
                        r.service_family,
                        r.service_type,
                        r.normalized_region,
                        r.provider_region,
                        r.resource_name,
                        r.resource_description,
                        insert.specs_json,
                        r.price_per_unit,
                        r.unit,
                        r.currency,
                        r.pricing_model.as_str(),
                        insert.details_json,
                        r.effective_date.map(|d| d.to_rfc3339()),
                        r.minimum_commitment,
                        r.source_raw_id
                    ])?;
                }
            }
            tx.commit()?;
            debug!("Committed {} normalized records", inserts.len());
            Ok(inserts.len())
        })
        .await
    }

    async fn delete_all_normalized(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM normalized_pricing", [])?;
            Ok(removed as u64)
        })
        .await
    }

    async fn query_normalized(
        &self,
        filter: &NormalizedPricingFilter,
    ) -> Result<Vec<NormalizedPricing>> {
        let (where_clause, mut values) = normalized_where(filter);
        values.push(Value::Integer(filter.limit.map_or(-1, |l| l as i64)));
        values.push(Value::Integer(filter.offset as i64));
        let order = format!(
            "{} {}, id ASC",
            filter.order_by.column(),
            filter.direction.sql()
        );
        let rows = self
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT {NORMALIZED_COLUMNS} FROM normalized_pricing{where_clause} \
                     ORDER BY {order} LIMIT ? OFFSET ?"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values.iter()), NormalizedRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(NormalizedRow::decode).collect()
    }

    async fn count_normalized(&self, filter: &NormalizedPricingFilter) -> Result<u64> {
        let (where_clause, values) = normalized_where(filter);
        self.with_conn(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM normalized_pricing{where_clause}");
            let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
