//! Persistent store adapter.
//!
//! `FlagStore` is the seam between the evaluator and its source of truth;
//! the Postgres implementation lives here and tests substitute an
//! in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flagship_core::{Environment, Flag, FlagType, FlagValue, FlagshipError, Result, Variant};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

/// Read-only access to flag definitions, keyed the way the evaluator
/// asks for them. Missing rows are `NotFound`; everything else is a
/// dependency failure.
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn environment_by_api_key(&self, api_key: &str) -> Result<Environment>;
    async fn flag_by_key(&self, flag_key: &str) -> Result<Flag>;
    async fn all_active_flags(&self) -> Result<Vec<Flag>>;
    async fn flag_value(&self, flag_id: Uuid, environment_id: Uuid) -> Result<FlagValue>;
    async fn variants(&self, flag_value_id: Uuid) -> Result<Vec<Variant>>;
    async fn flag_values_for_environment(
        &self,
        environment_id: Uuid,
    ) -> Result<HashMap<String, FlagValue>>;
    async fn ping(&self) -> Result<()>;
}

/// Postgres-backed store.
pub struct PgFlagStore {
    pool: PgPool,
}

impl PgFlagStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool and verify connectivity.
    pub async fn connect(cfg: &crate::config::DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_conns)
            .min_connections(cfg.min_conns)
            .max_lifetime(cfg.max_conn_lifetime)
            .idle_timeout(cfg.max_conn_idle_time)
            .connect(&cfg.connection_string())
            .await
            .map_err(store_err)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(store_err)?;

        Ok(Self::new(pool))
    }
}

fn store_err(err: sqlx::Error) -> FlagshipError {
    FlagshipError::dependency(err.to_string())
}

#[derive(sqlx::FromRow)]
struct EnvironmentRow {
    id: Uuid,
    key: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    api_key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EnvironmentRow> for Environment {
    fn from(row: EnvironmentRow) -> Self {
        Environment {
            id: row.id,
            key: row.key,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            api_key: row.api_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FlagRow {
    id: Uuid,
    key: String,
    name: String,
    description: Option<String>,
    flag_type: String,
    default_value: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlagRow> for Flag {
    type Error = FlagshipError;

    fn try_from(row: FlagRow) -> Result<Self> {
        let flag_type = FlagType::parse(&row.flag_type).ok_or_else(|| {
            FlagshipError::internal(format!(
                "flag {} has unknown type {:?}",
                row.key, row.flag_type
            ))
        })?;
        Ok(Flag {
            id: row.id,
            key: row.key,
            name: row.name,
            description: row.description,
            flag_type,
            default_value: row.default_value,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FlagValueRow {
    id: Uuid,
    flag_id: Uuid,
    environment_id: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FlagValueRow> for FlagValue {
    fn from(row: FlagValueRow) -> Self {
        FlagValue {
            id: row.id,
            flag_id: row.flag_id,
            environment_id: row.environment_id,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FlagValueWithKeyRow {
    id: Uuid,
    flag_id: Uuid,
    environment_id: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    flag_key: String,
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    flag_value_id: Uuid,
    value: String,
    percentage: i32,
    variant_order: i32,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Variant {
            id: row.id,
            flag_value_id: row.flag_value_id,
            value: row.value,
            percentage: row.percentage,
            variant_order: row.variant_order,
        }
    }
}

#[async_trait]
impl FlagStore for PgFlagStore {
    async fn environment_by_api_key(&self, api_key: &str) -> Result<Environment> {
        let row: Option<EnvironmentRow> = sqlx::query_as(
            r#"
            SELECT id, key, name, description, is_active, api_key, created_at, updated_at
            FROM environments
            WHERE api_key = $1 AND is_active = true
            "#,
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(Environment::from)
            .ok_or_else(|| FlagshipError::not_found("environment", "by-api-key"))
    }

    async fn flag_by_key(&self, flag_key: &str) -> Result<Flag> {
        let row: Option<FlagRow> = sqlx::query_as(
            r#"
            SELECT id, key, name, description, type AS flag_type,
                   default_value, is_active, created_at, updated_at
            FROM flags
            WHERE key = $1 AND is_active = true
            "#,
        )
        .bind(flag_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.ok_or_else(|| FlagshipError::not_found("flag", flag_key))?
            .try_into()
    }

    async fn all_active_flags(&self) -> Result<Vec<Flag>> {
        let rows: Vec<FlagRow> = sqlx::query_as(
            r#"
            SELECT id, key, name, description, type AS flag_type,
                   default_value, is_active, created_at, updated_at
            FROM flags
            WHERE is_active = true
            ORDER BY key
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(Flag::try_from).collect()
    }

    async fn flag_value(&self, flag_id: Uuid, environment_id: Uuid) -> Result<FlagValue> {
        let row: Option<FlagValueRow> = sqlx::query_as(
            r#"
            SELECT id, flag_id, environment_id, is_active, created_at, updated_at
            FROM flag_values
            WHERE flag_id = $1 AND environment_id = $2 AND is_active = true
            "#,
        )
        .bind(flag_id)
        .bind(environment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(FlagValue::from)
            .ok_or_else(|| FlagshipError::not_found("flag_value", flag_id.to_string()))
    }

    async fn variants(&self, flag_value_id: Uuid) -> Result<Vec<Variant>> {
        let rows: Vec<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, flag_value_id, value, percentage, variant_order
            FROM flag_value_variants
            WHERE flag_value_id = $1
            ORDER BY variant_order
            "#,
        )
        .bind(flag_value_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().map(Variant::from).collect())
    }

    async fn flag_values_for_environment(
        &self,
        environment_id: Uuid,
    ) -> Result<HashMap<String, FlagValue>> {
        let rows: Vec<FlagValueWithKeyRow> = sqlx::query_as(
            r#"
            SELECT fv.id, fv.flag_id, fv.environment_id, fv.is_active,
                   fv.created_at, fv.updated_at, f.key AS flag_key
            FROM flag_values fv
            JOIN flags f ON f.id = fv.flag_id
            WHERE fv.environment_id = $1 AND fv.is_active = true AND f.is_active = true
            "#,
        )
        .bind(environment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.flag_key,
                    FlagValue {
                        id: row.id,
                        flag_id: row.flag_id,
                        environment_id: row.environment_id,
                        is_active: row.is_active,
                        created_at: row.created_at,
                        updated_at: row.updated_at,
                    },
                )
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
