//! Deterministic flag evaluation.
//!
//! The selection function is pure given (flag key, user id, variants,
//! percentages, order): the bucket comes from MurmurHash3 with a fixed
//! zero seed over `flagKey:userID`, so assignments survive restarts and
//! hold across processes.

use flagship_cache::{keys, Cache, CachedValue};
use flagship_core::{
    compute_bucket, BulkEvaluationResult, Environment, EvaluationResult, Flag, FlagType,
    FlagValue, FlagValueJson, FlagshipError, Result, Variant,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::repository::FlagStore;

/// Evaluates flags for environments and users through the tiered cache.
pub struct EvaluationService {
    store: Arc<dyn FlagStore>,
    cache: Option<Arc<dyn Cache>>,
}

impl EvaluationService {
    pub fn new(store: Arc<dyn FlagStore>, cache: Option<Arc<dyn Cache>>) -> Self {
        Self { store, cache }
    }

    /// Resolve an API key to its environment. Unknown and empty keys are
    /// both `Unauthorized`, so callers cannot probe for existence.
    pub async fn authenticate_api_key(&self, api_key: &str) -> Result<Environment> {
        if api_key.is_empty() {
            return Err(FlagshipError::Unauthorized);
        }

        let cache_key = keys::env_by_api_key(api_key);
        if let Some(CachedValue::Environment(env)) = self.cache_get(&cache_key).await {
            return Ok(env);
        }

        let env = match self.store.environment_by_api_key(api_key).await {
            Ok(env) => env,
            Err(err) if err.is_not_found() => return Err(FlagshipError::Unauthorized),
            Err(err) => return Err(err),
        };

        self.cache_set(&cache_key, CachedValue::Environment(env.clone()))
            .await;
        Ok(env)
    }

    /// Evaluate a single flag for a user.
    pub async fn evaluate_flag(
        &self,
        env: &Environment,
        flag_key: &str,
        user_id: &str,
    ) -> Result<EvaluationResult> {
        let flag = self.flag_by_key(flag_key).await?;

        let flag_value = match self.flag_value(flag.id, env.id).await {
            Ok(fv) => fv,
            Err(err) if err.is_not_found() => {
                // No environment-specific override, use the default value.
                return create_result(&flag.key, &flag.default_value, flag.flag_type, true, None);
            }
            Err(err) => return Err(err),
        };

        let variants = self.variants(flag_value.id).await?;
        if variants.is_empty() {
            return create_result(&flag.key, &flag.default_value, flag.flag_type, true, None);
        }

        match select_variant(&variants, flag_key, user_id) {
            Some(variant) => create_result(
                &flag.key,
                &variant.value,
                flag.flag_type,
                false,
                Some(variant.id),
            ),
            // Bucket fell in the residual band.
            None => create_result(&flag.key, &flag.default_value, flag.flag_type, true, None),
        }
    }

    /// Evaluate every active flag for a user. Per-flag fetch or parse
    /// errors skip that flag without aborting the batch.
    pub async fn evaluate_all_flags(
        &self,
        env: &Environment,
        user_id: &str,
    ) -> Result<BulkEvaluationResult> {
        let flags = self.all_active_flags().await?;
        let flag_values = self.flag_values_for_environment(env.id).await?;

        let mut results = HashMap::with_capacity(flags.len());

        for flag in &flags {
            let Some(flag_value) = flag_values.get(&flag.key) else {
                if let Ok(result) =
                    create_result(&flag.key, &flag.default_value, flag.flag_type, true, None)
                {
                    results.insert(flag.key.clone(), result);
                }
                continue;
            };

            let Ok(variants) = self.variants(flag_value.id).await else {
                continue;
            };

            let result = if variants.is_empty() {
                create_result(&flag.key, &flag.default_value, flag.flag_type, true, None)
            } else {
                match select_variant(&variants, &flag.key, user_id) {
                    Some(variant) => create_result(
                        &flag.key,
                        &variant.value,
                        flag.flag_type,
                        false,
                        Some(variant.id),
                    ),
                    None => {
                        create_result(&flag.key, &flag.default_value, flag.flag_type, true, None)
                    }
                }
            };

            if let Ok(result) = result {
                results.insert(flag.key.clone(), result);
            }
        }

        Ok(BulkEvaluationResult { flags: results })
    }

    /// Readiness: both the store and the cache backend must answer.
    pub async fn check_health(&self) -> Result<()> {
        if let Err(err) = self.store.ping().await {
            warn!(error = %err, "health check: database ping failed");
            return Err(FlagshipError::dependency("Database connection failed"));
        }

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.ping().await {
                warn!(error = %err, "health check: cache ping failed");
                return Err(FlagshipError::dependency("Redis connection failed"));
            }
        }

        Ok(())
    }

    async fn flag_by_key(&self, flag_key: &str) -> Result<Flag> {
        let cache_key = keys::flag_by_key(flag_key);
        if let Some(CachedValue::Flag(flag)) = self.cache_get(&cache_key).await {
            return Ok(flag);
        }

        let flag = self.store.flag_by_key(flag_key).await?;
        self.cache_set(&cache_key, CachedValue::Flag(flag.clone()))
            .await;
        Ok(flag)
    }

    async fn all_active_flags(&self) -> Result<Vec<Flag>> {
        if let Some(CachedValue::ActiveFlags(flags)) =
            self.cache_get(keys::KEY_ALL_ACTIVE_FLAGS).await
        {
            return Ok(flags);
        }

        let flags = self.store.all_active_flags().await?;
        self.cache_set(
            keys::KEY_ALL_ACTIVE_FLAGS,
            CachedValue::ActiveFlags(flags.clone()),
        )
        .await;
        Ok(flags)
    }

    async fn flag_value(&self, flag_id: Uuid, environment_id: Uuid) -> Result<FlagValue> {
        let cache_key = keys::flag_value(&flag_id.to_string(), &environment_id.to_string());
        if let Some(CachedValue::FlagValue(fv)) = self.cache_get(&cache_key).await {
            return Ok(fv);
        }

        let fv = self.store.flag_value(flag_id, environment_id).await?;
        self.cache_set(&cache_key, CachedValue::FlagValue(fv.clone()))
            .await;
        Ok(fv)
    }

    async fn variants(&self, flag_value_id: Uuid) -> Result<Vec<Variant>> {
        let cache_key = keys::variants(&flag_value_id.to_string());
        if let Some(CachedValue::Variants(variants)) = self.cache_get(&cache_key).await {
            return Ok(variants);
        }

        let variants = self.store.variants(flag_value_id).await?;
        self.cache_set(&cache_key, CachedValue::Variants(variants.clone()))
            .await;
        Ok(variants)
    }

    async fn flag_values_for_environment(
        &self,
        environment_id: Uuid,
    ) -> Result<HashMap<String, FlagValue>> {
        let cache_key = keys::flag_values_env(&environment_id.to_string());
        if let Some(CachedValue::FlagValueMap(map)) = self.cache_get(&cache_key).await {
            return Ok(map);
        }

        let map = self
            .store
            .flag_values_for_environment(environment_id)
            .await?;
        self.cache_set(&cache_key, CachedValue::FlagValueMap(map.clone()))
            .await;
        Ok(map)
    }

    async fn cache_get(&self, key: &str) -> Option<CachedValue> {
        let cache = self.cache.as_ref()?;
        cache.get(key).await.ok()
    }

    async fn cache_set(&self, key: &str, value: CachedValue) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.set(key, value).await {
                warn!(key, error = %err, "failed to cache value");
            }
        }
    }
}

/// Pick the variant whose cumulative percentage band contains the user's
/// bucket. Returns `None` when the bucket falls in the residual band.
pub fn select_variant<'a>(
    variants: &'a [Variant],
    flag_key: &str,
    user_id: &str,
) -> Option<&'a Variant> {
    if variants.is_empty() {
        return None;
    }

    // A single 100% variant needs no hashing.
    if variants.len() == 1 && variants[0].percentage == 100 {
        return Some(&variants[0]);
    }

    let bucket = compute_bucket(flag_key, user_id) as i64;

    let mut cumulative: i64 = 0;
    for variant in variants {
        cumulative += i64::from(variant.percentage);
        if bucket < cumulative {
            return Some(variant);
        }
    }

    None
}

/// Parse a raw stored value into its declared type and wrap it in an
/// `EvaluationResult`.
pub fn create_result(
    flag_key: &str,
    raw_value: &str,
    flag_type: FlagType,
    is_default: bool,
    variant_id: Option<Uuid>,
) -> Result<EvaluationResult> {
    let value = match flag_type {
        FlagType::Boolean => FlagValueJson::Bool(parse_bool(raw_value).ok_or_else(|| {
            FlagshipError::parse(format!("{raw_value:?} is not a boolean"))
        })?),
        FlagType::Number => {
            let parsed: f64 = raw_value
                .parse()
                .map_err(|_| FlagshipError::parse(format!("{raw_value:?} is not a number")))?;
            // Whole numbers surface as integers.
            if parsed == (parsed as i64) as f64 {
                FlagValueJson::Int(parsed as i64)
            } else {
                FlagValueJson::Float(parsed)
            }
        }
        FlagType::String => FlagValueJson::Text(raw_value.to_string()),
        FlagType::Json => match serde_json::from_str(raw_value) {
            Ok(value) => FlagValueJson::Json(value),
            // Fall back to the raw string for unparseable documents.
            Err(_) => FlagValueJson::Text(raw_value.to_string()),
        },
    };

    Ok(EvaluationResult {
        flag_key: flag_key.to_string(),
        value,
        flag_type,
        is_default,
        variant_id,
    })
}

/// The textual boolean forms accepted for BOOLEAN flags.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
