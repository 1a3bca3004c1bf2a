//! Stable cache key construction.
//!
//! Keys are logical identifiers shared between the evaluation service and
//! the admin invalidation bus; the formats here must not change without
//! coordinating both sides.

pub const PREFIX_ENV_API_KEY: &str = "env:apikey:";
pub const PREFIX_FLAG_BY_KEY: &str = "flag:key:";
pub const KEY_ALL_ACTIVE_FLAGS: &str = "flags:active";
pub const PREFIX_FLAG_VALUES_ENV: &str = "flagvalues:env:";
pub const PREFIX_VARIANTS: &str = "variants:fv:";
pub const PREFIX_FLAG_VALUE: &str = "flagvalue:";

/// Key for an environment looked up by API key.
pub fn env_by_api_key(api_key: &str) -> String {
    format!("{PREFIX_ENV_API_KEY}{api_key}")
}

/// Key for a flag looked up by its short key.
pub fn flag_by_key(flag_key: &str) -> String {
    format!("{PREFIX_FLAG_BY_KEY}{flag_key}")
}

/// Key for the flag-key → flag-value map of an environment.
pub fn flag_values_env(env_id: &str) -> String {
    format!("{PREFIX_FLAG_VALUES_ENV}{env_id}")
}

/// Key for the ordered variant list of a flag value.
pub fn variants(flag_value_id: &str) -> String {
    format!("{PREFIX_VARIANTS}{flag_value_id}")
}

/// Key for a single (flag, environment) flag value.
pub fn flag_value(flag_id: &str, env_id: &str) -> String {
    format!("{PREFIX_FLAG_VALUE}{flag_id}:{env_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats_are_stable() {
        assert_eq!(env_by_api_key("abc"), "env:apikey:abc");
        assert_eq!(flag_by_key("dark-mode"), "flag:key:dark-mode");
        assert_eq!(flag_values_env("e1"), "flagvalues:env:e1");
        assert_eq!(variants("fv1"), "variants:fv:fv1");
        assert_eq!(flag_value("f1", "e1"), "flagvalue:f1:e1");
    }
}
