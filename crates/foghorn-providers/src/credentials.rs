//! Credential selection shared by the adapters.

use foghorn_core::{ProviderError, RuntimeEnv};

/// Picks the token tier for the current environment: outside production
/// the development token wins when present, otherwise the production
/// token. Construction fails when neither exists.
pub fn select_token(
    provider: &'static str,
    env: RuntimeEnv,
    production: Option<&str>,
    development: Option<&str>,
) -> Result<String, ProviderError> {
    let chosen = match env {
        RuntimeEnv::Production => production.or(development),
        RuntimeEnv::Development => development.or(production),
    };
    chosen
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(ProviderError::Configuration {
            provider,
            message: "no API token configured for this environment".to_string(),
        })
}

/// Strips trailing slashes so adapters can join paths uniformly.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_token_preferred_outside_production() {
        let token = select_token(
            "test",
            RuntimeEnv::Development,
            Some("prod-token"),
            Some("dev-token"),
        )
        .unwrap();
        assert_eq!(token, "dev-token");
    }

    #[test]
    fn production_env_uses_production_token() {
        let token = select_token(
            "test",
            RuntimeEnv::Production,
            Some("prod-token"),
            Some("dev-token"),
        )
        .unwrap();
        assert_eq!(token, "prod-token");
    }

    #[test]
    fn falls_back_across_tiers() {
        let token = select_token("test", RuntimeEnv::Development, Some("prod-token"), None).unwrap();
        assert_eq!(token, "prod-token");
        let token = select_token("test", RuntimeEnv::Production, None, Some("dev-token")).unwrap();
        assert_eq!(token, "dev-token");
    }

    #[test]
    fn missing_tokens_fail_at_construction() {
        let err = select_token("test", RuntimeEnv::Production, None, None).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        assert_eq!(normalize_base_url("https://x.test/"), "https://x.test");
        assert_eq!(normalize_base_url("https://x.test///"), "https://x.test");
        assert_eq!(normalize_base_url("https://x.test"), "https://x.test");
    }
}
