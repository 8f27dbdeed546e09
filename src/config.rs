//! Configuration loader: .env file, config.toml, then environment overrides.

use common::config::{LayerFilter, SyncConfig, RESOURCE_ADMIN_REPORTS};
use common::Error;
use std::collections::HashSet;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn validate_config(config: &SyncConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.api_base_url.trim().is_empty() {
        issues.push("api_base_url must not be empty".into());
    } else if let Err(e) = url::Url::parse(config.api_base_url.trim()) {
        issues.push(format!("api_base_url is not a valid URL: {}", e));
    }
    if config.request_timeout_ms == 0 {
        issues.push("request_timeout_ms must be > 0".into());
    }
    if config.default_city.trim().is_empty() {
        issues.push("default_city must not be empty".into());
    }
    if config.retry.max_attempts == 0 {
        issues.push("retry.max_attempts must be >= 1".into());
    }
    if config.resources.is_empty() {
        issues.push("resources must contain at least one resource".into());
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for res in &config.resources {
        if res.name.trim().is_empty() {
            issues.push(format!("resource with endpoint {} has an empty name", res.endpoint));
        } else if !seen.insert(res.name.as_str()) {
            issues.push(format!("resource name '{}' is used more than once", res.name));
        }
        if !res.endpoint.starts_with('/') {
            issues.push(format!("resources.{}.endpoint must start with '/'", res.name));
        }
        if res.refresh_interval_ms == 0 {
            issues.push(format!("resources.{}.refresh_interval_ms must be > 0", res.name));
        }
        if res.effective_max_age_ms() < res.refresh_interval_ms {
            issues.push(format!(
                "resources.{}.max_age_ms must be >= refresh_interval_ms",
                res.name
            ));
        }
        if res.retry.as_ref().is_some_and(|r| r.max_attempts == 0) {
            issues.push(format!("resources.{}.retry.max_attempts must be >= 1", res.name));
        }
        if res.name == RESOURCE_ADMIN_REPORTS && config.admin_secret.trim().is_empty() {
            issues.push("admin-reports requires SIAGA_ADMIN_SECRET / admin_secret".into());
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply `SIAGA_*` overrides. `lookup` is the environment in production.
fn apply_env_overrides(
    config: &mut SyncConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(url) = lookup("SIAGA_API_URL") {
        config.api_base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(city) = lookup("SIAGA_CITY") {
        config.default_city = city.trim().to_ascii_lowercase();
    }
    if let Some(secret) = lookup("SIAGA_ADMIN_SECRET") {
        config.admin_secret = secret;
    }
    if let Some(raw) = lookup("SIAGA_REQUEST_TIMEOUT_MS") {
        config.request_timeout_ms = parse_positive_u64(&raw, "SIAGA_REQUEST_TIMEOUT_MS")?;
    }
    if let Some(raw) = lookup("SIAGA_RETRY_MAX_ATTEMPTS") {
        let parsed = parse_positive_u64(&raw, "SIAGA_RETRY_MAX_ATTEMPTS")?;
        config.retry.max_attempts = u32::try_from(parsed)
            .map_err(|_| Error::Config("SIAGA_RETRY_MAX_ATTEMPTS is too large".into()))?;
    }
    if let Some(raw) = lookup("SIAGA_RETRY_BASE_DELAY_MS") {
        config.retry.base_delay_ms = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::Config("SIAGA_RETRY_BASE_DELAY_MS must be an integer >= 0".into()))?;
    }
    if let Some(raw) = lookup("SIAGA_LAYER_FILTER") {
        config.layer_filter = LayerFilter::parse(&raw).ok_or_else(|| {
            Error::Config(
                "SIAGA_LAYER_FILTER must be one of: all, zones, evacuation, reports".into(),
            )
        })?;
    }
    if let Some(path) = lookup("SIAGA_TOKEN_PATH") {
        config.token_path = path.trim().to_string();
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<SyncConfig, Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load sync configuration. An explicit `path` must exist; otherwise
/// `config.toml` in the working directory is used when present.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig, Error> {
    // 1. .env from the working directory or a parent.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. File config over defaults.
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                read_config_file(default_path)?
            } else {
                SyncConfig::default()
            }
        }
    };

    // 3. Environment wins.
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    // 4. Admin queue is polled whenever a secret is available.
    if !config.admin_secret.trim().is_empty() {
        config = config.with_admin_reports();
    }

    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ResourceConfig;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        validate_config(&SyncConfig::default()).expect("defaults validate");
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = SyncConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("SIAGA_API_URL", "https://siaga.example/"),
                ("SIAGA_CITY", " Surabaya "),
                ("SIAGA_RETRY_MAX_ATTEMPTS", "2"),
                ("SIAGA_LAYER_FILTER", "evacuation"),
            ]),
        )
        .expect("overrides apply");

        assert_eq!(cfg.api_base_url, "https://siaga.example");
        assert_eq!(cfg.default_city, "surabaya");
        assert_eq!(cfg.retry.max_attempts, 2);
        assert_eq!(cfg.layer_filter, LayerFilter::Evacuation);
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut cfg = SyncConfig::default();
        let err = apply_env_overrides(&mut cfg, env(&[("SIAGA_REQUEST_TIMEOUT_MS", "0")]))
            .expect_err("zero timeout");
        assert!(matches!(err, Error::Config(_)));

        let err = apply_env_overrides(&mut cfg, env(&[("SIAGA_LAYER_FILTER", "heatmap")]))
            .expect_err("unknown filter");
        assert!(err.to_string().contains("SIAGA_LAYER_FILTER"));
    }

    #[test]
    fn test_validation_collects_all_issues() {
        let mut cfg = SyncConfig {
            api_base_url: "not a url".into(),
            ..SyncConfig::default()
        };
        cfg.resources.push(ResourceConfig::new("stats", "api/stats", 0));
        cfg.resources.push(ResourceConfig {
            max_age_ms: Some(1_000),
            ..ResourceConfig::new("quakes", "/api/earthquake", 60_000)
        });

        let msg = validate_config(&cfg).expect_err("invalid").to_string();
        assert!(msg.contains("api_base_url is not a valid URL"));
        assert!(msg.contains("'stats' is used more than once"));
        assert!(msg.contains("endpoint must start with '/'"));
        assert!(msg.contains("stats.refresh_interval_ms must be > 0"));
        assert!(msg.contains("quakes.max_age_ms must be >= refresh_interval_ms"));
    }

    #[test]
    fn test_admin_resource_requires_secret() {
        let cfg = SyncConfig::default().with_admin_reports();
        let msg = validate_config(&cfg).expect_err("no secret").to_string();
        assert!(msg.contains("admin-reports requires"));
    }

    #[test]
    fn test_toml_file_is_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("siaga.toml");
        std::fs::write(
            &path,
            r#"
api_base_url = "https://api.siaga.example"
default_city = "medan"

[[resources]]
name = "risk"
endpoint = "/api/risk?city={city}"
refresh_interval_ms = 60000
"#,
        )
        .expect("write config");

        let cfg = read_config_file(&path).expect("parses");
        assert_eq!(cfg.default_city, "medan");
        assert_eq!(cfg.resources.len(), 1);
        assert_eq!(cfg.retry.max_attempts, 4);
        validate_config(&cfg).expect("valid");
    }
}
