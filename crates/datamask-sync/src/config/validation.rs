//! Configuration validation.

use std::collections::HashSet;

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{Result, SyncError};
use crate::masking::MaskingRule;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let db = &config.databases;
    if db.source_secret.is_empty() {
        return Err(SyncError::Config("databases.source_secret is required".into()));
    }
    if db.target_secret.is_empty() {
        return Err(SyncError::Config("databases.target_secret is required".into()));
    }

    // Cannot synchronize a database into itself
    if db.source_secret == db.target_secret {
        return Err(SyncError::Config(
            "databases.source_secret and databases.target_secret must differ".into(),
        ));
    }
    if db.source_environment == db.target_environment {
        return Err(SyncError::Config(format!(
            "source and target environment tags must differ (both are '{}')",
            db.source_environment
        )));
    }
    if db.max_connections == 0 {
        return Err(SyncError::Config(
            "databases.max_connections must be at least 1".into(),
        ));
    }

    if config.settings.batch_size == 0 {
        return Err(SyncError::Config(
            "settings.batch_size must be at least 1".into(),
        ));
    }
    if config.settings.retry_enabled && config.settings.retry_attempts == 0 {
        return Err(SyncError::Config(
            "settings.retry_attempts must be at least 1 when retries are enabled".into(),
        ));
    }
    if config.report.max_events == 0 {
        return Err(SyncError::Config("report.max_events must be at least 1".into()));
    }

    let mut seen = HashSet::new();
    for table in &config.tables {
        if table.name.is_empty() {
            return Err(SyncError::Config("tables[].name is required".into()));
        }
        if !seen.insert(table.name.as_str()) {
            return Err(SyncError::Config(format!(
                "table '{}' is configured more than once",
                table.name
            )));
        }
        if table.pk.is_empty() {
            return Err(SyncError::Config(format!(
                "table '{}': pk is required",
                table.name
            )));
        }
        validate_identifier(&table.pk)?;
        if let Some(col) = &table.filter_column {
            validate_identifier(col)?;
        }
        for (column, rule) in &table.masking_rules {
            validate_identifier(column)?;
            // Loads delete by key, so the key must map to the same value every run.
            if column.eq_ignore_ascii_case(&table.pk)
                && !matches!(rule, MaskingRule::None | MaskingRule::HashEmail)
            {
                return Err(SyncError::Config(format!(
                    "table '{}': masking rule '{}' cannot be applied to primary key '{}'",
                    table.name,
                    rule.as_str(),
                    table.pk
                )));
            }
        }
        validate_sample_percent(table.sample_percent).map_err(|msg| {
            SyncError::Config(format!("table '{}': {}", table.name, msg))
        })?;
    }

    Ok(())
}

/// Check that a sampling percentage lies in (0, 100].
pub fn validate_sample_percent(pct: f64) -> std::result::Result<(), String> {
    if pct.is_finite() && pct > 0.0 && pct <= 100.0 {
        Ok(())
    } else {
        Err(format!("sample_percent must be in (0, 100], got {}", pct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn valid_config() -> Config {
        serde_yaml::from_str::<Config>(
            r#"
databases:
  source_secret: PROD_DB_URL
  target_secret: QA_DB_URL
tables:
  - name: clientes
    pk: id
    filter_column: fecha_registro
    masking_rules:
      email: hash_email
      nombre: fake_name
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_same_secret_rejected() {
        let mut config = valid_config();
        config.databases.target_secret = "PROD_DB_URL".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_same_environment_rejected() {
        let mut config = valid_config();
        config.databases.target_environment = "production".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.settings.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut config = valid_config();
        let dup = config.tables[0].clone();
        config.tables.push(dup);
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_missing_pk_rejected() {
        let mut config = valid_config();
        config.tables[0].pk = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unstable_pk_masking_rejected() {
        for rule in [
            MaskingRule::FakeName,
            MaskingRule::PreserveFormat,
            MaskingRule::Redact,
        ] {
            let mut config = valid_config();
            config.tables[0].masking_rules.insert("ID".into(), rule);
            let err = validate(&config).unwrap_err();
            assert!(matches!(err, SyncError::Config(_)));
            assert!(err.to_string().contains("primary key"), "{}", err);
        }
    }

    #[test]
    fn test_deterministic_pk_masking_allowed() {
        for rule in [MaskingRule::None, MaskingRule::HashEmail] {
            let mut config = valid_config();
            config.tables[0].masking_rules.insert("id".into(), rule);
            assert!(validate(&config).is_ok());
        }
    }

    #[test]
    fn test_sample_percent_bounds() {
        assert!(validate_sample_percent(100.0).is_ok());
        assert!(validate_sample_percent(0.5).is_ok());
        assert!(validate_sample_percent(0.0).is_err());
        assert!(validate_sample_percent(100.1).is_err());
        assert!(validate_sample_percent(f64::NAN).is_err());

        let mut config = valid_config();
        config.tables[0].sample_percent = 0.0;
        assert!(validate(&config).is_err());
    }
}
