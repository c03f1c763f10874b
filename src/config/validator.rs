use crate::config::Config;
use crate::consequences::ConsequenceKind;
use crate::error::{AbuseFilterError, Result, ValidationError};
use crate::expiry::Expiry;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_wiki(config, &mut errors);
        Self::validate_consequences(config, &mut errors);
        Self::validate_durations(config, &mut errors);
        Self::validate_range_block(config, &mut errors);
        Self::validate_throttle(config, &mut errors);
        Self::validate_misc(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AbuseFilterError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_wiki(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.wiki.wiki_id.trim().is_empty() {
            errors.push(ValidationError::new(
                "wiki.wiki_id",
                "Wiki id cannot be empty",
            ));
        }
    }

    fn validate_consequences(config: &Config, errors: &mut Vec<ValidationError>) {
        let section = &config.consequences;

        for name in section.enabled.keys() {
            if ConsequenceKind::from_name(name).is_none() {
                errors.push(ValidationError::new(
                    "consequences.enabled",
                    format!("Unknown consequence '{}'", name),
                ));
            }
        }

        let lists = [
            ("consequences.dangerous", &section.dangerous),
            (
                "consequences.locally_disabled_global_actions",
                &section.locally_disabled_global_actions,
            ),
            (
                "consequences.throttled_safe_actions",
                &section.throttled_safe_actions,
            ),
        ];
        for (path, names) in lists {
            for name in names.iter() {
                if ConsequenceKind::from_name(name).is_none() {
                    errors.push(ValidationError::new(
                        path,
                        format!("Unknown consequence '{}'", name),
                    ));
                }
            }
        }

        // A throttled filter must not be able to do anything dangerous
        for name in &section.throttled_safe_actions {
            if section.dangerous.contains(name) {
                errors.push(ValidationError::new(
                    "consequences.throttled_safe_actions",
                    format!("'{}' is dangerous and cannot be a safe action", name),
                ));
            }
        }
    }

    fn validate_durations(config: &Config, errors: &mut Vec<ValidationError>) {
        let now = chrono::Utc::now();
        let durations = [
            ("block.anon_duration", &config.block.anon_duration),
            ("block.user_duration", &config.block.user_duration),
            ("range_block.duration", &config.range_block.duration),
        ];
        for (path, value) in durations {
            if let Err(e) = Expiry::parse(value, now) {
                errors.push(ValidationError::new(path, e.to_string()));
            }
        }

        if config.autopromote.block_days == 0 {
            errors.push(ValidationError::new(
                "autopromote.block_days",
                "Autopromote block must last at least one day",
            ));
        }
    }

    fn validate_range_block(config: &Config, errors: &mut Vec<ValidationError>) {
        let rb = &config.range_block;
        Self::check_prefix("range_block.ipv4_prefix", rb.ipv4_prefix, 32, errors);
        Self::check_prefix("range_block.ipv6_prefix", rb.ipv6_prefix, 128, errors);
        Self::check_prefix("range_block.core_ipv4_limit", rb.core_ipv4_limit, 32, errors);
        Self::check_prefix("range_block.core_ipv6_limit", rb.core_ipv6_limit, 128, errors);
    }

    fn validate_throttle(config: &Config, errors: &mut Vec<ValidationError>) {
        let t = &config.throttle;
        Self::check_prefix("throttle.range_ipv4_prefix", t.range_ipv4_prefix, 32, errors);
        Self::check_prefix("throttle.range_ipv6_prefix", t.range_ipv6_prefix, 128, errors);
    }

    fn validate_misc(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.filter_user.name.trim().is_empty() {
            errors.push(ValidationError::new(
                "filter_user.name",
                "Filter user name cannot be empty",
            ));
        }

        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn check_prefix(path: &str, prefix: u8, max: u8, errors: &mut Vec<ValidationError>) {
        if prefix == 0 || prefix > max {
            errors.push(ValidationError::new(
                path,
                format!("Prefix length must be between 1 and {}, got {}", max, prefix),
            ));
        }
    }
}
