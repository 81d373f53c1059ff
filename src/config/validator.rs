//! Config validation: resource naming rules for group, version, namespace and service account.

use crate::config::BaseConfig;
use crate::error::ConfigError;

const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

/// RFC 1123 label: lowercase alphanumerics and '-', starting and ending alphanumeric.
pub fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(&bytes[0])
        && alnum(&bytes[bytes.len() - 1])
        && bytes.iter().all(|b| alnum(b) || *b == b'-')
}

/// RFC 1123 subdomain: dot-separated labels, at most 253 characters.
pub fn is_dns_subdomain(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_SUBDOMAIN_LEN && s.split('.').all(is_dns_label)
}

/// API version names: v1, v2beta1, v1alpha2...
pub fn is_version_name(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('v') else {
        return false;
    };
    let major_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if major_len == 0 || rest.starts_with('0') {
        return false;
    }
    let suffix = &rest[major_len..];
    if suffix.is_empty() {
        return true;
    }
    let Some(level) = suffix.strip_prefix("alpha").or_else(|| suffix.strip_prefix("beta")) else {
        return false;
    };
    !level.is_empty() && !level.starts_with('0') && level.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate(config: &BaseConfig) -> Result<(), ConfigError> {
    let gv = &config.group_version;
    if !is_dns_subdomain(&gv.group) || !gv.group.contains('.') {
        return Err(ConfigError::Validation(format!(
            "group '{}' must be a dotted DNS subdomain",
            gv.group
        )));
    }
    if !is_version_name(&gv.version) {
        return Err(ConfigError::Validation(format!(
            "version '{}' must look like v1, v1beta1 or v2alpha1",
            gv.version
        )));
    }
    if !is_dns_label(&config.namespace) {
        return Err(ConfigError::Validation(format!(
            "namespace '{}' must be a DNS label",
            config.namespace
        )));
    }
    if !is_dns_label(&config.service_account) {
        return Err(ConfigError::Validation(format!(
            "service account '{}' must be a DNS label",
            config.service_account
        )));
    }
    if config.poll_interval.is_zero() {
        return Err(ConfigError::Validation("poll interval must be positive".into()));
    }
    if config.max_wait < config.poll_interval {
        return Err(ConfigError::Validation(format!(
            "max wait {:?} is shorter than poll interval {:?}",
            config.max_wait, config.poll_interval
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupVersion;
    use std::time::Duration;

    fn config() -> BaseConfig {
        BaseConfig::new(GroupVersion::new("test.crdbase.io", "v1"), "crdb-test", "crdb-test")
    }

    #[test]
    fn dns_label_rules() {
        assert!(is_dns_label("u1"));
        assert!(is_dns_label("count-type"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label("-a"));
        assert!(!is_dns_label("a-"));
        assert!(!is_dns_label("Upper"));
        assert!(!is_dns_label("a.b"));
        assert!(!is_dns_label(&"a".repeat(64)));
        assert!(is_dns_subdomain("counts.test.crdbase.io"));
        assert!(!is_dns_subdomain("counts..io"));
    }

    #[test]
    fn version_names() {
        for ok in ["v1", "v2", "v1beta1", "v10alpha3"] {
            assert!(is_version_name(ok), "{}", ok);
        }
        for bad in ["", "1", "v", "v0", "v01", "v1gamma1", "v1beta", "v1beta0"] {
            assert!(!is_version_name(bad), "{}", bad);
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&config()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut c = config();
        c.group_version.group = "nodots".into();
        assert!(validate(&c).is_err());

        let mut c = config();
        c.namespace = "Bad_NS".into();
        assert!(validate(&c).is_err());

        let mut c = config();
        c.service_account = "system.controller".into();
        assert!(matches!(validate(&c), Err(ConfigError::Validation(m)) if m.contains("service account")));

        let c = config().with_readiness(Duration::from_secs(5), Duration::from_secs(1));
        assert!(validate(&c).is_err());

        let c = config().with_readiness(Duration::ZERO, Duration::from_secs(1));
        assert!(validate(&c).is_err());
    }
}
