//! Custom validation functions for configuration.

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

static HOSTNAME: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
});

/// Accepts IPv4/IPv6 literals and DNS host names.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return Ok(());
    }
    let re = HOSTNAME
        .as_ref()
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if host.len() <= 253 && re.is_match(host) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_host"))
    }
}

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Templates may only reference the known `$` variables.
pub fn validate_template(template: &str) -> Result<(), ValidationError> {
    const VARIABLES: [&str; 4] = ["$clientname", "$adminname", "$reason", "$banduration"];
    let mut rest = template;
    while let Some(idx) = rest.find('$') {
        let tail = &rest[idx..];
        match VARIABLES.iter().find(|v| tail.starts_with(*v)) {
            Some(var) => rest = &tail[var.len()..],
            None => return Err(ValidationError::new("unknown_template_variable")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts() {
        assert!(validate_host("127.0.0.1").is_ok());
        assert!(validate_host("::1").is_ok());
        assert!(validate_host("bf3.example.org").is_ok());
        assert!(validate_host("bad host").is_err());
        assert!(validate_host("").is_err());
    }

    #[test]
    fn test_templates() {
        assert!(validate_template("$clientname was kicked by $adminname $reason").is_ok());
        assert!(validate_template("no variables").is_ok());
        assert!(validate_template("$nope").is_err());
    }
}
