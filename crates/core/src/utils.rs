use once_cell::sync::Lazy;
use regex::Regex;

static CVE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)cve-\d{4}-\d{4,}$").expect("static CVE id pattern is valid")
});

/// Matches the canonical `CVE-YYYY-NNNN` shape, case-insensitively, anchored
/// on both ends per the read-path matching rule in the data model.
pub fn is_valid_cve_id(candidate: &str) -> bool {
    CVE_ID_RE.is_match(candidate.trim())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_numeric()) {
        return Err("Password must contain at least one number".to_string());
    }

    if !password.chars().any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c)) {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_cve_id_case_insensitively() {
        assert!(is_valid_cve_id("CVE-2024-12345"));
        assert!(is_valid_cve_id("cve-2024-12345"));
        assert!(!is_valid_cve_id("CVE-24-1"));
        assert!(!is_valid_cve_id("not-a-cve"));
    }
}
