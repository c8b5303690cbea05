#[cfg(test)]
mod tests {
    #[test]
    fn test_password_validation() {
        use crate::utils::validate_password;

        assert!(validate_password("SecurePass123!").is_ok());
        assert!(validate_password("Complex@Pass2024").is_ok());

        assert!(validate_password("short").is_err());
        assert!(validate_password("nouppercase123!").is_err());
        assert!(validate_password("NOLOWERCASE123!").is_err());
        assert!(validate_password("NoNumbers!").is_err());
        assert!(validate_password("NoSpecialChars123").is_err());
    }

    #[test]
    fn test_cve_id_validation() {
        use crate::utils::is_valid_cve_id;

        assert!(is_valid_cve_id("CVE-2024-12345"));
        assert!(is_valid_cve_id("cve-2021-0001"));
        assert!(!is_valid_cve_id("CVE-24-1"));
    }

    #[test]
    fn test_severity_ordering() {
        use crate::types::Severity;

        assert!(Severity::Critical < Severity::High);
        assert!(Severity::High < Severity::Medium);
    }

    #[test]
    fn test_cve_canonical_id() {
        use crate::types::Cve;

        assert_eq!(Cve::canonical_id("cve-2024-0001"), "CVE-2024-0001");
    }
}
