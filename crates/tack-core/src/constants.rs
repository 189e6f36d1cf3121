//! Package-level constants.

/// Current version of the tack gateway (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "tack";

/// WebSocket close codes the gateway sends when it rejects a connection.
///
/// The 4xxx range is reserved for application use; 1013 is the registered
/// "try again later" code.
pub mod close {
    /// Missing or invalid authentication token.
    pub const UNAUTHENTICATED: u16 = 4001;

    /// The requested workspace does not exist.
    pub const WORKSPACE_NOT_FOUND: u16 = 4404;

    /// The authenticated user may not access the requested workspace.
    pub const ACCESS_DENIED: u16 = 4403;

    /// The registry is at the configured connection capacity.
    pub const TRY_AGAIN_LATER: u16 = 1013;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn name_is_lowercase() {
        assert_eq!(NAME, NAME.to_lowercase());
    }

    #[test]
    fn rejection_codes_are_application_range() {
        assert!(close::UNAUTHENTICATED >= 4000);
        assert!(close::WORKSPACE_NOT_FOUND >= 4000);
        assert!(close::ACCESS_DENIED >= 4000);
    }
}
