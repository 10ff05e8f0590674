//! Renderer license checks.

/// What the renderer reports about its license when a render starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseStatus {
    /// A license server or file was found.
    pub valid: bool,
    /// Renderer version the feature name is built from.
    pub version: String,
    /// The `RPS-<version>` feature is present.
    pub feature_found: bool,
    pub licenses_available: bool,
    /// Expiry date when the license has expired.
    pub expired: Option<String>,
}

impl LicenseStatus {
    /// A fully valid license for `version`.
    pub fn valid(version: &str) -> Self {
        Self {
            valid: true,
            version: version.to_string(),
            feature_found: true,
            licenses_available: true,
            expired: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LicenseError {
    #[error("Cannot find a valid RenderMan license. Aborting.")]
    NotFound,
    #[error("Cannot find RPS-{0} license feature. Aborting.")]
    MissingFeature(String),
    #[error("No PhotoRealistic-RenderMan licenses available. Aborting.")]
    NoneAvailable,
    #[error("PhotoRealistic-RenderMan licenses have expired ({0}).")]
    Expired(String),
}

/// Checks `status` in the order the renderer itself reports problems.
pub fn check_license(status: &LicenseStatus) -> Result<(), LicenseError> {
    if !status.valid {
        return Err(LicenseError::NotFound);
    }
    if !status.feature_found {
        return Err(LicenseError::MissingFeature(status.version.clone()));
    }
    if !status.licenses_available {
        return Err(LicenseError::NoneAvailable);
    }
    if let Some(date) = &status.expired {
        return Err(LicenseError::Expired(date.clone()));
    }
    Ok(())
}
