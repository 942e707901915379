//! Configuration and environment selection.
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// ZATCA environment a certificate was issued for.
/// - NonProduction: what ZATCA calls the "Integration Sandbox".
/// - Simulation: the "Simulation Test Environment".
/// - Production: the live environment.
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use fatoora_sign::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("simulation")?;
/// assert_eq!(env, EnvironmentType::Simulation);
/// # Ok::<(), fatoora_sign::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentType {
    NonProduction,
    Simulation,
    Production,
}

/// Error returned when parsing an [`EnvironmentType`] or
/// [`CertificateClass`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment type: {input}")]
    Invalid { input: String },
    #[error("invalid certificate class: {input}")]
    InvalidClass { input: String },
}

impl FromStr for EnvironmentType {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<EnvironmentType, EnvironmentParseError> {
        match env.to_ascii_lowercase().as_str() {
            "non_production" | "sandbox" => Ok(EnvironmentType::NonProduction),
            "simulation" => Ok(EnvironmentType::Simulation),
            "production" => Ok(EnvironmentType::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::NonProduction => "non_production",
            EnvironmentType::Simulation => "simulation",
            EnvironmentType::Production => "production",
        }
    }
}

/// Which certificate of an environment signs: the compliance (onboarding)
/// CSID or the production CSID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateClass {
    Onboarding,
    Production,
}

impl FromStr for CertificateClass {
    type Err = EnvironmentParseError;
    fn from_str(class: &str) -> Result<Self, Self::Err> {
        match class.to_ascii_lowercase().as_str() {
            "onboarding" | "compliance" => Ok(CertificateClass::Onboarding),
            "production" => Ok(CertificateClass::Production),
            _ => Err(EnvironmentParseError::InvalidClass {
                input: class.to_string(),
            }),
        }
    }
}

impl CertificateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateClass::Onboarding => "onboarding",
            CertificateClass::Production => "production",
        }
    }
}

/// Where the XAdES signing time comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningTimeSource {
    /// The invoice issue date and time; output is reproducible.
    #[default]
    IssueDateTime,
    /// Wall clock at signing.
    Now,
}

/// Signing pipeline settings.
///
/// # Examples
/// ```rust
/// use fatoora_sign::config::{CertificateClass, Config, EnvironmentType};
///
/// let config = Config::new(EnvironmentType::Simulation)
///     .with_certificate_class(CertificateClass::Production)
///     .with_indent_size(2);
/// assert_eq!(config.indent_size(), 2);
/// assert_eq!(config.max_qr_length(), 700);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    env: EnvironmentType,
    certificate_class: CertificateClass,
    indent_size: usize,
    max_qr_length: usize,
    signing_time_source: SigningTimeSource,
}

impl Config {
    pub fn new(env: EnvironmentType) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }

    pub fn with_certificate_class(mut self, class: CertificateClass) -> Self {
        self.certificate_class = class;
        self
    }

    pub fn with_indent_size(mut self, indent_size: usize) -> Self {
        self.indent_size = indent_size;
        self
    }

    pub fn with_max_qr_length(mut self, max_qr_length: usize) -> Self {
        self.max_qr_length = max_qr_length;
        self
    }

    pub fn with_signing_time_source(mut self, source: SigningTimeSource) -> Self {
        self.signing_time_source = source;
        self
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn certificate_class(&self) -> CertificateClass {
        self.certificate_class
    }

    pub fn indent_size(&self) -> usize {
        self.indent_size
    }

    pub fn max_qr_length(&self) -> usize {
        self.max_qr_length
    }

    pub fn signing_time_source(&self) -> SigningTimeSource {
        self.signing_time_source
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            env: EnvironmentType::NonProduction,
            certificate_class: CertificateClass::Onboarding,
            indent_size: 4,
            max_qr_length: 700,
            signing_time_source: SigningTimeSource::IssueDateTime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_accepts_aliases() {
        assert_eq!(
            EnvironmentType::from_str("SANDBOX").unwrap(),
            EnvironmentType::NonProduction
        );
        assert_eq!(
            CertificateClass::from_str("compliance").unwrap(),
            CertificateClass::Onboarding
        );
        assert!(matches!(
            EnvironmentType::from_str("staging"),
            Err(EnvironmentParseError::Invalid { .. })
        ));
        assert!(matches!(
            CertificateClass::from_str("nope"),
            Err(EnvironmentParseError::InvalidClass { .. })
        ));
    }

    #[test]
    fn as_str_round_trips() {
        for env in [
            EnvironmentType::NonProduction,
            EnvironmentType::Simulation,
            EnvironmentType::Production,
        ] {
            assert_eq!(EnvironmentType::from_str(env.as_str()).unwrap(), env);
        }
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"env":"production","signing_time_source":"now"}"#).unwrap();
        assert_eq!(config.env(), EnvironmentType::Production);
        assert_eq!(config.certificate_class(), CertificateClass::Onboarding);
        assert_eq!(config.indent_size(), 4);
        assert_eq!(config.max_qr_length(), 700);
        assert_eq!(config.signing_time_source(), SigningTimeSource::Now);
    }
}
