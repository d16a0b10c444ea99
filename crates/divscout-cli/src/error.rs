use thiserror::Error;

use divscout_core::{ConfigError, DiscoveryError, ValidationError, WarehouseError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Discovery(DiscoveryError::InvalidConfig(_)) => 2,
            Self::Discovery(_) => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
            Self::Warehouse(_) => 11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preconditions_and_config_use_distinct_exit_codes() {
        assert_eq!(CliError::from(DiscoveryError::MissingCredential).exit_code(), 3);
        assert_eq!(CliError::from(DiscoveryError::EmptyRegistry).exit_code(), 3);
        assert_eq!(
            CliError::from(DiscoveryError::InvalidConfig(ConfigError::invalid(
                "run.timeout_secs",
                "must be positive"
            )))
            .exit_code(),
            2
        );
        assert_eq!(
            CliError::from(WarehouseError::Rejected(String::from("bad symbol"))).exit_code(),
            11
        );
    }
}
