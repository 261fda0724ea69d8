use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] bawiki_core::ConfigError),

    #[error(transparent)]
    Fetch(#[from] bawiki_core::FetchError),

    #[error(transparent)]
    Alias(#[from] bawiki_core::AliasError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Command(_) => 2,
            Self::Fetch(_) => 3,
            Self::Serialization(_) => 4,
            Self::Alias(_) => 5,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failures_have_their_own_exit_code() {
        let error = CliError::from(bawiki_core::FetchError::Shutdown);

        assert_eq!(error.exit_code(), 3);
        assert_eq!(CliError::Command(String::from("x")).exit_code(), 2);
    }
}
