//! Domain error types.

/// Top-level error type for daytrader.
#[derive(Debug, thiserror::Error)]
pub enum DaytraderError {
    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("market data error for {code}: {reason}")]
    Market { code: String, reason: String },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error("forecast error for {code}: {reason}")]
    Forecast { code: String, reason: String },

    #[error("insufficient data for {code}: have {bars} bars, need {minimum}")]
    InsufficientData {
        code: String,
        bars: usize,
        minimum: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&DaytraderError> for std::process::ExitCode {
    fn from(err: &DaytraderError) -> Self {
        let code: u8 = match err {
            DaytraderError::Io(_) => 1,
            DaytraderError::ConfigParse { .. } | DaytraderError::ConfigInvalid { .. } => 2,
            DaytraderError::Storage { .. } => 3,
            DaytraderError::Market { .. }
            | DaytraderError::Broker { .. }
            | DaytraderError::Forecast { .. } => 4,
            DaytraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = DaytraderError::InsufficientData {
            code: "005930".into(),
            bars: 10,
            minimum: 35,
        };
        let msg = err.to_string();
        assert!(msg.contains("005930"));
        assert!(msg.contains("10"));
        assert!(msg.contains("35"));
    }

    #[test]
    fn io_errors_convert() {
        let err: DaytraderError = std::io::Error::other("disk full").into();
        assert!(matches!(err, DaytraderError::Io(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
