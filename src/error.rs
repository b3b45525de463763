//! Error taxonomy for the acquisition pipeline.
//!
//! One variant per failure class. Attempt-level errors are caught and
//! classified inside the executor; they become telemetry entries and
//! proxy-deadening signals, never panics.

use thiserror::Error;

/// Every way an acquisition (or one of its collaborators) can fail.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Missing or malformed query/identifier from the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Rejected by the request-level rate limiter.
    #[error("rate limited")]
    RateLimited,

    /// A challenge was detected but no solver credential is configured.
    #[error("captcha detected but no solver credential is configured")]
    NoSolverCredential,

    /// No reCAPTCHA site key could be found on the page or its frames.
    #[error("no site key found on blocked page")]
    NoSiteKey,

    /// The solver provider rejected task creation.
    #[error("solver task creation failed: {0}")]
    SolverCreateError(String),

    /// The solver did not produce a solution within the polling budget.
    #[error("solver timed out waiting for a solution")]
    SolverTimeout,

    /// The solver reported an error while the task was in flight.
    #[error("solver reported an error: {0}")]
    SolverResultError(String),

    /// The page still shows blocking markers after resolution.
    #[error("page still blocked: {0}")]
    Blocked(String),

    /// Credentials embedded in a proxy origin could not be parsed.
    /// Non-fatal: logged, and the attempt proceeds unauthenticated.
    #[error("could not parse proxy credentials from {0}")]
    ProxyAuthParseError(String),

    /// Browser navigation, script evaluation, or capture failed.
    #[error("browser driver error: {0}")]
    DriverError(String),

    /// An external lookup service (DNI/RUC) failed.
    #[error("upstream lookup failed: {0}")]
    UpstreamError(String),

    /// Every retry attempt failed; the fallback document takes over.
    #[error("all {attempts} acquisition attempts exhausted")]
    TotalExhaustion { attempts: u32 },
}

impl AcquireError {
    /// Stable classification string recorded in telemetry.
    pub fn classification(&self) -> &'static str {
        match self {
            AcquireError::InvalidInput(_) => "InvalidInput",
            AcquireError::RateLimited => "RateLimited",
            AcquireError::NoSolverCredential => "NoSolverCredential",
            AcquireError::NoSiteKey => "NoSiteKey",
            AcquireError::SolverCreateError(_) => "SolverCreateError",
            AcquireError::SolverTimeout => "SolverTimeout",
            AcquireError::SolverResultError(_) => "SolverResultError",
            AcquireError::Blocked(_) => "Blocked",
            AcquireError::ProxyAuthParseError(_) => "ProxyAuthParseError",
            AcquireError::DriverError(_) => "DriverError",
            AcquireError::UpstreamError(_) => "UpstreamError",
            AcquireError::TotalExhaustion { .. } => "TotalExhaustion",
        }
    }
}

pub type AcquireResult<T> = Result<T, AcquireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_stable() {
        assert_eq!(
            AcquireError::NoSolverCredential.classification(),
            "NoSolverCredential"
        );
        assert_eq!(
            AcquireError::Blocked("markers present".into()).classification(),
            "Blocked"
        );
        assert_eq!(
            AcquireError::TotalExhaustion { attempts: 3 }.classification(),
            "TotalExhaustion"
        );
    }

    #[test]
    fn display_carries_context() {
        let e = AcquireError::SolverCreateError("ERROR_ZERO_BALANCE".into());
        assert!(e.to_string().contains("ERROR_ZERO_BALANCE"));
    }
}
