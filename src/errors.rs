use thiserror::Error;

/// Failure taxonomy for the observation-to-execution pipeline. Rendered
/// into the `error` column of executed trades, so the class of a failure
/// survives in storage. Duplicate observations are not errors; they read
/// as an idempotent no-op on insert.
///
/// Each variant maps to a documented terminal or degraded behavior:
/// - `Decode` degrades the observation (watcher) or skips the trade (executor).
/// - `Policy` is a terminal `skipped`, never retried.
/// - `Quote` is terminal `failed` on Solana; on EVM the planner degrades
///   min-out to zero instead and flags the lost slippage protection.
/// - `Submission` is terminal `failed` with the error text preserved verbatim.
/// - `Reconciliation` never downgrades a confirmed `success`; the record
///   keeps the estimate and notes why the realized fields are unresolved.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("decode failure: {0}")]
    Decode(String),

    #[error("policy rejection: {0}")]
    Policy(String),

    #[error("quote failure: {0}")]
    Quote(String),

    #[error("submission failure: {0}")]
    Submission(String),

    #[error("reconciliation failure: {0}")]
    Reconciliation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_names_the_failure_class() {
        assert_eq!(
            TradeError::Decode("bad input".into()).to_string(),
            "decode failure: bad input"
        );
        assert_eq!(
            TradeError::Policy("denied token".into()).to_string(),
            "policy rejection: denied token"
        );
        assert_eq!(
            TradeError::Quote("no route".into()).to_string(),
            "quote failure: no route"
        );
        assert_eq!(
            TradeError::Submission("nonce too low".into()).to_string(),
            "submission failure: nonce too low"
        );
        assert_eq!(
            TradeError::Reconciliation("receipt timeout".into()).to_string(),
            "reconciliation failure: receipt timeout"
        );
    }
}
