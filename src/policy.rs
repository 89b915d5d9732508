use std::collections::HashSet;

use crate::models::FollowedWallet;

/// Global risk defaults, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct RiskDefaults {
    /// Fraction of the observed input amount committed when mirroring.
    pub copy_ratio: f64,
    /// Slippage tolerance in basis points.
    pub slippage_bps: u32,
    /// Absolute cap on native-asset input, smallest units. None = no cap.
    pub max_native_in: Option<u128>,
    pub allowed_tokens: Vec<String>,
    pub denied_tokens: Vec<String>,
}

impl Default for RiskDefaults {
    fn default() -> Self {
        Self {
            copy_ratio: 1.0,
            slippage_bps: 300,
            max_native_in: None,
            allowed_tokens: Vec::new(),
            denied_tokens: Vec::new(),
        }
    }
}

/// Fully resolved per-wallet policy. Every field is concrete: either the
/// wallet's override or the global default.
#[derive(Debug, Clone)]
pub struct RiskPolicy {
    pub copy_ratio: f64,
    pub slippage_bps: u32,
    pub max_native_in: Option<u128>,
    pub allowed_tokens: HashSet<String>,
    pub denied_tokens: HashSet<String>,
}

/// Merge per-wallet overrides over the global defaults, field by field.
/// Total: absent overrides always fall back to the default.
pub fn resolve(defaults: &RiskDefaults, wallet: Option<&FollowedWallet>) -> RiskPolicy {
    let copy_ratio = wallet
        .and_then(|w| w.copy_ratio)
        .unwrap_or(defaults.copy_ratio)
        .max(0.0);
    let slippage_bps = wallet
        .and_then(|w| w.slippage_bps)
        .map(|b| b.max(0) as u32)
        .unwrap_or(defaults.slippage_bps);
    let max_native_in = wallet
        .and_then(|w| w.max_native_in.as_deref())
        .and_then(|s| s.parse::<u128>().ok())
        .or(defaults.max_native_in)
        .filter(|cap| *cap > 0);

    let allowed: Vec<String> = wallet
        .and_then(|w| w.allowed_tokens.clone())
        .unwrap_or_else(|| defaults.allowed_tokens.clone());
    let denied: Vec<String> = wallet
        .and_then(|w| w.denied_tokens.clone())
        .unwrap_or_else(|| defaults.denied_tokens.clone());

    RiskPolicy {
        copy_ratio,
        slippage_bps,
        max_native_in,
        allowed_tokens: allowed.into_iter().map(|t| t.to_lowercase()).collect(),
        denied_tokens: denied.into_iter().map(|t| t.to_lowercase()).collect(),
    }
}

impl RiskPolicy {
    /// Token policy for the whole swap: reject if any token is denied, or if
    /// a non-empty allow list does not contain every token involved.
    pub fn tokens_allowed<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        let toks: Vec<String> = tokens
            .iter()
            .map(|t| t.as_ref().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if toks.iter().any(|t| self.denied_tokens.contains(t)) {
            return false;
        }
        if !self.allowed_tokens.is_empty() && !toks.iter().all(|t| self.allowed_tokens.contains(t))
        {
            return false;
        }
        true
    }
}
