//! Business configuration consumed by the aggregate.

use quoting_domain::Currency;

/// Default upper bound on processed items in a bulk quote
pub const DEFAULT_MAX_BULK_QUOTES: usize = 1000;

/// Policy knobs for the aggregate, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    /// Skip participant and scheme validation, trusting upstream checks
    pub pass_through_mode: bool,
    /// Currencies accepted by the scheme
    pub supported_currencies: Vec<Currency>,
    /// Maximum processed items in one bulk quote
    pub max_bulk_quotes: usize,
}

impl AggregateConfig {
    /// Parse currency codes, rejecting malformed ones
    pub fn currencies(codes: &[&str]) -> Result<Vec<Currency>, quoting_domain::DomainError> {
        codes.iter().map(|code| Currency::new(*code)).collect()
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            pass_through_mode: false,
            supported_currencies: ["USD", "EUR"]
                .into_iter()
                .filter_map(|code| Currency::new(code).ok())
                .collect(),
            max_bulk_quotes: DEFAULT_MAX_BULK_QUOTES,
        }
    }
}
