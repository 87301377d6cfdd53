use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::position::{Position, RawPosition};

/// The complete holdings of an account as of one successful fetch.
///
/// Immutable once built. A refresh produces a new snapshot which replaces the
/// previous one as a whole, so readers never see a mix of two fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingsSnapshot {
    positions: Vec<Position>,
    fetched_at: DateTime<Utc>,
}

impl HoldingsSnapshot {
    /// Build a snapshot, keeping the broker's ordering.
    /// Symbols are unique: a repeated symbol keeps its first occurrence.
    pub fn new(positions: Vec<Position>, fetched_at: DateTime<Utc>) -> Self {
        let mut seen = HashSet::new();
        let positions = positions
            .into_iter()
            .filter(|p| {
                let fresh = seen.insert(p.instrument.symbol.clone());
                if !fresh {
                    tracing::warn!(symbol = %p.instrument.symbol, "Dropping duplicate position");
                }
                fresh
            })
            .collect();
        Self {
            positions,
            fetched_at,
        }
    }

    /// Normalize a raw positions response into a snapshot.
    pub fn from_raw(
        raw: Vec<RawPosition>,
        account_currency: &str,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let positions = raw
            .into_iter()
            .map(|p| Position::from_raw(p, account_currency))
            .collect();
        Self::new(positions, fetched_at)
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Find the position for a trading symbol (exact match).
    pub fn lookup(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.instrument.symbol == symbol)
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.positions.iter().map(|p| p.symbol()).collect()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
