//! Prize classifier: (ticket, draw) → tier or no win.

use crate::types::{DrawRecord, Ticket, Tier, BACK_COUNT, FRONT_COUNT};

/// Front/back match counts for one ticket against one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchCount {
    pub front: u8,
    pub back: u8,
}

impl MatchCount {
    pub const fn new(front: u8, back: u8) -> Self {
        Self { front, back }
    }
}

/// Count how many ticket numbers appear in the draw, per zone.
pub fn match_counts(ticket: &Ticket, draw: &DrawRecord) -> MatchCount {
    let hits = |mine: &[u8], drawn: &[u8]| mine.iter().filter(|n| drawn.contains(n)).count() as u8;
    MatchCount {
        front: hits(ticket.front(), draw.front()),
        back: hits(ticket.back(), draw.back()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrizeTableError {
    #[error("match pattern {front}+{back} is impossible")]
    ImpossiblePattern { front: u8, back: u8 },

    #[error("match pattern {front}+{back} is assigned to more than one tier")]
    AmbiguousPattern { front: u8, back: u8 },

    #[error("tier {0} listed more than once")]
    DuplicateTier(Tier),
}

/// Maps match patterns to tiers.
///
/// Each tier owns one or more (front, back) patterns. Patterns are
/// disjoint across tiers, so lookup order never matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeTable {
    rules: Vec<(Tier, Vec<MatchCount>)>,
}

impl PrizeTable {
    pub fn new(rules: Vec<(Tier, Vec<MatchCount>)>) -> Result<Self, PrizeTableError> {
        let mut seen_tiers = Vec::with_capacity(rules.len());
        let mut seen_patterns: Vec<MatchCount> = Vec::new();

        for (tier, patterns) in &rules {
            if seen_tiers.contains(tier) {
                return Err(PrizeTableError::DuplicateTier(*tier));
            }
            seen_tiers.push(*tier);

            for p in patterns {
                if p.front as usize > FRONT_COUNT || p.back as usize > BACK_COUNT {
                    return Err(PrizeTableError::ImpossiblePattern { front: p.front, back: p.back });
                }
                if seen_patterns.contains(p) {
                    return Err(PrizeTableError::AmbiguousPattern { front: p.front, back: p.back });
                }
                seen_patterns.push(*p);
            }
        }

        let mut rules = rules;
        rules.sort_by_key(|(tier, _)| *tier);
        Ok(Self { rules })
    }

    /// The current nine-tier table.
    pub fn standard() -> Self {
        let m = MatchCount::new;
        let t = |n: usize| Tier::ALL[n - 1];
        Self {
            rules: vec![
                (t(1), vec![m(5, 2)]),
                (t(2), vec![m(5, 1)]),
                (t(3), vec![m(5, 0)]),
                (t(4), vec![m(4, 2)]),
                (t(5), vec![m(4, 1)]),
                (t(6), vec![m(3, 2)]),
                (t(7), vec![m(4, 0)]),
                (t(8), vec![m(3, 1), m(2, 2)]),
                (t(9), vec![m(3, 0), m(2, 1), m(1, 2), m(0, 2)]),
            ],
        }
    }

    pub fn tier_for(&self, counts: MatchCount) -> Option<Tier> {
        self.rules
            .iter()
            .find(|(_, patterns)| patterns.contains(&counts))
            .map(|(tier, _)| *tier)
    }

    pub fn classify(&self, ticket: &Ticket, draw: &DrawRecord) -> Option<Tier> {
        self.tier_for(match_counts(ticket, draw))
    }

    /// Human-readable winning condition, e.g. `"3+1 / 2+2"`.
    /// Empty for a tier the table does not award.
    pub fn condition_label(&self, tier: Tier) -> String {
        self.rules
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, patterns)| {
                patterns
                    .iter()
                    .map(|p| format!("{}+{}", p.front, p.back))
                    .collect::<Vec<_>>()
                    .join(" / ")
            })
            .unwrap_or_default()
    }
}

impl Default for PrizeTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Classify against the standard table.
pub fn classify(ticket: &Ticket, draw: &DrawRecord) -> Option<Tier> {
    PrizeTable::standard().classify(ticket, draw)
}
