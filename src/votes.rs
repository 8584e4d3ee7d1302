//! Vote Aggregator
//!
//! Sums faction votes across the whole arena corpus and turns them into
//! the integer percentage split shown on the faction bar and fed back
//! into generation as persona bias. Always recomputed from storage; the
//! corpus is small enough that caching would only add staleness.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Which side a vote lands on. Strict two-value parse; unlike speaker
/// normalization there is no fallback bucket here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteSide {
    Gto,
    Exploit,
}

impl VoteSide {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "gto" => Ok(VoteSide::Gto),
            "exploit" => Ok(VoteSide::Exploit),
            other => Err(anyhow!("Invalid vote side: {:?}", other)),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            VoteSide::Gto => "votes_gto",
            VoteSide::Exploit => "votes_exploit",
        }
    }
}

/// Corpus-wide vote sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VoteTotals {
    pub gto: i64,
    pub exploit: i64,
}

/// Integer percentage split. Sums to exactly 100 by construction: the
/// GTO share is rounded, the exploit share is its complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteShare {
    pub gto_percentage: i64,
    pub exploit_percentage: i64,
}

impl VoteTotals {
    /// Sum (gto, exploit) pairs across all stored debates.
    pub fn tally<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        let mut totals = VoteTotals::default();
        for (gto, exploit) in rows {
            totals.gto += gto.max(0);
            totals.exploit += exploit.max(0);
        }
        totals
    }

    /// Percentage split, 50/50 when nobody has voted yet.
    pub fn share(&self) -> VoteShare {
        let grand_total = self.gto + self.exploit;
        if grand_total == 0 {
            return VoteShare {
                gto_percentage: 50,
                exploit_percentage: 50,
            };
        }
        let gto = ((self.gto as f64 / grand_total as f64) * 100.0).round() as i64;
        VoteShare {
            gto_percentage: gto,
            exploit_percentage: 100 - gto,
        }
    }
}
