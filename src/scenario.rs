//! Scenario Generator
//!
//! Draws randomized poker situations for the arena. The distributions are
//! deliberately lumpy: stacks cluster around table-standard depths, pots
//! cluster by preflop action tier, and hero hands are drawn from realistic
//! range buckets instead of uniform noise.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GameType {
    Cash,
    #[serde(rename = "MTT")]
    Mtt,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Cash => "Cash",
            GameType::Mtt => "MTT",
        }
    }
}

/// How long a debate is allowed to drag on. Drives both the prompt's
/// length instruction and the turn budget drawn at creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DurationMode {
    Short,
    #[default]
    Medium,
    Long,
}

/// A poker situation, immutable once generated. Stored verbatim inside
/// the debate row, so optional fields stay optional at read time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Scenario {
    pub game_type: Option<GameType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<u8>,
    pub stack_depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pot_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pot_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero_hand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub villain_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_mode: Option<DurationMode>,
}

impl Scenario {
    pub fn duration_mode(&self) -> DurationMode {
        self.duration_mode.unwrap_or_default()
    }

    /// Stack-to-pot ratio, formatted for prompts. "Unknown" when the pot
    /// is zero or either side is missing.
    pub fn spr(&self) -> String {
        match (self.stack_depth, self.pot_size) {
            (Some(stack), Some(pot)) if pot > 0 => {
                format!("{:.2}", stack as f64 / pot as f64)
            }
            _ => "Unknown".to_string(),
        }
    }
}

const PREMIUM_HANDS: &[&str] = &[
    "AA", "KK", "QQ", "JJ", "TT", "AKs", "AQs", "AJs", "KQs", "AKo", "AQo",
];

const PLAYABLE_HANDS: &[&str] = &[
    "99", "88", "77", "66", "55", "44", "33", "22", "ATs", "KJs", "KTs", "QJs", "QTs", "JTs",
    "AJo", "KQo", "KJo", "QJo",
];

const SPECULATIVE_HANDS: &[&str] = &[
    "T9s", "98s", "87s", "76s", "65s", "54s", "A9s", "A8s", "A7s", "A5s", "A4s", "A3s", "A2s",
    "K9s", "Q9s", "J9s",
];

const RANKS: &[&str] = &["A", "K", "Q", "J", "T", "9", "8", "7", "6", "5", "4", "3", "2"];

const BASE_CONTEXTS: &[&str] = &[
    "Opponent is a Calling Station",
    "Opponent is a Maniac (Aggro)",
    "Villain is a Nit (Tight)",
    "Hero has a tight image",
    "Dynamic Board Texture",
    "Villain just lost a huge pot (Tilt?)",
    "Standard Reg vs Reg",
];

const MTT_CONTEXTS: &[&str] = &[
    "Bubble Period (ICM pressure extreme)",
    "Final Table (Huge Payjump)",
    "Bounty Tournament (KO incentive)",
];

/// Weighted hero hand draw: 30% premium, 40% playable, 20% speculative,
/// 10% any two cards.
fn realistic_hand<R: Rng + ?Sized>(rng: &mut R) -> String {
    let roll: f64 = rng.random();
    if roll < 0.30 {
        return PREMIUM_HANDS.choose(rng).unwrap_or(&"AA").to_string();
    }
    if roll < 0.70 {
        return PLAYABLE_HANDS.choose(rng).unwrap_or(&"99").to_string();
    }
    if roll < 0.90 {
        return SPECULATIVE_HANDS.choose(rng).unwrap_or(&"T9s").to_string();
    }

    let r1 = RANKS.choose(rng).unwrap_or(&"A");
    let r2 = RANKS.choose(rng).unwrap_or(&"K");
    if r1 == r2 {
        return format!("{}{}", r1, r1);
    }
    let suited = if rng.random_bool(0.5) { "s" } else { "o" };
    format!("{}{}{}", r1, r2, suited)
}

fn stack_depth<R: Rng + ?Sized>(rng: &mut R, game_type: GameType) -> u32 {
    match game_type {
        GameType::Cash => {
            let roll: f64 = rng.random();
            if roll < 0.6 {
                100
            } else if roll < 0.8 {
                rng.random_range(150..=300)
            } else {
                rng.random_range(40..=90)
            }
        }
        GameType::Mtt => {
            let roll: f64 = rng.random();
            if roll < 0.3 {
                rng.random_range(5..=15)
            } else if roll < 0.7 {
                rng.random_range(20..=40)
            } else {
                rng.random_range(41..=80)
            }
        }
    }
}

/// Draw a fresh arena scenario.
pub fn generate() -> Scenario {
    let mut rng = rand::rng();
    generate_with(&mut rng)
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Scenario {
    let game_type = if rng.random_bool(0.5) {
        GameType::Cash
    } else {
        GameType::Mtt
    };

    let stack = stack_depth(rng, game_type);

    let pot_roll: f64 = rng.random();
    let (mut pot_type, mut pot_size) = if pot_roll < 0.65 {
        ("Single Raised Pot (SRP)".to_string(), rng.random_range(5..=8))
    } else if pot_roll < 0.9 {
        ("3-Bet Pot".to_string(), rng.random_range(18..=25))
    } else {
        ("4-Bet Pot".to_string(), rng.random_range(40..=55))
    };

    // A short stack cannot sit behind a pot twice its size; reclassify
    // and clamp so the SPR stays physically possible.
    if stack < pot_size / 2 {
        pot_type = "Limped Pot / All-in situation".to_string();
        pot_size = stack;
    }

    let mut contexts: Vec<&str> = BASE_CONTEXTS.to_vec();
    if game_type == GameType::Mtt {
        contexts.extend_from_slice(MTT_CONTEXTS);
    }

    let duration_roll: f64 = rng.random();
    let duration_mode = if duration_roll < 0.2 {
        DurationMode::Short
    } else if duration_roll > 0.8 {
        DurationMode::Long
    } else {
        DurationMode::Medium
    };

    Scenario {
        game_type: Some(game_type),
        players: Some(6),
        stack_depth: Some(stack),
        pot_size: Some(pot_size),
        pot_type: Some(pot_type),
        hero_hand: Some(realistic_hand(rng)),
        board: None,
        hero_position: None,
        villain_position: None,
        context: Some(contexts.choose(rng).unwrap_or(&"Standard Reg vs Reg").to_string()),
        duration_mode: Some(duration_mode),
    }
}
