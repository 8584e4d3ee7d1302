//! Debate Cast & Transcript Module
//!
//! Defines the closed set of arena speakers, the transcript turn format,
//! and the persona cards embedded into generation prompts. Speaker
//! normalization lives here and nowhere else: every piece of model output
//! that claims to be a speaker goes through [`Speaker::parse`].

use serde::{Deserialize, Serialize};

/// The closed set of voices that can appear in a transcript.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Dealer,
    Gto,
    Exploit,
    Noob,
}

impl Speaker {
    /// Normalize free-text model output into the closed enum.
    ///
    /// Case-insensitive prefix match, so "GTO_Bot", "gto" and
    /// "Exploit_Bot (tilted)" all resolve. Anything unrecognized
    /// falls back to the dealer bucket.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        if lower.starts_with("gto") {
            Speaker::Gto
        } else if lower.starts_with("exploit") {
            Speaker::Exploit
        } else if lower.starts_with("noob") {
            Speaker::Noob
        } else {
            Speaker::Dealer
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Dealer => "dealer",
            Speaker::Gto => "gto",
            Speaker::Exploit => "exploit",
            Speaker::Noob => "noob",
        }
    }

    /// Whether this speaker competes for votes. The dealer referees and
    /// the noob heckles; neither can win a debate.
    pub fn is_competitor(&self) -> bool {
        matches!(self, Speaker::Gto | Speaker::Exploit)
    }
}

/// One utterance in a debate transcript. Order in the vector is
/// chronological and is also display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateTurn {
    pub speaker: Speaker,
    pub content: String,
    /// RFC 3339, stamped once per generation batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Whether the noob joins the cast. Earlier arena seasons ran three
/// voices; the noob came later and stays opt-in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersonaMode {
    #[default]
    Three,
    Four,
}

/// A persona card: the block of prompt text describing one voice.
#[derive(Debug, Clone)]
pub struct Persona {
    pub speaker: Speaker,
    pub name: String,
    pub card: String,
}

impl Persona {
    /// Dealer - sets the scene and referees.
    pub fn dealer(hero_hand: &str) -> Self {
        Self {
            speaker: Speaker::Dealer,
            name: "Dealer".to_string(),
            card: format!(
                r#"**Dealer (scene-setter & referee)**
- Role: opens the debate by presenting the hero's hand, the board and the full situation.
- The very first line of the opening message MUST be: **[Hero Hand]: {}**
- Stays neutral; never argues strategy."#,
                hero_hand
            ),
        }
    }

    /// GTO_Bot - the equilibrium purist.
    pub fn gto_bot() -> Self {
        Self {
            speaker: Speaker::Gto,
            name: "GTO_Bot".to_string(),
            card: r#"**GTO_Bot (theory faction)**
- Thinking: Nash equilibrium above all. Mixed strategies, minimum defense frequency, unexploitable lines.
- Tone: assertive and declarative. States frequencies and ranges as settled fact."#
                .to_string(),
        }
    }

    /// Exploit_Bot - the max-EV reader.
    pub fn exploit_bot() -> Self {
        Self {
            speaker: Speaker::Exploit,
            name: "Exploit_Bot".to_string(),
            card: r#"**Exploit_Bot (exploit faction)**
- Thinking: maximum EV by attacking the specific opponent's leaks. Population reads over solver output.
- Tone: aggressive and dismissive of theory. Canned sign-offs are banned; ends every message with a different parting shot."#
                .to_string(),
        }
    }

    /// Noob_Bot - the recreational heckler, only fielded in four-persona mode.
    pub fn noob_bot() -> Self {
        Self {
            speaker: Speaker::Noob,
            name: "Noob_Bot".to_string(),
            card: r#"**Noob_Bot (the rail)**
- Role: a recreational player who interjects with naive questions and bad math, giving both bots something to dunk on.
- Never declared the winner."#
                .to_string(),
        }
    }

    /// The full cast for a debate, keyed by persona mode.
    pub fn cast(mode: PersonaMode, hero_hand: &str) -> Vec<Persona> {
        let mut cast = vec![
            Persona::dealer(hero_hand),
            Persona::gto_bot(),
            Persona::exploit_bot(),
        ];
        if mode == PersonaMode::Four {
            cast.push(Persona::noob_bot());
        }
        cast
    }
}
