//! Debate Content Producer
//!
//! Adapter over the Gemini `generateContent` endpoint. Builds the arena
//! prompts, fires the request against the primary model with an automatic
//! fallback retry, and normalizes whatever comes back into the closed
//! transcript format.
//!
//! Failure policy: this module never propagates generation errors.
//! `create_debate` degrades to a fixed fallback debate and
//! `continue_debate` degrades to an empty batch; the caller decides what
//! an empty batch means.

use crate::config::ColosseumConfig;
use crate::debate::{DebateTurn, Persona, PersonaMode, Speaker};
use crate::scenario::{DurationMode, Scenario};
use crate::votes::VoteShare;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use colored::*;
use serde::Deserialize;
use serde_json::Value;
use std::env;

/// A fully generated debate, ready to persist.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GeneratedDebate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Scenario>,
    pub transcript: Vec<DebateTurn>,
    pub winner: Speaker,
}

#[async_trait]
pub trait ContentProducer: Send + Sync {
    /// Generate a fresh debate for a scenario, biased by the current
    /// faction vote share.
    async fn create_debate(&self, scenario: &Scenario, share: VoteShare) -> GeneratedDebate;

    /// Generate continuation turns for an ongoing debate. Empty on any
    /// failure; callers must treat empty as "leave the row alone".
    async fn continue_debate(&self, transcript: &[DebateTurn], scenario: &Scenario)
        -> Vec<DebateTurn>;
}

// --- Raw wire shapes, before normalization ---

#[derive(Debug, Deserialize)]
struct RawDebate {
    title: Option<String>,
    scenario: Option<Value>,
    transcript: Option<Vec<RawTurn>>,
    winner: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTurn {
    speaker: Option<String>,
    content: Option<String>,
}

/// Gemini-backed producer.
pub struct GeminiProducer {
    api_key: String,
    client: reqwest::Client,
    config: ColosseumConfig,
}

impl GeminiProducer {
    pub fn new(config: ColosseumConfig) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .context("CRITICAL: GEMINI_API_KEY not found in .env or environment")?;

        Ok(Self {
            api_key,
            client: reqwest::Client::new(),
            config,
        })
    }

    /// One generateContent round-trip, primary model first, fallback on
    /// any primary failure.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let primary_result = self.call_model(&self.config.primary_model, prompt).await;

        match primary_result {
            Ok(text) => return Ok(text),
            Err(e) => eprintln!("Primary model failed, switching to fallback. Error: {}", e),
        }

        self.call_model(&self.config.fallback_model, prompt).await
    }

    async fn call_model(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            model
        );

        let payload = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await.unwrap_or_default();
            return Err(anyhow!("{} failed: {} - {}", model, status, err_text));
        }

        let body: Value = res.json().await?;
        extract_text(&body).with_context(|| format!("{} response had no text part", model))
    }

    fn scenario_block(scenario: &Scenario) -> String {
        let spr = scenario.spr();
        format!(
            r#"- Game Type: {}
- Situation: {}
- Effective Stack: {} BB
- Pot Size (Flop): {} BB
- SPR (Stack to Pot Ratio): {}
- Context: {}
- Hand: {}"#,
            scenario.game_type.map(|g| g.as_str()).unwrap_or("Cash"),
            scenario.pot_type.as_deref().unwrap_or("Standard Pot"),
            scenario.stack_depth.unwrap_or(100),
            scenario.pot_size.unwrap_or(0),
            spr,
            scenario.context.as_deref().unwrap_or("Standard"),
            scenario.hero_hand.as_deref().unwrap_or("Unknown"),
        )
    }

    fn duration_instruction(mode: DurationMode) -> &'static str {
        match mode {
            DurationMode::Short => {
                "[Lightning mode]: each side states its case once, then call a verdict and wrap up immediately."
            }
            DurationMode::Long => {
                "[Quagmire mode]: neither side gives an inch. Keep countering with precise numbers and table-feel arguments; drag it out."
            }
            DurationMode::Medium => {
                "[Standard mode]: argue at a natural pace and stop once both positions are exhausted."
            }
        }
    }

    fn create_prompt(&self, scenario: &Scenario, share: VoteShare) -> String {
        let hero_hand = scenario.hero_hand.as_deref().unwrap_or("Random");
        let cast = Persona::cast(self.config.persona_mode, hero_hand);
        let cards: Vec<String> = cast.iter().map(|p| p.card.clone()).collect();
        let spr = scenario.spr();
        let mode = scenario.duration_mode();

        format!(
            r#"You are the operator of the poker forum "AI Colosseum".
Generate one heated poker strategy debate between the personas below, grounded in the given situation.

[Current state of the war]
- GTO faction share: {gto}%
- Exploit faction share: {exploit}%

[Personas]
{cards}

[The situation]
{situation}

[Strategy notes]
- Weigh SPR = {spr} in every argument.
  - SPR of 13 or more means deep-stack strategy.
  - SPR of 2 or less means commitment strategy.

[Debate length: {mode:?}]
{duration}

[Output format (JSON)]
The debate opens with the Dealer setting the scene, then GTO and Exploit trade short blows in turn.
Return a single JSON object:
{{
  "title": "debate title",
  "scenario": {{ ... }},
  "transcript": [
    {{ "speaker": "dealer", "content": "**[Hero Hand]: ...**\n\n..." }},
    {{ "speaker": "gto", "content": "..." }},
    {{ "speaker": "exploit", "content": "..." }}
  ],
  "winner": "gto"
}}"#,
            gto = share.gto_percentage,
            exploit = share.exploit_percentage,
            cards = cards.join("\n\n"),
            situation = Self::scenario_block(scenario),
            spr = spr,
            mode = mode,
            duration = Self::duration_instruction(mode),
        )
    }

    fn continue_prompt(&self, tail: &[DebateTurn], scenario: &Scenario) -> String {
        let recent: Vec<String> = tail
            .iter()
            .map(|t| format!("{}: {}", t.speaker.as_str(), t.content))
            .collect();

        let noob_note = if self.config.persona_mode == PersonaMode::Four {
            " An occasional noob interjection is allowed."
        } else {
            ""
        };

        format!(
            r#"You are the operator of the poker forum "AI Colosseum".
An ongoing debate needs its next posts.

[The situation]
{situation}

[Recent posts]
{recent}

[Instructions]
- Write 3 to 5 new posts continuing the argument, alternating between gto and exploit.{noob_note}
- Do NOT include the dealer.
- Do not repeat earlier points; escalate them.

[Output format (JSON)]
Return a JSON array:
[ {{ "speaker": "gto", "content": "..." }}, {{ "speaker": "exploit", "content": "..." }} ]"#,
            situation = Self::scenario_block(scenario),
            recent = recent.join("\n"),
            noob_note = noob_note,
        )
    }

    async fn try_create(&self, scenario: &Scenario, share: VoteShare) -> Result<GeneratedDebate> {
        let prompt = self.create_prompt(scenario, share);
        let text = self.generate(&prompt).await?;
        parse_debate_payload(&text)
    }

    /// Only the trailing window of the transcript goes back to the model.
    fn window_tail<'a>(&self, transcript: &'a [DebateTurn]) -> &'a [DebateTurn] {
        let window = self.config.continuation_window;
        if transcript.len() > window {
            &transcript[transcript.len() - window..]
        } else {
            transcript
        }
    }

    async fn try_continue(
        &self,
        transcript: &[DebateTurn],
        scenario: &Scenario,
    ) -> Result<Vec<DebateTurn>> {
        let prompt = self.continue_prompt(self.window_tail(transcript), scenario);
        let text = self.generate(&prompt).await?;
        parse_continuation_payload(&text)
    }
}

#[async_trait]
impl ContentProducer for GeminiProducer {
    async fn create_debate(&self, scenario: &Scenario, share: VoteShare) -> GeneratedDebate {
        match self.try_create(scenario, share).await {
            Ok(debate) => debate,
            Err(e) => {
                eprintln!("{} Debate generation failed: {}", "⚠️".red(), e);
                fallback_debate()
            }
        }
    }

    async fn continue_debate(
        &self,
        transcript: &[DebateTurn],
        scenario: &Scenario,
    ) -> Vec<DebateTurn> {
        match self.try_continue(transcript, scenario).await {
            Ok(turns) => turns,
            Err(e) => {
                eprintln!("{} Debate continuation failed: {}", "⚠️".red(), e);
                Vec::new()
            }
        }
    }
}

/// Strip markdown code fences the model wraps around JSON output.
fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn extract_text(body: &Value) -> Option<String> {
    body.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// Parse and normalize a fresh-debate payload.
fn parse_debate_payload(text: &str) -> Result<GeneratedDebate> {
    let clean = strip_fences(text);
    let raw: RawDebate =
        serde_json::from_str(&clean).context("Debate payload was not valid JSON")?;

    let turns = raw
        .transcript
        .ok_or_else(|| anyhow!("Debate payload had no transcript"))?;
    if turns.is_empty() {
        return Err(anyhow!("Debate payload had an empty transcript"));
    }

    let stamp = Utc::now().to_rfc3339();
    let transcript = normalize_turns(turns, &stamp);
    if transcript.is_empty() {
        return Err(anyhow!("Debate payload had no usable turns"));
    }

    let winner = resolve_winner(raw.winner.as_deref());
    let scenario = raw
        .scenario
        .and_then(|v| serde_json::from_value::<Scenario>(v).ok());

    Ok(GeneratedDebate {
        title: raw.title.unwrap_or_else(|| "Untitled Debate".to_string()),
        scenario,
        transcript,
        winner,
    })
}

/// Parse and normalize a continuation payload. Accepts either a bare
/// array of turns or an object carrying one under `transcript`/`turns`.
fn parse_continuation_payload(text: &str) -> Result<Vec<DebateTurn>> {
    let clean = strip_fences(text);
    let value: Value =
        serde_json::from_str(&clean).context("Continuation payload was not valid JSON")?;

    let raw_turns: Vec<RawTurn> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        let inner = value
            .get("transcript")
            .or_else(|| value.get("turns"))
            .cloned()
            .ok_or_else(|| anyhow!("Continuation payload had no turn array"))?;
        serde_json::from_value(inner)?
    };

    let stamp = Utc::now().to_rfc3339();
    Ok(normalize_turns(raw_turns, &stamp))
}

/// Map raw turns into the closed speaker set and stamp the whole batch
/// with one shared timestamp. Turns with no content are dropped.
fn normalize_turns(raw: Vec<RawTurn>, stamp: &str) -> Vec<DebateTurn> {
    raw.into_iter()
        .filter_map(|t| {
            let content = t.content?;
            if content.is_empty() {
                return None;
            }
            Some(DebateTurn {
                speaker: Speaker::parse(t.speaker.as_deref().unwrap_or("")),
                content,
                timestamp: Some(stamp.to_string()),
            })
        })
        .collect()
}

/// Lowercase and validate the asserted winner. Missing winners and
/// non-competitors get a coin flip between the two factions.
fn resolve_winner(raw: Option<&str>) -> Speaker {
    match raw {
        Some(w) => {
            let speaker = Speaker::parse(w);
            if speaker.is_competitor() {
                speaker
            } else {
                coin_flip_winner()
            }
        }
        None => coin_flip_winner(),
    }
}

fn coin_flip_winner() -> Speaker {
    use rand::Rng;
    if rand::rng().random_bool(0.5) {
        Speaker::Gto
    } else {
        Speaker::Exploit
    }
}

/// The canned debate returned when generation is down.
pub fn fallback_debate() -> GeneratedDebate {
    GeneratedDebate {
        title: "System Error".to_string(),
        scenario: None,
        transcript: vec![DebateTurn {
            speaker: Speaker::Dealer,
            content: "AI connection error. The arena is dark tonight; come back for the next card."
                .to_string(),
            timestamp: Some(Utc::now().to_rfc3339()),
        }],
        winner: Speaker::Gto,
    }
}
