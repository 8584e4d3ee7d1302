//! Debate Lifecycle Controller
//!
//! One invocation advances the arena by exactly one step: either the
//! active debate gets fresh turns, or it has hit its turn budget and a
//! new debate is created in its place. There is exactly one active
//! debate at a time, tracked by an explicit pointer record; the newest
//! row serves as the fallback where no pointer exists yet.
//!
//! Persistence failures abort the step with the error and nothing is
//! partially written. Generation failures never abort: the producer
//! degrades internally and an empty continuation leaves the row alone.

use crate::debate::Speaker;
use crate::producer::ContentProducer;
use crate::scenario::{self, DurationMode, Scenario};
use crate::store::{ArenaStore, NewDebate, TranscriptDoc};
use crate::votes::VoteTotals;
use anyhow::Result;
use colored::*;
use rand::Rng;

/// What a lifecycle step did. Mirrored into the trigger response.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The active debate grew by `appended` turns.
    Continued {
        id: String,
        turns: usize,
        max_turns: u32,
        duration_mode: DurationMode,
        appended: usize,
    },
    /// Continuation produced nothing; the row was left untouched.
    Unchanged {
        id: String,
        turns: usize,
        max_turns: u32,
    },
    /// A fresh debate row was created.
    Created {
        id: String,
        title: String,
        winner: Speaker,
        duration_mode: DurationMode,
        max_turns: u32,
    },
}

/// Turn budget drawn once at creation and stored with the row.
pub fn draw_max_turns(mode: DurationMode) -> u32 {
    let mut rng = rand::rng();
    match mode {
        DurationMode::Short => rng.random_range(8..=15),
        DurationMode::Medium => rng.random_range(30..=50),
        DurationMode::Long => rng.random_range(80..=120),
    }
}

/// Deterministic budget for rows that predate the stored `maxTurns`
/// field. Persisted onto the row the first time it is used.
pub fn fallback_max_turns(mode: DurationMode) -> u32 {
    match mode {
        DurationMode::Short => 15,
        DurationMode::Medium => 50,
        DurationMode::Long => 120,
    }
}

/// The posting gate for automatic ticks: roll 1-100, act when at or
/// under the configured probability. Manual triggers skip this.
pub fn roll_dice(post_probability: u32) -> bool {
    let roll: u32 = rand::rng().random_range(1..=100);
    roll <= post_probability
}

/// Resolve the debate the arena currently considers live: the explicit
/// pointer when one is recorded, otherwise the newest row (deployments
/// that predate the pointer, or a pointer left dangling).
async fn resolve_active(store: &dyn ArenaStore) -> Result<Option<crate::store::DebateRow>> {
    if let Some(id) = store.active_debate_id().await? {
        if let Some(row) = store.fetch_debate(&id).await? {
            return Ok(Some(row));
        }
    }
    store.latest_debate().await
}

/// Run one lifecycle step against the active debate row.
pub async fn run_step(
    store: &dyn ArenaStore,
    producer: &dyn ContentProducer,
) -> Result<StepOutcome> {
    if let Some(row) = resolve_active(store).await? {
        let mut doc = row.transcript_json;
        let scenario: Scenario = row
            .scenario_json
            .or_else(|| doc.scenario.clone())
            .unwrap_or_default();
        let mode = scenario.duration_mode();
        let max_turns = doc.max_turns.unwrap_or_else(|| fallback_max_turns(mode));
        let current = doc.transcript.len();

        if (current as u32) < max_turns {
            println!(
                "{} Continuing debate {} ({:?}, {}/{})",
                "🗣️".cyan(),
                row.id,
                mode,
                current,
                max_turns
            );

            let mut new_turns = producer.continue_debate(&doc.transcript, &scenario).await;
            if new_turns.is_empty() {
                println!(
                    "{} No continuation came back; leaving debate {} untouched",
                    "💤".yellow(),
                    row.id
                );
                return Ok(StepOutcome::Unchanged {
                    id: row.id,
                    turns: current,
                    max_turns,
                });
            }

            // Never overshoot the budget a row was created with.
            let room = (max_turns as usize).saturating_sub(current);
            new_turns.truncate(room);
            let appended = new_turns.len();

            doc.transcript.extend(new_turns);
            doc.max_turns = Some(max_turns);
            store.update_transcript(&row.id, &doc).await?;

            return Ok(StepOutcome::Continued {
                id: row.id,
                turns: doc.transcript.len(),
                max_turns,
                duration_mode: mode,
                appended,
            });
        }

        println!(
            "{} Debate {} finished ({:?}, reached {} turns). Starting new one.",
            "🏁".green(),
            row.id,
            mode,
            max_turns
        );
    }

    create_debate(store, producer).await
}

/// The create-new path: bias from the global vote share, fresh scenario,
/// fresh budget, initial votes seeded from the asserted winner.
async fn create_debate(
    store: &dyn ArenaStore,
    producer: &dyn ContentProducer,
) -> Result<StepOutcome> {
    println!("{} Starting NEW debate...", "🆕".green());

    let counts = store.all_vote_counts().await?;
    let share = VoteTotals::tally(counts).share();

    let drawn = scenario::generate();
    let generated = producer.create_debate(&drawn, share).await;

    let mode = drawn.duration_mode();
    let max_turns = draw_max_turns(mode);

    let (votes_gto, votes_exploit) = match generated.winner {
        Speaker::Gto => (1, 0),
        Speaker::Exploit => (0, 1),
        _ => (0, 0),
    };

    let doc = TranscriptDoc {
        title: Some(generated.title.clone()),
        scenario: Some(generated.scenario.unwrap_or_else(|| drawn.clone())),
        transcript: generated.transcript,
        max_turns: Some(max_turns),
    };

    let id = store
        .insert_debate(&NewDebate {
            title: generated.title.clone(),
            scenario_json: drawn,
            transcript_json: doc,
            votes_gto,
            votes_exploit,
        })
        .await?;
    store.set_active_debate(&id).await?;

    println!(
        "{} Created debate {} ({:?}, budget {} turns, winner {})",
        "⚔️".green(),
        id,
        mode,
        max_turns,
        generated.winner.as_str()
    );

    Ok(StepOutcome::Created {
        id,
        title: generated.title,
        winner: generated.winner,
        duration_mode: mode,
        max_turns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::DebateTurn;
    use crate::producer::GeneratedDebate;
    use crate::store::mem::MemStore;
    use crate::store::DebateRow;
    use crate::votes::VoteShare;
    use async_trait::async_trait;

    struct FakeProducer {
        continuation: Vec<DebateTurn>,
        winner: Speaker,
    }

    impl Default for FakeProducer {
        fn default() -> Self {
            Self {
                continuation: vec![
                    turn(Speaker::Gto, "range check"),
                    turn(Speaker::Exploit, "stab every time"),
                ],
                winner: Speaker::Gto,
            }
        }
    }

    #[async_trait]
    impl ContentProducer for FakeProducer {
        async fn create_debate(&self, scenario: &Scenario, _share: VoteShare) -> GeneratedDebate {
            GeneratedDebate {
                title: "Fresh blood".to_string(),
                scenario: Some(scenario.clone()),
                transcript: vec![turn(Speaker::Dealer, "**[Hero Hand]: AA**")],
                winner: self.winner,
            }
        }

        async fn continue_debate(
            &self,
            _transcript: &[DebateTurn],
            _scenario: &Scenario,
        ) -> Vec<DebateTurn> {
            self.continuation.clone()
        }
    }

    fn turn(speaker: Speaker, content: &str) -> DebateTurn {
        DebateTurn {
            speaker,
            content: content.to_string(),
            timestamp: None,
        }
    }

    fn row(turns: usize, max_turns: Option<u32>, mode: DurationMode) -> DebateRow {
        DebateRow {
            id: "row-1".to_string(),
            title: Some("old".to_string()),
            scenario_json: Some(Scenario {
                duration_mode: Some(mode),
                ..Default::default()
            }),
            transcript_json: TranscriptDoc {
                title: Some("old".to_string()),
                scenario: None,
                transcript: (0..turns).map(|i| turn(Speaker::Gto, &format!("t{}", i))).collect(),
                max_turns,
            },
            votes_gto: 0,
            votes_exploit: 0,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_active_debate_is_continued() {
        let store = MemStore::with_rows(vec![row(3, Some(10), DurationMode::Short)]);
        let producer = FakeProducer::default();

        let outcome = run_step(&store, &producer).await.unwrap();
        match outcome {
            StepOutcome::Continued {
                id,
                turns,
                max_turns,
                appended,
                ..
            } => {
                assert_eq!(id, "row-1");
                assert_eq!(turns, 5);
                assert_eq!(appended, 2);
                assert_eq!(max_turns, 10);
            }
            other => panic!("expected Continued, got {:?}", other),
        }

        let stored = store.row("row-1").unwrap();
        assert_eq!(stored.transcript_json.transcript.len(), 5);
        assert_eq!(stored.transcript_json.max_turns, Some(10));
        // scenario untouched
        assert_eq!(
            stored.scenario_json.unwrap().duration_mode(),
            DurationMode::Short
        );
    }

    #[tokio::test]
    async fn test_empty_continuation_is_a_noop() {
        let store = MemStore::with_rows(vec![row(3, Some(10), DurationMode::Short)]);
        let producer = FakeProducer {
            continuation: vec![],
            ..Default::default()
        };

        let outcome = run_step(&store, &producer).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Unchanged {
                id: "row-1".to_string(),
                turns: 3,
                max_turns: 10,
            }
        );

        // not treated as exhausted, no second row created
        assert_eq!(store.rows.lock().unwrap().len(), 1);
        let stored = store.row("row-1").unwrap();
        assert_eq!(stored.transcript_json.transcript.len(), 3);
        assert_eq!(stored.transcript_json.max_turns, Some(10));
    }

    #[tokio::test]
    async fn test_exhausted_debate_spawns_a_new_row() {
        let store = MemStore::with_rows(vec![row(10, Some(10), DurationMode::Short)]);
        let producer = FakeProducer::default();

        let outcome = run_step(&store, &producer).await.unwrap();
        match outcome {
            StepOutcome::Created {
                max_turns,
                duration_mode,
                winner,
                ..
            } => {
                // freshly drawn budget consistent with the new scenario's tier
                let (lo, hi) = match duration_mode {
                    DurationMode::Short => (8, 15),
                    DurationMode::Medium => (30, 50),
                    DurationMode::Long => (80, 120),
                };
                assert!(max_turns >= lo && max_turns <= hi);
                assert_eq!(winner, Speaker::Gto);
            }
            other => panic!("expected Created, got {:?}", other),
        }
        assert_eq!(store.rows.lock().unwrap().len(), 2);

        let latest = store.latest_debate().await.unwrap().unwrap();
        assert_eq!(latest.votes_gto, 1);
        assert_eq!(latest.votes_exploit, 0);
    }

    #[tokio::test]
    async fn test_pointer_beats_newest_row() {
        // Two rows share a creation instant; the pointer decides which
        // one is live, not insertion order.
        let mut exhausted = row(10, Some(10), DurationMode::Short);
        exhausted.id = "row-2".to_string();
        let store = MemStore::with_rows(vec![row(3, Some(10), DurationMode::Short), exhausted]);
        *store.active.lock().unwrap() = Some("row-1".to_string());
        let producer = FakeProducer::default();

        let outcome = run_step(&store, &producer).await.unwrap();
        match outcome {
            StepOutcome::Continued { id, turns, .. } => {
                assert_eq!(id, "row-1");
                assert_eq!(turns, 5);
            }
            other => panic!("expected Continued, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dangling_pointer_falls_back_to_latest() {
        let store = MemStore::with_rows(vec![row(3, Some(10), DurationMode::Short)]);
        *store.active.lock().unwrap() = Some("gone".to_string());
        let producer = FakeProducer::default();

        let outcome = run_step(&store, &producer).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Continued { .. }));
    }

    #[tokio::test]
    async fn test_create_records_the_active_pointer() {
        let store = MemStore::default();
        let producer = FakeProducer::default();

        let outcome = run_step(&store, &producer).await.unwrap();
        let id = match outcome {
            StepOutcome::Created { id, .. } => id,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(*store.active.lock().unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_empty_store_creates_first_debate() {
        let store = MemStore::default();
        let producer = FakeProducer {
            winner: Speaker::Exploit,
            ..Default::default()
        };

        let outcome = run_step(&store, &producer).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Created { .. }));

        let latest = store.latest_debate().await.unwrap().unwrap();
        assert_eq!(latest.votes_gto, 0);
        assert_eq!(latest.votes_exploit, 1);
        assert!(latest.transcript_json.max_turns.is_some());
    }

    #[tokio::test]
    async fn test_legacy_row_budget_is_healed() {
        // Pre-maxTurns row: Medium fallback is 50, so 3 turns is active.
        let store = MemStore::with_rows(vec![row(3, None, DurationMode::Medium)]);
        let producer = FakeProducer::default();

        let outcome = run_step(&store, &producer).await.unwrap();
        match outcome {
            StepOutcome::Continued { max_turns, .. } => assert_eq!(max_turns, 50),
            other => panic!("expected Continued, got {:?}", other),
        }

        let stored = store.row("row-1").unwrap();
        assert_eq!(stored.transcript_json.max_turns, Some(50));
    }

    #[tokio::test]
    async fn test_legacy_exhausted_row_rolls_over() {
        let store = MemStore::with_rows(vec![row(15, None, DurationMode::Short)]);
        let producer = FakeProducer::default();

        let outcome = run_step(&store, &producer).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Created { .. }));
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_continuation_never_overshoots_budget() {
        let store = MemStore::with_rows(vec![row(9, Some(10), DurationMode::Short)]);
        let producer = FakeProducer::default(); // yields 2 turns, room for 1

        let outcome = run_step(&store, &producer).await.unwrap();
        match outcome {
            StepOutcome::Continued { turns, appended, .. } => {
                assert_eq!(turns, 10);
                assert_eq!(appended, 1);
            }
            other => panic!("expected Continued, got {:?}", other),
        }

        let stored = store.row("row-1").unwrap();
        assert_eq!(stored.transcript_json.transcript.len(), 10);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_the_step() {
        let mut store = MemStore::with_rows(vec![row(3, Some(10), DurationMode::Short)]);
        store.fail_writes = true;
        let producer = FakeProducer::default();

        assert!(run_step(&store, &producer).await.is_err());
        // nothing partially written
        let stored = store.row("row-1").unwrap();
        assert_eq!(stored.transcript_json.transcript.len(), 3);
    }

    #[test]
    fn test_budget_tiers() {
        for _ in 0..200 {
            let s = draw_max_turns(DurationMode::Short);
            assert!((8..=15).contains(&s));
            let m = draw_max_turns(DurationMode::Medium);
            assert!((30..=50).contains(&m));
            let l = draw_max_turns(DurationMode::Long);
            assert!((80..=120).contains(&l));
        }
        assert_eq!(fallback_max_turns(DurationMode::Short), 15);
        assert_eq!(fallback_max_turns(DurationMode::Medium), 50);
        assert_eq!(fallback_max_turns(DurationMode::Long), 120);
    }

    #[test]
    fn test_dice_extremes() {
        for _ in 0..100 {
            assert!(roll_dice(100));
            assert!(!roll_dice(0));
        }
    }
}
