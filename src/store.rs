//! Arena Row Store
//!
//! Persistence adapter for debate rows and lab analyses. The production
//! backend is a Supabase project spoken to over its PostgREST interface;
//! the [`ArenaStore`] trait keeps the lifecycle controller testable
//! against an in-memory fake.
//!
//! No transactions and no optimistic concurrency: every operation is a
//! plain read or a plain write, matching the storage contract the arena
//! accepts (last write wins on a row).

use crate::debate::DebateTurn;
use crate::scenario::Scenario;
use crate::votes::VoteSide;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::env;

/// The JSON document stored in a row's `transcript_json` column.
///
/// `max_turns` is optional because rows created before the turn-budget
/// field existed don't carry it; the lifecycle controller heals those on
/// first touch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TranscriptDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Scenario>,
    pub transcript: Vec<DebateTurn>,
    #[serde(rename = "maxTurns", skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
}

/// A persisted arena debate row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRow {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub scenario_json: Option<Scenario>,
    #[serde(default)]
    pub transcript_json: TranscriptDoc,
    #[serde(default)]
    pub votes_gto: i64,
    #[serde(default)]
    pub votes_exploit: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Row ids are opaque: uuid strings on fresh projects, bigints on older
/// ones. Accept both and carry them as text.
fn opaque_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unsupported id type: {}",
            other
        ))),
    }
}

/// Insert payload for a new arena debate.
#[derive(Debug, Clone, Serialize)]
pub struct NewDebate {
    pub title: String,
    pub scenario_json: Scenario,
    pub transcript_json: TranscriptDoc,
    pub votes_gto: i64,
    pub votes_exploit: i64,
}

/// Reference to a freshly stored lab analysis.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisRef {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[async_trait]
pub trait ArenaStore: Send + Sync {
    /// The most recently created debate row, if any. Fallback for
    /// deployments that predate the active-debate pointer.
    async fn latest_debate(&self) -> Result<Option<DebateRow>>;
    /// One row by id.
    async fn fetch_debate(&self, id: &str) -> Result<Option<DebateRow>>;
    /// The explicit active-debate pointer. Creation-timestamp ties make
    /// "latest" ambiguous, so the lifecycle controller records which row
    /// it considers live.
    async fn active_debate_id(&self) -> Result<Option<String>>;
    async fn set_active_debate(&self, id: &str) -> Result<()>;
    /// Newest-first listing, capped at `limit`.
    async fn list_debates(&self, limit: usize) -> Result<Vec<DebateRow>>;
    /// Insert a new row, returning its id.
    async fn insert_debate(&self, debate: &NewDebate) -> Result<String>;
    /// Overwrite a row's transcript document.
    async fn update_transcript(&self, id: &str, doc: &TranscriptDoc) -> Result<()>;
    /// Current vote pair for one row, `None` when the id is unknown.
    async fn fetch_votes(&self, id: &str) -> Result<Option<(i64, i64)>>;
    /// Write one side's counter on a row.
    async fn update_vote(&self, id: &str, side: VoteSide, value: i64) -> Result<()>;
    /// Vote pairs across the whole corpus.
    async fn all_vote_counts(&self) -> Result<Vec<(i64, i64)>>;
    /// Persist a one-off lab analysis, separate from the arena lifecycle.
    async fn insert_analysis(&self, scenario: &Scenario, transcript: &Value) -> Result<AnalysisRef>;
}

/// PostgREST-backed store.
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Build from `SUPABASE_URL` / `SUPABASE_ANON_KEY`.
    pub fn from_env() -> Result<Self> {
        let url = env::var("SUPABASE_URL")
            .context("CRITICAL: SUPABASE_URL not found in .env or environment")?;
        let key = env::var("SUPABASE_ANON_KEY")
            .context("CRITICAL: SUPABASE_ANON_KEY not found in .env or environment")?;
        Ok(Self::new(url, key))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn get_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let res = self
            .authed(self.client.get(self.table_url(table)))
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed to send", table))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("GET {} failed: {} - {}", table, status, body));
        }
        res.json::<Vec<T>>()
            .await
            .with_context(|| format!("GET {} returned malformed rows", table))
    }

    async fn patch_row(&self, table: &str, id: &str, body: &Value) -> Result<()> {
        let res = self
            .authed(self.client.patch(self.table_url(table)))
            .query(&[("id", format!("eq.{}", id))])
            .json(body)
            .send()
            .await
            .with_context(|| format!("PATCH {} failed to send", table))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("PATCH {} failed: {} - {}", table, status, text));
        }
        Ok(())
    }
}

#[async_trait]
impl ArenaStore for SupabaseStore {
    async fn latest_debate(&self) -> Result<Option<DebateRow>> {
        let mut rows: Vec<DebateRow> = self
            .get_rows(
                "arena_debates",
                &[
                    ("select", "*".to_string()),
                    ("order", "created_at.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn fetch_debate(&self, id: &str) -> Result<Option<DebateRow>> {
        let mut rows: Vec<DebateRow> = self
            .get_rows(
                "arena_debates",
                &[("select", "*".to_string()), ("id", format!("eq.{}", id))],
            )
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn active_debate_id(&self) -> Result<Option<String>> {
        #[derive(Deserialize)]
        struct StateRow {
            #[serde(default)]
            active_debate_id: Option<String>,
        }

        let rows: Vec<StateRow> = self
            .get_rows(
                "arena_state",
                &[
                    ("select", "active_debate_id".to_string()),
                    ("id", "eq.1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().and_then(|r| r.active_debate_id))
    }

    async fn set_active_debate(&self, id: &str) -> Result<()> {
        // Single-row upsert; the pointer record always has id 1.
        let res = self
            .authed(self.client.post(self.table_url("arena_state")))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&serde_json::json!([{ "id": 1, "active_debate_id": id }]))
            .send()
            .await
            .context("UPSERT arena_state failed to send")?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("UPSERT arena_state failed: {} - {}", status, text));
        }
        Ok(())
    }

    async fn list_debates(&self, limit: usize) -> Result<Vec<DebateRow>> {
        self.get_rows(
            "arena_debates",
            &[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn insert_debate(&self, debate: &NewDebate) -> Result<String> {
        let res = self
            .authed(self.client.post(self.table_url("arena_debates")))
            .query(&[("select", "id")])
            .header("Prefer", "return=representation")
            .json(debate)
            .send()
            .await
            .context("INSERT arena_debates failed to send")?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("INSERT arena_debates failed: {} - {}", status, text));
        }

        let mut refs: Vec<AnalysisRef> = res
            .json()
            .await
            .context("INSERT arena_debates returned no id")?;
        if refs.is_empty() {
            return Err(anyhow!("INSERT arena_debates returned an empty row set"));
        }
        Ok(refs.remove(0).id)
    }

    async fn update_transcript(&self, id: &str, doc: &TranscriptDoc) -> Result<()> {
        let body = serde_json::json!({ "transcript_json": doc });
        self.patch_row("arena_debates", id, &body).await
    }

    async fn fetch_votes(&self, id: &str) -> Result<Option<(i64, i64)>> {
        #[derive(Deserialize)]
        struct VotePair {
            #[serde(default)]
            votes_gto: i64,
            #[serde(default)]
            votes_exploit: i64,
        }

        let rows: Vec<VotePair> = self
            .get_rows(
                "arena_debates",
                &[
                    ("select", "votes_gto,votes_exploit".to_string()),
                    ("id", format!("eq.{}", id)),
                ],
            )
            .await?;
        Ok(rows.first().map(|r| (r.votes_gto, r.votes_exploit)))
    }

    async fn update_vote(&self, id: &str, side: VoteSide, value: i64) -> Result<()> {
        let mut body = serde_json::Map::new();
        body.insert(side.column().to_string(), Value::from(value));
        self.patch_row("arena_debates", id, &Value::Object(body)).await
    }

    async fn all_vote_counts(&self) -> Result<Vec<(i64, i64)>> {
        #[derive(Deserialize)]
        struct VotePair {
            #[serde(default)]
            votes_gto: i64,
            #[serde(default)]
            votes_exploit: i64,
        }

        let rows: Vec<VotePair> = self
            .get_rows(
                "arena_debates",
                &[("select", "votes_gto,votes_exploit".to_string())],
            )
            .await?;
        Ok(rows.iter().map(|r| (r.votes_gto, r.votes_exploit)).collect())
    }

    async fn insert_analysis(&self, scenario: &Scenario, transcript: &Value) -> Result<AnalysisRef> {
        let body = serde_json::json!({
            "input_scenario": scenario,
            "transcript_json": transcript,
            "user_id": Value::Null,
        });

        let res = self
            .authed(self.client.post(self.table_url("lab_analyses")))
            .query(&[("select", "id,created_at")])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .context("INSERT lab_analyses failed to send")?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("INSERT lab_analyses failed: {} - {}", status, text));
        }

        let mut refs: Vec<AnalysisRef> = res
            .json()
            .await
            .context("INSERT lab_analyses returned no id")?;
        if refs.is_empty() {
            return Err(anyhow!("INSERT lab_analyses returned an empty row set"));
        }
        Ok(refs.remove(0))
    }
}

/// In-memory store for tests. Rows live in insertion order; "latest"
/// means last inserted.
#[cfg(test)]
pub mod mem {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemStore {
        pub rows: Mutex<Vec<DebateRow>>,
        pub analyses: Mutex<Vec<AnalysisRef>>,
        pub active: Mutex<Option<String>>,
        pub fail_writes: bool,
    }

    impl MemStore {
        pub fn with_rows(rows: Vec<DebateRow>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Default::default()
            }
        }

        pub fn row(&self, id: &str) -> Option<DebateRow> {
            self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned()
        }
    }

    #[async_trait]
    impl ArenaStore for MemStore {
        async fn latest_debate(&self) -> Result<Option<DebateRow>> {
            Ok(self.rows.lock().unwrap().last().cloned())
        }

        async fn fetch_debate(&self, id: &str) -> Result<Option<DebateRow>> {
            Ok(self.row(id))
        }

        async fn active_debate_id(&self) -> Result<Option<String>> {
            Ok(self.active.lock().unwrap().clone())
        }

        async fn set_active_debate(&self, id: &str) -> Result<()> {
            if self.fail_writes {
                return Err(anyhow!("simulated storage failure"));
            }
            *self.active.lock().unwrap() = Some(id.to_string());
            Ok(())
        }

        async fn list_debates(&self, limit: usize) -> Result<Vec<DebateRow>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().rev().take(limit).cloned().collect())
        }

        async fn insert_debate(&self, debate: &NewDebate) -> Result<String> {
            if self.fail_writes {
                return Err(anyhow!("simulated storage failure"));
            }
            let id = uuid::Uuid::new_v4().to_string();
            self.rows.lock().unwrap().push(DebateRow {
                id: id.clone(),
                title: Some(debate.title.clone()),
                scenario_json: Some(debate.scenario_json.clone()),
                transcript_json: debate.transcript_json.clone(),
                votes_gto: debate.votes_gto,
                votes_exploit: debate.votes_exploit,
                created_at: Some(chrono::Utc::now().to_rfc3339()),
            });
            Ok(id)
        }

        async fn update_transcript(&self, id: &str, doc: &TranscriptDoc) -> Result<()> {
            if self.fail_writes {
                return Err(anyhow!("simulated storage failure"));
            }
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| anyhow!("no such row: {}", id))?;
            row.transcript_json = doc.clone();
            Ok(())
        }

        async fn fetch_votes(&self, id: &str) -> Result<Option<(i64, i64)>> {
            Ok(self.row(id).map(|r| (r.votes_gto, r.votes_exploit)))
        }

        async fn update_vote(&self, id: &str, side: VoteSide, value: i64) -> Result<()> {
            if self.fail_writes {
                return Err(anyhow!("simulated storage failure"));
            }
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| anyhow!("no such row: {}", id))?;
            match side {
                VoteSide::Gto => row.votes_gto = value,
                VoteSide::Exploit => row.votes_exploit = value,
            }
            Ok(())
        }

        async fn all_vote_counts(&self) -> Result<Vec<(i64, i64)>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().map(|r| (r.votes_gto, r.votes_exploit)).collect())
        }

        async fn insert_analysis(
            &self,
            _scenario: &Scenario,
            _transcript: &Value,
        ) -> Result<AnalysisRef> {
            if self.fail_writes {
                return Err(anyhow!("simulated storage failure"));
            }
            let analysis = AnalysisRef {
                id: uuid::Uuid::new_v4().to_string(),
                created_at: Some(chrono::Utc::now().to_rfc3339()),
            };
            self.analyses.lock().unwrap().push(analysis.clone());
            Ok(analysis)
        }
    }
}
