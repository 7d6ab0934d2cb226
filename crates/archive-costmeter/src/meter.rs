use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{error, info};

use archive_llm::{CallEvent, CallKind, LlmCallObserver};

use crate::db::init_db;
use crate::pricing::cost_usd;
use crate::types::{CostEvent, EventKind};

/// Bounded in-memory ring buffer size. Oldest events are evicted once full;
/// the persisted row in SQLite is the durable record (spec §4.2).
const BUFFER_CAPACITY: usize = 2048;

struct Inner {
    buffer: VecDeque<CostEvent>,
    session_total: f64,
    daily_totals: HashMap<String, f64>,
    conversation_totals: HashMap<String, f64>,
}

/// Intercepts every LLM/embedding/transcription/image call, prices it from
/// the static pricing table, and maintains running totals. Persistence
/// failures are logged and swallowed — the meter must never break the hot
/// path (spec §4.2 failure semantics).
pub struct CostMeter {
    conn: Mutex<Connection>,
    state: Mutex<Inner>,
}

impl CostMeter {
    pub fn open(path: &str) -> archive_core::error::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self::from_conn(conn))
    }

    pub fn open_in_memory() -> archive_core::error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            state: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(BUFFER_CAPACITY),
                session_total: 0.0,
                daily_totals: HashMap::new(),
                conversation_totals: HashMap::new(),
            }),
        }
    }

    /// Record a billable call directly (used for whisper/image calls made
    /// outside the `archive-llm` observer hook, e.g. a transcription
    /// plugin's direct HTTP client).
    pub fn record(
        &self,
        provider: &str,
        model: &str,
        kind: EventKind,
        in_tokens: u32,
        out_tokens: u32,
        minutes: f64,
        images: u32,
        conversation_id: Option<&str>,
        request_context: Option<&str>,
    ) -> f64 {
        let cost = cost_usd(provider, model, kind, in_tokens, out_tokens, minutes, images);
        let event = CostEvent {
            ts: Utc::now(),
            provider: provider.to_string(),
            model: model.to_string(),
            kind,
            in_tokens,
            out_tokens,
            total_tokens: in_tokens + out_tokens,
            cost_usd: cost,
            conversation_id: conversation_id.map(String::from),
            request_context: request_context.map(String::from),
        };

        // Update in-memory aggregates inside the lock; persistence happens
        // outside it so a slow disk never stalls concurrent callers.
        {
            let mut state = self.state.lock().unwrap();
            if state.buffer.len() == BUFFER_CAPACITY {
                state.buffer.pop_front();
            }
            state.buffer.push_back(event.clone());
            state.session_total += cost;
            let day = event.ts.format("%Y-%m-%d").to_string();
            *state.daily_totals.entry(day).or_insert(0.0) += cost;
            if let Some(cid) = &event.conversation_id {
                *state.conversation_totals.entry(cid.clone()).or_insert(0.0) += cost;
            }
        }

        self.persist(&event);
        cost
    }

    fn persist(&self, event: &CostEvent) {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO cost_events
             (ts, provider, model, kind, in_tokens, out_tokens, total_tokens, cost_usd,
              conversation_id, request_context)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.ts.to_rfc3339(),
                event.provider,
                event.model,
                event.kind.to_string(),
                event.in_tokens,
                event.out_tokens,
                event.total_tokens,
                event.cost_usd,
                event.conversation_id,
                event.request_context,
            ],
        );
        if let Err(e) = result {
            error!(error = %e, "cost event persistence failed — continuing without it");
        }
    }

    /// Running session total (spec §3). Take a snapshot before a multi-step
    /// operation and diff against this afterward for a per-query cost.
    pub fn session_total(&self) -> f64 {
        self.state.lock().unwrap().session_total
    }

    pub fn daily_total(&self, day: &str) -> f64 {
        self.state
            .lock()
            .unwrap()
            .daily_totals
            .get(day)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn conversation_total(&self, conversation_id: &str) -> f64 {
        self.state
            .lock()
            .unwrap()
            .conversation_totals
            .get(conversation_id)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn recent_events(&self, limit: usize) -> Vec<CostEvent> {
        let state = self.state.lock().unwrap();
        state.buffer.iter().rev().take(limit).cloned().collect()
    }
}

/// A point-in-time snapshot of the session total, used to compute the cost
/// delta of a single query (spec §4.2, §8 P10 and scenario 6).
pub struct CostSnapshot(f64);

impl CostMeter {
    pub fn snapshot(&self) -> CostSnapshot {
        CostSnapshot(self.session_total())
    }

    pub fn delta_since(&self, snapshot: &CostSnapshot) -> f64 {
        self.session_total() - snapshot.0
    }
}

/// Wires `archive-llm`'s provider-call interception hook into this meter
/// (spec §4.2: "intercepted via a callback hook registered on the LLM
/// framework"). `conversation_id`/`request_context` aren't visible on
/// `CallEvent` itself, so callers scope a meter (or pass context some other
/// way) per logical operation when they need per-conversation attribution;
/// this observer always records against the session/day totals.
pub struct CostMeterObserver {
    pub meter: std::sync::Arc<CostMeter>,
    pub conversation_id: Option<String>,
    pub request_context: Option<String>,
}

#[async_trait]
impl LlmCallObserver for CostMeterObserver {
    async fn on_call_complete(&self, event: CallEvent) {
        if !event.ok {
            info!(provider = %event.provider, model = %event.model, "call failed, not billed");
            return;
        }
        let kind = match event.kind {
            CallKind::Chat => EventKind::Chat,
            CallKind::Embed => EventKind::Embed,
            CallKind::Rerank => EventKind::Rerank,
        };
        self.meter.record(
            &event.provider,
            &event.model,
            kind,
            event.tokens_in,
            event.tokens_out,
            0.0,
            0,
            self.conversation_id.as_deref(),
            self.request_context.as_deref(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_delta_matches_recorded_cost() {
        let meter = CostMeter::open_in_memory().unwrap();
        let before = meter.snapshot();
        let cost = meter.record(
            "openai",
            "gpt-4o-mini",
            EventKind::Chat,
            1000,
            1000,
            0.0,
            0,
            Some("conv-1"),
            None,
        );
        let delta = meter.delta_since(&before);
        assert!((delta - cost).abs() < 1e-9);
        assert!((meter.conversation_total("conv-1") - cost).abs() < 1e-9);
    }

    #[test]
    fn buffer_evicts_oldest_when_full() {
        let meter = CostMeter::open_in_memory().unwrap();
        for _ in 0..(BUFFER_CAPACITY + 10) {
            meter.record("openai", "gpt-4o-mini", EventKind::Chat, 1, 1, 0.0, 0, None, None);
        }
        assert_eq!(meter.recent_events(usize::MAX).len(), BUFFER_CAPACITY);
    }
}
