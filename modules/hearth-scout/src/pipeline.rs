//! Discovery run orchestration.
//!
//! Stages run in strict sequence (ingest, merge, filter, score, propose)
//! because each consumes the complete output of the one before it. Work
//! inside a stage fans out with bounded parallelism. A store-side run lock
//! serializes whole runs; concurrent batches would mint duplicate canonical
//! events.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use hearth_common::config::ConfigCache;
use hearth_common::store::EventStore;
use hearth_common::types::{CanonicalEvent, EventStatus};
use hearth_common::HearthError;

use crate::filters::FilterEngine;
use crate::ingest::{ingest_batch, RawCandidate};
use crate::merge::MergeEngine;
use crate::scoring::{OrderingMode, ScoringEngine};

/// Events surfaced for approval per run.
const DEFAULT_PROPOSAL_LIMIT: usize = 5;

#[derive(Debug, Default)]
pub struct RunStats {
    pub run_id: Uuid,
    pub candidates_in: u32,
    pub dropped_at_ingest: u32,
    pub exact_merges: u32,
    pub fuzzy_merges: u32,
    pub events_created: u32,
    pub filtered_pass: u32,
    pub filtered_fail: u32,
    pub proposed: u32,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub stats: RunStats,
    /// The events moved to `proposed` this run, in rank order.
    pub proposed: Vec<CanonicalEvent>,
}

pub struct DiscoveryPipeline {
    store: Arc<dyn EventStore>,
    merge_engine: MergeEngine,
    filter_engine: FilterEngine,
    scoring_engine: ScoringEngine,
    config_cache: Arc<ConfigCache>,
    ordering: OrderingMode,
    proposal_limit: usize,
}

impl DiscoveryPipeline {
    pub fn new(
        store: Arc<dyn EventStore>,
        filter_engine: FilterEngine,
        scoring_engine: ScoringEngine,
        config_cache: Arc<ConfigCache>,
    ) -> Self {
        Self {
            store,
            merge_engine: MergeEngine::new(),
            filter_engine,
            scoring_engine,
            config_cache,
            ordering: OrderingMode::Default,
            proposal_limit: DEFAULT_PROPOSAL_LIMIT,
        }
    }

    pub fn with_ordering(mut self, ordering: OrderingMode) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_proposal_limit(mut self, limit: usize) -> Self {
        self.proposal_limit = limit;
        self
    }

    /// Execute one discovery run over a scraped candidate batch.
    pub async fn run(&self, raw: Vec<RawCandidate>) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        if !self.store.acquire_run_lock(run_id).await? {
            return Err(HearthError::RunLockConflict.into());
        }

        let result = self.execute(run_id, raw).await;
        self.store.release_run_lock(run_id).await?;
        result
    }

    async fn execute(&self, run_id: Uuid, raw: Vec<RawCandidate>) -> Result<RunOutcome> {
        let now = Utc::now();
        let mut stats = RunStats {
            run_id,
            candidates_in: raw.len() as u32,
            ..Default::default()
        };

        // Stage 1: validate and coerce at the boundary.
        let (candidates, ingest_stats) = ingest_batch(raw);
        stats.dropped_at_ingest = ingest_stats.dropped;

        // Stage 2: identity resolution against the existing canonical set.
        let existing = self.store.active_events().await?;
        let outcome = self
            .merge_engine
            .merge(candidates, existing, now);
        stats.exact_merges = outcome.stats.exact_merges;
        stats.fuzzy_merges = outcome.stats.fuzzy_merges;
        stats.events_created = outcome.stats.created;

        for event in &outcome.canonical {
            self.store.upsert_event(event).await?;
        }
        for record in &outcome.merges {
            self.store.append_merge_record(record).await?;
        }

        // Stage 3: eligibility filtering over newly discovered events, with
        // a config snapshot fetched fresh through the cache.
        let mut household = self.config_cache.snapshot(now).await?;
        household
            .attended_fingerprints
            .extend(self.store.attended_fingerprints().await?);

        let discovered: Vec<CanonicalEvent> = outcome
            .canonical
            .into_iter()
            .filter(|e| e.status == EventStatus::Discovered)
            .collect();

        let results = self
            .filter_engine
            .filter_batch(&discovered, &household, now)
            .await;

        let mut passers = Vec::new();
        for (mut event, result) in discovered.into_iter().zip(results) {
            let passed = result.passed;
            event.filter = Some(result);
            self.store.upsert_event(&event).await?;
            if passed {
                stats.filtered_pass += 1;
                passers.push(event);
            } else {
                stats.filtered_fail += 1;
            }
        }

        // Stage 4: score and rank everything that survived.
        let ranked = self.scoring_engine.score(passers, self.ordering, now);
        for event in &ranked {
            self.store.upsert_event(event).await?;
        }

        // Stage 5: surface the top of the ranking for approval.
        let mut proposed = Vec::new();
        for event in ranked.into_iter().take(self.proposal_limit) {
            let applied = self
                .store
                .transition_status(event.id, EventStatus::Discovered, EventStatus::Proposed)
                .await?;
            if applied {
                stats.proposed += 1;
                proposed.push(event);
            }
        }

        info!(
            run_id = %stats.run_id,
            candidates = stats.candidates_in,
            dropped = stats.dropped_at_ingest,
            exact = stats.exact_merges,
            fuzzy = stats.fuzzy_merges,
            created = stats.events_created,
            passed = stats.filtered_pass,
            failed = stats.filtered_fail,
            proposed = stats.proposed,
            "Discovery run complete"
        );

        Ok(RunOutcome { stats, proposed })
    }
}

/// Age cutoff helper for the retention path: events first seen before the
/// returned instant are eligible for cleanup.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    now - chrono::Duration::days(retention_days)
}
