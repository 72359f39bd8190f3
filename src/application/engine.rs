//! Cycle distribution engine.
//!
//! Selects the next batch of phrases so that, across repeated dispatches,
//! every phrase is delivered before any phrase repeats. One full pass over
//! the catalog is a cycle; cycle state is derived from the rows on every
//! selection rather than stored, so it cannot drift.
//!
//! Selection order:
//!
//! 1. stray pass — phrases never delivered under the current scheme
//!    (`cycle_number = 0` or no timestamp) have catch-up priority
//! 2. reconciliation — a non-empty but short stray pool folds every
//!    unselected phrase back into the stray class and tops up from it
//! 3. normal rotation — phrases not yet delivered in the cycle being
//!    filled, uniformly at random
//! 4. full reset — only when rotation is empty and the cycle is complete
//!
//! All of this happens on a single [`PhraseUnit`] transaction that stays
//! open inside the returned [`PendingBatch`]; the caller decides between
//! [`PendingBatch::confirm`] (mark delivered + commit) and
//! [`PendingBatch::abandon`] after the sink has accepted or rejected the
//! rendered digest. Either way, row state only ever changes as a whole.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::application::repos::{PhraseStore, PhraseUnit, RepoError};
use crate::domain::entities::PhraseRecord;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Zero rotation candidates while the cycle is incomplete. Surfaced
    /// distinctly so operators can tell data corruption from "no work".
    #[error("inconsistent cycle state: {context}")]
    InconsistentState { context: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Snapshot of the derived cycle state, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOverview {
    pub current_cycle: i32,
    pub total: i64,
    pub delivered_in_cycle: i64,
    pub cycle_complete: bool,
}

/// A selected batch whose transaction is still open.
///
/// Dropping a pending batch rolls everything back, including any
/// reconciliation resets performed during selection.
pub struct PendingBatch {
    unit: Box<dyn PhraseUnit>,
    phrases: Vec<PhraseRecord>,
    cycle: i32,
    touched_unselected: bool,
}

impl std::fmt::Debug for PendingBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingBatch")
            .field("phrases", &self.phrases)
            .field("cycle", &self.cycle)
            .field("touched_unselected", &self.touched_unselected)
            .finish_non_exhaustive()
    }
}

impl PendingBatch {
    pub fn phrases(&self) -> &[PhraseRecord] {
        &self.phrases
    }

    pub fn cycle(&self) -> i32 {
        self.cycle
    }

    /// True when selection reset phrases outside the batch (reconciliation
    /// or full reset), so cached snapshots of the whole namespace are stale
    /// once confirmed.
    pub fn touched_unselected(&self) -> bool {
        self.touched_unselected
    }

    /// Mark the batch delivered in this cycle and commit, returning the
    /// delivered ids.
    pub async fn confirm(mut self) -> Result<Vec<i64>, EngineError> {
        let ids: Vec<i64> = self.phrases.iter().map(|phrase| phrase.id).collect();
        self.unit
            .mark_delivered(&ids, self.cycle, OffsetDateTime::now_utc())
            .await?;
        self.unit.commit().await?;
        info!(
            target = "application::engine",
            delivered = ids.len(),
            cycle = self.cycle,
            "batch marked delivered"
        );
        Ok(ids)
    }

    /// Roll the selection back, leaving row state exactly as before.
    pub async fn abandon(self) -> Result<(), EngineError> {
        self.unit.rollback().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct CycleEngine {
    store: Arc<dyn PhraseStore>,
}

impl CycleEngine {
    pub fn new(store: Arc<dyn PhraseStore>) -> Self {
        Self { store }
    }

    /// Select up to `batch_size` phrases for delivery.
    ///
    /// `Ok(None)` means nothing is eligible (empty catalog or empty batch
    /// size) and is not an error. Batch size is a ceiling: when fewer
    /// phrases remain in the cycle than requested, the batch is short.
    pub async fn select_next_batch(
        &self,
        batch_size: usize,
    ) -> Result<Option<PendingBatch>, EngineError> {
        if batch_size == 0 {
            return Ok(None);
        }

        let mut unit = self.store.begin().await?;
        let total = unit.count_total().await?;
        if total == 0 {
            unit.rollback().await?;
            return Ok(None);
        }

        let limit = batch_size as i64;
        let (cycle, cycle_complete) = derive_cycle(unit.as_mut(), total).await?;
        debug!(
            target = "application::engine",
            cycle, cycle_complete, total, "cycle state derived"
        );

        let mut touched_unselected = false;
        let mut selected = unit.find_eligible_stray(limit).await?;

        if !selected.is_empty() && (selected.len() as i64) < limit {
            // The stray pool is short of a full batch: fold every phrase
            // outside the selection back into the stray class and top up,
            // so a partially stocked pool cannot starve rotation.
            unit.reset_except(&selected).await?;
            touched_unselected = true;
            let needed = limit - selected.len() as i64;
            let more = unit.find_unsent_excluding(&selected, needed).await?;
            debug!(
                target = "application::engine",
                strays = selected.len(),
                reconciled = more.len(),
                "stray pool reconciled"
            );
            selected.extend(more);
        }

        if selected.is_empty() {
            selected = unit.find_eligible_rotation(cycle, limit).await?;

            if selected.is_empty() {
                if cycle_complete {
                    // Completed cycle with nothing selectable: restart the
                    // scheme from scratch and retry the selection once.
                    unit.reset_all().await?;
                    touched_unselected = true;
                    selected = unit.find_eligible_stray(limit).await?;
                } else {
                    unit.rollback().await?;
                    return Err(EngineError::InconsistentState {
                        context: format!(
                            "select_next_batch: no rotation candidates below cycle {cycle} \
                             while {total} phrases report the cycle incomplete"
                        ),
                    });
                }
            }
        }

        if selected.is_empty() {
            unit.rollback().await?;
            return Ok(None);
        }

        let phrases = unit.fetch_detail(&selected).await?;
        Ok(Some(PendingBatch {
            unit,
            phrases,
            cycle,
            touched_unselected,
        }))
    }

    /// Derived cycle state on a read-only unit.
    pub async fn overview(&self) -> Result<CycleOverview, EngineError> {
        let mut unit = self.store.begin().await?;
        let total = unit.count_total().await?;
        let current_cycle = unit.current_cycle().await?;
        let delivered_in_cycle = if current_cycle > 0 {
            unit.count_at_cycle(current_cycle).await?
        } else {
            0
        };
        unit.rollback().await?;

        Ok(CycleOverview {
            current_cycle,
            total,
            delivered_in_cycle,
            cycle_complete: total > 0 && delivered_in_cycle >= total,
        })
    }
}

/// Compute the cycle being filled and whether the previous one completed.
///
/// No delivery anywhere means cycle 1 is starting; a complete cycle rolls
/// the counter forward. Comparisons are `>=` against the total on purpose:
/// an off-by-one here silently breaks the no-repeat guarantee.
async fn derive_cycle(unit: &mut dyn PhraseUnit, total: i64) -> Result<(i32, bool), RepoError> {
    let current = unit.current_cycle().await?;
    if current == 0 {
        return Ok((1, false));
    }
    let delivered = unit.count_at_cycle(current).await?;
    if delivered >= total {
        Ok((current + 1, true))
    } else {
        Ok((current, false))
    }
}
