use tracing::{
    info,
    warn,
};

use crate::{
    anki::CardStore,
    core::{
        utils::strip_sound_tags,
        CardContent,
        CardProposal,
        DuplicateScope,
        FlaggedCard,
        OutcomeRecord,
        OutcomeStatus,
        ReviewSelection,
        SelectedCandidate,
    },
    generator::PairGenerator,
};

#[cfg(test)]
mod engine_tests;

/// Small enough that a single regenerate call stays fast and cheap.
pub const DEFAULT_CHUNK_SIZE: usize = 5;

/// Orange flag: marks a note as touched by the engine, distinct from the
/// selection flag that queues cards for reconciliation.
pub const DEFAULT_REVIEW_MARKER: u8 = 2;

const DELETED_SENTINEL: &str = "(deleted)";

const FRONT_FIELD: &str = "Front";
const BACK_FIELD: &str = "Back";

/// Reconciliation engine: pulls flagged cards out of the store, asks the pair
/// generator for replacements, and applies the one-to-many split policy with
/// per-card failure isolation.
///
/// Batches run to completion one at a time; the store is a single-user
/// desktop endpoint and the generator is rate-sensitive, so no fan-out here.
pub struct ReconcileEngine<S, G> {
    store: S,
    generator: G,
    chunk_size: usize,
    review_marker: u8,
    duplicate_scope: DuplicateScope,
}

impl<S: CardStore, G: PairGenerator> ReconcileEngine<S, G> {
    pub fn new(store: S, generator: G) -> Self {
        Self {
            store,
            generator,
            chunk_size: DEFAULT_CHUNK_SIZE,
            review_marker: DEFAULT_REVIEW_MARKER,
            duplicate_scope: DuplicateScope::AllNoteTypes,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_review_marker(mut self, marker: u8) -> Self {
        self.review_marker = marker;
        self
    }

    pub fn with_duplicate_scope(mut self, scope: DuplicateScope) -> Self {
        self.duplicate_scope = scope;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Reads flagged notes and projects them to cards, stripping audio
    /// markup so the generator never sees `[sound:...]` tags.
    async fn fetch_flagged_cards(&self, deck: &str, flag: u8) -> Vec<FlaggedCard> {
        let ids = self.store.find_flagged(deck, flag).await;
        if ids.is_empty() {
            return Vec::new();
        }
        let notes = self.store.fetch_by_ids(&ids).await;

        let mut cards = Vec::with_capacity(notes.len());
        for note in notes {
            let (front, back) = match (note.field_value(FRONT_FIELD), note.field_value(BACK_FIELD))
            {
                (Some(front), Some(back)) => (front, back),
                _ => {
                    warn!("note {} has no Front/Back fields, skipping", note.note_id);
                    continue;
                }
            };
            cards.push(FlaggedCard {
                note_id: note.note_id,
                front: strip_sound_tags(front),
                back: strip_sound_tags(back),
            });
        }
        cards
    }

    /// Fully automatic reconciliation: every flagged card is updated, split,
    /// or left alone according to the generator's candidate sets. Returns one
    /// audit record per card-level operation, in processing order.
    pub async fn reconcile_auto(&self, deck: &str, flag: u8) -> Vec<OutcomeRecord> {
        let cards = self.fetch_flagged_cards(deck, flag).await;
        if cards.is_empty() {
            return Vec::new();
        }
        info!("reconciling {} flagged cards in deck {}", cards.len(), deck);

        let mut records = Vec::new();
        for batch in cards.chunks(self.chunk_size) {
            let pairs: Vec<CardContent> =
                batch.iter().map(|c| CardContent::new(&c.front, &c.back)).collect();
            let candidate_sets = self.generator.regenerate(&pairs).await;

            // A misaligned reply cannot be attributed to the right cards.
            // Drop the whole batch rather than guess; the cards stay flagged.
            if candidate_sets.len() != batch.len() {
                warn!(
                    "generator returned {} candidate sets for a batch of {}, discarding batch",
                    candidate_sets.len(),
                    batch.len()
                );
                continue;
            }

            for (card, candidates) in batch.iter().zip(candidate_sets) {
                self.apply_candidates(deck, card, candidates, &mut records).await;
            }
        }
        records
    }

    /// Split policy for one card within a valid batch. Failures here are
    /// isolated: sibling cards in the batch are unaffected.
    async fn apply_candidates(
        &self,
        deck: &str,
        card: &FlaggedCard,
        candidates: Vec<CardContent>,
        records: &mut Vec<OutcomeRecord>,
    ) {
        match candidates.len() {
            0 => {
                records.push(record(card, &card.front, &card.back, OutcomeStatus::NoChanges));
            }
            1 => {
                let candidate = &candidates[0];
                let status = match self.store.update(card.note_id, &candidate.front, &candidate.back).await
                {
                    Ok(()) => OutcomeStatus::Ok,
                    Err(e) => OutcomeStatus::UpdateError(e.to_string()),
                };
                // The audit trail shows the attempted value even on failure.
                records.push(record(card, &candidate.front, &candidate.back, status));
            }
            _ => {
                if let Err(e) = self.store.delete(card.note_id).await {
                    records.push(record(
                        card,
                        &card.front,
                        &card.back,
                        OutcomeStatus::DeleteError(e.to_string()),
                    ));
                    // Original still exists; creating replacements now would
                    // duplicate it. Abort this card only.
                    return;
                }
                records.push(record(
                    card,
                    DELETED_SENTINEL,
                    DELETED_SENTINEL,
                    OutcomeStatus::DeletedOld,
                ));

                for candidate in &candidates {
                    let (note_id, status) = match self
                        .store
                        .create(deck, &candidate.front, &candidate.back, self.duplicate_scope)
                        .await
                    {
                        Ok(new_id) => (new_id, OutcomeStatus::AddNew),
                        Err(e) => (0, OutcomeStatus::AddError(e.to_string())),
                    };
                    records.push(OutcomeRecord {
                        note_id,
                        before_front: card.front.clone(),
                        before_back: card.back.clone(),
                        after_front: candidate.front.clone(),
                        after_back: candidate.back.clone(),
                        status,
                    });
                }
            }
        }
    }

    /// Computes proposals without touching the store: each flagged card is
    /// paired with its raw candidate set for human review.
    pub async fn manual_preview(&self, deck: &str, flag: u8) -> Vec<CardProposal> {
        let cards = self.fetch_flagged_cards(deck, flag).await;
        if cards.is_empty() {
            return Vec::new();
        }

        let mut proposals = Vec::with_capacity(cards.len());
        for batch in cards.chunks(self.chunk_size) {
            let pairs: Vec<CardContent> =
                batch.iter().map(|c| CardContent::new(&c.front, &c.back)).collect();
            let candidate_sets = self.generator.regenerate(&pairs).await;

            if candidate_sets.len() != batch.len() {
                warn!(
                    "generator returned {} candidate sets for a batch of {}, discarding batch",
                    candidate_sets.len(),
                    batch.len()
                );
                continue;
            }

            for (card, candidates) in batch.iter().zip(candidate_sets) {
                proposals.push(CardProposal {
                    note_id: card.note_id,
                    front: card.front.clone(),
                    back: card.back.clone(),
                    candidates,
                });
            }
        }
        proposals
    }

    /// Applies a reviewer's per-card selections. The first selected candidate
    /// reuses the original note; further selections become new notes. The
    /// review marker is applied after the update and again after each create
    /// (idempotent, preserved behavior).
    pub async fn apply_selection(
        &self,
        deck: &str,
        selections: &[ReviewSelection],
    ) -> Vec<OutcomeRecord> {
        let mut records = Vec::new();

        for selection in selections {
            let chosen: Vec<&SelectedCandidate> =
                selection.candidates.iter().filter(|c| c.selected).collect();

            if chosen.is_empty() {
                records.push(OutcomeRecord {
                    note_id: selection.note_id,
                    before_front: selection.old_front.clone(),
                    before_back: selection.old_back.clone(),
                    after_front: selection.old_front.clone(),
                    after_back: selection.old_back.clone(),
                    status: OutcomeStatus::Skip("No suggestions selected".to_string()),
                });
                continue;
            }

            let first = chosen[0];
            match self.store.update(selection.note_id, &first.front, &first.back).await {
                Ok(()) => {
                    self.mark_reviewed(selection.note_id).await;
                    records.push(OutcomeRecord {
                        note_id: selection.note_id,
                        before_front: selection.old_front.clone(),
                        before_back: selection.old_back.clone(),
                        after_front: first.front.clone(),
                        after_back: first.back.clone(),
                        status: OutcomeStatus::Ok,
                    });
                }
                Err(e) => {
                    records.push(OutcomeRecord {
                        note_id: selection.note_id,
                        before_front: selection.old_front.clone(),
                        before_back: selection.old_back.clone(),
                        after_front: first.front.clone(),
                        after_back: first.back.clone(),
                        status: OutcomeStatus::UpdateError(e.to_string()),
                    });
                    // Leave the rest of this card's selections unapplied.
                    continue;
                }
            }

            for candidate in &chosen[1..] {
                let (note_id, status) = match self
                    .store
                    .create(deck, &candidate.front, &candidate.back, self.duplicate_scope)
                    .await
                {
                    Ok(new_id) => (new_id, OutcomeStatus::AddNew),
                    Err(e) => (0, OutcomeStatus::AddError(e.to_string())),
                };
                records.push(OutcomeRecord {
                    note_id,
                    before_front: selection.old_front.clone(),
                    before_back: selection.old_back.clone(),
                    after_front: candidate.front.clone(),
                    after_back: candidate.back.clone(),
                    status,
                });
                self.mark_reviewed(selection.note_id).await;
            }
        }
        records
    }

    /// Adds freshly extracted pairs to the deck, one create per pair.
    /// Duplicate rejection comes back as a non-success result like any other
    /// protocol error.
    pub async fn add_cards(
        &self,
        deck: &str,
        pairs: &[CardContent],
    ) -> Vec<(CardContent, Result<u64, crate::anki::StoreError>)> {
        let mut results = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let outcome =
                self.store.create(deck, &pair.front, &pair.back, self.duplicate_scope).await;
            results.push((pair.clone(), outcome));
        }
        results
    }

    async fn mark_reviewed(&self, note_id: u64) {
        match self.store.set_review_marker(note_id, self.review_marker).await {
            Ok(report) if report.succeeded() => {}
            Ok(_) => warn!("review marker did not stick on any card of note {}", note_id),
            Err(e) => warn!("failed to set review marker on note {}: {}", note_id, e),
        }
    }
}

fn record(card: &FlaggedCard, after_front: &str, after_back: &str, status: OutcomeStatus) -> OutcomeRecord {
    OutcomeRecord {
        note_id: card.note_id,
        before_front: card.front.clone(),
        before_back: card.back.clone(),
        after_front: after_front.to_string(),
        after_back: after_back.to_string(),
        status,
    }
}
