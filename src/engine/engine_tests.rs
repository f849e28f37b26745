use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        atomic::{
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
        Mutex,
    },
};

use async_trait::async_trait;

use super::ReconcileEngine;
use crate::{
    anki::{
        api::Field,
        CardStore,
        MarkerDetail,
        MarkerReport,
        NoteInfo,
        StoreError,
    },
    core::{
        CardContent,
        DuplicateScope,
        OutcomeStatus,
        ReviewSelection,
        SelectedCandidate,
    },
    generator::PairGenerator,
};

/// In-memory stand-in for AnkiConnect with injectable per-note failures.
#[derive(Default)]
struct MockStore {
    offline: bool,
    flagged: Vec<u64>,
    notes: Mutex<HashMap<u64, (String, String)>>,
    next_id: AtomicU64,
    fail_updates: Vec<u64>,
    fail_deletes: Vec<u64>,
    fail_create_fronts: Vec<String>,
    marker_calls: Mutex<Vec<u64>>,
    writes: AtomicUsize,
}

impl MockStore {
    fn new() -> Self {
        Self { next_id: AtomicU64::new(100), ..Default::default() }
    }

    fn with_note(self, id: u64, front: &str, back: &str) -> Self {
        self.notes.lock().unwrap().insert(id, (front.to_string(), back.to_string()));
        let mut store = self;
        store.flagged.push(id);
        store
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn marker_calls(&self) -> Vec<u64> {
        self.marker_calls.lock().unwrap().clone()
    }

    fn has_note(&self, id: u64) -> bool {
        self.notes.lock().unwrap().contains_key(&id)
    }

    fn note_content(&self, id: u64) -> Option<(String, String)> {
        self.notes.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl CardStore for MockStore {
    async fn health_check(&self) -> bool {
        !self.offline
    }

    async fn find_flagged(&self, _deck: &str, _flag: u8) -> Vec<u64> {
        if self.offline {
            return Vec::new();
        }
        self.flagged.clone()
    }

    async fn fetch_by_ids(&self, ids: &[u64]) -> Vec<NoteInfo> {
        if self.offline {
            return Vec::new();
        }
        let notes = self.notes.lock().unwrap();
        ids.iter()
            .filter_map(|id| {
                notes.get(id).map(|(front, back)| NoteInfo {
                    note_id: *id,
                    tags: Vec::new(),
                    fields: HashMap::from([
                        ("Front".to_string(), Field { value: front.clone(), order: 0 }),
                        ("Back".to_string(), Field { value: back.clone(), order: 1 }),
                    ]),
                    model_name: "Basic".to_string(),
                    cards: vec![*id * 10, *id * 10 + 1],
                })
            })
            .collect()
    }

    async fn create(
        &self,
        _deck: &str,
        front: &str,
        back: &str,
        _scope: DuplicateScope,
    ) -> Result<u64, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_fronts.iter().any(|f| f == front) {
            return Err(StoreError::Protocol(
                "cannot create note because it is a duplicate".to_string(),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.notes.lock().unwrap().insert(id, (front.to_string(), back.to_string()));
        Ok(id)
    }

    async fn update(&self, note_id: u64, front: &str, back: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.contains(&note_id) {
            return Err(StoreError::Protocol(format!("note was not found: {}", note_id)));
        }
        let mut notes = self.notes.lock().unwrap();
        match notes.get_mut(&note_id) {
            Some(entry) => {
                *entry = (front.to_string(), back.to_string());
                Ok(())
            }
            None => Err(StoreError::Protocol(format!("note was not found: {}", note_id))),
        }
    }

    async fn delete(&self, note_id: u64) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.contains(&note_id) {
            return Err(StoreError::Protocol(format!("could not delete note {}", note_id)));
        }
        match self.notes.lock().unwrap().remove(&note_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::Protocol(format!("note was not found: {}", note_id))),
        }
    }

    async fn list_decks(&self) -> Result<Vec<String>, StoreError> {
        Ok(vec!["test".to_string()])
    }

    async fn set_review_marker(
        &self,
        note_id: u64,
        _marker: u8,
    ) -> Result<MarkerReport, StoreError> {
        self.marker_calls.lock().unwrap().push(note_id);
        Ok(MarkerReport {
            details: vec![MarkerDetail { card_id: note_id * 10, changed: true, error: None }],
        })
    }
}

/// Generator that replays pre-scripted candidate sets, one script per call,
/// and records the pairs it was given.
#[derive(Default)]
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Vec<Vec<CardContent>>>>,
    inputs: Mutex<Vec<Vec<CardContent>>>,
}

impl ScriptedGenerator {
    fn with_reply(self, reply: Vec<Vec<CardContent>>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    fn inputs(&self) -> Vec<Vec<CardContent>> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PairGenerator for ScriptedGenerator {
    async fn pairs_from_text(&self, _text: &str) -> Vec<CardContent> {
        Vec::new()
    }

    async fn pairs_from_image(&self, _base64_image: &str, _caption: &str) -> Vec<CardContent> {
        Vec::new()
    }

    async fn regenerate(&self, pairs: &[CardContent]) -> Vec<Vec<CardContent>> {
        self.inputs.lock().unwrap().push(pairs.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Vec::new(); pairs.len()])
    }
}

fn pair(front: &str, back: &str) -> CardContent {
    CardContent::new(front, back)
}

fn selection(note_id: u64, old: (&str, &str), candidates: Vec<(&str, &str, bool)>) -> ReviewSelection {
    ReviewSelection {
        note_id,
        old_front: old.0.to_string(),
        old_back: old.1.to_string(),
        candidates: candidates
            .into_iter()
            .map(|(front, back, selected)| SelectedCandidate {
                front: front.to_string(),
                back: back.to_string(),
                selected,
            })
            .collect(),
    }
}

#[tokio::test]
async fn mixed_batch_emits_one_record_per_operation() {
    let store = MockStore::new()
        .with_note(1, "f1", "b1")
        .with_note(2, "f2", "b2")
        .with_note(3, "f3", "b3");
    let generator = ScriptedGenerator::default().with_reply(vec![
        vec![pair("f1+", "b1+")],
        vec![],
        vec![pair("x1", "y1"), pair("x2", "y2"), pair("x3", "y3")],
    ]);
    let engine = ReconcileEngine::new(store, generator);

    let records = engine.reconcile_auto("test", 1).await;

    // 3 input cards, candidate sets of [1, 0, 3] => 6 records.
    assert_eq!(records.len(), 6);

    assert_eq!(records[0].note_id, 1);
    assert_eq!(records[0].status, OutcomeStatus::Ok);
    assert_eq!(records[0].after_front, "f1+");

    assert_eq!(records[1].note_id, 2);
    assert_eq!(records[1].status, OutcomeStatus::NoChanges);
    assert_eq!(records[1].after_front, records[1].before_front);
    assert_eq!(records[1].after_back, records[1].before_back);

    assert_eq!(records[2].note_id, 3);
    assert_eq!(records[2].status, OutcomeStatus::DeletedOld);
    assert_eq!(records[2].after_front, "(deleted)");

    for (i, record) in records[3..].iter().enumerate() {
        assert_eq!(record.status, OutcomeStatus::AddNew);
        assert_eq!(record.note_id, 100 + i as u64);
        assert_eq!(record.before_front, "f3");
    }

    let store = engine.store();
    assert_eq!(store.note_content(1), Some(("f1+".to_string(), "b1+".to_string())));
    assert!(!store.has_note(3));
    assert!(store.has_note(100) && store.has_note(101) && store.has_note(102));
}

#[tokio::test]
async fn misaligned_candidate_sets_discard_the_whole_batch() {
    let store = MockStore::new()
        .with_note(1, "f1", "b1")
        .with_note(2, "f2", "b2")
        .with_note(3, "f3", "b3");
    // Two sets for three cards: alignment is unknowable.
    let generator = ScriptedGenerator::default()
        .with_reply(vec![vec![pair("a", "b")], vec![pair("c", "d")]]);
    let engine = ReconcileEngine::new(store, generator);

    let records = engine.reconcile_auto("test", 1).await;

    assert!(records.is_empty());
    assert_eq!(engine.store().writes(), 0);
}

#[tokio::test]
async fn unreachable_store_yields_empty_outcome() {
    let mut store = MockStore::new().with_note(1, "f1", "b1");
    store.offline = true;
    let engine = ReconcileEngine::new(store, ScriptedGenerator::default());

    let records = engine.reconcile_auto("test", 1).await;

    assert!(records.is_empty());
    assert!(engine.generator().inputs().is_empty());
}

#[tokio::test]
async fn failed_update_records_the_attempted_content() {
    let mut store = MockStore::new().with_note(1, "f1", "b1");
    store.fail_updates.push(1);
    let generator = ScriptedGenerator::default().with_reply(vec![vec![pair("f1+", "b1+")]]);
    let engine = ReconcileEngine::new(store, generator);

    let records = engine.reconcile_auto("test", 1).await;

    assert_eq!(records.len(), 1);
    assert!(matches!(records[0].status, OutcomeStatus::UpdateError(_)));
    assert_eq!(records[0].after_front, "f1+");
    assert_eq!(records[0].after_back, "b1+");
}

#[tokio::test]
async fn failed_delete_aborts_only_that_card() {
    let mut store = MockStore::new().with_note(1, "f1", "b1").with_note(2, "f2", "b2");
    store.fail_deletes.push(1);
    let generator = ScriptedGenerator::default().with_reply(vec![
        vec![pair("x1", "y1"), pair("x2", "y2")],
        vec![pair("f2+", "b2+")],
    ]);
    let engine = ReconcileEngine::new(store, generator);

    let records = engine.reconcile_auto("test", 1).await;

    // Card 1: one DELETE_ERROR record, no creates. Card 2 proceeds normally.
    assert_eq!(records.len(), 2);
    assert!(matches!(records[0].status, OutcomeStatus::DeleteError(_)));
    assert_eq!(records[0].after_front, "f1");
    assert_eq!(records[1].note_id, 2);
    assert_eq!(records[1].status, OutcomeStatus::Ok);
    assert!(engine.store().has_note(1));
}

#[tokio::test]
async fn failed_create_after_delete_is_recorded_not_undone() {
    let mut store = MockStore::new().with_note(1, "f1", "b1");
    store.fail_create_fronts.push("x2".to_string());
    let generator = ScriptedGenerator::default()
        .with_reply(vec![vec![pair("x1", "y1"), pair("x2", "y2")]]);
    let engine = ReconcileEngine::new(store, generator);

    let records = engine.reconcile_auto("test", 1).await;

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].status, OutcomeStatus::DeletedOld);
    assert_eq!(records[1].status, OutcomeStatus::AddNew);
    assert!(matches!(records[2].status, OutcomeStatus::AddError(_)));
    assert_eq!(records[2].note_id, 0);
    // No compensating re-create of the original: it stays deleted.
    assert!(!engine.store().has_note(1));
}

#[tokio::test]
async fn batches_are_chunked_and_sent_whole() {
    let mut store = MockStore::new();
    for id in 1..=7 {
        store = store.with_note(id, &format!("f{}", id), &format!("b{}", id));
    }
    let engine = ReconcileEngine::new(store, ScriptedGenerator::default()).with_chunk_size(3);

    let records = engine.reconcile_auto("test", 1).await;

    // Empty-shaped fallback replies: every card is a NO_CHANGES.
    assert_eq!(records.len(), 7);
    let sizes: Vec<usize> = engine.generator().inputs().iter().map(|i| i.len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[tokio::test]
async fn sound_tags_are_stripped_before_the_generator_sees_them() {
    let store = MockStore::new().with_note(1, "hello [sound:word.mp3]", "b1 [sound:b.ogg]");
    let engine = ReconcileEngine::new(store, ScriptedGenerator::default());

    let records = engine.reconcile_auto("test", 1).await;

    let inputs = engine.generator().inputs();
    assert_eq!(inputs[0][0], pair("hello", "b1"));
    assert_eq!(records[0].before_front, "hello");
    assert_eq!(records[0].status, OutcomeStatus::NoChanges);
}

#[tokio::test]
async fn manual_preview_is_readonly_and_stable() {
    let reply = vec![vec![pair("f1+", "b1+")], vec![]];
    let store = MockStore::new().with_note(1, "f1", "b1").with_note(2, "f2", "b2");
    let generator = ScriptedGenerator::default()
        .with_reply(reply.clone())
        .with_reply(reply);
    let engine = ReconcileEngine::new(store, generator);

    let first = engine.manual_preview("test", 1).await;
    let second = engine.manual_preview("test", 1).await;

    assert_eq!(first.len(), 2);
    assert_eq!(first[0].candidates, vec![pair("f1+", "b1+")]);
    assert!(first[1].candidates.is_empty());
    assert_eq!(first, second);
    assert_eq!(engine.store().writes(), 0);
}

#[tokio::test]
async fn selection_with_nothing_selected_is_skipped() {
    let store = MockStore::new().with_note(1, "f1", "b1");
    let engine = ReconcileEngine::new(store, ScriptedGenerator::default());

    let selections = vec![selection(1, ("f1", "b1"), vec![("f1+", "b1+", false)])];
    let records = engine.apply_selection("test", &selections).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, OutcomeStatus::Skip("No suggestions selected".to_string()));
    assert_eq!(records[0].after_front, "f1");
    assert_eq!(engine.store().writes(), 0);
    assert!(engine.store().marker_calls().is_empty());
}

#[tokio::test]
async fn selection_with_two_chosen_updates_then_creates() {
    let store = MockStore::new().with_note(1, "f1", "b1");
    let engine = ReconcileEngine::new(store, ScriptedGenerator::default());

    let selections = vec![selection(
        1,
        ("f1", "b1"),
        vec![("f1a", "b1a", true), ("skipped", "skipped", false), ("f1b", "b1b", true)],
    )];
    let records = engine.apply_selection("test", &selections).await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].note_id, 1);
    assert_eq!(records[0].status, OutcomeStatus::Ok);
    assert_eq!(records[0].after_front, "f1a");
    assert_eq!(records[1].status, OutcomeStatus::AddNew);
    assert_eq!(records[1].note_id, 100);
    assert_eq!(records[1].before_front, "f1");

    // Marker lands once for the update and once more per spawned create,
    // always on the original note.
    assert_eq!(engine.store().marker_calls(), vec![1, 1]);
}

#[tokio::test]
async fn selection_update_failure_aborts_that_item() {
    let mut store = MockStore::new().with_note(1, "f1", "b1").with_note(2, "f2", "b2");
    store.fail_updates.push(1);
    let engine = ReconcileEngine::new(store, ScriptedGenerator::default());

    let selections = vec![
        selection(1, ("f1", "b1"), vec![("f1a", "b1a", true), ("f1b", "b1b", true)]),
        selection(2, ("f2", "b2"), vec![("f2+", "b2+", true)]),
    ];
    let records = engine.apply_selection("test", &selections).await;

    // Item 1: the failed update suppresses its create. Item 2 is unaffected.
    assert_eq!(records.len(), 2);
    assert!(matches!(records[0].status, OutcomeStatus::UpdateError(_)));
    assert_eq!(records[1].note_id, 2);
    assert_eq!(records[1].status, OutcomeStatus::Ok);
    assert_eq!(engine.store().marker_calls(), vec![2]);
}
