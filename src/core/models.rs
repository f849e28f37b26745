use std::fmt;

use serde::{
    Deserialize,
    Serialize,
    Serializer,
};

/// Front/back text of a card, without store identity. Field names follow the
/// wire shape shared by the model API and the HTTP clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardContent {
    #[serde(rename = "Front")]
    pub front: String,
    #[serde(rename = "Back")]
    pub back: String,
}

impl CardContent {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self { front: front.into(), back: back.into() }
    }
}

/// A persisted card projected out of the store: note id plus content fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedCard {
    pub note_id: u64,
    pub front: String,
    pub back: String,
}

/// Terminal status of one card-level operation. Serialized as the literal
/// status string so the audit trail carries error text verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Ok,
    NoChanges,
    DeletedOld,
    AddNew,
    Skip(String),
    UpdateError(String),
    DeleteError(String),
    AddError(String),
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Ok => write!(f, "OK"),
            OutcomeStatus::NoChanges => write!(f, "NO_CHANGES"),
            OutcomeStatus::DeletedOld => write!(f, "DELETED_OLD"),
            OutcomeStatus::AddNew => write!(f, "ADD_NEW"),
            OutcomeStatus::Skip(reason) => write!(f, "SKIP: {}", reason),
            OutcomeStatus::UpdateError(reason) => write!(f, "UPDATE_ERROR: {}", reason),
            OutcomeStatus::DeleteError(reason) => write!(f, "DELETE_ERROR: {}", reason),
            OutcomeStatus::AddError(reason) => write!(f, "ADD_ERROR: {}", reason),
        }
    }
}

impl Serialize for OutcomeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One row of the before/after audit trail. Updates and no-ops produce one
/// record per original card; a split adds one record per created card, where
/// `note_id` is the new id on success and 0 when the create failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub note_id: u64,
    pub before_front: String,
    pub before_back: String,
    pub after_front: String,
    pub after_back: String,
    pub status: OutcomeStatus,
}

/// Manual-review row: one flagged card with the raw candidate set proposed
/// for it (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardProposal {
    #[serde(rename = "noteId")]
    pub note_id: u64,
    #[serde(rename = "Front")]
    pub front: String,
    #[serde(rename = "Back")]
    pub back: String,
    #[serde(rename = "New")]
    pub candidates: Vec<CardContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectedCandidate {
    #[serde(rename = "Front")]
    pub front: String,
    #[serde(rename = "Back")]
    pub back: String,
    pub selected: bool,
}

/// A reviewer's verdict for one flagged card: which of the proposed
/// candidates to apply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSelection {
    pub note_id: u64,
    pub old_front: String,
    pub old_back: String,
    #[serde(rename = "newSuggestions")]
    pub candidates: Vec<SelectedCandidate>,
}

/// Scope of duplicate detection when creating a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateScope {
    SameDeck,
    IncludeSubdecks,
    AllNoteTypes,
}
