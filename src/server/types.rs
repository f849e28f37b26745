use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    CardContent,
    ReviewSelection,
};

#[derive(Debug, Deserialize)]
pub struct ProcessTextInput {
    pub text: String,
    #[serde(rename = "deckName")]
    pub deck_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractTextInput {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCardsInput {
    #[serde(rename = "deckName")]
    pub deck_name: String,
    pub pairs: Vec<CardContent>,
}

#[derive(Debug, Deserialize)]
pub struct ManualApplyInput {
    #[serde(rename = "deckName")]
    pub deck_name: String,
    pub data: Vec<ReviewSelection>,
}

#[derive(Debug, Deserialize)]
pub struct DeckQuery {
    pub deck_name: Option<String>,
}

/// Per-pair result of an add operation.
#[derive(Debug, Serialize)]
pub struct AddStatus {
    #[serde(rename = "Status")]
    pub status: bool,
    #[serde(rename = "Front")]
    pub front: String,
    #[serde(rename = "Back")]
    pub back: String,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: Vec<AddStatus>,
}

#[derive(Debug, Serialize)]
pub struct PairsResponse {
    pub pairs: Vec<AddStatus>,
}

#[derive(Debug, Serialize)]
pub struct ExtractedPairsResponse {
    pub pairs: Vec<CardContent>,
}

#[derive(Debug, Serialize)]
pub struct DecksResponse {
    pub decks: Vec<String>,
}

/// Per-image result of a multi-image run: either the per-pair statuses or a
/// detail string explaining why the image produced nothing.
#[derive(Debug, Serialize)]
pub struct ImageResult {
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Status")]
    pub status: bool,
    #[serde(rename = "Detail", skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(rename = "Pairs", skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Vec<AddStatus>>,
}

#[derive(Debug, Serialize)]
pub struct ImageResultsResponse {
    pub results: Vec<ImageResult>,
}
