use std::sync::Arc;

use axum::{
    extract::{
        Multipart,
        Query,
        State,
    },
    http::StatusCode,
    routing::{
        get,
        post,
    },
    Json,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{
    error,
    info,
};

use crate::{
    anki::{
        AnkiClient,
        CardStore,
        StoreError,
    },
    core::{
        CardContent,
        CardProposal,
        ForgeError,
        OutcomeRecord,
    },
    engine::ReconcileEngine,
    generator::{
        OpenAiGenerator,
        PairGenerator,
    },
    ingest::{
        self,
        EncodedImage,
    },
};

pub mod types;

use types::{
    AddCardsInput,
    AddStatus,
    DeckQuery,
    DecksResponse,
    ExtractTextInput,
    ExtractedPairsResponse,
    ImageResult,
    ImageResultsResponse,
    ManualApplyInput,
    PairsResponse,
    ProcessTextInput,
    StatusResponse,
};

type ApiError = (StatusCode, String);

/// Shared state for every route: one engine instance for the process, plus
/// the deck/flag defaults the reconciliation routes fall back to.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconcileEngine<AnkiClient, OpenAiGenerator>>,
    pub default_deck: String,
    pub reconcile_flag: u8,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process_text", post(process_text))
        .route("/process_images", post(process_images))
        .route("/extract_text", post(extract_text))
        .route("/extract_images", post(extract_images))
        .route("/add_cards", post(add_cards))
        .route("/get_decks", get(get_decks))
        .route("/update_cards_red", get(update_cards_red))
        .route("/update_cards_red_manual_get", get(update_cards_red_manual_get))
        .route("/update_cards_red_manual_adding", post(update_cards_red_manual_adding))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> Result<(), ForgeError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ForgeError::Custom(format!("server error: {}", e)))
}

fn bad_request(detail: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, detail.into())
}

fn add_statuses(results: Vec<(CardContent, Result<u64, StoreError>)>) -> Vec<AddStatus> {
    results
        .into_iter()
        .map(|(pair, outcome)| match outcome {
            Ok(_) => AddStatus { status: true, front: pair.front, back: pair.back, error: None },
            Err(e) => AddStatus {
                status: false,
                front: pair.front,
                back: pair.back,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

async fn process_text(
    State(state): State<AppState>,
    Json(input): Json<ProcessTextInput>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    if input.text.trim().is_empty() {
        return Err(bad_request("No text provided."));
    }
    let deck = deck_or_default(&input.deck_name, &state);

    let pairs = state.engine.generator().pairs_from_text(&input.text).await;
    if pairs.is_empty() {
        return Err(bad_request("No pairs extracted."));
    }

    let results = state.engine.add_cards(&deck, &pairs).await;
    Ok((StatusCode::CREATED, Json(StatusResponse { status: add_statuses(results) })))
}

async fn process_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImageResultsResponse>), ApiError> {
    let upload = collect_upload(multipart).await?;
    if upload.files.is_empty() {
        return Err(bad_request("No files uploaded."));
    }
    let deck = deck_or_default(upload.deck_name.as_deref().unwrap_or_default(), &state);

    // Validation failures become per-image results, not request failures.
    let mut slots: Vec<Result<EncodedImage, ImageResult>> = Vec::new();
    for file in &upload.files {
        match ingest::prepare_image(&file.filename, file.content_type.as_deref(), &file.bytes) {
            Ok(image) => slots.push(Ok(image)),
            Err(e) => slots.push(Err(ImageResult {
                image: file.filename.clone(),
                status: false,
                detail: Some(format!("Failed to process image: {}", e)),
                pairs: None,
            })),
        }
    }

    let valid: Vec<EncodedImage> = slots.iter().filter_map(|s| s.as_ref().ok().cloned()).collect();
    let extracted = ingest::extract_from_images(state.engine.generator(), &valid).await;

    // Stitch extraction results back into upload order, then add pairs to the
    // deck sequentially (the store is a single-user endpoint).
    let mut extracted = extracted.into_iter();
    let mut results = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Err(failed) => results.push(failed),
            Ok(image) => {
                let pairs = extracted.next().unwrap_or_default();
                if pairs.is_empty() {
                    results.push(ImageResult {
                        image: image.filename,
                        status: false,
                        detail: Some("No pairs extracted from the image.".to_string()),
                        pairs: None,
                    });
                    continue;
                }
                let added = state.engine.add_cards(&deck, &pairs).await;
                results.push(ImageResult {
                    image: image.filename,
                    status: true,
                    detail: None,
                    pairs: Some(add_statuses(added)),
                });
            }
        }
    }

    Ok((StatusCode::CREATED, Json(ImageResultsResponse { results })))
}

async fn extract_text(
    State(state): State<AppState>,
    Json(input): Json<ExtractTextInput>,
) -> Result<Json<ExtractedPairsResponse>, ApiError> {
    if input.text.trim().is_empty() {
        return Err(bad_request("No text provided."));
    }
    let pairs = state.engine.generator().pairs_from_text(&input.text).await;
    if pairs.is_empty() {
        return Err(bad_request("No pairs extracted."));
    }
    Ok(Json(ExtractedPairsResponse { pairs }))
}

async fn extract_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PairsResponse>, ApiError> {
    let upload = collect_upload(multipart).await?;
    if upload.files.is_empty() {
        return Err(bad_request("No files uploaded."));
    }

    let mut images = Vec::new();
    for file in &upload.files {
        match ingest::prepare_image(&file.filename, file.content_type.as_deref(), &file.bytes) {
            Ok(image) => images.push(image),
            Err(e) => error!("skipping {}: {}", file.filename, e),
        }
    }

    let extracted = ingest::extract_from_images(state.engine.generator(), &images).await;
    let pairs: Vec<AddStatus> = extracted
        .into_iter()
        .flatten()
        .map(|p| AddStatus { status: true, front: p.front, back: p.back, error: None })
        .collect();

    if pairs.is_empty() {
        return Err(bad_request("No pairs extracted from images."));
    }
    Ok(Json(PairsResponse { pairs }))
}

async fn add_cards(
    State(state): State<AppState>,
    Json(input): Json<AddCardsInput>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    if input.pairs.is_empty() {
        return Err(bad_request("No pairs provided."));
    }
    let deck = deck_or_default(&input.deck_name, &state);
    let results = state.engine.add_cards(&deck, &input.pairs).await;
    Ok((StatusCode::CREATED, Json(StatusResponse { status: add_statuses(results) })))
}

async fn get_decks(State(state): State<AppState>) -> Result<Json<DecksResponse>, ApiError> {
    match state.engine.store().list_decks().await {
        Ok(decks) => Ok(Json(DecksResponse { decks })),
        Err(e) => Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}

async fn update_cards_red(
    State(state): State<AppState>,
    Query(query): Query<DeckQuery>,
) -> Json<Vec<OutcomeRecord>> {
    let deck = deck_or_default(query.deck_name.as_deref().unwrap_or_default(), &state);
    Json(state.engine.reconcile_auto(&deck, state.reconcile_flag).await)
}

async fn update_cards_red_manual_get(
    State(state): State<AppState>,
    Query(query): Query<DeckQuery>,
) -> Json<Vec<CardProposal>> {
    let deck = deck_or_default(query.deck_name.as_deref().unwrap_or_default(), &state);
    Json(state.engine.manual_preview(&deck, state.reconcile_flag).await)
}

async fn update_cards_red_manual_adding(
    State(state): State<AppState>,
    Json(input): Json<ManualApplyInput>,
) -> Result<Json<Vec<OutcomeRecord>>, ApiError> {
    if input.data.is_empty() {
        return Err(bad_request("No selections provided."));
    }
    let deck = deck_or_default(&input.deck_name, &state);
    Ok(Json(state.engine.apply_selection(&deck, &input.data).await))
}

fn deck_or_default(requested: &str, state: &AppState) -> String {
    if requested.trim().is_empty() {
        state.default_deck.clone()
    } else {
        requested.to_string()
    }
}

struct RawUpload {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

struct Upload {
    deck_name: Option<String>,
    files: Vec<RawUpload>,
}

async fn collect_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload { deck_name: None, files: Vec::new() };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        if field.name() == Some("deckName") {
            let value = field
                .text()
                .await
                .map_err(|e| bad_request(format!("malformed deckName field: {}", e)))?;
            upload.deck_name = Some(value);
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(|ct| ct.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read {}: {}", filename, e)))?;
        upload.files.push(RawUpload { filename, content_type, bytes: bytes.to_vec() });
    }

    Ok(upload)
}
