use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::json;

use crate::core::DuplicateScope;

pub const ANKI_CONNECT_VERSION: u32 = 6;

/// AnkiConnect response envelope: exactly one of `result`/`error` is set.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Field {
    pub value: String,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    pub note_id: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub fields: HashMap<String, Field>,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub cards: Vec<u64>,
}

impl NoteInfo {
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }
}

pub fn request_body(action: &str, params: Option<serde_json::Value>) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("action".to_string(), serde_json::Value::String(action.to_string()));
    body.insert("version".to_string(), serde_json::Value::Number(ANKI_CONNECT_VERSION.into()));
    if let Some(params) = params {
        body.insert("params".to_string(), params);
    }
    serde_json::Value::Object(body)
}

pub fn add_note_params(deck: &str, front: &str, back: &str, scope: DuplicateScope) -> serde_json::Value {
    let (check_children, check_all_models) = match scope {
        DuplicateScope::SameDeck => (false, false),
        DuplicateScope::IncludeSubdecks => (true, false),
        DuplicateScope::AllNoteTypes => (true, true),
    };
    json!({
        "note": {
            "deckName": deck,
            "modelName": "Basic",
            "fields": { "Front": front, "Back": back },
            "options": {
                "allowDuplicate": false,
                "duplicateScope": "deck",
                "duplicateScopeOptions": {
                    "deckName": deck,
                    "checkChildren": check_children,
                    "checkAllModels": check_all_models,
                },
            },
            "tags": [],
        }
    })
}

pub fn update_note_params(note_id: u64, front: &str, back: &str) -> serde_json::Value {
    json!({
        "note": {
            "id": note_id,
            "fields": { "Front": front, "Back": back },
        }
    })
}

pub fn set_card_flag_params(card_id: u64, flag: u8) -> serde_json::Value {
    // warning_check acknowledges that this writes scheduler-adjacent DB values.
    json!({
        "card": card_id,
        "keys": ["flags"],
        "newValues": [flag],
        "warning_check": true,
    })
}

/// Builds a `findNotes` query like `deck:"My Deck" flag:1`, quoting the deck
/// name when it would otherwise break the query grammar.
pub fn flagged_query(deck: &str, flag: u8) -> String {
    if deck.contains(' ') || deck.contains(':') || deck.contains('"') {
        format!("deck:\"{}\" flag:{}", deck.replace('"', "\\\""), flag)
    } else {
        format!("deck:{} flag:{}", deck, flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flagged_query_quotes_awkward_deck_names() {
        assert_eq!(flagged_query("mining", 1), "deck:mining flag:1");
        assert_eq!(flagged_query("My Deck", 1), "deck:\"My Deck\" flag:1");
        assert_eq!(flagged_query("a:b", 2), "deck:\"a:b\" flag:2");
    }

    #[test]
    fn add_note_params_encode_duplicate_scope() {
        let params = add_note_params("test", "f", "b", DuplicateScope::AllNoteTypes);
        let options = &params["note"]["options"]["duplicateScopeOptions"];
        assert_eq!(options["checkChildren"], true);
        assert_eq!(options["checkAllModels"], true);

        let params = add_note_params("test", "f", "b", DuplicateScope::SameDeck);
        let options = &params["note"]["options"]["duplicateScopeOptions"];
        assert_eq!(options["checkChildren"], false);
        assert_eq!(options["checkAllModels"], false);
    }
}
