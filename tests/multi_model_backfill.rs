//! Multi-model migration scenario: store under one model, register a
//! second, backfill, and verify both vector spaces are populated with the
//! text preserved bit-identically.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::FixedDimEmbedder;
use mnemo_rs::embedding::Embedder;
use mnemo_rs::memory::{ModelMap, MultiModelStorage, Role};

fn model(name: &str, dim: usize) -> (String, Arc<dyn Embedder>) {
    (
        format!("{name}:{dim}"),
        Arc::new(FixedDimEmbedder {
            name: name.to_string(),
            dim,
        }) as Arc<dyn Embedder>,
    )
}

#[tokio::test]
async fn backfill_adds_new_model_without_touching_text() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let storage = MultiModelStorage::open(dir.path());

    // Store one conversation message with model A:384 only.
    let mut models: ModelMap = BTreeMap::new();
    let (key_a, embedder_a) = model("A", 384);
    models.insert(key_a.clone(), embedder_a);

    let id = storage
        .store_conversation("the text to migrate", Role::User, &models)
        .await
        .unwrap_or_else(|_| unreachable!());

    let before = storage.get_conversation(&id).unwrap_or_else(|| unreachable!());
    assert_eq!(before.metadata.available_models, vec![key_a.clone()]);

    // Later: register B:768 and backfill.
    let (key_b, embedder_b) = model("B", 768);
    models.insert(key_b.clone(), embedder_b);
    let added = storage.backfill(&models).await.unwrap_or_else(|_| unreachable!());
    assert_eq!(added, 1);

    let after = storage.get_conversation(&id).unwrap_or_else(|| unreachable!());
    assert_eq!(after.text, "the text to migrate");
    assert_eq!(after.text, before.text);
    assert_eq!(after.embeddings[&key_a].len(), 384);
    assert_eq!(after.embeddings[&key_b].len(), 768);
    assert_eq!(after.embeddings[&key_a], before.embeddings[&key_a]);
    assert_eq!(
        after.metadata.available_models,
        vec![key_a.clone(), key_b.clone()]
    );

    // Backfill is idempotent once every entry carries every model.
    let again = storage.backfill(&models).await.unwrap_or_else(|_| unreachable!());
    assert_eq!(again, 0);
}

#[tokio::test]
async fn backfill_covers_documents_too() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let storage = MultiModelStorage::open(dir.path());

    let mut models: ModelMap = BTreeMap::new();
    let (key_a, embedder_a) = model("A", 16);
    models.insert(key_a.clone(), embedder_a);

    storage
        .store_document("reference text", serde_json::json!({"title": "ref"}), &models)
        .await
        .unwrap_or_else(|_| unreachable!());

    let (key_b, embedder_b) = model("B", 32);
    models.insert(key_b.clone(), embedder_b);
    let added = storage.backfill(&models).await.unwrap_or_else(|_| unreachable!());
    assert_eq!(added, 1);

    let counts = storage.available_models();
    assert_eq!(counts[&key_a], 1);
    assert_eq!(counts[&key_b], 1);
}

#[tokio::test]
async fn search_is_scoped_to_one_model_key() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let storage = MultiModelStorage::open(dir.path());

    let mut models: ModelMap = BTreeMap::new();
    let (key_a, embedder_a) = model("A", 24);
    models.insert(key_a.clone(), embedder_a.clone());

    storage
        .store_conversation("a memorable sentence", Role::Assistant, &models)
        .await
        .unwrap_or_else(|_| unreachable!());

    let query = embedder_a
        .embed("a memorable sentence", mnemo_rs::embedding::PromptKind::Query)
        .await;
    let hits = storage.search_conversations(&query, &key_a, 5, 0.9);
    assert_eq!(hits.len(), 1);
    assert!(hits[0].similarity > 0.99);

    // The other key has no vectors; searching it finds nothing.
    assert!(storage.search_conversations(&query, "B:24", 5, 0.0).is_empty());
}
