//! Quick start example for ragstore.
//!
//! Run with: cargo run --example quickstart

use ragstore::prelude::*;
use serde_json::json;

fn main() -> Result<()> {
    println!("ragstore quick start\n");

    // Small dimension for demonstration; real embeddings are 384-1536 dim
    let store = VectorStore::in_memory()?;
    store.create_collection("articles", CollectionConfig::new(8, DistanceMetric::Cosine))?;

    let articles = vec![
        (
            "Introduction to Rust programming",
            [0.9, 0.8, 0.1, 0.0, 0.1, 0.0, 0.2, 0.1],
            "programming",
            2021,
        ),
        (
            "Advanced Rust patterns and idioms",
            [0.85, 0.9, 0.15, 0.05, 0.1, 0.0, 0.25, 0.15],
            "programming",
            2024,
        ),
        (
            "Python for data science",
            [0.1, 0.2, 0.9, 0.85, 0.0, 0.1, 0.0, 0.2],
            "data",
            2022,
        ),
        (
            "Machine learning fundamentals",
            [0.2, 0.1, 0.8, 0.9, 0.1, 0.2, 0.1, 0.1],
            "data",
            2023,
        ),
        (
            "Growing tomatoes at home",
            [0.0, 0.1, 0.0, 0.1, 0.9, 0.8, 0.1, 0.0],
            "garden",
            2020,
        ),
    ];

    let documents = articles
        .into_iter()
        .map(|(title, embedding, category, year)| {
            Document::new(title, embedding.to_vec()).with_metadata(
                Metadata::new()
                    .with_field("category", category)
                    .with_field("year", year),
            )
        })
        .collect();
    let ids = store.upsert("articles", documents)?;
    println!("Inserted {} documents\n", ids.len());

    let query = vec![0.88, 0.85, 0.1, 0.0, 0.1, 0.0, 0.2, 0.1];

    println!("Top 3 for a Rust-like query:");
    for result in store.search("articles", &SearchRequest::new(query.clone(), 3))? {
        println!("  {:.3}  {}", result.score, result.document.content);
    }

    println!("\nOnly data articles from 2023 on:");
    let filter = Filter::from_json(json!({"category": "data", "year": {"$gte": 2023}}));
    let request = SearchRequest::new(query.clone(), 3).with_filter(filter);
    for result in store.search("articles", &request)? {
        println!("  {:.3}  {}", result.score, result.document.content);
    }

    println!("\nDiverse results (MMR):");
    let request = SearchRequest::new(query, 3).with_mmr(MmrOptions {
        fetch_k: 5,
        lambda: 0.3,
    });
    for result in store.search("articles", &request)? {
        println!("  {:.3}  {}", result.score, result.document.content);
    }

    let removed = store.delete_by_filter("articles", &Filter::field("category").eq("garden"))?;
    println!("\nRemoved {} garden article(s); {} left", removed, store.count("articles")?);

    Ok(())
}
