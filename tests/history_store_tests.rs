// Integration tests for the JSON file history store

use anyhow::Result;
use loqa_assistant::{ChatTurn, FileHistoryStore, HistoryStore};
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_missing_file_loads_empty() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = FileHistoryStore::at_path(temp_dir.path().join("history.json"));

    assert!(store.load().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_save_and_reload_preserves_order() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("nested").join("history.json");
    let store = FileHistoryStore::at_path(&path);

    let turns = vec![
        ChatTurn::model("Hello! How can I assist you today?"),
        ChatTurn::user("hi"),
        ChatTurn::model("Hello!"),
        ChatTurn::user("multi\nline \"quoted\" ✓"),
        ChatTurn::model(""),
    ];
    store.save(&turns).await?;

    // A fresh store on the same path sees the same sequence
    let reloaded = FileHistoryStore::at_path(&path).load().await?;
    assert_eq!(reloaded, turns);

    // No temp file is left behind
    assert!(!path.with_extension("tmp").exists());

    Ok(())
}

#[tokio::test]
async fn test_saved_format_is_role_text_records() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("history.json");
    let store = FileHistoryStore::at_path(&path);

    store
        .save(&[ChatTurn::user("hi"), ChatTurn::model("yo")])
        .await?;

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(
        raw,
        serde_json::json!([
            { "role": "user", "text": "hi" },
            { "role": "model", "text": "yo" }
        ])
    );

    Ok(())
}

#[tokio::test]
async fn test_save_overwrites_previous_transcript() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = FileHistoryStore::at_path(temp_dir.path().join("history.json"));

    store.save(&[ChatTurn::user("a"), ChatTurn::model("b")]).await?;
    store.save(&[ChatTurn::user("c")]).await?;

    assert_eq!(store.load().await?, vec![ChatTurn::user("c")]);

    Ok(())
}

#[tokio::test]
async fn test_corrupt_file_fails_to_load() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("history.json");
    fs::write(&path, "{ not json")?;

    let store = FileHistoryStore::at_path(&path);
    assert!(store.load().await.is_err());

    // Unknown roles are rejected as well
    fs::write(&path, r#"[{"role":"system","text":"x"}]"#)?;
    assert!(store.load().await.is_err());

    Ok(())
}
