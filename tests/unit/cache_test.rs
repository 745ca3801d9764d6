//! Unit tests for the cache store and prompt keys

use std::sync::Arc;
use std::time::Duration;

use prompt_image_gateway::backend::traits::BackendKind;
use prompt_image_gateway::cache::{CacheKey, CacheStore, PromptKey};
use prompt_image_gateway::AppError;

#[tokio::test]
async fn test_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path()).await.unwrap();
    let key = CacheKey::parse(BackendKind::StableDiffusion, "sunset-over-lake").unwrap();

    assert!(!store.exists(&key).await.unwrap());
    store.write(&key, b"image bytes").await.unwrap();

    assert!(store.exists(&key).await.unwrap());
    assert_eq!(store.read(&key).await.unwrap().as_ref(), b"image bytes");
    assert_eq!(store.path_for(&key), dir.path().join("stablediffusion--sunset-over-lake.png"));
}

#[tokio::test]
async fn test_missing_entry_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path()).await.unwrap();
    let key = CacheKey::parse(BackendKind::StableDiffusion, "nothing-here").unwrap();

    assert!(matches!(store.read(&key).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_open_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("images");

    CacheStore::open(&nested).await.unwrap();
    assert!(nested.is_dir());
}

#[tokio::test]
async fn test_write_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path()).await.unwrap();
    let key = CacheKey::parse(BackendKind::StableDiffusion, "clean").unwrap();

    store.write(&key, &[7u8; 4096]).await.unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["stablediffusion--clean.png".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reader_never_sees_partial_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CacheStore::open(dir.path()).await.unwrap());
    let key = CacheKey::parse(BackendKind::StableDiffusion, "big-image").unwrap();
    let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

    let reader = {
        let store = store.clone();
        let key = key.clone();
        let expected_len = payload.len();
        tokio::spawn(async move {
            let mut observed = 0;
            for _ in 0..2000 {
                if store.exists(&key).await.unwrap() {
                    match store.read(&key).await {
                        Ok(bytes) => {
                            assert_eq!(bytes.len(), expected_len, "partial entry observed");
                            observed += 1;
                            if observed > 5 {
                                break;
                            }
                        }
                        Err(AppError::NotFound(_)) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            observed
        })
    };

    store.write(&key, &payload).await.unwrap();
    let observed = reader.await.unwrap();
    assert!(observed > 0);
    assert_eq!(store.read(&key).await.unwrap().as_ref(), payload.as_slice());
}

#[test]
fn test_equivalent_prompts_share_a_key() {
    let variants = ["Cat-In-A-Hat", "cat_in_a_hat", "cat in a hat", "cat--in--a--hat", " cat+in+a+hat "];
    let keys: Vec<PromptKey> = variants.iter().map(|v| PromptKey::parse(v).unwrap()).collect();

    for key in &keys {
        assert_eq!(key, &keys[0]);
        assert_eq!(key.as_str(), "cat-in-a-hat");
        assert_eq!(key.prompt(), "cat in a hat");
    }
}

#[tokio::test]
async fn test_backends_keep_separate_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path()).await.unwrap();
    let sd = CacheKey::parse(BackendKind::StableDiffusion, "a-castle").unwrap();
    let mj = CacheKey::parse(BackendKind::Midjourney, "a castle").unwrap();

    store.write(&sd, b"sd image").await.unwrap();

    assert!(store.exists(&sd).await.unwrap());
    assert!(!store.exists(&mj).await.unwrap());
    store.write(&mj, b"mj image").await.unwrap();
    assert_eq!(store.read(&sd).await.unwrap().as_ref(), b"sd image");
    assert_eq!(store.read(&mj).await.unwrap().as_ref(), b"mj image");

    let mut stems = store.list().await.unwrap();
    stems.sort();
    assert_eq!(stems, vec!["midjourney--a-castle", "stablediffusion--a-castle"]);
}

#[test]
fn test_distinct_prompts_have_distinct_keys() {
    let a = PromptKey::parse("red-cat").unwrap();
    let b = PromptKey::parse("red-car").unwrap();
    assert_ne!(a, b);
}
