//! End-to-end message lifecycle on every engine

mod common;

use std::time::Duration;

use burnbox::{
    Burnbox, BurnboxConfig, Engine, Error, FileRequest, MessageRequest, Secret, StoreError,
};
use burnbox_core::file::FILE_MARKER;
use chrono::{TimeZone, Utc};
use common::{harness, harness_with, ENGINES, PIN};

#[test_log::test(tokio::test)]
async fn test_create_then_read_once() {
    for (engine, in_memory) in ENGINES {
        let h = harness(engine, in_memory);
        let processor = h.burnbox.processor();

        let msg = processor
            .create(MessageRequest::text(Duration::from_secs(30), PIN, "abc"))
            .await
            .unwrap();
        assert_eq!(msg.key.as_str().len(), 12);
        assert_ne!(msg.data, b"abc");

        let loaded = processor.load(&msg.key, PIN).await.unwrap();
        assert_eq!(loaded.data, b"abc", "engine {engine}");

        let err = processor.load(&msg.key, PIN).await.unwrap_err();
        assert!(matches!(err, Error::NotFound), "engine {engine}: {err:?}");

        h.burnbox.close().await.unwrap();
    }
}

#[test_log::test(tokio::test)]
async fn test_wrong_pin_exhaustion() {
    for (engine, in_memory) in ENGINES {
        let h = harness_with(|c| c.limits.max_pin_attempts = 2, engine, in_memory);
        let processor = h.burnbox.processor();

        let msg = processor
            .create(MessageRequest::text(Duration::from_secs(30), PIN, "abc"))
            .await
            .unwrap();

        let err = processor.load(&msg.key, "wrong").await.unwrap_err();
        match err {
            Error::BadPinAttempt { attempts, message } => {
                assert_eq!(attempts, 1);
                assert_eq!(message.errors, 1);
                assert_eq!(message.key, msg.key);
            }
            other => panic!("engine {engine}: unexpected {other:?}"),
        }

        let err = processor.load(&msg.key, "wrong").await.unwrap_err();
        assert!(matches!(err, Error::BadPin), "engine {engine}: {err:?}");

        let err = processor.load(&msg.key, PIN).await.unwrap_err();
        assert!(matches!(err, Error::NotFound), "engine {engine}: {err:?}");

        h.burnbox.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_wrong_pin_then_correct() {
    for (engine, in_memory) in ENGINES {
        let h = harness(engine, in_memory);
        let processor = h.burnbox.processor();

        let msg = processor
            .create(MessageRequest::text(Duration::from_secs(30), PIN, "abc"))
            .await
            .unwrap();

        let err = processor.load(&msg.key, "54321").await.unwrap_err();
        assert!(err.is_retryable());

        let loaded = processor.load(&msg.key, PIN).await.unwrap();
        assert_eq!(loaded.data, b"abc");
        assert_eq!(loaded.errors, 1);

        h.burnbox.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_expiry() {
    for (engine, in_memory) in ENGINES {
        let h = harness(engine, in_memory);
        let processor = h.burnbox.processor();

        let msg = processor
            .create(MessageRequest::text(Duration::from_secs(30), PIN, "abc"))
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::seconds(30));

        // expired messages never consume a pin attempt
        let err = processor.load(&msg.key, "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Expired), "engine {engine}: {err:?}");

        let err = processor.load(&msg.key, PIN).await.unwrap_err();
        assert!(matches!(err, Error::NotFound), "engine {engine}: {err:?}");

        h.burnbox.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_expiry_is_monotonic() {
    for (engine, in_memory) in ENGINES {
        let h = harness(engine, in_memory);
        let processor = h.burnbox.processor();

        let msg = processor
            .create(MessageRequest::text(Duration::from_secs(10), PIN, "abc"))
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::seconds(10));
        for _ in 0..3 {
            assert!(processor.load(&msg.key, PIN).await.is_err());
            assert!(!processor.is_file(&msg.key).await);
        }

        h.burnbox.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_loadable_until_expiry() {
    for (engine, in_memory) in ENGINES {
        let h = harness(engine, in_memory);
        let processor = h.burnbox.processor();
        h.clock.set(Utc.timestamp_opt(1_700_000_000, 500_000).unwrap());

        let msg = processor
            .create(MessageRequest::text(Duration::from_secs(10), PIN, "abc"))
            .await
            .unwrap();
        assert_eq!(msg.expires_at.timestamp_subsec_nanos(), 500_000);

        h.clock.set(msg.expires_at - chrono::Duration::microseconds(1));
        let loaded = processor.load(&msg.key, PIN).await.unwrap();
        assert_eq!(loaded.data, b"abc", "engine {engine}");

        let msg = processor
            .create(MessageRequest::text(Duration::from_secs(10), PIN, "abc"))
            .await
            .unwrap();
        h.clock.set(msg.expires_at);
        let err = processor.load(&msg.key, PIN).await.unwrap_err();
        assert!(matches!(err, Error::Expired), "engine {engine}: {err:?}");

        h.burnbox.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_sweeper_removes_expired() {
    for (engine, in_memory) in ENGINES {
        let h = harness_with(|c| c.storage.cleanup_interval_secs = 1, engine, in_memory);
        let processor = h.burnbox.processor();

        let msg = processor
            .create(MessageRequest::text(Duration::from_secs(5), PIN, "abc"))
            .await
            .unwrap();
        h.clock.advance(chrono::Duration::seconds(6));

        let mut swept = false;
        for _ in 0..60 {
            if let Err(StoreError::LoadRejected) = h.burnbox.store().load(&msg.key).await {
                swept = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(swept, "engine {engine}: sweeper did not remove the message");

        h.burnbox.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_file_round_trip() {
    for (engine, in_memory) in ENGINES {
        let h = harness(engine, in_memory);
        let processor = h.burnbox.processor();

        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let msg = processor
            .create_file(FileRequest {
                duration: Duration::from_secs(30),
                pin: PIN.to_string(),
                file_name: "report 2024.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                data: payload.clone(),
            })
            .await
            .unwrap();

        assert!(msg.data.starts_with(FILE_MARKER));
        assert!(!msg
            .data
            .windows(b"report 2024.pdf".len())
            .any(|w| w == b"report 2024.pdf"));
        assert!(processor.is_file(&msg.key).await);

        let revealed = processor.reveal(&msg.key, PIN).await.unwrap();
        assert!(revealed.is_file());
        assert_eq!(
            revealed.secret,
            Secret::File {
                file_name: "report 2024.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                data: payload,
            },
            "engine {engine}"
        );
        assert!(!processor.is_file(&msg.key).await);

        h.burnbox.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_file_too_large() {
    let h = harness_with(|c| c.limits.max_file_size = 16, Engine::Memory, false);
    let err = h
        .burnbox
        .processor()
        .create_file(FileRequest {
            duration: Duration::from_secs(30),
            pin: PIN.to_string(),
            file_name: "big.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            data: vec![0; 17],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FileTooLarge { size: 17, max: 16 }));
}

#[tokio::test]
async fn test_client_encrypted_round_trip() {
    for (engine, in_memory) in ENGINES {
        let h = harness(engine, in_memory);
        let processor = h.burnbox.processor();

        let blob = b"client-side ciphertext, opaque to the server".to_vec();
        let msg = processor
            .create(MessageRequest::client_encrypted(
                Duration::from_secs(30),
                PIN,
                blob.clone(),
            ))
            .await
            .unwrap();
        assert_eq!(msg.data, blob);

        let revealed = processor.reveal(&msg.key, PIN).await.unwrap();
        assert_eq!(revealed.secret, Secret::Opaque(blob));

        h.burnbox.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_text_reveal() {
    let h = harness(Engine::Memory, false);
    let processor = h.burnbox.processor();

    let msg = processor
        .create(MessageRequest::text(Duration::from_secs(30), PIN, ""))
        .await
        .unwrap();
    assert!(!processor.is_file(&msg.key).await);

    let revealed = processor.reveal(&msg.key, PIN).await.unwrap();
    assert_eq!(revealed.secret, Secret::Text(Vec::new()));
    assert_eq!(revealed.key, msg.key);
}

#[tokio::test]
async fn test_create_rejections() {
    let h = harness(Engine::Memory, false);
    let processor = h.burnbox.processor();

    let err = processor
        .create(MessageRequest::text(Duration::from_secs(30), "", "abc"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadPin));

    let too_long = Duration::from_secs(32 * 24 * 3600);
    let err = processor
        .create(MessageRequest::text(too_long, PIN, "abc"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadDuration { .. }));

    // the pin completes the cipher key, so its length is fixed
    let err = processor
        .create(MessageRequest::text(Duration::from_secs(30), "123456", "abc"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Crypto(_)));
}

#[tokio::test]
async fn test_open_rejects_invalid_config() {
    assert!(Burnbox::open(&BurnboxConfig::default()).is_err());

    let mut config = BurnboxConfig::with_sign_key(common::SIGN_KEY);
    config.storage.engine = Engine::Sqlite;
    assert!(Burnbox::open(&config).is_err());

    config.storage.in_memory = true;
    config.hasher.p_cost = 0;
    assert!(Burnbox::open(&config).is_err());
}

#[tokio::test]
async fn test_sled_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(Engine::Sled, false, &dir);

    let key = {
        let burnbox = Burnbox::open(&config).unwrap();
        let msg = burnbox
            .processor()
            .create(MessageRequest::text(Duration::from_secs(60), PIN, "abc"))
            .await
            .unwrap();
        burnbox.close().await.unwrap();
        msg.key
    };

    let burnbox = Burnbox::open(&config).unwrap();
    let loaded = burnbox.processor().load(&key, PIN).await.unwrap();
    assert_eq!(loaded.data, b"abc");
    burnbox.close().await.unwrap();
}
