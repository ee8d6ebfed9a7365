//! Identity directory: publish, lookup, alias binding, immutability.

use courier_crypto::{identity::PublicIdentity, Identity};
use courier_proto::api::{RelayRequest, RelayResponse};
use courier_store::{Store, StoreError};

async fn open_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(&dir.path().join("relay.db")).await.expect("open store");
    (dir, store)
}

async fn publish(store: &Store, id: &Identity, record: &PublicIdentity) -> Result<PublicIdentity, StoreError> {
    let signature = id.sign_record(record).expect("sign record");
    store.publish_identity(record, &signature).await
}

async fn rebind(store: &Store, id: &Identity, alias: &str) -> Result<(), StoreError> {
    let key = id.signing_public().to_hex();
    let mut claimed = store.require_identity(&key).await?;
    claimed.alias = Some(alias.to_string());
    let signature = id.sign_record(&claimed).expect("sign record");
    store.bind_alias(&key, alias, &signature).await
}

#[tokio::test]
async fn published_identity_is_found_case_insensitively() {
    let (_dir, store) = open_store().await;
    let alice = Identity::generate(Some("alice".into()));

    let mut record = alice.public_record();
    record.signing_key = record.signing_key.to_ascii_uppercase();
    let published = publish(&store, &alice, &record).await.unwrap();
    assert_eq!(published.signing_key, alice.signing_public().to_hex());

    let found = store
        .lookup_identity(&alice.signing_public().to_hex().to_ascii_uppercase())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, alice.public_record());
    assert_eq!(store.lookup_alias("alice").await.unwrap(), Some(alice.public_record()));
}

#[tokio::test]
async fn encryption_key_cannot_change_after_publishing() {
    let (_dir, store) = open_store().await;
    let alice = Identity::generate(None);
    publish(&store, &alice, &alice.public_record()).await.unwrap();

    let mut changed = alice.public_record();
    changed.encryption_key = Some(Identity::generate(None).encryption_public().to_hex());
    let err = publish(&store, &alice, &changed).await.unwrap_err();
    assert!(matches!(err, StoreError::IdentityKeyConflict { .. }));

    // Re-publishing the same record is fine.
    publish(&store, &alice, &alice.public_record()).await.unwrap();
}

#[tokio::test]
async fn record_without_encryption_key_may_gain_one() {
    let (_dir, store) = open_store().await;
    let alice = Identity::generate(None);
    let bare = PublicIdentity {
        signing_key: alice.signing_public().to_hex(),
        encryption_key: None,
        alias: None,
    };
    publish(&store, &alice, &bare).await.unwrap();
    let found = store.require_identity(&bare.signing_key).await.unwrap();
    assert!(found.encryption_key_bytes().is_err());

    publish(&store, &alice, &alice.public_record()).await.unwrap();
    let found = store.require_identity(&bare.signing_key).await.unwrap();
    assert_eq!(found.encryption_key_bytes().unwrap(), *alice.encryption_public());
}

#[tokio::test]
async fn unsigned_or_foreign_signed_records_are_refused() {
    let (_dir, store) = open_store().await;
    let victim = Identity::generate(None);
    let mallory = Identity::generate(None);

    // Mallory's encryption key under the victim's signing key.
    let planted = PublicIdentity {
        signing_key: victim.signing_public().to_hex(),
        encryption_key: Some(mallory.encryption_public().to_hex()),
        alias: Some("victim".into()),
    };
    let foreign = hex::encode(mallory.sign(&planted.signing_input()));
    assert!(matches!(
        store.publish_identity(&planted, &foreign).await,
        Err(StoreError::IdentitySignature(_))
    ));
    assert!(matches!(
        store.publish_identity(&planted, "").await,
        Err(StoreError::IdentitySignature(_))
    ));
    assert!(store.lookup_identity(&planted.signing_key).await.unwrap().is_none());

    // Nor can a keyless record be given someone else's key later.
    let bare = PublicIdentity {
        encryption_key: None,
        alias: None,
        ..planted.clone()
    };
    publish(&store, &victim, &bare).await.unwrap();
    let foreign = hex::encode(mallory.sign(&planted.signing_input()));
    let resp = store
        .handle(RelayRequest::PublishIdentity {
            identity: planted.clone(),
            signature: foreign,
        })
        .await;
    match resp {
        RelayResponse::Error { code, .. } => assert_eq!(code, "bad_identity_signature"),
        other => panic!("unexpected {other:?}"),
    }
    let found = store.require_identity(&planted.signing_key).await.unwrap();
    assert_eq!(found.encryption_key, None);
    assert_eq!(found.alias, None);

    // A signature over one alias does not authorise another.
    let claimed = PublicIdentity {
        alias: Some("ace".into()),
        ..found
    };
    let signature = victim.sign_record(&claimed).unwrap();
    assert!(matches!(
        store.bind_alias(&planted.signing_key, "mallory", &signature).await,
        Err(StoreError::IdentitySignature(_))
    ));
    store.bind_alias(&planted.signing_key, "ace", &signature).await.unwrap();
}

#[tokio::test]
async fn alias_is_unique_and_rebindable() {
    let (_dir, store) = open_store().await;
    let alice = Identity::generate(None);
    let bob = Identity::generate(None);
    publish(&store, &alice, &alice.public_record()).await.unwrap();
    publish(&store, &bob, &bob.public_record()).await.unwrap();

    let b = bob.signing_public().to_hex();
    rebind(&store, &alice, "ace").await.unwrap();
    assert!(matches!(rebind(&store, &bob, "ace").await, Err(StoreError::Duplicate(_))));

    rebind(&store, &alice, "alice").await.unwrap();
    assert!(store.lookup_alias("ace").await.unwrap().is_none());
    rebind(&store, &bob, "ace").await.unwrap();
    assert_eq!(store.lookup_alias("ace").await.unwrap().unwrap().signing_key, b);
}

#[tokio::test]
async fn unknown_identity_is_orphaned() {
    let (_dir, store) = open_store().await;
    let ghost = Identity::generate(None);
    let key = ghost.signing_public().to_hex();
    assert!(store.lookup_identity(&key).await.unwrap().is_none());
    assert!(matches!(
        store.require_identity(&key).await,
        Err(StoreError::OrphanedIdentity(_))
    ));
    let signature = ghost.sign_record(&ghost.public_record()).unwrap();
    assert!(matches!(
        store.bind_alias(&key, "x", &signature).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn malformed_keys_are_rejected() {
    let (_dir, store) = open_store().await;
    let bad = PublicIdentity {
        signing_key: "not-hex".into(),
        encryption_key: None,
        alias: None,
    };
    let resp = store
        .handle(RelayRequest::PublishIdentity {
            identity: bad,
            signature: String::new(),
        })
        .await;
    match resp {
        RelayResponse::Error { code, .. } => assert_eq!(code, "invalid_identity"),
        other => panic!("unexpected {other:?}"),
    }
}
