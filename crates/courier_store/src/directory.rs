//! Shared identity directory.
//!
//! Holds only public halves: signing key, encryption key, optional alias.
//! A record is immutable once published, except that the alias may be
//! (re)bound and a record published without an encryption key may gain one.
//! Every write carries a signature by the record's own signing key over
//! `PublicIdentity::signing_input`.

use tracing::{info, warn};

use courier_crypto::identity::{normalize_key_hex, PublicIdentity, PublicKeyBytes};

use crate::{
    db::{now_ms, short, Store},
    error::StoreError,
    models::IdentityRow,
};

fn validate_key(label: &str, key: &str) -> Result<String, StoreError> {
    PublicKeyBytes::from_hex(key).map_err(|e| StoreError::InvalidIdentity(format!("{label}: {e}")))?;
    Ok(normalize_key_hex(key))
}

fn check_record_signature(record: &PublicIdentity, signature: &str) -> Result<(), StoreError> {
    record.verify_record_signature(signature).map_err(|e| {
        warn!(signing_key = %short(&record.signing_key), error = %e, "identity signature rejected");
        StoreError::IdentitySignature(normalize_key_hex(&record.signing_key))
    })
}

impl Store {
    /// Publish (or re-publish) a public identity record.
    ///
    /// `signature` must come from `Identity::sign_record` by the key the
    /// record names. Re-publishing with a different encryption key is
    /// rejected.
    pub async fn publish_identity(
        &self,
        record: &PublicIdentity,
        signature: &str,
    ) -> Result<PublicIdentity, StoreError> {
        let signing_key = validate_key("signingKey", &record.signing_key)?;
        let encryption_key = record
            .encryption_key
            .as_deref()
            .map(|k| validate_key("encryptionKey", k))
            .transpose()?;
        check_record_signature(record, signature)?;

        let mut tx = self.pool.begin().await?;
        let existing: Option<IdentityRow> = sqlx::query_as(
            "SELECT signing_key, encryption_key, alias, published_at, updated_at \
             FROM identities WHERE signing_key = ?",
        )
        .bind(&signing_key)
        .fetch_optional(&mut *tx)
        .await?;

        let now = now_ms();
        match &existing {
            Some(row) => {
                if let (Some(stored), Some(new)) = (&row.encryption_key, &encryption_key) {
                    if stored != new {
                        warn!(signing_key = %short(&signing_key), "rejected encryption key change");
                        return Err(StoreError::IdentityKeyConflict {
                            signing_key,
                            stored: stored.clone(),
                            new: new.clone(),
                        });
                    }
                }
                sqlx::query(
                    "UPDATE identities SET encryption_key = COALESCE(encryption_key, ?), updated_at = ? \
                     WHERE signing_key = ?",
                )
                .bind(encryption_key.as_deref())
                .bind(now)
                .bind(&signing_key)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO identities (signing_key, encryption_key, alias, published_at, updated_at) \
                     VALUES (?, ?, NULL, ?, ?)",
                )
                .bind(&signing_key)
                .bind(encryption_key.as_deref())
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        if let Some(alias) = &record.alias {
            self.set_alias(&signing_key, alias).await?;
        }

        info!(
            signing_key = %short(&signing_key),
            republished = existing.is_some(),
            "identity published"
        );

        self.lookup_identity(&signing_key)
            .await?
            .ok_or(StoreError::NotFound(signing_key))
    }

    pub async fn lookup_identity(&self, signing_key: &str) -> Result<Option<PublicIdentity>, StoreError> {
        let row: Option<IdentityRow> = sqlx::query_as(
            "SELECT signing_key, encryption_key, alias, published_at, updated_at \
             FROM identities WHERE signing_key = ?",
        )
        .bind(normalize_key_hex(signing_key))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PublicIdentity::from))
    }

    /// Like `lookup_identity`, but a missing record is an `OrphanedIdentity`.
    pub async fn require_identity(&self, signing_key: &str) -> Result<PublicIdentity, StoreError> {
        self.lookup_identity(signing_key)
            .await?
            .ok_or_else(|| StoreError::OrphanedIdentity(normalize_key_hex(signing_key)))
    }

    pub async fn lookup_alias(&self, alias: &str) -> Result<Option<PublicIdentity>, StoreError> {
        let row: Option<IdentityRow> = sqlx::query_as(
            "SELECT signing_key, encryption_key, alias, published_at, updated_at \
             FROM identities WHERE alias = ?",
        )
        .bind(alias)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PublicIdentity::from))
    }

    /// Bind `alias` to a published identity, replacing any previous alias.
    ///
    /// `signature` covers the stored record with `alias` in place, as
    /// produced by `Identity::sign_record`.
    pub async fn bind_alias(&self, signing_key: &str, alias: &str, signature: &str) -> Result<(), StoreError> {
        let stored = self
            .lookup_identity(signing_key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("identity {}", normalize_key_hex(signing_key))))?;
        let claimed = PublicIdentity {
            alias: Some(alias.to_string()),
            ..stored
        };
        check_record_signature(&claimed, signature)?;
        self.set_alias(&claimed.signing_key, alias).await
    }

    async fn set_alias(&self, signing_key: &str, alias: &str) -> Result<(), StoreError> {
        let signing_key = normalize_key_hex(signing_key);
        let res = sqlx::query("UPDATE identities SET alias = ?, updated_at = ? WHERE signing_key = ?")
            .bind(alias)
            .bind(now_ms())
            .bind(&signing_key)
            .execute(&self.pool)
            .await;
        match res {
            Ok(r) if r.rows_affected() == 0 => Err(StoreError::NotFound(format!("identity {signing_key}"))),
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate(format!("alias {alias}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}
