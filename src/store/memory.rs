//! In-process store backed by an ordered map.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use time::OffsetDateTime;

use super::{CertificateFilter, CertificateRecord, CertificateStore, StoreTransaction};
use crate::error::{CaError, CaResult};

#[derive(Debug, Default)]
struct Shared {
    rows: RwLock<BTreeMap<u64, CertificateRecord>>,
    last_id: AtomicU64,
}

impl Shared {
    fn read(&self) -> CaResult<RwLockReadGuard<'_, BTreeMap<u64, CertificateRecord>>> {
        self.rows
            .read()
            .map_err(|_| CaError::Store("certificate table lock poisoned".into()))
    }

    fn write(&self) -> CaResult<RwLockWriteGuard<'_, BTreeMap<u64, CertificateRecord>>> {
        self.rows
            .write()
            .map_err(|_| CaError::Store("certificate table lock poisoned".into()))
    }
}

/// Certificate store kept in memory. Clones share the same table.
///
/// Ids are allocated from a counter starting at 1 and are never reused, even
/// when the transaction that reserved them rolls back.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transaction over a [`MemoryStore`]; staged rows are applied under one
/// write lock at commit.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    drafts: Vec<u64>,
    staged: BTreeMap<u64, CertificateRecord>,
}

impl StoreTransaction for MemoryTransaction {
    async fn insert_draft(&mut self, issuer_id: Option<u64>, name: &str) -> CaResult<u64> {
        let id = self.shared.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let draft = CertificateRecord::draft(id, issuer_id, name, OffsetDateTime::now_utc());
        self.drafts.push(id);
        self.staged.insert(id, draft);
        Ok(id)
    }

    async fn save(&mut self, record: CertificateRecord) -> CaResult<()> {
        if !self.drafts.contains(&record.id) && !self.shared.read()?.contains_key(&record.id) {
            return Err(CaError::Store(format!(
                "save of unknown certificate {}",
                record.id
            )));
        }
        self.staged.insert(record.id, record);
        Ok(())
    }

    async fn commit(self) -> CaResult<()> {
        let now = OffsetDateTime::now_utc();
        let mut rows = self.shared.write()?;
        for (id, mut record) in self.staged {
            match rows.get(&id) {
                Some(existing) => {
                    record.created_at = existing.created_at;
                    record.revoked_at = existing.revoked_at.or(record.revoked_at);
                }
                None => record.created_at = now,
            }
            record.updated_at = now;
            rows.insert(id, record);
        }
        Ok(())
    }

    async fn rollback(self) -> CaResult<()> {
        Ok(())
    }
}

impl CertificateStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> CaResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            shared: self.shared.clone(),
            drafts: Vec::new(),
            staged: BTreeMap::new(),
        })
    }

    async fn find_by_name(
        &self,
        name: &str,
        issuer_id: Option<u64>,
    ) -> CaResult<Option<CertificateRecord>> {
        Ok(self
            .shared
            .read()?
            .values()
            .find(|row| !row.is_revoked() && row.issuer_id == issuer_id && row.name == name)
            .cloned())
    }

    async fn get(&self, id: u64) -> CaResult<Option<CertificateRecord>> {
        Ok(self
            .shared
            .read()?
            .get(&id)
            .filter(|row| !row.is_revoked())
            .cloned())
    }

    async fn list(&self, filter: &CertificateFilter) -> CaResult<Vec<CertificateRecord>> {
        Ok(self
            .shared
            .read()?
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &CertificateFilter) -> CaResult<u64> {
        let count = self
            .shared
            .read()?
            .values()
            .filter(|row| filter.matches(row))
            .count();
        Ok(count as u64)
    }

    async fn revoke(&self, id: u64, at: OffsetDateTime) -> CaResult<()> {
        if let Some(row) = self.shared.write()?.get_mut(&id) {
            if row.revoked_at.is_none() {
                row.revoked_at = Some(at);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{IssuerScope, RevokedScope};

    async fn insert(store: &MemoryStore, issuer_id: Option<u64>, name: &str) -> u64 {
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_draft(issuer_id, name).await.unwrap();
        let mut record = CertificateRecord::draft(id, issuer_id, name, OffsetDateTime::now_utc());
        record.serial = id.to_string();
        tx.save(record).await.unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn ids_start_at_one_and_rows_appear_on_commit() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_draft(None, "root").await.unwrap();
        assert_eq!(id, 1);
        assert!(store.get(id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap().name, "root");
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_writes() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_draft(None, "a").await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_draft(None, "b").await.unwrap();
        }

        assert_eq!(store.count(&CertificateFilter::default()).await.unwrap(), 0);
        // ids burnt by aborted transactions are not handed out again
        assert_eq!(insert(&store, None, "c").await, 3);
    }

    #[tokio::test]
    async fn save_keeps_created_at_and_refreshes_updated_at() {
        let store = MemoryStore::new();
        let id = insert(&store, None, "root").await;
        let before = store.get(id).await.unwrap().unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut changed = before.clone();
        changed.created_at = OffsetDateTime::UNIX_EPOCH;
        changed.domains = vec!["root.local".into()];
        tx.save(changed).await.unwrap();
        tx.commit().await.unwrap();

        let after = store.get(id).await.unwrap().unwrap();
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.domains, vec!["root.local"]);
    }

    #[tokio::test]
    async fn save_of_unknown_id_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let record = CertificateRecord::draft(42, None, "x", OffsetDateTime::now_utc());
        assert!(matches!(tx.save(record).await, Err(CaError::Store(_))));
    }

    #[tokio::test]
    async fn revoked_rows_leave_lookups_but_stay_listable() {
        let store = MemoryStore::new();
        let root = insert(&store, None, "root").await;
        let child = insert(&store, Some(root), "child").await;

        store.revoke(child, OffsetDateTime::now_utc()).await.unwrap();
        store.revoke(999, OffsetDateTime::now_utc()).await.unwrap();

        assert!(store.get(child).await.unwrap().is_none());
        assert!(store.find_by_name("child", Some(root)).await.unwrap().is_none());
        let revoked = store
            .list(
                &CertificateFilter::builder()
                    .issuer(IssuerScope::Issuer(root))
                    .revoked(RevokedScope::Only)
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(revoked.len(), 1);
        assert_eq!(revoked[0].id, child);
        assert_eq!(
            store
                .count(&CertificateFilter::builder().revoked(RevokedScope::Include).build())
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn find_by_name_matches_issuer_exactly() {
        let store = MemoryStore::new();
        let root = insert(&store, None, "same").await;
        insert(&store, Some(root), "same").await;

        let found_root = store.find_by_name("same", None).await.unwrap().unwrap();
        assert_eq!(found_root.id, root);
        let found_child = store.find_by_name("same", Some(root)).await.unwrap().unwrap();
        assert_eq!(found_child.issuer_id, Some(root));
        assert!(store.find_by_name("same", Some(99)).await.unwrap().is_none());
    }
}
