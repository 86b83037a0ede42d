use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::store::traits::{StateStore, StoreError};

/// 兩次清掃過期鍵之間的最短間隔（秒）
const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 記憶體鍵值存儲
///
/// 存活時間依注入的時鐘判定，因此測試可以用手動時鐘讓計數器過期。
/// 每個鍵的遞增在 DashMap 分片鎖內完成，同一行程內是原子的。
/// 寫入時最多每分鐘清掃一次過期鍵，帶日期的計數鍵不會無限累積。
pub struct MemoryStateStore {
    entries: DashMap<String, MemoryEntry>,
    clock: Arc<dyn Clock>,
    last_sweep: Mutex<DateTime<Utc>>,
}

impl MemoryStateStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            entries: DashMap::new(),
            clock,
            last_sweep: Mutex::new(now),
        }
    }

    /// 當前未過期的鍵數量
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 實際保存的鍵數量，含尚未清掃的過期鍵
    pub fn stored_len(&self) -> usize {
        self.entries.len()
    }

    /// 移除所有過期鍵，返回移除數量
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        *self.last_sweep.lock() = now;

        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("記憶體存儲清除 {} 個過期鍵", removed);
        }
        removed
    }

    // 呼叫時不可持有任何 entries 的引用
    fn sweep_if_due(&self) {
        let now = self.clock.now();
        let due = now - *self.last_sweep.lock() >= Duration::seconds(SWEEP_INTERVAL_SECS);
        if due {
            self.purge_expired();
        }
    }

    /// 剩餘存活時間，無存活時間或不存在時為 None
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at - now)
    }

    fn expiry(&self, ttl_secs: u64) -> DateTime<Utc> {
        self.clock.now() + Duration::seconds(ttl_secs as i64)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!("記憶體存儲鍵已過期: {}", key);
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StoreError> {
        self.sweep_if_due();
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl_secs.map(|ttl| self.expiry(ttl)),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        self.sweep_if_due();
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry {
                value: "0".to_string(),
                expires_at: None,
            });

        if entry.is_expired(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }

        let current = entry
            .value
            .parse::<i64>()
            .map_err(|e| StoreError::TypeError(format!("{}: {}", key, e)))?;
        let next = current + 1;
        entry.value = next.to_string();

        if entry.expires_at.is_none() {
            entry.expires_at = Some(now + Duration::seconds(ttl_secs as i64));
        }

        Ok(next)
    }

    async fn incr_many(&self, keys: &[(&str, u64)]) -> Result<Vec<i64>, StoreError> {
        // 先檢查所有值都是整數，避免只遞增其中一部分
        let now = self.clock.now();
        for (key, _) in keys {
            if let Some(entry) = self.entries.get(*key) {
                if !entry.is_expired(now) {
                    entry
                        .value
                        .parse::<i64>()
                        .map_err(|e| StoreError::TypeError(format!("{}: {}", key, e)))?;
                }
            }
        }

        let mut counts = Vec::with_capacity(keys.len());
        for (key, ttl_secs) in keys {
            counts.push(self.incr(key, *ttl_secs).await?);
        }
        Ok(counts)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::traits::{load_count, load_json, save_json};
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};

    fn store_with_clock() -> (MemoryStateStore, Arc<ManualClock>) {
        let clock = ManualClock::shared(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        (MemoryStateStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_incr_sets_ttl_only_on_first_use() {
        let (store, clock) = store_with_clock();

        assert_eq!(store.incr("counter", 60).await.unwrap(), 1);
        clock.advance(Duration::seconds(30));
        assert_eq!(store.incr("counter", 60).await.unwrap(), 2);

        // 第二次遞增不應延長存活時間
        assert_eq!(store.ttl("counter"), Some(Duration::seconds(30)));

        clock.advance(Duration::seconds(30));
        assert_eq!(store.get("counter").await.unwrap(), None);
        assert_eq!(store.incr("counter", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let (store, clock) = store_with_clock();

        store.set("plain", "value", None).await.unwrap();
        store.set("short", "value", Some(5)).await.unwrap();
        assert_eq!(store.len(), 2);

        clock.advance(Duration::seconds(5));
        assert_eq!(store.get("plain").await.unwrap(), Some("value".to_string()));
        assert_eq!(store.get("short").await.unwrap(), None);

        assert!(store.delete("plain").await.unwrap());
        assert!(!store.delete("plain").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (store, _clock) = store_with_clock();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.incr("shared", 3600).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(load_count(store.as_ref(), "shared").await.unwrap(), 400);
    }

    #[tokio::test]
    async fn test_dated_counters_do_not_accumulate() {
        let (store, clock) = store_with_clock();

        for day in 0..30 {
            let key = format!("email:user:2025-01-{:02}", day + 1);
            store.incr(&key, 86_400).await.unwrap();
            store.incr(&key, 86_400).await.unwrap();
            store.set("email:user:last", "x", Some(86_400)).await.unwrap();
            assert!(store.stored_len() <= 3, "第 {} 天仍保留 {} 個鍵", day, store.stored_len());
            clock.advance(Duration::days(1));
        }

        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.stored_len(), 0);
    }

    #[tokio::test]
    async fn test_incr_many_is_all_or_nothing() {
        let (store, _clock) = store_with_clock();

        assert_eq!(store.incr_many(&[("h", 3600), ("d", 86_400)]).await.unwrap(), vec![1, 1]);
        assert_eq!(store.ttl("d"), Some(Duration::days(1)));

        store.set("d", "broken", None).await.unwrap();
        assert!(store.incr_many(&[("h", 3600), ("d", 86_400)]).await.is_err());
        assert_eq!(load_count(&store, "h").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_is_throttled() {
        let (store, clock) = store_with_clock();
        store.set("short", "v", Some(1)).await.unwrap();
        clock.advance(Duration::seconds(2));

        // 距上次清掃不足一分鐘，過期鍵暫留
        store.set("other", "v", None).await.unwrap();
        assert_eq!(store.stored_len(), 2);
        assert_eq!(store.len(), 1);

        clock.advance(Duration::seconds(60));
        store.incr("counter", 60).await.unwrap();
        assert_eq!(store.stored_len(), 2);
        assert_eq!(store.get("short").await.unwrap(), None);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        count: u32,
    }

    #[tokio::test]
    async fn test_json_helpers_tolerate_corruption() {
        let (store, _clock) = store_with_clock();

        save_json(&store, "record", &Record { count: 3 }, Some(60))
            .await
            .unwrap();
        let loaded: Option<Record> = load_json(&store, "record").await.unwrap();
        assert_eq!(loaded, Some(Record { count: 3 }));

        store.set("record", "{not json", None).await.unwrap();
        let loaded: Option<Record> = load_json(&store, "record").await.unwrap();
        assert_eq!(loaded, None);

        store.set("count", "abc", None).await.unwrap();
        assert!(load_count(&store, "count").await.is_err());
    }
}
