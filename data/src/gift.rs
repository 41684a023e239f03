use crate::sqlite::Storage;
use tokio::task::JoinHandle;

/// 每个礼物单独起一个任务写入，不在弹幕回调里等待
#[derive(Clone, Debug)]
pub struct GiftRecorder {
    storage: Storage,
}

impl GiftRecorder {
    #[inline]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn record(&self, uid: String, username: String, count: i64) -> JoinHandle<()> {
        let storage = self.storage.clone();
        tokio::spawn(async move {
            match storage.record_gift(&uid, &username, count).await {
                Ok(()) => log::debug!("gift ranking uid={} +{}", uid, count),
                Err(e) => log::error!("failed to update gift ranking uid={}: {}", uid, e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::tests::temp_storage;
    use anyhow::Result;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record() -> Result<()> {
        let (_dir, storage) = temp_storage().await?;
        let recorder = GiftRecorder::new(storage.clone());
        let handles: Vec<_> = [(4, "a"), (1, ""), (7, "b")]
            .into_iter()
            .map(|(n, name)| recorder.record("1".to_string(), name.to_string(), n))
            .collect();
        for handle in handles {
            handle.await?;
        }
        let ranking = storage.gift_ranking("1").await?.unwrap();
        assert_eq!(ranking.gift_count, 12);
        assert!(ranking.username.is_some());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_failure_is_swallowed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::open(dir.path().join("test.db"));
        let recorder = GiftRecorder::new(storage.clone());

        recorder.record("1".to_string(), "a".to_string(), 3).await?;
        assert!(storage.gift_ranking("1").await.is_err());

        storage.create_tables().await?;
        recorder.record("1".to_string(), "a".to_string(), 2).await?;
        assert_eq!(storage.gift_ranking("1").await?.unwrap().gift_count, 2);

        Ok(())
    }
}
