use crate::{pool::RusqliteConnectionManager, sql::*};
use anyhow::Result;
use bb8::Pool;
use bililivedata_common::{
    create_dir,
    data::{format_time, CaptainEvent},
    database::DATABASE_DIRECTORY,
};
use once_cell::sync::Lazy;
use rusqlite::{named_params, OpenFlags};
use std::{path::Path, time::Duration};
use tokio::task::block_in_place;

const POOL_SIZE: u32 = 4;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static OPEN_FLAGS: Lazy<OpenFlags> = Lazy::new(|| {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
});

#[inline]
pub async fn create_db_dir() -> Result<()> {
    create_dir(&*DATABASE_DIRECTORY).await
}

/// 舰长和礼物排行的存储，可以随意 clone
#[derive(Clone, Debug)]
pub struct Storage {
    pool: Pool<RusqliteConnectionManager>,
}

impl Storage {
    /// 不会马上连接数据库，第一次使用时才打开
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let pool = Pool::builder()
            .max_size(POOL_SIZE)
            .max_lifetime(None)
            .idle_timeout(None)
            .connection_timeout(CONNECT_TIMEOUT)
            .build_unchecked(RusqliteConnectionManager::new(path, *OPEN_FLAGS, BUSY_TIMEOUT));

        Self { pool }
    }

    pub async fn create_tables(&self) -> Result<()> {
        let conn = self.pool.get().await?;
        block_in_place(|| {
            conn.execute_batch(CREATE_CAPTAINS)?;
            conn.execute_batch(CREATE_GIFT_RANKING)
        })?;

        Ok(())
    }

    /// 在一个事务里插入一条舰长记录，失败时回滚
    pub async fn insert_captain(&self, event: &CaptainEvent) -> Result<()> {
        let mut conn = self.pool.get().await?;
        block_in_place(|| {
            let tx = conn.transaction()?;
            let result = tx.execute(
                INSERT_CAPTAIN,
                named_params! {
                    ":user_uid": event.uid,
                    ":username": event.username,
                    ":joined_at": format_time(&event.joined_at),
                    ":joined_month": event.joined_month(),
                    ":level": event.level.name(),
                    ":ship_count": event.ship_count.max(1),
                    ":is_red_packet": event.is_red_packet,
                },
            );
            match result {
                Ok(_) => Ok(tx.commit()?),
                Err(e) => {
                    if let Err(e) = tx.rollback() {
                        log::warn!("failed to rollback captain transaction: {}", e);
                    }
                    Err(e.into())
                }
            }
        })
    }

    /// 累加用户的礼物数
    pub async fn record_gift(&self, uid: &str, username: &str, count: i64) -> Result<()> {
        let mut conn = self.pool.get().await?;
        block_in_place(|| {
            let tx = conn.transaction()?;
            let result = tx.execute(
                UPSERT_GIFT_RANKING,
                named_params! {
                    ":user_uid": uid,
                    ":username": username,
                    ":gift_count": count,
                },
            );
            match result {
                Ok(_) => Ok(tx.commit()?),
                Err(e) => {
                    if let Err(e) = tx.rollback() {
                        log::warn!("failed to rollback gift ranking transaction: {}", e);
                    }
                    Err(e.into())
                }
            }
        })
    }

    #[cfg(test)]
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.pool.get().await?;
        block_in_place(|| conn.execute_batch(sql))?;

        Ok(())
    }

    #[cfg(test)]
    pub async fn gift_ranking(
        &self,
        uid: &str,
    ) -> Result<Option<bililivedata_common::data::GiftRanking>> {
        use bililivedata_common::data::GiftRanking;
        use rusqlite::OptionalExtension;

        let conn = self.pool.get().await?;
        Ok(block_in_place(|| {
            conn.query_row(
                SELECT_GIFT_RANKING,
                named_params! { ":user_uid": uid },
                |r| {
                    Ok(GiftRanking {
                        uid: r.get(0)?,
                        username: r.get(1)?,
                        gift_count: r.get(2)?,
                        updated_at: r.get(3)?,
                    })
                },
            )
            .optional()
        })?)
    }

    #[cfg(test)]
    pub async fn captains(&self) -> Result<Vec<tests::CaptainRow>> {
        let conn = self.pool.get().await?;
        Ok(block_in_place(|| {
            let mut stmt = conn.prepare(SELECT_CAPTAINS)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(tests::CaptainRow {
                        uid: r.get(0)?,
                        username: r.get(1)?,
                        joined_at: r.get(2)?,
                        joined_month: r.get(3)?,
                        level: r.get(4)?,
                        ship_count: r.get(5)?,
                        is_red_packet: r.get(6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })?)
    }
}
