use crate::{
    alert::CookieAlert,
    captain::{self, CaptainQueue},
    config::{self, CAPTAIN_QUEUE_SIZE, GUARD_REPORT_ROOM_ID},
    gift::GiftRecorder,
    guard::{self, GuardReport},
    handler::Classifier,
    mail::{self, Mailer},
    reconnect,
    room::RoomManager,
    session::Session,
    sqlite::Storage,
    status::{self, LiveStatusTable},
};
use anyhow::Result;
use bililivedata_common::{config::Settings, data::LiveStatusSnapshot};
use std::{path::Path, sync::Arc};
use tokio::{sync::Mutex, task::JoinHandle};

struct Running {
    session: Arc<Session>,
    rooms: Arc<RoomManager>,
    tasks: Vec<JoinHandle<()>>,
}

/// 启动和停止所有后台任务
pub struct Monitor {
    settings: Settings,
    primary_room: i64,
    status: Arc<LiveStatusTable>,
    running: Mutex<Option<Running>>,
}

impl Monitor {
    pub fn new(settings: Settings) -> Self {
        let primary_room = config::rooms(&settings)
            .first()
            .map(|r| r.room_id)
            .unwrap_or(GUARD_REPORT_ROOM_ID);
        Self {
            settings,
            primary_room,
            status: Arc::new(LiveStatusTable::new()),
            running: Mutex::new(None),
        }
    }

    /// 主直播间的直播状态
    #[inline]
    pub fn snapshot(&self) -> LiveStatusSnapshot {
        self.status.snapshot(self.primary_room)
    }

    #[inline]
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// 没有开启监听或者已经启动时什么都不做，只有创建 HTTP client 失败会返回错误
    #[inline]
    pub async fn bootstrap(&self, database: &Path) -> Result<()> {
        self.start(database, |settings| {
            Session::new(settings.cookies.clone(), config::rooms(settings))
        })
        .await
    }

    async fn start<F>(&self, database: &Path, new_session: F) -> Result<()>
    where
        F: FnOnce(&Settings) -> Result<Session>,
    {
        if !self.settings.monitor_enabled {
            log::info!("monitor is disabled");
            return Ok(());
        }
        let mut running = self.running.lock().await;
        if running.is_some() {
            log::debug!("monitor is already running");
            return Ok(());
        }

        let session = Arc::new(new_session(&self.settings)?);
        session.resolve_uids().await;

        let storage = Storage::open(database);
        if let Err(e) = storage.create_tables().await {
            log::error!("failed to create tables in {}: {}", database.display(), e);
        }

        let (queue, captain_rx) = CaptainQueue::new(CAPTAIN_QUEUE_SIZE);
        let (mailer, mail_rx) = Mailer::new(self.settings.smtp.clone());
        let mailer = Arc::new(mailer);
        let alert = Arc::new(CookieAlert::new(mailer.clone()));
        let classifier = Classifier::new(queue, GiftRecorder::new(storage.clone()), alert);
        let rooms = Arc::new(RoomManager::new(
            session.clone(),
            Arc::new(classifier),
            self.status.clone(),
        ));
        let room_ids: Vec<i64> = session.rooms().iter().map(|r| r.room_id).collect();
        let report = GuardReport::new(
            session.clone(),
            mailer.clone(),
            self.settings.report_receiver(),
        );

        let start_rooms = rooms.clone();
        let tasks = vec![
            tokio::spawn(captain::writer(captain_rx, storage)),
            tokio::spawn(async move { start_rooms.start_all().await }),
            tokio::spawn(status::poll(session.clone(), self.status.clone())),
            tokio::spawn(reconnect::scheduler(rooms.clone(), room_ids)),
            tokio::spawn(guard::scheduler(report)),
            tokio::spawn(mail::worker(mailer, mail_rx)),
        ];
        *running = Some(Running {
            session,
            rooms,
            tasks,
        });
        log::info!("monitor started");

        Ok(())
    }

    /// 取消所有任务，关闭所有连接，可以重复调用
    pub async fn shutdown(&self) {
        let running = match self.running.lock().await.take() {
            Some(running) => running,
            None => return,
        };
        let Running {
            session,
            rooms,
            tasks,
        } = running;

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => log::debug!("task was cancelled"),
                Err(e) => log::error!("task failed while shutting down: {}", e),
            }
        }
        rooms.close_all().await;
        drop(rooms);
        drop(session);
        log::info!("monitor stopped");
    }
}
