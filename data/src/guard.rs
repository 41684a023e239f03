use crate::{
    config::{GUARD_REPORT_ROOM_ID, GUARD_REPORT_RUID},
    mail::{self, Mailer},
    reconnect::wait_time,
    session::Session,
};
use anyhow::Result;
use bililivedata_common::{
    api, create_dir,
    data::{format_time, month_str, GuardRow},
    database::{report_file_name, report_path, REPORT_DIRECTORY},
};
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone};
use rust_xlsxwriter::Workbook;
use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};
use tokio::{fs, time};

const PAGE_INTERVAL: Duration = Duration::from_millis(800);
const HEADERS: [&str; 3] = ["UID", "用户名", "舰长等级"];

fn month_end(year: i32, month: u32) -> Option<NaiveDateTime> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()?
        .and_hms_opt(23, 59, 0)
}

#[inline]
fn to_local(naive: &NaiveDateTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(naive).earliest()
}

/// 下一个月末 23:59，已经到了就是下个月的月末
pub fn next_month_end(now: &DateTime<Local>) -> DateTime<Local> {
    let this_month = month_end(now.year(), now.month()).and_then(|t| to_local(&t));
    if let Some(target) = this_month {
        if *now < target {
            return target;
        }
    }
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    month_end(year, month)
        .and_then(|t| to_local(&t))
        .unwrap_or_else(|| *now + chrono::Duration::days(30))
}

/// 翻页直到遇到空页，中途某页失败时返回已经拿到的行，第一页就失败才返回错误
pub async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<GuardRow>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<GuardRow>>>,
{
    let mut rows = Vec::new();
    let mut page = 1;
    loop {
        let list = match fetch(page).await {
            Ok(list) => list,
            Err(e) if rows.is_empty() => return Err(e),
            Err(e) => {
                log::warn!(
                    "failed to get guard list page {}, keep {} rows collected before: {}",
                    page,
                    rows.len(),
                    e
                );
                break;
            }
        };
        if list.is_empty() {
            break;
        }
        rows.extend(list);
        page += 1;
        time::sleep(PAGE_INTERVAL).await;
    }

    Ok(rows)
}

/// 列宽为最长的字符数加 2
pub fn column_widths(rows: &[GuardRow]) -> [f64; 3] {
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in rows {
        for (width, value) in widths
            .iter_mut()
            .zip([row.uid.as_str(), row.name.as_str(), row.level.as_str()])
        {
            *width = (*width).max(value.chars().count());
        }
    }

    widths.map(|w| (w + 2) as f64)
}

pub fn build_report(rows: &[GuardRow], month: &str, path: &std::path::Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let _ = worksheet.set_name(format!("{}在舰列表", month))?;
    for (col, header) in HEADERS.iter().enumerate() {
        let _ = worksheet.write_string(0, col as u16, *header)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        let _ = worksheet.write_string(r, 0, &row.uid)?;
        let _ = worksheet.write_string(r, 1, &row.name)?;
        let _ = worksheet.write_string(r, 2, &row.level)?;
    }
    for (col, width) in column_widths(rows).iter().enumerate() {
        let _ = worksheet.set_column_width(col as u16, *width)?;
    }
    workbook.save(path)?;

    Ok(())
}

/// 每月末生成在舰列表并发邮件
#[derive(Clone, Debug)]
pub struct GuardReport {
    session: Arc<Session>,
    mailer: Arc<Mailer>,
    receiver: String,
}

impl GuardReport {
    #[inline]
    pub fn new(session: Arc<Session>, mailer: Arc<Mailer>, receiver: impl Into<String>) -> Self {
        Self {
            session,
            mailer,
            receiver: receiver.into(),
        }
    }

    /// 主直播间和主播 uid，uid 没获取到时用默认值
    fn target(&self) -> (i64, i64) {
        let room_id = self
            .session
            .primary_room()
            .map(|r| r.room_id)
            .unwrap_or(GUARD_REPORT_ROOM_ID);
        let ruid = self.session.uid(room_id).unwrap_or(GUARD_REPORT_RUID);
        (room_id, ruid)
    }

    pub async fn run(&self, month: &str) -> Result<PathBuf> {
        let (room_id, ruid) = self.target();
        log::info!("[{}] collecting guard list of {}", room_id, month);
        let client = self.session.client();
        let rows = collect_pages(|page| api::guard_page(client, ruid, room_id, page)).await?;
        let total = rows.len();

        create_dir(&*REPORT_DIRECTORY).await?;
        let path = report_path(month);
        let (month_owned, path_owned) = (month.to_string(), path.clone());
        tokio::task::spawn_blocking(move || build_report(&rows, &month_owned, &path_owned)).await??;

        let smtp = self.mailer.settings();
        if !smtp.has_sender() || self.receiver.is_empty() {
            log::warn!("smtp host, email_from or receiver isn't configured, skip guard report mail");
            return Ok(path);
        }
        let message = mail::with_xlsx(
            &smtp.email_from,
            &self.receiver,
            &format!("{}在舰列表（自动发送）", month),
            format!("{} 在舰列表已生成，共 {} 人。", month, total),
            report_file_name(month),
            fs::read(&path).await?,
        )?;
        self.mailer.deliver(message).await?;
        log::info!(
            "sent guard list of {}, {} guards, saved in {}",
            month,
            total,
            path.display()
        );

        Ok(path)
    }
}

pub async fn scheduler(report: GuardReport) {
    loop {
        let now = Local::now();
        let target = next_month_end(&now);
        let wait = wait_time(&now, &target);
        log::info!(
            "next guard report at {}, about {:.1} minutes later",
            format_time(&target),
            wait.as_secs_f64() / 60.0
        );
        time::sleep(wait).await;

        if let Err(e) = report.run(&month_str(&target)).await {
            log::error!("failed to make guard report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn row(uid: &str, name: &str, level: &str) -> GuardRow {
        GuardRow {
            uid: uid.to_string(),
            name: name.to_string(),
            level: level.to_string(),
        }
    }

    #[test]
    fn test_next_month_end() {
        assert_eq!(
            next_month_end(&local(2024, 1, 15, 10, 0, 0)),
            local(2024, 1, 31, 23, 59, 0)
        );
        assert_eq!(
            next_month_end(&local(2024, 2, 1, 0, 0, 0)),
            local(2024, 2, 29, 23, 59, 0)
        );
        assert_eq!(
            next_month_end(&local(2023, 2, 28, 23, 58, 59)),
            local(2023, 2, 28, 23, 59, 0)
        );
        // 正好 23:59 时是下个月
        assert_eq!(
            next_month_end(&local(2024, 4, 30, 23, 59, 0)),
            local(2024, 5, 31, 23, 59, 0)
        );
        assert_eq!(
            next_month_end(&local(2024, 12, 31, 23, 59, 30)),
            local(2025, 1, 31, 23, 59, 0)
        );
    }

    #[test]
    fn test_column_widths() {
        assert_eq!(column_widths(&[]), [5.0, 5.0, 6.0]);
        let rows = [row("1234567890", "名字很长很长的用户", "舰长"), row("1", "a", "")];
        assert_eq!(column_widths(&rows), [12.0, 11.0, 6.0]);
    }

    #[test]
    fn test_build_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(report_file_name("202401"));
        build_report(&[row("1", "a", "舰长"), row("2", "b", "总督")], "202401", &path)?;
        assert!(std::fs::metadata(&path)?.len() > 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_collect_pages() -> Result<()> {
        let rows = collect_pages(|page| async move {
            Ok(match page {
                1 => vec![row("1", "a", "舰长"), row("2", "b", "提督")],
                2 => vec![row("3", "c", "总督")],
                _ => Vec::new(),
            })
        })
        .await?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].uid, "3");

        let partial = collect_pages(|page| async move {
            match page {
                1 => Ok(vec![row("1", "a", "舰长")]),
                _ => Err(anyhow::anyhow!("HTTP 412")),
            }
        })
        .await?;
        assert_eq!(partial, vec![row("1", "a", "舰长")]);

        let failed = collect_pages(|_| async { Err::<Vec<GuardRow>, _>(anyhow::anyhow!("network")) }).await;
        assert!(failed.is_err());

        Ok(())
    }
}
