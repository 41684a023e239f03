use once_cell::sync::Lazy;
use std::path::PathBuf;

const DATABASE_DIR: &str = "database";
const REPORT_DIR: &str = "download_files";
pub const BILI_LIVE_DATABASE_NAME: &str = "bililive.db";

pub static DATABASE_DIRECTORY: Lazy<PathBuf> = Lazy::new(|| {
    let mut path = crate::DIRECTORY_PATH.clone();
    path.push(DATABASE_DIR);
    path
});

pub static BILI_LIVE_DATABASE: Lazy<PathBuf> = Lazy::new(|| {
    let mut path = DATABASE_DIRECTORY.clone();
    path.push(BILI_LIVE_DATABASE_NAME);
    path
});

/// 在舰列表报表的存放目录
pub static REPORT_DIRECTORY: Lazy<PathBuf> = Lazy::new(|| {
    let mut path = crate::DIRECTORY_PATH.clone();
    path.push(REPORT_DIR);
    path
});

#[inline]
pub fn report_file_name(month: &str) -> String {
    format!("{}在舰列表.xlsx", month)
}

#[inline]
pub fn report_path(month: &str) -> PathBuf {
    let mut path = REPORT_DIRECTORY.clone();
    path.push(report_file_name(month));
    path
}
