use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use flexi_logger::DeferredNow;
use log::Record;
use path_absolutize::Absolutize;

use crate::JudgeBoxError;

/// Seconds
pub type TimeLimitType = f64;

/// Bytes
pub type MemoryLimitType = u64;

/// Decimal places kept for `user_time` in exec records
pub const TIME_PRECISION: i32 = 10;

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Task successfully read from conf.json```
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}

/// 保留 TIME_PRECISION 位小数
pub fn round_seconds(value: f64) -> f64 {
  let factor = 10f64.powi(TIME_PRECISION);
  (value * factor).round() / factor
}

/// 转为绝对路径，避免程序名被当作 PATH 中的命令
pub fn absolutize<P: AsRef<Path>>(path: P) -> Result<PathBuf, JudgeBoxError> {
  let path = path.as_ref().absolutize()?;
  Ok(path.to_path_buf())
}

pub(crate) fn is_executable(path: &Path) -> bool {
  match fs::metadata(path) {
    Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
    Err(_) => false,
  }
}
