use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::config::ExecConfig;
use crate::record::{write_record, ExecRecord};
use crate::utils::{absolutize, is_executable};
use crate::JudgeBoxError;

pub use limiter::Limiter;
pub use process::{ChildProcess, ExitStatus, ProcessExit};
pub use watchdog::{
  Cancellation, KillReason, SleepTicker, Supervised, Ticker, Watchdog, WatchdogOutcome,
};

mod limiter;
mod process;
mod watchdog;

/// Run one test case and always leave an exec record behind
pub fn execute(config: &ExecConfig) -> ExecRecord {
  execute_with(config, &Cancellation::new())
}

/// Same as [`execute`], `cancellation` kills the child from the outside
pub fn execute_with(config: &ExecConfig, cancellation: &Cancellation) -> ExecRecord {
  let record = match run(config, cancellation) {
    Ok(record) => record,
    Err(err) => {
      if err.is_setup() {
        warn!("Skip running {}: {}", config.binary_path().display(), err);
      } else {
        error!("Execute {} fails: {}", config.binary_path().display(), err);
      }
      // 让人能在 stderr 文件里看到失败原因
      if let Err(write_err) = fs::write(config.error_path(), format!("{}\n", err)) {
        error!(
          "Fails writing diagnostic to {}: {}",
          config.error_path().display(),
          write_err
        );
      }
      ExecRecord::sentinel()
    }
  };

  if let Err(err) = write_record(config.exec_record_path(), &record) {
    error!(
      "Fails writing exec record {}: {}",
      config.exec_record_path().display(),
      err
    );
  }

  record
}

/// Run one test case, reporting internal failures as errors
pub fn run(config: &ExecConfig, cancellation: &Cancellation) -> Result<ExecRecord, JudgeBoxError> {
  let binary = resolve_binary(config.binary_path())?;
  if !config.input_path().is_file() {
    return Err(JudgeBoxError::missing_input(config.input_path()));
  }

  let stdin = File::open(config.input_path())?;
  let stdout = File::create(config.output_path())?;
  let stderr = File::create(config.error_path())?;

  let mut command = Command::new(&binary);
  command
    .args(config.arguments())
    .env_clear()
    .env("PATH", env::var("PATH").unwrap_or("".to_string()))
    .stdin(Stdio::from(stdin))
    .stdout(Stdio::from(stdout))
    .stderr(Stdio::from(stderr));

  Limiter::new(config.limits()).install(&mut command);

  {
    let args = config.arguments().join(" ");
    info!(
      "Start running program {} {}",
      binary.display(),
      args
    );
  }

  let t0 = Instant::now();
  let child = command.spawn().map_err(|err| {
    JudgeBoxError::spawn(format!(
      "can not start {} ({})",
      binary.display(),
      err
    ))
  })?;
  let mut process = ChildProcess::new(child.id());
  debug!("Child process #{} is running", process.pid());

  let watchdog = Watchdog::new(config.limits().cpu_deadline(), config.wall_limit());
  let mut ticker = SleepTicker::new(cancellation.clone());
  let outcome = watchdog.supervise(&mut process, &mut ticker)?;

  let exit = &outcome.exit;
  match outcome.killed {
    Some(reason) => info!(
      "Child process #{} is killed ({}), real time {:?}",
      process.pid(),
      reason,
      t0.elapsed()
    ),
    None => info!(
      "Child process #{} exited with return code {}, real time {:?}",
      process.pid(),
      exit.return_code(),
      t0.elapsed()
    ),
  }

  Ok(ExecRecord::new(
    exit.return_code(),
    exit.user_time.as_secs_f64(),
    exit.memory,
  ))
}

/// 相对路径按当前目录解析，不在 PATH 中查找
fn resolve_binary(path: &Path) -> Result<PathBuf, JudgeBoxError> {
  let binary = absolutize(path)?;
  if is_executable(&binary) {
    Ok(binary)
  } else {
    Err(JudgeBoxError::missing_binary(path))
  }
}
