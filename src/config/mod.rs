use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::{MemoryLimitType, TimeLimitType};

pub use builder::{ExecConfigBuilder, PipelineBuilder};

mod builder;

pub const DEFAULT_TIME_LIMIT: TimeLimitType = 2.0;

pub const DEFAULT_MEMORY_LIMIT: MemoryLimitType = 256 * 1024 * 1024;

pub const DEFAULT_STACK_LIMIT: MemoryLimitType = 8 * 1024 * 1024;

/// One day, anything longer is treated as a typo
pub const MAX_TIME_LIMIT: TimeLimitType = 24.0 * 60.0 * 60.0;

/// Resource limits of one test case
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
  /// CPU time limit (unit: second)
  pub time_limit: TimeLimitType,
  /// Address space limit (unit: byte)
  pub memory_limit: MemoryLimitType,
  /// Stack limit (unit: byte), 0 keeps the inherited limit
  pub stack_limit: MemoryLimitType,
}

/// Everything the runner needs to execute one test case
#[derive(Debug, Clone)]
pub struct ExecConfig {
  pub(crate) binary_path: PathBuf,
  pub(crate) arguments: Vec<String>,
  pub(crate) input_path: PathBuf,
  pub(crate) output_path: PathBuf,
  pub(crate) error_path: PathBuf,
  pub(crate) exec_record_path: PathBuf,
  pub(crate) limits: Limits,
  pub(crate) wall_limit: Option<TimeLimitType>,
}

/// Directory conventions shared by the exec and judge phases
#[derive(Debug, Clone)]
pub struct Layout {
  binary: PathBuf,
  input_dir: PathBuf,
  answer_dir: PathBuf,
  std_dir: PathBuf,
  record_dir: PathBuf,
}

/// Configuration of a whole pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub(crate) layout: Layout,
  pub(crate) limits: Limits,
  pub(crate) arguments: Vec<String>,
  pub(crate) manifest: Option<PathBuf>,
  pub(crate) jobs: usize,
}

impl Default for Limits {
  fn default() -> Self {
    Limits {
      time_limit: DEFAULT_TIME_LIMIT,
      memory_limit: DEFAULT_MEMORY_LIMIT,
      stack_limit: DEFAULT_STACK_LIMIT,
    }
  }
}

impl Limits {
  /// Reject time limits that are not a number of seconds we can wait for
  pub fn check(&self) -> Result<(), String> {
    check_seconds("time limit", self.time_limit)
  }

  /// CPU deadline observed by the watchdog
  pub fn cpu_deadline(&self) -> Duration {
    seconds_to_duration(self.time_limit)
  }

  /// Whole seconds handed to RLIMIT_CPU
  pub fn cpu_seconds(&self) -> u64 {
    self.time_limit.max(0.0).ceil() as u64
  }
}

pub fn check_seconds(what: &str, value: TimeLimitType) -> Result<(), String> {
  if !value.is_finite() || value < 0.0 || value > MAX_TIME_LIMIT {
    Err(format!(
      "{} must be between 0 and {} seconds, got {}",
      what, MAX_TIME_LIMIT, value
    ))
  } else {
    Ok(())
  }
}

/// NaN and negative values become zero, huge values saturate
fn seconds_to_duration(value: TimeLimitType) -> Duration {
  if value.is_nan() {
    return Duration::ZERO;
  }
  Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

impl ExecConfig {
  pub fn builder<BP: Into<PathBuf>, IP: Into<PathBuf>>(
    binary_path: BP,
    input_path: IP,
  ) -> ExecConfigBuilder {
    ExecConfigBuilder::new(binary_path.into(), input_path.into())
  }

  pub fn binary_path(&self) -> &Path {
    &self.binary_path
  }

  pub fn arguments(&self) -> &Vec<String> {
    &self.arguments
  }

  pub fn input_path(&self) -> &Path {
    &self.input_path
  }

  pub fn output_path(&self) -> &Path {
    &self.output_path
  }

  pub fn error_path(&self) -> &Path {
    &self.error_path
  }

  pub fn exec_record_path(&self) -> &Path {
    &self.exec_record_path
  }

  pub fn limits(&self) -> &Limits {
    &self.limits
  }

  /// Wall clock guard, defaults to the CPU limit rounded up plus one second
  pub fn wall_limit(&self) -> Duration {
    match self.wall_limit {
      Some(value) => seconds_to_duration(value),
      None => Duration::from_secs(self.limits.cpu_seconds().saturating_add(1)),
    }
  }
}

impl Layout {
  pub fn new<P: Into<PathBuf>>(
    binary: P,
    input_dir: P,
    answer_dir: P,
    std_dir: P,
    record_dir: P,
  ) -> Self {
    Layout {
      binary: binary.into(),
      input_dir: input_dir.into(),
      answer_dir: answer_dir.into(),
      std_dir: std_dir.into(),
      record_dir: record_dir.into(),
    }
  }

  /// `root/bin/program`, `root/tests/in`, `root/tests/out`, `root/std`, `root/out`
  pub fn under<P: AsRef<Path>>(root: P) -> Self {
    let root = root.as_ref();
    Layout {
      binary: root.join("bin").join("program"),
      input_dir: root.join("tests").join("in"),
      answer_dir: root.join("tests").join("out"),
      std_dir: root.join("std"),
      record_dir: root.join("out"),
    }
  }

  pub fn binary(&self) -> &Path {
    &self.binary
  }

  pub fn input_dir(&self) -> &Path {
    &self.input_dir
  }

  pub fn answer_dir(&self) -> &Path {
    &self.answer_dir
  }

  pub fn std_dir(&self) -> &Path {
    &self.std_dir
  }

  pub fn record_dir(&self) -> &Path {
    &self.record_dir
  }

  pub fn input_path(&self, name: &str) -> PathBuf {
    self.input_dir.join(format!("{}.in", name))
  }

  pub fn answer_path(&self, name: &str) -> PathBuf {
    self.answer_dir.join(format!("{}.out", name))
  }

  pub fn stdout_path(&self, name: &str) -> PathBuf {
    self.std_dir.join(format!("{}.stdout.out", name))
  }

  pub fn stderr_path(&self, name: &str) -> PathBuf {
    self.std_dir.join(format!("{}.stderr.out", name))
  }

  pub fn compile_record_path(&self) -> PathBuf {
    self.record_dir.join("comp.json")
  }

  pub fn exec_record_path(&self, name: &str) -> PathBuf {
    self.record_dir.join(format!("{}.exec.json", name))
  }

  pub fn judge_record_path(&self, name: &str) -> PathBuf {
    self.record_dir.join(format!("{}.judge.json", name))
  }
}

impl PipelineConfig {
  pub fn builder(layout: Layout) -> PipelineBuilder {
    PipelineBuilder::new(layout)
  }

  pub fn layout(&self) -> &Layout {
    &self.layout
  }

  pub fn limits(&self) -> &Limits {
    &self.limits
  }

  pub fn arguments(&self) -> &Vec<String> {
    &self.arguments
  }

  pub fn manifest(&self) -> &Option<PathBuf> {
    &self.manifest
  }

  pub fn jobs(&self) -> usize {
    self.jobs
  }
}
