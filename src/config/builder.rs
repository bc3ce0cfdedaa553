use std::path::PathBuf;
use std::thread::available_parallelism;

use crate::config::{ExecConfig, Layout, Limits, PipelineConfig};
use crate::utils::{MemoryLimitType, TimeLimitType};

/// Build the config of one execution
pub struct ExecConfigBuilder {
  config: ExecConfig,
}

/// Build the config of a pipeline run
pub struct PipelineBuilder {
  config: PipelineConfig,
}

impl ExecConfigBuilder {
  pub(crate) fn new(binary_path: PathBuf, input_path: PathBuf) -> Self {
    ExecConfigBuilder {
      config: ExecConfig {
        binary_path,
        arguments: vec![],
        input_path,
        output_path: PathBuf::from("/dev/null"),
        error_path: PathBuf::from("/dev/null"),
        exec_record_path: PathBuf::from("/dev/null"),
        limits: Limits::default(),
        wall_limit: None,
      },
    }
  }

  /// Finish building
  pub fn build(self) -> ExecConfig {
    self.config
  }

  /// Set program arguments
  pub fn arguments<AS: Into<String>>(mut self, arguments: Vec<AS>) -> Self {
    self.config.arguments = arguments.into_iter().map(|a| a.into()).collect();
    self
  }

  /// Set stdout redirection
  pub fn stdout<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.config.output_path = path.into();
    self
  }

  /// Set stderr redirection
  pub fn stderr<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.config.error_path = path.into();
    self
  }

  /// Set where the exec record is written
  pub fn exec_record<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.config.exec_record_path = path.into();
    self
  }

  /// Set all the limits at once
  pub fn limits(mut self, limits: Limits) -> Self {
    self.config.limits = limits;
    self
  }

  /// Set time limit (unit: second)
  pub fn time_limit(mut self, value: TimeLimitType) -> Self {
    self.config.limits.time_limit = value;
    self
  }

  /// Set memory limit (unit: byte)
  pub fn memory_limit(mut self, value: MemoryLimitType) -> Self {
    self.config.limits.memory_limit = value;
    self
  }

  /// Set stack limit (unit: byte)
  pub fn stack_limit(mut self, value: MemoryLimitType) -> Self {
    self.config.limits.stack_limit = value;
    self
  }

  /// Set wall clock limit (unit: second)
  pub fn wall_limit(mut self, value: TimeLimitType) -> Self {
    self.config.wall_limit = Some(value);
    self
  }

  /// Set wall clock limit or keep the derived one
  pub fn set_wall_limit(mut self, value: Option<TimeLimitType>) -> Self {
    self.config.wall_limit = value;
    self
  }
}

impl PipelineBuilder {
  pub(crate) fn new(layout: Layout) -> Self {
    let jobs = available_parallelism().map(|n| n.get()).unwrap_or(1);
    PipelineBuilder {
      config: PipelineConfig {
        layout,
        limits: Limits::default(),
        arguments: vec![],
        manifest: None,
        jobs,
      },
    }
  }

  /// Finish building
  pub fn build(self) -> PipelineConfig {
    self.config
  }

  /// Set default limits of discovered test cases
  pub fn limits(mut self, limits: Limits) -> Self {
    self.config.limits = limits;
    self
  }

  /// Set default time limit (unit: second)
  pub fn time_limit(mut self, value: TimeLimitType) -> Self {
    self.config.limits.time_limit = value;
    self
  }

  /// Set default memory limit (unit: byte)
  pub fn memory_limit(mut self, value: MemoryLimitType) -> Self {
    self.config.limits.memory_limit = value;
    self
  }

  /// Set default stack limit (unit: byte)
  pub fn stack_limit(mut self, value: MemoryLimitType) -> Self {
    self.config.limits.stack_limit = value;
    self
  }

  /// Set program arguments
  pub fn arguments<AS: Into<String>>(mut self, arguments: Vec<AS>) -> Self {
    self.config.arguments = arguments.into_iter().map(|a| a.into()).collect();
    self
  }

  /// Read test cases from a manifest instead of scanning the input directory
  pub fn manifest<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
    self.config.manifest = path.map(|p| p.into());
    self
  }

  /// Set the number of workers or keep the number of cores
  pub fn jobs(mut self, value: Option<usize>) -> Self {
    if let Some(value) = value {
      self.config.jobs = value.max(1);
    }
    self
  }
}
