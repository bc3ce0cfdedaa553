use std::fmt::{Display, Formatter};
use std::fs;
use std::time::Instant;

use log::{debug, info};

use crate::config::{ExecConfig, PipelineConfig};
use crate::judge::{judge, Grader, JudgeTask};
use crate::observer::{LogObserver, Observer};
use crate::sandbox::{execute_with, Cancellation};
use crate::JudgeBoxError;

pub use discover::{load_manifest, scan, sort_tests, TestCase};
pub use pool::for_each_parallel;
pub use scoreboard::{ScoreRow, Scoreboard};

mod discover;
mod pool;
mod scoreboard;

/// States of one pipeline run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Discovering,
  Compiling,
  Executing,
  Judging,
  Aggregating,
  Done,
}

/// Drive every test case of one submission through exec and judge
pub struct Pipeline {
  config: PipelineConfig,
  observer: Box<dyn Observer>,
  cancellation: Cancellation,
}

impl Display for Stage {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Stage::Discovering => "Discovering",
      Stage::Compiling => "Compiling",
      Stage::Executing => "Executing",
      Stage::Judging => "Judging",
      Stage::Aggregating => "Aggregating",
      Stage::Done => "Done",
    };
    f.write_str(name)
  }
}

impl Pipeline {
  pub fn new(config: PipelineConfig) -> Self {
    Pipeline {
      config,
      observer: Box::new(LogObserver),
      cancellation: Cancellation::new(),
    }
  }

  pub fn observer<O: Observer + 'static>(mut self, observer: O) -> Self {
    self.observer = Box::new(observer);
    self
  }

  /// Cancelling it kills every running and pending child of this run
  pub fn cancellation(&self) -> Cancellation {
    self.cancellation.clone()
  }

  /// Run all the stages. Only discovery and directory setup errors abort the run.
  pub fn run(&self) -> Result<Scoreboard, JudgeBoxError> {
    let t0 = Instant::now();

    self.observer.stage(Stage::Discovering);
    let tests = self.discover()?;
    self.prepare()?;

    self.observer.stage(Stage::Compiling);
    let grader = Grader::from_compile_record(&self.config.layout().compile_record_path());

    self.observer.stage(Stage::Executing);
    self.execute_all(&tests);

    self.observer.stage(Stage::Judging);
    self.judge_all(&grader, &tests);

    self.observer.stage(Stage::Aggregating);
    let scoreboard = Scoreboard::collect(self.config.layout(), &tests);

    self.observer.stage(Stage::Done);
    info!(
      "Pipeline finished: {}/{} points, real time {:?}",
      scoreboard.points(),
      scoreboard.total(),
      t0.elapsed()
    );
    Ok(scoreboard)
  }

  /// Read the manifest if given, otherwise scan the input directory
  pub fn discover(&self) -> Result<Vec<TestCase>, JudgeBoxError> {
    match self.config.manifest() {
      Some(manifest) => load_manifest(manifest, self.config.limits()),
      None => scan(self.config.layout(), self.config.limits()),
    }
  }

  fn prepare(&self) -> Result<(), JudgeBoxError> {
    let layout = self.config.layout();
    fs::create_dir_all(layout.std_dir())?;
    fs::create_dir_all(layout.record_dir())?;
    Ok(())
  }

  pub fn exec_config(&self, test: &TestCase) -> ExecConfig {
    let layout = self.config.layout();
    ExecConfig::builder(layout.binary(), &test.input)
      .arguments(self.config.arguments().clone())
      .stdout(layout.stdout_path(&test.name))
      .stderr(layout.stderr_path(&test.name))
      .exec_record(layout.exec_record_path(&test.name))
      .limits(test.limits)
      .build()
  }

  pub fn judge_task(&self, test: &TestCase) -> JudgeTask {
    let layout = self.config.layout();
    JudgeTask {
      exec_record: layout.exec_record_path(&test.name),
      answer: test.answer.clone(),
      output: layout.stdout_path(&test.name),
    }
  }

  fn execute_all(&self, tests: &[TestCase]) {
    for_each_parallel(tests, self.config.jobs(), |test| {
      debug!("Execute test {}", test.name);
      let record = execute_with(&self.exec_config(test), &self.cancellation);
      self.observer.executed(test, &record);
    });
  }

  fn judge_all(&self, grader: &Grader, tests: &[TestCase]) {
    let layout = self.config.layout();
    for_each_parallel(tests, self.config.jobs(), |test| {
      let record = judge(
        grader,
        &self.judge_task(test),
        &layout.judge_record_path(&test.name),
      );
      self.observer.judged(test, &record);
    });
  }
}
