use log::{debug, info, warn};

use crate::pipeline::{Stage, TestCase};
use crate::record::{ExecRecord, JudgeRecord};

/// Hooks called by the pipeline, every method defaults to a no-op
pub trait Observer: Send + Sync {
  fn stage(&self, _stage: Stage) {}

  fn executed(&self, _test: &TestCase, _record: &ExecRecord) {}

  fn judged(&self, _test: &TestCase, _record: &JudgeRecord) {}
}

/// Forward pipeline events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

/// Swallow every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl Observer for LogObserver {
  fn stage(&self, stage: Stage) {
    info!("Pipeline enters {}", stage);
  }

  fn executed(&self, test: &TestCase, record: &ExecRecord) {
    if record.is_success() {
      debug!(
        "Test {} executed in {}s, {} KB",
        test.name, record.user_time, record.memory
      );
    } else {
      warn!(
        "Test {} executed with return code {}",
        test.name, record.return_code
      );
    }
  }

  fn judged(&self, test: &TestCase, record: &JudgeRecord) {
    info!(
      "Test {} judged: grade {}, {}",
      test.name,
      if record.grade { 1 } else { 0 },
      record.info
    );
  }
}

impl Observer for SilentObserver {}
