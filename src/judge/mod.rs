use std::path::Path;

use log::{error, info};

use crate::record::{write_record, JudgeRecord};

pub use comparator::{compare, compare_lines};
pub use grader::{Grader, JudgeTask};

mod comparator;
mod grader;

/// Outcome of one judging stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
  pub pass: bool,
  pub info: String,
}

impl Verdict {
  pub fn ok() -> Self {
    Verdict {
      pass: true,
      info: "ok".to_string(),
    }
  }

  pub fn fail<MS: Into<String>>(info: MS) -> Self {
    Verdict {
      pass: false,
      info: info.into(),
    }
  }
}

impl From<Verdict> for JudgeRecord {
  fn from(verdict: Verdict) -> Self {
    JudgeRecord {
      grade: verdict.pass,
      info: verdict.info,
    }
  }
}

/// Grade one test case and write its judge record.
/// Grading errors become a failed record instead of propagating.
pub fn judge(grader: &Grader, task: &JudgeTask, judge_record_path: &Path) -> JudgeRecord {
  let record = match grader.grade(task) {
    Ok(record) => record,
    Err(err) => {
      error!("Judge {} fails: {}", task.output.display(), err);
      JudgeRecord::rejected(format!("judge error: {}", err))
    }
  };

  info!(
    "Judge {}: grade {}, {}",
    judge_record_path.display(),
    if record.grade { 1 } else { 0 },
    record.info
  );

  if let Err(err) = write_record(judge_record_path, &record) {
    error!(
      "Fails writing judge record {}: {}",
      judge_record_path.display(),
      err
    );
  }

  record
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::{read_required, ExecRecord};
  use std::fs;

  #[test]
  fn it_should_write_judge_record() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    let task = JudgeTask {
      exec_record: dir.join("1.exec.json"),
      answer: dir.join("1.out"),
      output: dir.join("1.stdout.out"),
    };
    write_record(&task.exec_record, &ExecRecord::exited(0, 0.1, 100)).unwrap();
    fs::write(&task.answer, "3\n").unwrap();
    fs::write(&task.output, "3\n").unwrap();

    let path = dir.join("1.judge.json");
    let record = judge(&Grader::new(None), &task, &path);
    assert_eq!(record, JudgeRecord::accepted());
    assert_eq!(read_required::<JudgeRecord>(&path).unwrap(), record);
  }

  #[test]
  fn it_should_turn_errors_into_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    let task = JudgeTask {
      exec_record: dir.join("1.exec.json"),
      answer: dir.join("1.out"),
      output: dir.join("1.stdout.out"),
    };
    write_record(&task.exec_record, &ExecRecord::exited(0, 0.1, 100)).unwrap();

    let path = dir.join("1.judge.json");
    let record = judge(&Grader::new(None), &task, &path);
    assert!(!record.grade);
    assert!(record.info.starts_with("judge error"));
    assert_eq!(read_required::<JudgeRecord>(&path).unwrap(), record);
  }
}
