use std::path::{Path, PathBuf};

use log::{debug, info};
use nix::sys::signal::Signal;

use crate::judge::{compare, Verdict};
use crate::record::{read_record, read_required, CompileRecord, ExecRecord, JudgeRecord, RecordPolicy};
use crate::JudgeBoxError;

/// Files consumed when grading one test case
#[derive(Debug, Clone)]
pub struct JudgeTask {
  pub exec_record: PathBuf,
  pub answer: PathBuf,
  pub output: PathBuf,
}

/// Compile check, then exec check, then answer comparison
#[derive(Debug, Clone)]
pub struct Grader {
  compile: Option<CompileRecord>,
}

impl Grader {
  pub fn new(compile: Option<CompileRecord>) -> Self {
    Grader { compile }
  }

  /// A missing or malformed compile record means there was no compile step
  pub fn from_compile_record(path: &Path) -> Self {
    let compile = read_record::<CompileRecord>(path, RecordPolicy::Optional)
      .ok()
      .flatten();
    match &compile {
      Some(record) => debug!("Compile record: {:?}", record),
      None => debug!("No compile record at {}", path.display()),
    }
    Grader::new(compile)
  }

  pub fn compile_record(&self) -> &Option<CompileRecord> {
    &self.compile
  }

  pub fn check_compile(&self) -> Verdict {
    match &self.compile {
      Some(record) if record.return_code != 0 => Verdict::fail(format!(
        "compilation failed with return code {}",
        record.return_code
      )),
      _ => Verdict::ok(),
    }
  }

  pub fn check_exec(record: &ExecRecord) -> Verdict {
    if record.return_code > 0 {
      Verdict::fail(format!(
        "program exited with return code {}",
        record.return_code
      ))
    } else if record.return_code < 0 {
      let signal = record.signal.unwrap_or(record.return_code.abs());
      match Signal::try_from(signal) {
        Ok(name) => Verdict::fail(format!(
          "program was terminated by signal {} ({})",
          signal, name
        )),
        Err(_) => Verdict::fail(format!("program was terminated by signal {}", signal)),
      }
    } else {
      Verdict::ok()
    }
  }

  /// Grade one test case. Missing exec record or unreadable files are errors.
  pub fn grade(&self, task: &JudgeTask) -> Result<JudgeRecord, JudgeBoxError> {
    let verdict = self.check_compile();
    if !verdict.pass {
      info!("Skip judging: {}", verdict.info);
      return Ok(verdict.into());
    }

    let exec: ExecRecord = read_required(&task.exec_record)?;
    let verdict = Self::check_exec(&exec);
    if !verdict.pass {
      return Ok(verdict.into());
    }

    let verdict = compare(&task.answer, &task.output)?;
    Ok(verdict.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_describe_exec_failures() {
    let verdict = Grader::check_exec(&ExecRecord::exited(1, 0.1, 0));
    assert_eq!(verdict, Verdict::fail("program exited with return code 1"));

    let verdict = Grader::check_exec(&ExecRecord::signaled(9, 0.1, 0));
    assert!(!verdict.pass);
    assert!(verdict.info.contains("terminated by signal 9"));
    assert!(verdict.info.contains("SIGKILL"));

    assert_eq!(Grader::check_exec(&ExecRecord::exited(0, 0.1, 0)), Verdict::ok());
  }

  #[test]
  fn it_should_fail_open_without_compile_record() {
    assert_eq!(Grader::new(None).check_compile(), Verdict::ok());
    assert_eq!(
      Grader::new(Some(CompileRecord { return_code: 0 })).check_compile(),
      Verdict::ok()
    );
    let verdict = Grader::new(Some(CompileRecord { return_code: 256 })).check_compile();
    assert_eq!(verdict.info, "compilation failed with return code 256");
  }

  #[test]
  fn it_should_short_circuit_on_compile_failure() {
    let grader = Grader::new(Some(CompileRecord { return_code: 1 }));
    let task = JudgeTask {
      exec_record: PathBuf::from("/nonexistent/1.exec.json"),
      answer: PathBuf::from("/nonexistent/1.out"),
      output: PathBuf::from("/nonexistent/1.stdout.out"),
    };
    let record = grader.grade(&task).unwrap();
    assert!(!record.grade);
    assert!(record.info.contains("compilation failed"));
  }

  #[test]
  fn it_should_require_exec_record() {
    let grader = Grader::new(None);
    let task = JudgeTask {
      exec_record: PathBuf::from("/nonexistent/1.exec.json"),
      answer: PathBuf::from("/nonexistent/1.out"),
      output: PathBuf::from("/nonexistent/1.stdout.out"),
    };
    assert!(grader.grade(&task).is_err());
  }
}
