use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::judge::Verdict;
use crate::JudgeBoxError;

/// Compare the program output against the expected answer.
///
/// Lines are compared in order after stripping surrounding whitespace. Only
/// the answer's length is checked: extra trailing output lines are ignored.
pub fn compare(answer_path: &Path, output_path: &Path) -> Result<Verdict, JudgeBoxError> {
  let answer = File::open(answer_path).map_err(|err| {
    JudgeBoxError::Fs(format!("can not open answer {} ({})", answer_path.display(), err))
  })?;
  let output = File::open(output_path).map_err(|err| {
    JudgeBoxError::Fs(format!("can not open output {} ({})", output_path.display(), err))
  })?;
  compare_lines(BufReader::new(answer), BufReader::new(output))
}

pub fn compare_lines<A: BufRead, O: BufRead>(answer: A, output: O) -> Result<Verdict, JudgeBoxError> {
  let mut output = output.lines();

  for (index, expected) in answer.lines().enumerate() {
    let line_nr = index + 1;
    let expected = expected?;
    let expected = expected.trim();

    let actual = match output.next() {
      Some(line) => line?,
      None => {
        debug!("Output ends before line {}", line_nr);
        return Ok(Verdict::fail(format!(
          "unexpected EOF in line {}: expected \"{}\"",
          line_nr, expected
        )));
      }
    };
    let actual = actual.trim();

    if expected != actual {
      debug!("Line {} differs", line_nr);
      return Ok(Verdict::fail(format!(
        "line {} is not correct: expected \"{}\" but got \"{}\"",
        line_nr, expected, actual
      )));
    }
  }

  Ok(Verdict::ok())
}
