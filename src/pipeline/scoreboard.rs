use std::fmt::Write;

use log::warn;
use nix::libc::STDOUT_FILENO;
use nix::unistd::isatty;
use serde::Serialize;

use crate::config::Layout;
use crate::pipeline::TestCase;
use crate::record::{read_record, read_required, ExecRecord, JudgeRecord, RecordPolicy};

/// One rendered line of the scoreboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
  pub name: String,
  pub user_time: f64,
  pub return_code: i32,
  pub grade: bool,
  pub info: String,
}

/// Aggregated judge records of a pipeline run, ordered by test index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scoreboard {
  points: usize,
  total: usize,
  rows: Vec<ScoreRow>,
}

impl Scoreboard {
  /// `rows` must already be in scoreboard order
  pub fn new(rows: Vec<ScoreRow>) -> Self {
    Scoreboard {
      points: rows.iter().filter(|row| row.grade).count(),
      total: rows.len(),
      rows,
    }
  }

  /// 读取每个测试点的 exec 和 judge 记录
  pub fn collect(layout: &Layout, tests: &[TestCase]) -> Self {
    let rows = tests
      .iter()
      .map(|test| {
        let exec: Option<ExecRecord> =
          read_record(&layout.exec_record_path(&test.name), RecordPolicy::Optional)
            .ok()
            .flatten();
        let judge = read_required::<JudgeRecord>(&layout.judge_record_path(&test.name))
          .unwrap_or_else(|err| {
            warn!("Test {} has no judge record: {}", test.name, err);
            JudgeRecord::rejected(format!("judge record is missing: {}", err))
          });
        let exec = exec.unwrap_or_else(ExecRecord::sentinel);
        ScoreRow {
          name: test.name.clone(),
          user_time: exec.user_time,
          return_code: exec.return_code,
          grade: judge.grade,
          info: judge.info,
        }
      })
      .collect();
    Scoreboard::new(rows)
  }

  /// Number of accepted tests
  pub fn points(&self) -> usize {
    self.points
  }

  pub fn total(&self) -> usize {
    self.total
  }

  pub fn rows(&self) -> &Vec<ScoreRow> {
    &self.rows
  }

  pub fn report(&self) {
    let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
    if is_tty {
      self.report_human();
    } else {
      self.report_json();
    }
  }

  pub fn report_human(&self) {
    print!("{}", self.format_human());
  }

  pub fn report_json(&self) {
    println!("{}", self.format_json());
  }

  pub fn format_human(&self) -> String {
    let width = self
      .rows
      .iter()
      .map(|row| row.name.len())
      .max()
      .unwrap_or(2)
      .max(2);
    let border = format!("+-{}-+------+-----+", "-".repeat(width));

    let mut text = String::new();
    let _ = writeln!(text, "{}", border);
    let _ = writeln!(text, "| {:>width$} | time | ret |", "nr", width = width);
    let _ = writeln!(text, "{}", border);
    for row in self.rows.iter() {
      let color = if row.return_code != 0 {
        173
      } else if row.grade {
        65
      } else {
        131
      };
      let _ = writeln!(
        text,
        "|\x1b[48;5;{}m\x1b[38;5;232m {:>width$} | {:.2} | {:>3} \x1b[0m| {}",
        color,
        row.name,
        row.user_time,
        row.return_code,
        row.info,
        width = width
      );
    }
    let _ = writeln!(text, "{}", border);
    let footer = format!("points: {}/{}", self.points, self.total);
    let _ = writeln!(
      text,
      "| {:^inner$} |",
      footer,
      inner = border.len() - 4
    );
    let _ = writeln!(text, "{}", border);
    text
  }

  pub fn format_json(&self) -> String {
    serde_json::json!({
      "ok": true,
      "points": self.points,
      "total": self.total,
      "tests": self.rows,
    })
    .to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(name: &str, return_code: i32, grade: bool, info: &str) -> ScoreRow {
    ScoreRow {
      name: name.to_string(),
      user_time: 0.5,
      return_code,
      grade,
      info: info.to_string(),
    }
  }

  #[test]
  fn it_should_count_points() {
    let board = Scoreboard::new(vec![
      row("1", 0, true, "ok"),
      row("2", 1, false, "program exited with return code 1"),
      row("3", 0, true, "ok"),
    ]);
    assert_eq!(board.points(), 2);
    assert_eq!(board.total(), 3);

    let text = board.format_human();
    assert!(text.contains("points: 2/3"));
    assert!(text.contains("program exited with return code 1"));

    let value: serde_json::Value = serde_json::from_str(&board.format_json()).unwrap();
    assert_eq!(value["points"], 2);
    assert_eq!(value["tests"][1]["name"], "2");
    assert_eq!(value["tests"][1]["grade"], false);
  }

  #[test]
  fn it_should_reject_missing_judge_record() {
    let root = tempfile::tempdir().unwrap();
    let layout = Layout::under(root.path());
    let test = TestCase::new(
      "1",
      layout.input_path("1"),
      layout.answer_path("1"),
      Default::default(),
    );
    let board = Scoreboard::collect(&layout, &[test]);
    assert_eq!(board.points(), 0);
    assert!(!board.rows()[0].grade);
    assert_eq!(board.rows()[0].return_code, 2);
  }
}
