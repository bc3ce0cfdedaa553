use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::utils::round_seconds;
use crate::JudgeBoxError;

/// Return code of the record written when the runner itself fails
pub const SENTINEL_RETURN_CODE: i32 = 2;

/// Written by the external compile phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileRecord {
  pub return_code: i32,
}

/// Written by the runner, exactly once per test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecRecord {
  /// Exit code, or the negated signal number
  pub return_code: i32,
  pub signal: Option<i32>,
  /// Seconds
  pub user_time: f64,
  /// Peak resident set (unit: KB)
  pub memory: i64,
}

/// Final verdict of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRecord {
  #[serde(with = "grade_flag")]
  pub grade: bool,
  #[serde(default = "ok_info")]
  pub info: String,
}

/// How a missing or malformed record file is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPolicy {
  /// Absence or corruption reads as "no record"
  Optional,
  /// Absence or corruption is an error
  Required,
}

impl ExecRecord {
  pub fn new(return_code: i32, user_time: f64, memory: i64) -> Self {
    ExecRecord {
      return_code,
      signal: if return_code < 0 {
        Some(return_code.abs())
      } else {
        None
      },
      user_time: round_seconds(user_time),
      memory,
    }
  }

  pub fn exited(code: i32, user_time: f64, memory: i64) -> Self {
    Self::new(code, user_time, memory)
  }

  pub fn signaled(signal: i32, user_time: f64, memory: i64) -> Self {
    Self::new(-signal.abs(), user_time, memory)
  }

  /// Produced instead of a real record when the runner fails internally
  pub fn sentinel() -> Self {
    ExecRecord {
      return_code: SENTINEL_RETURN_CODE,
      signal: None,
      user_time: 0.0,
      memory: 0,
    }
  }

  pub fn is_success(&self) -> bool {
    self.return_code == 0
  }
}

impl JudgeRecord {
  pub fn accepted() -> Self {
    JudgeRecord {
      grade: true,
      info: ok_info(),
    }
  }

  pub fn rejected<MS: Into<String>>(info: MS) -> Self {
    JudgeRecord {
      grade: false,
      info: info.into(),
    }
  }
}

fn ok_info() -> String {
  "ok".to_string()
}

/// `grade` is a boolean on our side and `1` / `0` on disk
mod grade_flag {
  use serde::de::{self, Deserializer, Unexpected, Visitor};
  use serde::Serializer;

  pub fn serialize<S: Serializer>(grade: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(if *grade { 1 } else { 0 })
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    deserializer.deserialize_any(GradeVisitor)
  }

  struct GradeVisitor;

  impl<'de> Visitor<'de> for GradeVisitor {
    type Value = bool;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
      f.write_str("0, 1 or a boolean")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
      Ok(value)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
      match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(E::invalid_value(Unexpected::Unsigned(value), &self)),
      }
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
      match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(E::invalid_value(Unexpected::Signed(value), &self)),
      }
    }
  }
}

/// Read one JSON record, `policy` decides whether a bad file is an error
pub fn read_record<T: DeserializeOwned>(
  path: &Path,
  policy: RecordPolicy,
) -> Result<Option<T>, JudgeBoxError> {
  let text = match fs::read_to_string(path) {
    Ok(text) => text,
    Err(err) => {
      return match policy {
        RecordPolicy::Optional => {
          if err.kind() != ErrorKind::NotFound {
            warn!("Ignore unreadable record {}: {}", path.display(), err);
          } else {
            debug!("Optional record {} does not exist", path.display());
          }
          Ok(None)
        }
        RecordPolicy::Required => Err(JudgeBoxError::record(format!(
          "can not read {} ({})",
          path.display(),
          err
        ))),
      };
    }
  };

  match serde_json::from_str::<T>(&text) {
    Ok(record) => Ok(Some(record)),
    Err(err) => match policy {
      RecordPolicy::Optional => {
        warn!("Ignore malformed record {}: {}", path.display(), err);
        Ok(None)
      }
      RecordPolicy::Required => Err(JudgeBoxError::record(format!(
        "malformed {} ({})",
        path.display(),
        err
      ))),
    },
  }
}

/// Read a record that must exist
pub fn read_required<T: DeserializeOwned>(path: &Path) -> Result<T, JudgeBoxError> {
  read_record(path, RecordPolicy::Required)?
    .ok_or_else(|| JudgeBoxError::record(format!("missing {}", path.display())))
}

pub fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<(), JudgeBoxError> {
  let file = File::create(path)?;
  let mut writer = BufWriter::new(file);
  serde_json::to_writer(&mut writer, record)?;
  writer.flush()?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_derive_signal() {
    let record = ExecRecord::new(-9, 0.5, 1024);
    assert_eq!(record.signal, Some(9));
    assert!(!record.is_success());

    let record = ExecRecord::new(3, 0.5, 1024);
    assert_eq!(record.signal, None);

    let record = ExecRecord::signaled(24, 1.0, 0);
    assert_eq!(record.return_code, -24);
    assert_eq!(record.signal, Some(24));
  }

  #[test]
  fn it_should_serialize_exec_record() {
    let record = ExecRecord::exited(0, 0.25, 3000);
    let text = serde_json::to_string(&record).unwrap();
    assert_eq!(
      text,
      r#"{"return_code":0,"signal":null,"user_time":0.25,"memory":3000}"#
    );
  }

  #[test]
  fn it_should_serialize_grade_as_number() {
    let text = serde_json::to_string(&JudgeRecord::accepted()).unwrap();
    assert_eq!(text, r#"{"grade":1,"info":"ok"}"#);

    let record: JudgeRecord = serde_json::from_str(r#"{"grade":0,"info":"bad"}"#).unwrap();
    assert_eq!(record, JudgeRecord::rejected("bad"));

    let record: JudgeRecord = serde_json::from_str(r#"{"grade":1}"#).unwrap();
    assert_eq!(record, JudgeRecord::accepted());

    assert!(serde_json::from_str::<JudgeRecord>(r#"{"grade":7}"#).is_err());
  }

  #[test]
  fn it_should_apply_record_policy() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    let missing = dir.join("missing.json");
    let malformed = dir.join("malformed.json");
    fs::write(&malformed, "{ not json").unwrap();

    let value: Option<CompileRecord> = read_record(&missing, RecordPolicy::Optional).unwrap();
    assert_eq!(value, None);
    let value: Option<CompileRecord> = read_record(&malformed, RecordPolicy::Optional).unwrap();
    assert_eq!(value, None);

    assert!(read_record::<ExecRecord>(&missing, RecordPolicy::Required).is_err());
    assert!(read_record::<ExecRecord>(&malformed, RecordPolicy::Required).is_err());

    let path = dir.join("exec.json");
    write_record(&path, &ExecRecord::sentinel()).unwrap();
    let record: ExecRecord = read_required(&path).unwrap();
    assert_eq!(record.return_code, SENTINEL_RETURN_CODE);
  }
}
