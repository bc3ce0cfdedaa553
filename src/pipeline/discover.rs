use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::{Layout, Limits};
use crate::utils::{MemoryLimitType, TimeLimitType};
use crate::JudgeBoxError;

const INPUT_SUFFIX: &str = ".in";

/// One test case of a submission, immutable once discovered
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
  pub name: String,
  /// Numeric index parsed from the name, used for ordering
  pub index: Option<u64>,
  pub input: PathBuf,
  pub answer: PathBuf,
  pub limits: Limits,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
  tests: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
  name: String,
  input: PathBuf,
  answer: PathBuf,
  time_limit: Option<TimeLimitType>,
  memory_limit: Option<MemoryLimitType>,
  stack_limit: Option<MemoryLimitType>,
}

impl TestCase {
  pub fn new<S: Into<String>>(name: S, input: PathBuf, answer: PathBuf, limits: Limits) -> Self {
    let name = name.into();
    TestCase {
      index: name.parse::<u64>().ok(),
      name,
      input,
      answer,
      limits,
    }
  }
}

/// Ascending numeric index, names without an index go last
pub fn sort_tests(tests: &mut [TestCase]) {
  tests.sort_by(|a, b| match (a.index, b.index) {
    (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
    (Some(_), None) => std::cmp::Ordering::Less,
    (None, Some(_)) => std::cmp::Ordering::Greater,
    (None, None) => a.name.cmp(&b.name),
  });
}

/// Names become file names under the std and record directories
fn check_name(name: &str) -> Result<(), JudgeBoxError> {
  if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
    Err(JudgeBoxError::discovery(format!(
      "invalid test name \"{}\"",
      name
    )))
  } else {
    Ok(())
  }
}

fn check_limits(name: &str, limits: &Limits) -> Result<(), JudgeBoxError> {
  limits
    .check()
    .map_err(|msg| JudgeBoxError::discovery(format!("test {}: {}", name, msg)))
}

/// Find every `{name}.in` in the input directory
pub fn scan(layout: &Layout, limits: &Limits) -> Result<Vec<TestCase>, JudgeBoxError> {
  check_limits("defaults", limits)?;

  let dir = layout.input_dir();
  if !dir.is_dir() {
    return Err(JudgeBoxError::discovery(format!(
      "input directory {} does not exist",
      dir.display()
    )));
  }

  let mut tests = vec![];
  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    if !entry.file_type()?.is_file() {
      continue;
    }
    let file_name = entry.file_name();
    let file_name = file_name.to_str().ok_or_else(|| {
      JudgeBoxError::discovery(format!(
        "file name {} is not valid UTF-8",
        entry.path().display()
      ))
    })?;
    if let Some(name) = file_name.strip_suffix(INPUT_SUFFIX) {
      if name.is_empty() {
        continue;
      }
      check_name(name)?;
      debug!("Discover test {}", name);
      tests.push(TestCase::new(
        name,
        layout.input_path(name),
        layout.answer_path(name),
        *limits,
      ));
    }
  }

  sort_tests(&mut tests);
  info!("Discover {} tests in {}", tests.len(), dir.display());
  Ok(tests)
}

/// Read test cases and their limits from a JSON manifest
pub fn load_manifest(path: &Path, limits: &Limits) -> Result<Vec<TestCase>, JudgeBoxError> {
  let text = fs::read_to_string(path).map_err(|err| {
    JudgeBoxError::discovery(format!("can not read manifest {} ({})", path.display(), err))
  })?;
  let manifest: Manifest = serde_json::from_str(&text).map_err(|err| {
    JudgeBoxError::discovery(format!("malformed manifest {} ({})", path.display(), err))
  })?;
  let base = path.parent().unwrap_or(Path::new("."));

  let mut names = HashSet::new();
  let mut tests = vec![];
  for entry in manifest.tests {
    check_name(&entry.name)?;
    if !names.insert(entry.name.clone()) {
      return Err(JudgeBoxError::discovery(format!(
        "duplicate test name {} in {}",
        entry.name,
        path.display()
      )));
    }
    let limits = Limits {
      time_limit: entry.time_limit.unwrap_or(limits.time_limit),
      memory_limit: entry.memory_limit.unwrap_or(limits.memory_limit),
      stack_limit: entry.stack_limit.unwrap_or(limits.stack_limit),
    };
    check_limits(&entry.name, &limits)?;
    tests.push(TestCase::new(
      entry.name,
      base.join(entry.input),
      base.join(entry.answer),
      limits,
    ));
  }

  sort_tests(&mut tests);
  info!("Load {} tests from {}", tests.len(), path.display());
  Ok(tests)
}
