use std::{
  error::Error,
  fmt::{Debug, Display},
  path::Path,
  process::{ExitCode, Termination},
};

use flexi_logger::FlexiLoggerError;
use nix::{errno::Errno, libc::STDOUT_FILENO, unistd::isatty};

pub enum JudgeBoxError {
  MissingBinary(String),
  MissingInput(String),
  Spawn(String),
  Record(String),
  Discovery(String),
  Nix(Errno),
  Fs(String),
  Json(String),
  Cli(String),
  Logger(FlexiLoggerError),
}

pub const EXIT_INTERNAL: u8 = 1;

pub const EXIT_USAGE: u8 = 2;

pub const EXIT_SETUP: u8 = 3;

pub enum JudgeBoxExit {
  Ok,
  Err(JudgeBoxError),
}

impl JudgeBoxError {
  pub fn missing_binary<P: AsRef<Path>>(path: P) -> JudgeBoxError {
    JudgeBoxError::MissingBinary(path.as_ref().to_string_lossy().to_string())
  }

  pub fn missing_input<P: AsRef<Path>>(path: P) -> JudgeBoxError {
    JudgeBoxError::MissingInput(path.as_ref().to_string_lossy().to_string())
  }

  pub fn spawn<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Spawn(msg.into())
  }

  pub fn record<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Record(msg.into())
  }

  pub fn discovery<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Discovery(msg.into())
  }

  pub fn cli<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Cli(msg.into())
  }

  /// Setup errors are detected before the child is spawned
  pub fn is_setup(&self) -> bool {
    matches!(
      self,
      JudgeBoxError::MissingBinary(_) | JudgeBoxError::MissingInput(_)
    )
  }
}

impl JudgeBoxError {
  /// Error name shown before the message
  pub fn title(&self) -> &'static str {
    match self {
      JudgeBoxError::MissingBinary(_) => "JudgeBox Missing Binary Error",
      JudgeBoxError::MissingInput(_) => "JudgeBox Missing Input Error",
      JudgeBoxError::Spawn(_) => "JudgeBox Spawn Error",
      JudgeBoxError::Record(_) => "JudgeBox Record Error",
      JudgeBoxError::Discovery(_) => "JudgeBox Discovery Error",
      JudgeBoxError::Nix(_) => "JudgeBox Nix Error",
      JudgeBoxError::Fs(_) => "JudgeBox File System Error",
      JudgeBoxError::Json(_) => "JudgeBox JSON Error",
      JudgeBoxError::Cli(_) => "JudgeBox CLI Error",
      JudgeBoxError::Logger(_) => "JudgeBox Logger Error",
    }
  }

  pub fn message(&self) -> String {
    match self {
      JudgeBoxError::MissingBinary(msg)
      | JudgeBoxError::MissingInput(msg)
      | JudgeBoxError::Spawn(msg)
      | JudgeBoxError::Record(msg)
      | JudgeBoxError::Discovery(msg)
      | JudgeBoxError::Fs(msg)
      | JudgeBoxError::Json(msg)
      | JudgeBoxError::Cli(msg) => msg.clone(),
      JudgeBoxError::Nix(errno) => errno.to_string(),
      JudgeBoxError::Logger(err) => err.to_string(),
    }
  }

  /// Process exit code of the binary
  ///
  /// Bad arguments exit with 2, a submission that can not be judged at all
  /// (no binary, no input, no test cases) with 3, everything else with 1.
  pub fn exit_code(&self) -> u8 {
    match self {
      JudgeBoxError::Cli(_) => EXIT_USAGE,
      JudgeBoxError::MissingBinary(_)
      | JudgeBoxError::MissingInput(_)
      | JudgeBoxError::Discovery(_) => EXIT_SETUP,
      _ => EXIT_INTERNAL,
    }
  }

  /// 终端输出彩色文本，否则输出 JSON
  pub fn render(&self, is_tty: bool) -> String {
    if is_tty {
      format!(
        "\x1b[1m\x1b[91m{}\x1b[39m\x1b[22m  {}",
        self.title(),
        self.message()
      )
    } else {
      serde_json::json!({
        "ok": false,
        "type": self.title(),
        "code": self.exit_code(),
        "message": self.message(),
      })
      .to_string()
    }
  }
}

impl Debug for JudgeBoxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self)
  }
}

impl Display for JudgeBoxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.title(), self.message())
  }
}

impl From<Errno> for JudgeBoxError {
  fn from(errno: Errno) -> Self {
    JudgeBoxError::Nix(errno)
  }
}

impl From<std::io::Error> for JudgeBoxError {
  fn from(err: std::io::Error) -> Self {
    JudgeBoxError::Fs(err.to_string())
  }
}

impl From<serde_json::Error> for JudgeBoxError {
  fn from(err: serde_json::Error) -> Self {
    JudgeBoxError::Json(err.to_string())
  }
}

impl From<FlexiLoggerError> for JudgeBoxError {
  fn from(err: FlexiLoggerError) -> Self {
    JudgeBoxError::Logger(err)
  }
}

impl Error for JudgeBoxError {}

impl<T> From<Result<T, JudgeBoxError>> for JudgeBoxExit {
  fn from(result: Result<T, JudgeBoxError>) -> Self {
    match result {
      Ok(_) => JudgeBoxExit::Ok,
      Err(err) => JudgeBoxExit::Err(err),
    }
  }
}

impl Termination for JudgeBoxExit {
  fn report(self) -> ExitCode {
    match self {
      JudgeBoxExit::Ok => ExitCode::SUCCESS,
      JudgeBoxExit::Err(err) => {
        let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
        eprintln!("{}", err.render(is_tty));
        ExitCode::from(err.exit_code())
      }
    }
  }
}
