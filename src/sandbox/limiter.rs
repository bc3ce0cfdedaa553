use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

use log::debug;
use nix::libc::RLIM_INFINITY;
use nix::sys::resource::{setrlimit, Resource};

use crate::config::Limits;

/// OS level ceilings applied to the child between fork and exec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limiter {
  cpu_seconds: u64,
  memory_bytes: u64,
  stack_bytes: u64,
}

impl Limiter {
  pub fn new(limits: &Limits) -> Self {
    Limiter {
      cpu_seconds: limits.cpu_seconds().max(1),
      memory_bytes: limits.memory_limit,
      stack_bytes: limits.stack_limit,
    }
  }

  pub fn cpu_seconds(&self) -> u64 {
    self.cpu_seconds
  }

  /// 调用 setrlimit
  ///
  /// Runs inside the forked child, so it must not allocate or take locks.
  pub fn apply(&self) -> nix::Result<()> {
    // soft == hard, no grace period
    setrlimit(Resource::RLIMIT_CPU, self.cpu_seconds, self.cpu_seconds)?;

    let memory = if self.memory_bytes == 0 {
      RLIM_INFINITY
    } else {
      self.memory_bytes
    };
    setrlimit(Resource::RLIMIT_AS, memory, memory)?;

    if self.stack_bytes > 0 {
      setrlimit(Resource::RLIMIT_STACK, self.stack_bytes, self.stack_bytes)?;
    }

    setrlimit(Resource::RLIMIT_CORE, 0, 0)?;

    Ok(())
  }

  /// Apply the limits to every process spawned from `command`.
  /// If any of them fails the exec fails and spawning reports the error.
  pub fn install(&self, command: &mut Command) {
    debug!(
      "Install limits: cpu {} s, address space {} bytes, stack {} bytes",
      self.cpu_seconds, self.memory_bytes, self.stack_bytes
    );
    let limiter = *self;
    unsafe {
      command.pre_exec(move || limiter.apply().map_err(io::Error::from));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::process::Stdio;

  fn ulimit(limits: &Limits, flag: &str) -> String {
    let mut command = Command::new("/bin/sh");
    command
      .arg("-c")
      .arg(format!("ulimit {}", flag))
      .stdin(Stdio::null())
      .stdout(Stdio::piped());
    Limiter::new(limits).install(&mut command);
    let output = command.output().unwrap();
    String::from_utf8(output.stdout).unwrap().trim().to_string()
  }

  #[test]
  fn it_should_round_cpu_seconds() {
    let limits = Limits {
      time_limit: 1.2,
      ..Limits::default()
    };
    assert_eq!(Limiter::new(&limits).cpu_seconds(), 2);

    let limits = Limits {
      time_limit: 0.0,
      ..Limits::default()
    };
    assert_eq!(Limiter::new(&limits).cpu_seconds(), 1);
  }

  #[test]
  fn it_should_limit_child_process() {
    let limits = Limits {
      time_limit: 1.5,
      memory_limit: 256 * 1024 * 1024,
      stack_limit: 8 * 1024 * 1024,
    };
    assert_eq!(ulimit(&limits, "-t"), "2");
    assert_eq!(ulimit(&limits, "-v"), "262144");
    assert_eq!(ulimit(&limits, "-s"), "8192");
    assert_eq!(ulimit(&limits, "-c"), "0");
  }

  #[test]
  fn it_should_keep_stack_when_unset() {
    let expected = {
      let output = Command::new("/bin/sh")
        .arg("-c")
        .arg("ulimit -s")
        .output()
        .unwrap();
      String::from_utf8(output.stdout).unwrap().trim().to_string()
    };
    let limits = Limits {
      stack_limit: 0,
      ..Limits::default()
    };
    assert_eq!(ulimit(&limits, "-s"), expected);
  }
}
