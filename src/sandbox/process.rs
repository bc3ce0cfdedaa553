use std::mem::MaybeUninit;
use std::time::Duration;

use log::{debug, warn};
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::time::{clock_gettime, ClockId};
use nix::unistd::Pid;

use crate::sandbox::watchdog::Supervised;
use crate::JudgeBoxError;

/// How the child process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
  Exited(i32),
  Signaled(i32),
}

/// Status and resource usage collected when the child is reaped
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessExit {
  pub status: ExitStatus,
  pub user_time: Duration,
  /// Peak resident set (unit: KB)
  pub memory: i64,
}

/// A spawned child process, reaped with wait4 so usage is per child
pub struct ChildProcess {
  pid: Pid,
  exit: Option<ProcessExit>,
}

impl ExitStatus {
  fn from_raw(status: i32) -> Self {
    if libc::WIFSIGNALED(status) {
      ExitStatus::Signaled(libc::WTERMSIG(status))
    } else {
      ExitStatus::Exited(libc::WEXITSTATUS(status))
    }
  }

  /// Exit code, or the negated signal number
  pub fn return_code(&self) -> i32 {
    match self {
      ExitStatus::Exited(code) => *code,
      ExitStatus::Signaled(signal) => -signal,
    }
  }

  pub fn is_signaled(&self) -> bool {
    matches!(self, ExitStatus::Signaled(_))
  }
}

impl ProcessExit {
  pub fn return_code(&self) -> i32 {
    self.status.return_code()
  }
}

impl ChildProcess {
  pub fn new(pid: u32) -> Self {
    ChildProcess {
      pid: Pid::from_raw(pid as i32),
      exit: None,
    }
  }

  pub fn pid(&self) -> Pid {
    self.pid
  }

  fn wait4(&mut self, options: i32) -> Result<Option<ProcessExit>, JudgeBoxError> {
    if let Some(exit) = &self.exit {
      return Ok(Some(exit.clone()));
    }

    let mut status: i32 = 0;
    let mut rusage: MaybeUninit<libc::rusage> = MaybeUninit::zeroed();

    let ret = loop {
      let ret = unsafe { libc::wait4(self.pid.as_raw(), &mut status, options, rusage.as_mut_ptr()) };
      if ret < 0 {
        match Errno::last() {
          Errno::EINTR => continue,
          errno => return Err(JudgeBoxError::from(errno)),
        }
      }
      break ret;
    };

    if ret == 0 {
      return Ok(None);
    }

    let rusage = unsafe { rusage.assume_init() };
    let exit = ProcessExit {
      status: ExitStatus::from_raw(status),
      user_time: Duration::new(
        rusage.ru_utime.tv_sec.max(0) as u64,
        (rusage.ru_utime.tv_usec.max(0) as u32) * 1000,
      ),
      memory: rusage.ru_maxrss as i64,
    };
    debug!("Child process #{} reaped: {:?}", self.pid, exit);

    self.exit = Some(exit.clone());
    Ok(Some(exit))
  }
}

impl Supervised for ChildProcess {
  fn try_reap(&mut self) -> Result<Option<ProcessExit>, JudgeBoxError> {
    self.wait4(libc::WNOHANG)
  }

  fn cpu_time(&self) -> Option<Duration> {
    if self.exit.is_some() {
      return None;
    }
    let clock = ClockId::pid_cpu_clock_id(self.pid).ok()?;
    let time = clock_gettime(clock).ok()?;
    Some(Duration::new(
      time.tv_sec().max(0) as u64,
      time.tv_nsec().max(0) as u32,
    ))
  }

  fn kill(&mut self) -> Result<(), JudgeBoxError> {
    // 已回收的 pid 可能被复用，不能再发送信号
    if self.exit.is_some() {
      return Ok(());
    }
    match signal::kill(self.pid, Signal::SIGKILL) {
      Ok(_) => {
        debug!("Send SIGKILL to child process #{}", self.pid);
        Ok(())
      }
      Err(Errno::ESRCH) => Ok(()),
      Err(errno) => Err(JudgeBoxError::from(errno)),
    }
  }

  fn reap(&mut self) -> Result<ProcessExit, JudgeBoxError> {
    match self.wait4(0)? {
      Some(exit) => Ok(exit),
      None => Err(JudgeBoxError::spawn(format!(
        "child process #{} can not be reaped",
        self.pid
      ))),
    }
  }
}

impl Drop for ChildProcess {
  fn drop(&mut self) {
    if self.exit.is_none() {
      warn!("Child process #{} is still running, kill it", self.pid);
      if self.kill().is_ok() {
        if let Err(err) = self.reap() {
          warn!("Fails reaping child process #{}: {}", self.pid, err);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::process::Command;
  use std::thread;

  #[test]
  fn it_should_reap_exit_code() {
    let child = Command::new("/bin/sh").arg("-c").arg("exit 7").spawn().unwrap();
    let mut process = ChildProcess::new(child.id());
    let exit = process.reap().unwrap();
    assert_eq!(exit.status, ExitStatus::Exited(7));
    assert_eq!(exit.return_code(), 7);
  }

  #[test]
  fn it_should_kill_idempotently() {
    let child = Command::new("/bin/sh").arg("-c").arg("sleep 10").spawn().unwrap();
    let mut process = ChildProcess::new(child.id());
    assert!(process.try_reap().unwrap().is_none());
    assert!(process.cpu_time().is_some());

    process.kill().unwrap();
    let exit = process.reap().unwrap();
    assert_eq!(exit.status, ExitStatus::Signaled(9));
    assert_eq!(exit.return_code(), -9);

    // killing an already terminated child is a no-op
    process.kill().unwrap();
    assert_eq!(process.reap().unwrap(), exit);
    assert!(process.cpu_time().is_none());
  }

  #[test]
  fn it_should_read_cpu_clock() {
    let child = Command::new("/bin/sh")
      .arg("-c")
      .arg("while :; do :; done")
      .spawn()
      .unwrap();
    let mut process = ChildProcess::new(child.id());
    thread::sleep(Duration::from_millis(200));
    let cpu = process.cpu_time().unwrap();
    assert!(cpu > Duration::from_millis(10));
    process.kill().unwrap();
    assert!(process.reap().unwrap().status.is_signaled());
  }
}
