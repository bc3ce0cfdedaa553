use std::fmt::{Display, Formatter};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::sandbox::process::ProcessExit;
use crate::JudgeBoxError;

/// Polling interval far from the deadline
pub const BASE_INTERVAL: Duration = Duration::from_millis(10);

/// Polling interval close to the deadline
pub const FINE_INTERVAL: Duration = Duration::from_millis(1);

/// Remaining CPU time below which the fine interval is used
pub const FINE_WINDOW: Duration = Duration::from_millis(50);

/// A running process observed by the watchdog
pub trait Supervised {
  /// Non-blocking liveness check, returns the exit once the process is reaped
  fn try_reap(&mut self) -> Result<Option<ProcessExit>, JudgeBoxError>;

  /// Consumed CPU time, `None` once the process handle is no longer valid
  fn cpu_time(&self) -> Option<Duration>;

  /// SIGKILL, a no-op if the process has already terminated
  fn kill(&mut self) -> Result<(), JudgeBoxError>;

  /// Blocking wait
  fn reap(&mut self) -> Result<ProcessExit, JudgeBoxError>;
}

/// Cancellable timer driving the watchdog
pub trait Ticker {
  /// Suspend for at most `interval`, returns false once cancelled
  fn tick(&mut self, interval: Duration) -> bool;

  /// Wall time since the ticker started
  fn elapsed(&self) -> Duration;
}

/// Shared flag used to abort one execution from the outside
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
  inner: Arc<(Mutex<bool>, Condvar)>,
}

/// Ticker backed by a condition variable, so cancel wakes it up immediately
pub struct SleepTicker {
  start: Instant,
  cancellation: Cancellation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
  CpuTime,
  WallTime,
  Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogOutcome {
  pub exit: ProcessExit,
  /// Set only when the process really died from our kill
  pub killed: Option<KillReason>,
}

/// Kills the child once its CPU time exceeds the deadline
#[derive(Debug, Clone)]
pub struct Watchdog {
  cpu_deadline: Duration,
  wall_deadline: Duration,
}

impl Cancellation {
  pub fn new() -> Self {
    Self::default()
  }

  /// Cancelling twice, or after the execution has finished, is a no-op
  pub fn cancel(&self) {
    let (lock, cvar) = &*self.inner;
    let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
    *cancelled = true;
    cvar.notify_all();
  }

  pub fn is_cancelled(&self) -> bool {
    let (lock, _) = &*self.inner;
    *lock.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Returns true when cancelled before the timeout elapsed
  fn wait_timeout(&self, timeout: Duration) -> bool {
    let (lock, cvar) = &*self.inner;
    let cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
    let (cancelled, _) = cvar
      .wait_timeout_while(cancelled, timeout, |cancelled| !*cancelled)
      .unwrap_or_else(|e| e.into_inner());
    *cancelled
  }
}

impl SleepTicker {
  pub fn new(cancellation: Cancellation) -> Self {
    SleepTicker {
      start: Instant::now(),
      cancellation,
    }
  }
}

impl Ticker for SleepTicker {
  fn tick(&mut self, interval: Duration) -> bool {
    !self.cancellation.wait_timeout(interval)
  }

  fn elapsed(&self) -> Duration {
    self.start.elapsed()
  }
}

impl Display for KillReason {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      KillReason::CpuTime => f.write_str("cpu time limit exceeded"),
      KillReason::WallTime => f.write_str("wall time limit exceeded"),
      KillReason::Cancelled => f.write_str("cancelled"),
    }
  }
}

impl Watchdog {
  pub fn new(cpu_deadline: Duration, wall_deadline: Duration) -> Self {
    Watchdog {
      cpu_deadline,
      wall_deadline,
    }
  }

  /// 离时限越近，轮询越密
  pub fn poll_interval(&self, cpu_time: Duration) -> Duration {
    let remaining = self.cpu_deadline.saturating_sub(cpu_time);
    if remaining <= FINE_WINDOW {
      FINE_INTERVAL
    } else {
      BASE_INTERVAL
    }
  }

  /// Watch `process` until it terminates, killing it when a deadline passes
  pub fn supervise<P: Supervised, T: Ticker>(
    &self,
    process: &mut P,
    ticker: &mut T,
  ) -> Result<WatchdogOutcome, JudgeBoxError> {
    let mut last_cpu_time = Duration::ZERO;

    loop {
      if let Some(exit) = process.try_reap()? {
        return Ok(WatchdogOutcome { exit, killed: None });
      }

      match process.cpu_time() {
        Some(cpu_time) => {
          last_cpu_time = cpu_time;
          if cpu_time > self.cpu_deadline {
            info!(
              "Child process used {:?} cpu time (limit {:?})",
              cpu_time, self.cpu_deadline
            );
            return self.terminate(process, KillReason::CpuTime);
          }
        }
        None => {
          // exited between the two checks, or the clock is unreadable
          debug!("Can not read cpu clock of child process");
        }
      }

      if ticker.elapsed() > self.wall_deadline {
        info!(
          "Child process ran for {:?} wall time (limit {:?})",
          ticker.elapsed(),
          self.wall_deadline
        );
        return self.terminate(process, KillReason::WallTime);
      }

      if !ticker.tick(self.poll_interval(last_cpu_time)) {
        info!("Child process is cancelled");
        return self.terminate(process, KillReason::Cancelled);
      }
    }
  }

  fn terminate<P: Supervised>(
    &self,
    process: &mut P,
    reason: KillReason,
  ) -> Result<WatchdogOutcome, JudgeBoxError> {
    process.kill()?;
    let exit = process.reap()?;
    if exit.status.is_signaled() {
      Ok(WatchdogOutcome {
        exit,
        killed: Some(reason),
      })
    } else {
      warn!(
        "Child process exited on its own before the kill ({}), keep its status",
        reason
      );
      Ok(WatchdogOutcome { exit, killed: None })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sandbox::process::ExitStatus;
  use std::cell::Cell;
  use std::rc::Rc;
  use std::thread;

  /// Wall clock shared by the fake process and the fake ticker
  #[derive(Clone, Default)]
  struct FakeClock {
    wall: Rc<Cell<Duration>>,
    cpu: Rc<Cell<Duration>>,
  }

  struct FakeProcess {
    clock: FakeClock,
    exit_at: Option<Duration>,
    exit_on_kill: bool,
    killed: bool,
    reaped: bool,
    kills: usize,
  }

  struct FakeTicker {
    clock: FakeClock,
    busy: bool,
    cancel_after: Option<usize>,
    intervals: Vec<Duration>,
  }

  impl FakeProcess {
    fn new(clock: &FakeClock) -> Self {
      FakeProcess {
        clock: clock.clone(),
        exit_at: None,
        exit_on_kill: false,
        killed: false,
        reaped: false,
        kills: 0,
      }
    }

    fn exit(&self) -> ProcessExit {
      let status = if self.killed && !self.exit_on_kill {
        ExitStatus::Signaled(9)
      } else {
        ExitStatus::Exited(0)
      };
      ProcessExit {
        status,
        user_time: self.clock.cpu.get(),
        memory: 1024,
      }
    }

    fn finished(&self) -> bool {
      match self.exit_at {
        Some(at) => self.clock.cpu.get() >= at,
        None => false,
      }
    }
  }

  impl Supervised for FakeProcess {
    fn try_reap(&mut self) -> Result<Option<ProcessExit>, JudgeBoxError> {
      if self.finished() || self.killed {
        self.reaped = true;
        Ok(Some(self.exit()))
      } else {
        Ok(None)
      }
    }

    fn cpu_time(&self) -> Option<Duration> {
      if self.reaped {
        None
      } else {
        Some(self.clock.cpu.get())
      }
    }

    fn kill(&mut self) -> Result<(), JudgeBoxError> {
      self.kills += 1;
      if !self.finished() {
        self.killed = true;
      }
      Ok(())
    }

    fn reap(&mut self) -> Result<ProcessExit, JudgeBoxError> {
      self.reaped = true;
      Ok(self.exit())
    }
  }

  impl FakeTicker {
    fn new(clock: &FakeClock) -> Self {
      FakeTicker {
        clock: clock.clone(),
        busy: true,
        cancel_after: None,
        intervals: vec![],
      }
    }
  }

  impl Ticker for FakeTicker {
    fn tick(&mut self, interval: Duration) -> bool {
      if let Some(n) = self.cancel_after {
        if self.intervals.len() >= n {
          return false;
        }
      }
      self.intervals.push(interval);
      self.clock.wall.set(self.clock.wall.get() + interval);
      if self.busy {
        self.clock.cpu.set(self.clock.cpu.get() + interval);
      }
      true
    }

    fn elapsed(&self) -> Duration {
      self.clock.wall.get()
    }
  }

  fn watchdog(cpu_ms: u64) -> Watchdog {
    Watchdog::new(Duration::from_millis(cpu_ms), Duration::from_secs(10))
  }

  #[test]
  fn it_should_kill_busy_loop() {
    let clock = FakeClock::default();
    let mut process = FakeProcess::new(&clock);
    let mut ticker = FakeTicker::new(&clock);

    let outcome = watchdog(100).supervise(&mut process, &mut ticker).unwrap();

    assert_eq!(outcome.killed, Some(KillReason::CpuTime));
    assert_eq!(outcome.exit.return_code(), -9);
    // overshoot bounded by the fine interval
    assert!(outcome.exit.user_time > Duration::from_millis(100));
    assert!(outcome.exit.user_time <= Duration::from_millis(100) + FINE_INTERVAL);
    assert_eq!(ticker.intervals.first(), Some(&BASE_INTERVAL));
    assert_eq!(ticker.intervals.last(), Some(&FINE_INTERVAL));
  }

  #[test]
  fn it_should_keep_natural_exit() {
    let clock = FakeClock::default();
    let mut process = FakeProcess::new(&clock);
    process.exit_at = Some(Duration::from_millis(40));
    let mut ticker = FakeTicker::new(&clock);

    let outcome = watchdog(100).supervise(&mut process, &mut ticker).unwrap();

    assert_eq!(outcome.killed, None);
    assert_eq!(outcome.exit.status, ExitStatus::Exited(0));
    assert_eq!(process.kills, 0);
  }

  #[test]
  fn it_should_not_report_exit_near_deadline_as_killed() {
    let clock = FakeClock::default();
    let mut process = FakeProcess::new(&clock);
    // finishes inside the last poll interval before the deadline check
    process.exit_at = Some(Duration::from_micros(100_500));
    let mut ticker = FakeTicker::new(&clock);

    let outcome = watchdog(100).supervise(&mut process, &mut ticker).unwrap();

    assert_eq!(outcome.killed, None);
    assert_eq!(outcome.exit.return_code(), 0);
  }

  #[test]
  fn it_should_keep_status_when_kill_races_exit() {
    let clock = FakeClock::default();
    let mut process = FakeProcess::new(&clock);
    process.exit_on_kill = true;
    let mut ticker = FakeTicker::new(&clock);

    let outcome = watchdog(30).supervise(&mut process, &mut ticker).unwrap();

    assert_eq!(process.kills, 1);
    assert_eq!(outcome.killed, None);
    assert_eq!(outcome.exit.status, ExitStatus::Exited(0));
  }

  #[test]
  fn it_should_kill_on_wall_deadline() {
    let clock = FakeClock::default();
    let mut process = FakeProcess::new(&clock);
    let mut ticker = FakeTicker::new(&clock);
    ticker.busy = false;

    let watchdog = Watchdog::new(Duration::from_millis(100), Duration::from_millis(500));
    let outcome = watchdog.supervise(&mut process, &mut ticker).unwrap();

    assert_eq!(outcome.killed, Some(KillReason::WallTime));
    assert_eq!(outcome.exit.user_time, Duration::ZERO);
    assert!(clock.wall.get() > Duration::from_millis(500));
  }

  #[test]
  fn it_should_kill_on_cancel() {
    let clock = FakeClock::default();
    let mut process = FakeProcess::new(&clock);
    let mut ticker = FakeTicker::new(&clock);
    ticker.cancel_after = Some(3);

    let outcome = watchdog(1000).supervise(&mut process, &mut ticker).unwrap();

    assert_eq!(outcome.killed, Some(KillReason::Cancelled));
    assert_eq!(ticker.intervals.len(), 3);
  }

  #[test]
  fn it_should_tighten_interval_near_deadline() {
    let watchdog = watchdog(200);
    assert_eq!(watchdog.poll_interval(Duration::ZERO), BASE_INTERVAL);
    assert_eq!(watchdog.poll_interval(Duration::from_millis(149)), BASE_INTERVAL);
    assert_eq!(watchdog.poll_interval(Duration::from_millis(150)), FINE_INTERVAL);
    assert_eq!(watchdog.poll_interval(Duration::from_millis(300)), FINE_INTERVAL);
  }

  #[test]
  fn it_should_wake_sleep_ticker_on_cancel() {
    let cancellation = Cancellation::new();
    let mut ticker = SleepTicker::new(cancellation.clone());
    assert!(ticker.tick(Duration::from_millis(1)));

    let handle = {
      let cancellation = cancellation.clone();
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancellation.cancel();
      })
    };
    let t0 = Instant::now();
    assert!(!ticker.tick(Duration::from_secs(10)));
    assert!(t0.elapsed() < Duration::from_secs(5));
    handle.join().unwrap();

    cancellation.cancel();
    assert!(cancellation.is_cancelled());
  }
}
