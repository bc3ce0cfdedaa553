use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Run `task` on every item with at most `jobs` threads.
/// Results keep the order of `items`.
pub fn for_each_parallel<T, R, F>(items: &[T], jobs: usize, task: F) -> Vec<R>
where
  T: Sync,
  R: Send,
  F: Fn(&T) -> R + Sync,
{
  let jobs = jobs.max(1).min(items.len());
  if jobs <= 1 {
    return items.iter().map(&task).collect();
  }

  let next = AtomicUsize::new(0);
  let mut results: Vec<(usize, R)> = thread::scope(|scope| {
    let handles: Vec<_> = (0..jobs)
      .map(|_| {
        scope.spawn(|| {
          let mut done = vec![];
          loop {
            let index = next.fetch_add(1, Ordering::SeqCst);
            match items.get(index) {
              Some(item) => done.push((index, task(item))),
              None => break,
            }
          }
          done
        })
      })
      .collect();

    handles
      .into_iter()
      .flat_map(|handle| match handle.join() {
        Ok(done) => done,
        Err(payload) => std::panic::resume_unwind(payload),
      })
      .collect()
  });

  results.sort_by_key(|(index, _)| *index);
  results.into_iter().map(|(_, result)| result).collect()
}
