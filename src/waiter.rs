// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::{Condvar, Mutex};
use std::time::Instant;

/// A way to wait for a set of tasks to complete, with an absolute deadline.
///
/// Protocols count their sender tasks in one of these and wait on it during
/// shutdown so queued messages get a chance to drain within the linger
/// window. There must be a one to one correspondence between `add` and
/// `done` calls.
pub struct Waiter {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Waiter {
    pub fn new() -> Waiter {
        Waiter {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn add(&self) {
        let mut count = crate::util::lock(&self.count);
        *count += 1;
    }

    pub fn done(&self) {
        let mut count = crate::util::lock(&self.count);
        if *count == 0 {
            panic!("waiter count dropped below zero");
        }
        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    /// Waits until the count drops to zero or the deadline passes.
    /// Returns true if the count reached zero.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut count = crate::util::lock(&self.count);
        while *count != 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _timeout) = self
                .cond
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            count = guard;
        }
        *count == 0
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Waiter::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::Waiter;

    #[test]
    fn wait_returns_once_every_task_is_done() {
        let waiter = Arc::new(Waiter::new());
        waiter.add();
        waiter.add();

        let background = waiter.clone();
        let handle = thread::spawn(move || {
            background.done();
            thread::sleep(Duration::from_millis(20));
            background.done();
        });

        assert!(waiter.wait_until(Instant::now() + Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn wait_gives_up_at_the_deadline() {
        let waiter = Waiter::new();
        waiter.add();

        let started = Instant::now();
        assert!(!waiter.wait_until(started + Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));

        waiter.done();
    }

    #[test]
    fn wait_with_expired_deadline_only_checks_the_count() {
        let waiter = Waiter::new();
        assert!(waiter.wait_until(Instant::now()));

        waiter.add();
        assert!(!waiter.wait_until(Instant::now()));
        waiter.done();
    }
}
