// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, never, Receiver, Sender};

use crate::endpoint::Endpoint;

/// Locks a mutex, shrugging off poisoning; the state guarded by these
/// mutexes stays consistent across a panicking holder.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Builds a timer channel for a deadline. A zero duration means "no
/// timeout" and yields a channel that is never ready, so the result can be
/// dropped straight into a `select!`.
pub fn deadline_timer(deadline: Duration) -> Receiver<Instant> {
    if deadline == Duration::ZERO {
        never()
    } else {
        after(deadline)
    }
}

/// Waits for a queue to drain, up to the expiration time. The queue length
/// is polled every 10 ms at most; arranging wakeup messages through the
/// consumers would buy very little over this. Returns true if the queue
/// emptied in time.
pub fn drain_queue<T>(queue: &Sender<T>, expire: Instant) -> bool {
    loop {
        if queue.is_empty() {
            return true;
        }
        let now = Instant::now();
        if now >= expire {
            return false;
        }
        let mut nap = expire - now;
        if nap > Duration::from_millis(10) {
            nap = Duration::from_millis(10);
        }
        thread::sleep(nap);
    }
}

/// Receives and discards everything an endpoint produces, until it closes.
/// Send-only protocols run one of these per endpoint so a dropped
/// connection is noticed even though nothing consumes the inbound side.
pub fn null_recv(ep: Arc<Endpoint>) {
    while let Some(msg) = ep.recv_msg() {
        drop(msg);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crossbeam_channel::bounded;

    use super::{deadline_timer, drain_queue};

    #[test]
    fn zero_deadline_never_fires() {
        let timer = deadline_timer(Duration::ZERO);
        assert!(timer.try_recv().is_err());
    }

    #[test]
    fn nonzero_deadline_fires() {
        let timer = deadline_timer(Duration::from_millis(5));
        assert!(timer.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn drain_reports_an_empty_queue() {
        let (tx, _rx) = bounded::<u32>(4);
        assert!(drain_queue(&tx, Instant::now() + Duration::from_millis(50)));
    }

    #[test]
    fn drain_gives_up_on_a_stuck_queue() {
        let (tx, _rx) = bounded::<u32>(4);
        tx.send(1).unwrap();
        let started = Instant::now();
        assert!(!drain_queue(&tx, started + Duration::from_millis(40)));
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn drain_notices_consumption() {
        let (tx, rx) = bounded::<u32>(4);
        tx.send(1).unwrap();

        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            rx.recv().unwrap();
            rx
        });

        assert!(drain_queue(&tx, Instant::now() + Duration::from_secs(5)));
        consumer.join().unwrap();
    }
}
