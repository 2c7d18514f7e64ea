// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashSet;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::core::SocketCore;
use crate::error::Result;
use crate::message::Message;
use crate::pipe::{Pipe, PortProperty};
use crate::util::lock;

/// Fired on the socket's port hook when an endpoint comes or goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAction {
    Add,
    Remove,
}

pub type PortHook = Arc<dyn Fn(PortAction, &Endpoint) -> bool + Send + Sync>;

/// Endpoint ids are 31-bit and unique across the process while the endpoint
/// lives; bit 31 stays clear so they can never collide with request ids,
/// which always have it set. A dedicated generator feeds candidates through
/// a channel, starting from a random base.
fn id_feed() -> &'static Receiver<u32> {
    static FEED: OnceLock<Receiver<u32>> = OnceLock::new();

    FEED.get_or_init(|| {
        let (tx, rx) = bounded::<u32>(64);
        thread::spawn(move || {
            let mut next: u32 = rand::random();
            loop {
                let id = next & 0x7fff_ffff;
                next = next.wrapping_add(1);
                if id == 0 {
                    continue;
                }
                if tx.send(id).is_err() {
                    return;
                }
            }
        });
        rx
    })
}

fn live_ids() -> &'static Mutex<HashSet<u32>> {
    static LIVE: OnceLock<Mutex<HashSet<u32>>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

fn next_endpoint_id() -> u32 {
    loop {
        let id = match id_feed().recv() {
            Ok(id) => id,
            // The generator only dies with the process; fall back to raw
            // randomness rather than wedging the caller.
            Err(_) => (rand::random::<u32>() | 1) & 0x7fff_ffff,
        };
        if lock(live_ids()).insert(id) {
            return id;
        }
    }
}

/// The socket-side handle around one connected pipe.
///
/// Protocols talk to their peers through endpoints; the socket core owns the
/// endpoint vector and everybody else refers to endpoints by id. Closing is
/// idempotent: it detaches the endpoint from the socket and the protocol,
/// closes the pipe, fires the port hook, and wakes the owning dialer so it
/// can redial.
pub struct Endpoint {
    id: u32,
    pipe: Box<dyn Pipe>,
    sock: Mutex<Weak<SocketCore>>,
    index: AtomicIsize,
    addr: String,
    client: bool,
    closing: Mutex<bool>,
    closed_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
}

impl Endpoint {
    pub(crate) fn new(pipe: Box<dyn Pipe>, addr: String, client: bool) -> Arc<Endpoint> {
        let (closed_tx, closed_rx) = bounded::<()>(0);

        Arc::new(Endpoint {
            id: next_endpoint_id(),
            pipe,
            sock: Mutex::new(Weak::new()),
            index: AtomicIsize::new(-1),
            addr,
            client,
            closing: Mutex::new(false),
            closed_tx: Mutex::new(Some(closed_tx)),
            closed_rx,
        })
    }

    pub(crate) fn attach(&self, sock: &Arc<SocketCore>) {
        *lock(&self.sock) = Arc::downgrade(sock);
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.addr
    }

    pub fn is_client(&self) -> bool {
        self.client
    }

    pub fn is_server(&self) -> bool {
        !self.client
    }

    pub fn is_open(&self) -> bool {
        self.pipe.is_open()
    }

    pub fn property(&self, name: &str) -> Result<PortProperty> {
        self.pipe.property(name)
    }

    /// A channel that becomes ready when the endpoint closes. The owning
    /// dialer blocks on it to know when to redial.
    pub(crate) fn closed_chan(&self) -> Receiver<()> {
        self.closed_rx.clone()
    }

    pub(crate) fn set_index(&self, index: isize) {
        self.index.store(index, Ordering::Release);
    }

    pub(crate) fn index(&self) -> isize {
        self.index.load(Ordering::Acquire)
    }

    pub(crate) fn send_msg(&self, msg: &Message) -> Result<()> {
        if let Err(e) = self.pipe.send_msg(msg) {
            debug!("endpoint [{}] send failed: {}, closing", self.id, e);
            self.close();
            return Err(e);
        }
        Ok(())
    }

    /// Receives the next message, or `None` once the pipe failed; a failed
    /// pipe closes the endpoint, which in turn gets the dialer redialing.
    pub(crate) fn recv_msg(&self) -> Option<Message> {
        match self.pipe.recv_msg() {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!("endpoint [{}] recv failed: {}, closing", self.id, e);
                self.close();
                None
            }
        }
    }

    pub fn close(&self) {
        {
            let mut closing = lock(&self.closing);
            if *closing {
                return;
            }
            *closing = true;
        }
        debug!("endpoint [{}] closing (proto {}/{})",
               self.id, self.pipe.local_protocol(), self.pipe.remote_protocol());

        lock(&self.closed_tx).take();

        if let Some(core) = lock(&self.sock).upgrade() {
            core.remove_endpoint(self);
        }
        self.pipe.close();
        lock(live_ids()).remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::next_endpoint_id;

    #[test]
    fn generated_ids_are_31_bit_nonzero_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let id = next_endpoint_id();
            assert_ne!(0, id);
            assert_eq!(0, id & 0x8000_0000);
            assert!(seen.insert(id));
        }
    }
}
