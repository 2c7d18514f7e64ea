// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::mem;
use std::sync::Mutex;

/// Capacity classes of the body buffer pool, with the number of buffers
/// each slab is allowed to retain.
const POOL_CLASSES: [(usize, usize); 5] = [
    (64, 2048),
    (128, 1024),
    (1024, 1024),
    (8192, 256),
    (65536, 64),
];

static POOL: [Mutex<Vec<Vec<u8>>>; 5] = [
    Mutex::new(Vec::new()),
    Mutex::new(Vec::new()),
    Mutex::new(Vec::new()),
    Mutex::new(Vec::new()),
    Mutex::new(Vec::new()),
];

fn class_of(capacity: usize) -> Option<usize> {
    POOL_CLASSES.iter().position(|&(cap, _)| capacity < cap)
}

fn alloc_body(capacity: usize) -> (Vec<u8>, Option<usize>) {
    match class_of(capacity) {
        Some(class) => {
            let buffer = crate::util::lock(&POOL[class]).pop();
            let buffer = buffer.unwrap_or_else(|| Vec::with_capacity(POOL_CLASSES[class].0));
            (buffer, Some(class))
        }
        None => (Vec::with_capacity(capacity), None),
    }
}

/// A message exchanged over a socket.
///
/// The meaning of the header and body parts, and where the split occurs,
/// depends on the protocol: the header carries routing and correlation ids,
/// the body carries the application payload. Length prefixes added by the
/// framing layer are part of neither.
///
/// Bodies are drawn from a tiered pool of buffers; dropping a message hands
/// its buffer back to the slab it came from. Fan-out paths share one message
/// between peers through an `Arc`, so the buffer is recycled when the last
/// reference goes away.
#[derive(Debug)]
pub struct Message {
    pub header: Vec<u8>,
    pub body: Vec<u8>,
    class: Option<usize>,
}

impl Message {
    /// Obtains a message whose body buffer can hold at least `capacity`
    /// bytes, recycled from the pool when a buffer of a matching class is
    /// available. The body starts out empty.
    pub fn new(capacity: usize) -> Message {
        let (body, class) = alloc_body(capacity);

        Message {
            header: Vec::new(),
            body,
            class,
        }
    }

    /// Wraps an application provided buffer. The buffer is not pooled.
    pub fn with_body(body: Vec<u8>) -> Message {
        Message {
            header: Vec::new(),
            body,
            class: None,
        }
    }

    /// Detaches the body from the message, leaving the pool out of it.
    pub fn to_buffer(mut self) -> Vec<u8> {
        self.class = None;
        mem::take(&mut self.body)
    }

    pub fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.body.is_empty()
    }
}

impl Clone for Message {
    fn clone(&self) -> Message {
        Message {
            header: self.header.clone(),
            body: self.body.clone(),
            class: None,
        }
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        let class = match self.class {
            Some(class) => class,
            None => return,
        };
        let mut body = mem::take(&mut self.body);
        let (cap, limit) = POOL_CLASSES[class];

        // A protocol may have swapped the buffer out from under us,
        // only the original slab allocation goes back.
        if body.capacity() != cap {
            return;
        }
        body.clear();

        let mut slab = crate::util::lock(&POOL[class]);
        if slab.len() < limit {
            slab.push(body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{class_of, Message};

    #[test]
    fn classes_are_picked_by_strict_upper_bound() {
        assert_eq!(Some(0), class_of(0));
        assert_eq!(Some(0), class_of(63));
        assert_eq!(Some(1), class_of(64));
        assert_eq!(Some(2), class_of(128));
        assert_eq!(Some(3), class_of(1024));
        assert_eq!(Some(4), class_of(8192));
        assert_eq!(None, class_of(65536));
        assert_eq!(None, class_of(1 << 20));
    }

    #[test]
    fn pooled_body_has_the_class_capacity() {
        let msg = Message::new(100);
        assert_eq!(128, msg.body.capacity());
        assert_eq!(0, msg.body.len());
    }

    #[test]
    fn oversized_bodies_bypass_the_pool() {
        let msg = Message::new(1 << 20);
        assert!(msg.class.is_none());
        assert_eq!(1 << 20, msg.body.capacity());
    }

    #[test]
    fn dropping_a_message_recycles_its_buffer() {
        // Class 4 is quiet enough in the test process to observe reuse.
        let mut msg = Message::new(40_000);
        msg.body.resize(40_000, 7);
        let ptr = msg.body.as_ptr();
        drop(msg);

        let msg = Message::new(40_000);
        assert_eq!(ptr, msg.body.as_ptr());
        assert_eq!(0, msg.body.len());
    }

    #[test]
    fn detached_buffers_are_not_recycled() {
        let mut msg = Message::new(5000);
        msg.body.resize(123, 0);
        let buffer = msg.to_buffer();
        assert_eq!(123, buffer.len());

        // The buffer now belongs to the caller; dropping it must not
        // disturb the pool accounting of a later message.
        drop(buffer);
        let msg = Message::new(10);
        assert_eq!(0, msg.body.len());
    }

    #[test]
    fn clones_are_deep_and_unpooled() {
        let mut msg = Message::new(10);
        msg.header.extend_from_slice(&[1, 2, 3, 4]);
        msg.body.extend_from_slice(b"abc");

        let copy = msg.clone();
        assert_eq!(msg.header, copy.header);
        assert_eq!(msg.body, copy.body);
        assert!(copy.class.is_none());
    }
}
