// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Defines the socket types, which in turn determines the exact semantics of the socket.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SocketType {
    /// **One-to-one protocol**
    /// Socket for communication with exactly one peer.
    /// Each party can send messages at any time.
    /// At most one peer is accepted at a time, additional connections are closed.
    Pair       = (    16),

    /// **Publish/subscribe protocol**
    /// Broadcasts messages to multiple destinations.
    /// Messages are sent from `Pub` sockets and will only be received
    /// by `Sub` sockets that have subscribed to a matching topic.
    /// Topic is an arbitrary prefix of the message body.
    /// Receive operation is not defined for this socket.
    Pub        = (2 * 16),

    /// Receives messages from the publisher.
    /// Only messages matching a subscription are received; when the socket is
    /// created there are no subscriptions. An empty subscription matches
    /// every message. Send operation is not defined for this socket.
    Sub        = (2 * 16) + 1,

    /// **Request/reply protocol**
    /// Used to implement the client application that sends requests and
    /// receives replies. The request/reply pair works in lockstep: a request
    /// must be sent before a reply can be received, and requests are resent
    /// automatically if no reply arrives within the retry interval.
    Req        = (3 * 16),

    /// Used to implement the stateless worker that receives requests and
    /// sends replies. A reply can only be sent after a request was received.
    Rep        = (3 * 16) + 1,

    /// **Pipeline protocol**
    /// This socket is used to send messages to a cluster of load-balanced
    /// nodes. Receive operation is not implemented on this socket type.
    Push       = (5 * 16),

    /// This socket is used to receive a message from a cluster of nodes.
    /// Send operation is not implemented on this socket type.
    Pull       = (5 * 16) + 1,

    /// **Survey protocol**
    /// Used to send the survey. The survey is delivered to all connected
    /// respondents. Once the query is sent, the socket can be used to receive
    /// the responses until the survey deadline expires, after which receive
    /// fails with a timeout.
    Surveyor   = (6 * 16) + 2,

    /// Used to respond to the survey. The survey is received with the receive
    /// function, the response is sent with the send function.
    Respondent = (6 * 16) + 3,

    /// **Message bus protocol**
    /// Broadcasts messages from any node to all other nodes in the topology.
    /// The socket never receives messages that it sent itself. The user is
    /// responsible for keeping the topology cycle free.
    Bus        = (7 * 16),
}

impl SocketType {
    pub fn id(&self) -> u16 {
        *self as u16
    }

    pub fn peer(&self) -> SocketType {
        match *self {
            SocketType::Pair       => SocketType::Pair,
            SocketType::Pub        => SocketType::Sub,
            SocketType::Sub        => SocketType::Pub,
            SocketType::Req        => SocketType::Rep,
            SocketType::Rep        => SocketType::Req,
            SocketType::Push       => SocketType::Pull,
            SocketType::Pull       => SocketType::Push,
            SocketType::Surveyor   => SocketType::Respondent,
            SocketType::Respondent => SocketType::Surveyor,
            SocketType::Bus        => SocketType::Bus,
        }
    }

    pub fn matches(&self, other: SocketType) -> bool {
        self.peer() == other && other.peer() == *self
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SocketId(pub usize);

impl fmt::Debug for SocketId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

#[derive(Clone)]
pub struct IdSequence {
    value: Arc<AtomicUsize>,
}

impl IdSequence {
    pub fn new() -> IdSequence {
        IdSequence { value: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn next(&self) -> usize {
        self.value.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        IdSequence::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{IdSequence, SocketType};

    #[test]
    fn id_sequence_can_be_cloned() {
        let seq = IdSequence::new();
        let other = seq.clone();

        assert_eq!(0, other.next());
        assert_eq!(1, seq.next());
        assert_eq!(2, seq.next());
        assert_eq!(3, other.next());
    }

    #[test]
    fn socket_types_match_their_peer() {
        assert!(SocketType::Pair.matches(SocketType::Pair));
        assert!(SocketType::Pub.matches(SocketType::Sub));
        assert!(SocketType::Req.matches(SocketType::Rep));
        assert!(SocketType::Push.matches(SocketType::Pull));
        assert!(SocketType::Surveyor.matches(SocketType::Respondent));
        assert!(SocketType::Bus.matches(SocketType::Bus));

        assert!(!SocketType::Req.matches(SocketType::Sub));
        assert!(!SocketType::Pub.matches(SocketType::Pub));
        assert!(!SocketType::Pull.matches(SocketType::Pull));
    }

    #[test]
    fn socket_type_numbers_follow_the_sp_assignments() {
        assert_eq!(16, SocketType::Pair.id());
        assert_eq!(32, SocketType::Pub.id());
        assert_eq!(33, SocketType::Sub.id());
        assert_eq!(48, SocketType::Req.id());
        assert_eq!(49, SocketType::Rep.id());
        assert_eq!(80, SocketType::Push.id());
        assert_eq!(81, SocketType::Pull.id());
        assert_eq!(98, SocketType::Surveyor.id());
        assert_eq!(99, SocketType::Respondent.id());
        assert_eq!(112, SocketType::Bus.id());
    }
}
