// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The protocol plug-ins. Each module implements one messaging pattern on
//! top of the socket substrate: it spawns the per-endpoint tasks, owns the
//! pattern's routing state, and hooks into the send/receive path when it
//! needs to rewrite or veto messages.

mod bus;
mod pair;
mod pbu;
mod pull;
mod push;
mod rep;
mod req;
mod respondent;
mod sub;
mod surveyor;

use std::sync::Arc;
use std::time::Instant;

use crate::core::ProtoSocket;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::global::SocketType;
use crate::message::Message;
use crate::options::SocketOption;

/// One messaging pattern. The socket core drives this through endpoint
/// lifecycle calls and the optional send/recv hooks; everything else the
/// protocol does happens on its own tasks.
pub trait Protocol: Send + Sync {
    /// The 16-bit SP protocol number.
    fn number(&self) -> u16;

    /// The protocol number this protocol is willing to peer with.
    fn peer_number(&self) -> u16;

    /// Called when a new endpoint is attached, after connect or accept
    /// completes. The protocol spawns its per-endpoint tasks here.
    fn add_endpoint(&self, ep: &Arc<Endpoint>);

    /// Called when an endpoint goes away.
    fn remove_endpoint(&self, ep: &Endpoint);

    /// Drains the send side on socket close, waiting no longer than the
    /// linger deadline.
    fn shutdown(&self, expire: Instant);

    fn set_option(&self, opt: &SocketOption) -> Result<()>;

    fn get_option(&self, name: &str) -> Result<SocketOption>;

    /// Capability flags: the socket only dispatches into a hook when the
    /// matching flag is set.
    fn has_send_hook(&self) -> bool {
        false
    }

    fn has_recv_hook(&self) -> bool {
        false
    }

    /// Runs as the application sends a message; may rewrite it. Returning
    /// false drops the message silently.
    fn send_hook(&self, _msg: &mut Message) -> bool {
        true
    }

    /// Runs as a message is handed to the application; may rewrite it.
    /// Returning false frees the message and fetches the next one.
    fn recv_hook(&self, _msg: &mut Message) -> bool {
        true
    }
}

/// Builds the protocol instance for a socket type. The handle is the
/// protocol's only line back to the socket: queues, close signal and the
/// sticky error cells.
pub fn create(socket_type: SocketType, ps: ProtoSocket) -> Arc<dyn Protocol> {
    match socket_type {
        SocketType::Pair       => Arc::new(pair::Pair::new(ps)),
        SocketType::Pub        => Arc::new(pbu::Pub::new(ps)),
        SocketType::Sub        => Arc::new(sub::Sub::new(ps)),
        SocketType::Req        => Arc::new(req::Req::new(ps)),
        SocketType::Rep        => Arc::new(rep::Rep::new(ps)),
        SocketType::Push       => Arc::new(push::Push::new(ps)),
        SocketType::Pull       => Arc::new(pull::Pull::new(ps)),
        SocketType::Surveyor   => Arc::new(surveyor::Surveyor::new(ps)),
        SocketType::Respondent => Arc::new(respondent::Respondent::new(ps)),
        SocketType::Bus        => Arc::new(bus::Bus::new(ps)),
    }
}
