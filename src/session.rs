// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use crate::global::{IdSequence, SocketId, SocketType};
use crate::socket::Socket;

/// Entry point of the library. A session hands out sockets; each socket
/// comes with the default transports (tcp, ipc, inproc, tls+tcp)
/// registered and lives independently of the session afterwards.
pub struct Session {
    id_seq: IdSequence,
}

impl Session {
    pub fn new() -> Session {
        Session {
            id_seq: IdSequence::new(),
        }
    }

    /// Creates a socket of the specified type, which determines its
    /// communication pattern and which peers it will accept.
    pub fn create_socket(&self, socket_type: SocketType) -> Socket {
        Socket::new(SocketId(self.id_seq.next()), socket_type)
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
