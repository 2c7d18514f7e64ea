// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::thread;

use crate::error::{Error, Result};
use crate::options::SocketOption;
use crate::socket::Socket;

/// Wires two compatible sockets into a forwarding device: everything
/// received on one is sent out the other, with both sockets switched to
/// raw mode so routing headers travel intact.
///
/// The forwarding runs on background threads and stops when either socket
/// closes. Passing two clones of one BUS socket builds the loopback device
/// that re-broadcasts between its peers without echoing to the origin.
pub fn device(left: &Socket, right: &Socket) -> Result<()> {
    if !left.matches(right) {
        return Err(Error::BadProtocol);
    }
    left.set_option(SocketOption::Raw(true))?;
    right.set_option(SocketOption::Raw(true))?;

    let (from, to) = (left.clone(), right.clone());
    thread::spawn(move || forward(from, to));

    let (from, to) = (right.clone(), left.clone());
    thread::spawn(move || forward(from, to));

    Ok(())
}

fn forward(from: Socket, to: Socket) {
    loop {
        let msg = match from.recv_msg() {
            Ok(msg) => msg,
            Err(e) => {
                debug!("device stopping: {}", e);
                return;
            }
        };
        if let Err(e) = to.send_msg(msg) {
            debug!("device stopping: {}", e);
            return;
        }
    }
}
