// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Scalability protocols messaging library.
//!
//! An application creates a [`Socket`] of a chosen [`SocketType`], binds it
//! to listen or connects out to peers, and exchanges discrete messages; the
//! library takes care of reconnection, framing, fan-out and fan-in, and
//! request correlation. Supported patterns: request/reply,
//! publish/subscribe, pipeline, survey, bus and pair, over tcp, ipc,
//! in-process and TLS transports.
//!
//! ```no_run
//! use scalemsg::{Session, SocketType};
//!
//! let session = Session::new();
//! let pull = session.create_socket(SocketType::Pull);
//! let push = session.create_socket(SocketType::Push);
//!
//! pull.bind("tcp://127.0.0.1:5454").unwrap();
//! push.connect("tcp://127.0.0.1:5454").unwrap();
//!
//! push.send(vec![65, 66, 67]).unwrap();
//! let received = pull.recv().unwrap();
//! assert_eq!(vec![65, 66, 67], received);
//! ```

#[macro_use]
extern crate log;

mod core;
mod device;
mod endpoint;
mod error;
mod global;
mod message;
mod options;
mod pipe;
mod protocol;
mod session;
mod socket;
mod transport;
mod util;
mod waiter;

pub use crate::device::device;
pub use crate::endpoint::{Endpoint, PortAction};
pub use crate::error::{Error, Result};
pub use crate::global::{SocketId, SocketType};
pub use crate::message::Message;
pub use crate::options::SocketOption;
pub use crate::pipe::{PortProperty, TlsState, PROP_LOCAL_ADDR, PROP_REMOTE_ADDR, PROP_TLS_STATE};
pub use crate::session::Session;
pub use crate::socket::Socket;
pub use crate::transport::tls::TlsConfig;
