// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by sockets, endpoints and transports.
///
/// The handshake variants are fatal for the pipe that raised them; the
/// dialer's backoff takes care of retrying. `ProtoOp` and `ProtoState` are
/// sticky: the protocol parks them in the socket's send/recv error cells and
/// clears them when the state machine allows the operation again.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("protocols are not compatible")]
    BadProtocol,
    #[error("peer handshake carries an incompatible protocol number")]
    BadPeerProtocol,
    #[error("peer handshake is malformed")]
    BadHeader,
    #[error("peer requested an unsupported protocol version")]
    BadVersion,
    #[error("no transport registered for the address scheme")]
    BadTransport,
    #[error("option is not recognized or cannot be changed")]
    BadOption,
    #[error("option value is invalid")]
    BadValue,
    #[error("property is not recognized")]
    BadProperty,
    #[error("address is already in use")]
    AddrInUse,
    #[error("object is closed")]
    Closed,
    #[error("connection refused")]
    ConnRefused,
    #[error("operation is not supported by the protocol")]
    ProtoOp,
    #[error("operation is not allowed in the current protocol state")]
    ProtoState,
    #[error("send deadline expired")]
    SendTimeout,
    #[error("recv deadline expired")]
    RecvTimeout,
    #[error("message is too long")]
    TooLong,
    #[error("transport requires a TLS configuration")]
    TlsNoConfig,
    #[error("TLS configuration is missing the required certificate material")]
    TlsNoCert,
    #[error("i/o error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::AddrInUse => Error::AddrInUse,
            io::ErrorKind::ConnectionRefused => Error::ConnRefused,
            _ => Error::Io(Arc::new(err)),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Error::Io(l), Error::Io(r)) => l.kind() == r.kind(),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Eq for Error {}

#[cfg(test)]
mod tests {
    use std::io;

    use super::Error;

    #[test]
    fn io_errors_map_onto_the_taxonomy() {
        let e: Error = io::Error::from(io::ErrorKind::AddrInUse).into();
        assert_eq!(Error::AddrInUse, e);

        let e: Error = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert_eq!(Error::ConnRefused, e);

        let e: Error = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn io_errors_compare_by_kind() {
        let l: Error = io::Error::from(io::ErrorKind::BrokenPipe).into();
        let r: Error = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert_eq!(l, r);
    }
}
