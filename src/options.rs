// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::time::Duration;

use crate::transport::tls::TlsConfig;

// String names for each option, used for gets and for the dispatch between
// the protocol and the socket core.

pub const OPTION_RAW: &str = "RAW";
pub const OPTION_RECV_DEADLINE: &str = "RECV-DEADLINE";
pub const OPTION_SEND_DEADLINE: &str = "SEND-DEADLINE";
pub const OPTION_RETRY_TIME: &str = "RETRY-TIME";
pub const OPTION_SUBSCRIBE: &str = "SUBSCRIBE";
pub const OPTION_UNSUBSCRIBE: &str = "UNSUBSCRIBE";
pub const OPTION_SURVEY_TIME: &str = "SURVEY-TIME";
pub const OPTION_TLS_CONFIG: &str = "TLS-CONFIG";
pub const OPTION_WRITE_Q_LEN: &str = "WRITEQ-LEN";
pub const OPTION_READ_Q_LEN: &str = "READQ-LEN";
pub const OPTION_NO_DELAY: &str = "NO-DELAY";
pub const OPTION_KEEP_ALIVE: &str = "KEEP-ALIVE";
pub const OPTION_LINGER: &str = "LINGER";
pub const OPTION_TTL: &str = "TTL";

/// Options a socket accepts, each variant carrying its typed value.
///
/// Options understood by the installed protocol are handled there
/// (subscriptions, retry interval, survey deadline, hop limit); everything
/// else is handled by the socket core. Setting an option neither side
/// recognizes fails with [`Error::BadOption`](crate::Error::BadOption).
#[derive(Clone, Debug)]
pub enum SocketOption {
    /// Disables cooked-mode state enforcement and header rewriting,
    /// for building forwarding devices.
    Raw(bool),
    /// Timeout applied to each receive operation. Zero means no timeout.
    RecvTimeout(Duration),
    /// Timeout applied to each send operation. Zero means no timeout.
    SendTimeout(Duration),
    /// Interval after which an unanswered request is sent again.
    /// Zero disables the automatic resend. Req sockets only.
    ResendInterval(Duration),
    /// Adds a subscription prefix. Sub sockets only.
    Subscribe(Vec<u8>),
    /// Removes a previously added subscription prefix. Sub sockets only.
    Unsubscribe(Vec<u8>),
    /// Window during which survey responses are accepted; once it expires,
    /// receive fails with a timeout. Zero leaves the survey open forever.
    /// Surveyor sockets only.
    SurveyDeadline(Duration),
    /// TLS material for the `tls+tcp` transport, snapshotted when a dialer
    /// or listener is created.
    TlsConfig(TlsConfig),
    /// Capacity, in messages, of the send queue. Cannot be changed once the
    /// socket is active.
    SendQueueLen(usize),
    /// Capacity, in messages, of the receive queue. Cannot be changed once
    /// the socket is active.
    RecvQueueLen(usize),
    /// Disables Nagle buffering on TCP streams.
    NoDelay(bool),
    /// Enables keep-alive probing on TCP streams.
    KeepAlive(bool),
    /// How long `close` may spend draining the send queue.
    Linger(Duration),
    /// Hop limit for backtrace headers. Rep and Respondent sockets only.
    Ttl(u8),
}

impl SocketOption {
    pub fn name(&self) -> &'static str {
        match *self {
            SocketOption::Raw(..)            => OPTION_RAW,
            SocketOption::RecvTimeout(..)    => OPTION_RECV_DEADLINE,
            SocketOption::SendTimeout(..)    => OPTION_SEND_DEADLINE,
            SocketOption::ResendInterval(..) => OPTION_RETRY_TIME,
            SocketOption::Subscribe(..)      => OPTION_SUBSCRIBE,
            SocketOption::Unsubscribe(..)    => OPTION_UNSUBSCRIBE,
            SocketOption::SurveyDeadline(..) => OPTION_SURVEY_TIME,
            SocketOption::TlsConfig(..)      => OPTION_TLS_CONFIG,
            SocketOption::SendQueueLen(..)   => OPTION_WRITE_Q_LEN,
            SocketOption::RecvQueueLen(..)   => OPTION_READ_Q_LEN,
            SocketOption::NoDelay(..)        => OPTION_NO_DELAY,
            SocketOption::KeepAlive(..)      => OPTION_KEEP_ALIVE,
            SocketOption::Linger(..)         => OPTION_LINGER,
            SocketOption::Ttl(..)            => OPTION_TTL,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn options_know_their_wire_names() {
        assert_eq!("RAW", SocketOption::Raw(true).name());
        assert_eq!("RECV-DEADLINE", SocketOption::RecvTimeout(Duration::ZERO).name());
        assert_eq!("RETRY-TIME", SocketOption::ResendInterval(Duration::ZERO).name());
        assert_eq!("SUBSCRIBE", SocketOption::Subscribe(vec![]).name());
        assert_eq!("SURVEY-TIME", SocketOption::SurveyDeadline(Duration::ZERO).name());
        assert_eq!("WRITEQ-LEN", SocketOption::SendQueueLen(0).name());
        assert_eq!("READQ-LEN", SocketOption::RecvQueueLen(0).name());
        assert_eq!("TTL", SocketOption::Ttl(8).name());
    }
}
