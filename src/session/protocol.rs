// src/session/protocol.rs

//! Transport-neutral frames exchanged with a live viewer.

use std::fmt;

/// Something the session wants delivered to the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Bytes appended to the job's log, exactly as written.
    Log(Vec<u8>),
    /// Keepalive with no payload.
    Heartbeat,
    /// The session is over; the transport should close.
    Close,
}

/// A frame received from the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The viewer closed the connection.
    Close,
    /// Anything without a control meaning (pongs, binary frames).
    Other,
}

/// Control tokens a viewer may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlToken {
    Kill,
    Unknown(String),
}

impl ControlToken {
    /// Surrounding whitespace is ignored; matching is case-sensitive.
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "kill" => ControlToken::Kill,
            other => ControlToken::Unknown(other.to_string()),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The viewer asked for the job to be killed.
    Killed,
    /// The viewer closed the connection.
    ViewerLeft,
    /// Nothing was heard from the viewer within the liveness timeout.
    TimedOut,
    /// The job reached a terminal state and its log was flushed.
    JobFinished,
    TransportError(String),
    TailerError(String),
    /// Stopped from outside via the session's cancellation token.
    Cancelled,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Killed => f.write_str("killed"),
            SessionEnd::ViewerLeft => f.write_str("viewer left"),
            SessionEnd::TimedOut => f.write_str("viewer timed out"),
            SessionEnd::JobFinished => f.write_str("job finished"),
            SessionEnd::TransportError(e) => write!(f, "transport error: {e}"),
            SessionEnd::TailerError(e) => write!(f, "tailer error: {e}"),
            SessionEnd::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_token_is_trimmed_but_case_sensitive() {
        assert_eq!(ControlToken::parse("kill"), ControlToken::Kill);
        assert_eq!(ControlToken::parse("  kill\n"), ControlToken::Kill);
        assert_eq!(
            ControlToken::parse("KILL"),
            ControlToken::Unknown("KILL".to_string())
        );
        assert_eq!(
            ControlToken::parse("pause"),
            ControlToken::Unknown("pause".to_string())
        );
    }
}
