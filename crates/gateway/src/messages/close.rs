/// Clean close, the session is finished
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close sent by the client when it intends to resume
pub const RESUMABLE_CLOSURE: u16 = 4000;

/// The server rejected the sequence number sent on resume
pub const INVALID_SEQUENCE: u16 = 4007;

/// The session expired on the server
pub const SESSION_TIMEOUT: u16 = 4009;

/// Whether a close with this code invalidates the stored session
pub fn clears_session(code: u16) -> bool {
    matches!(code, INVALID_SEQUENCE | SESSION_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_clearing_codes() {
        assert!(clears_session(4007));
        assert!(clears_session(4009));
        assert!(!clears_session(NORMAL_CLOSURE));
        assert!(!clears_session(4004));
    }
}
