/// Mutable state of one portal session, owned by a single driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Session ID from the portal's `SID` cookie
    pub sid: Option<String>,
    /// Queries issued by this driver, across session resets
    pub query_count: u32,
    /// Successful handshakes so far
    pub session_count: u32,
    pub post_requests: u32,
    pub get_requests: u32,
}

impl Session {
    /// Whether the query about to be issued has to start from a fresh session.
    ///
    /// Resets happen once every `query_reset` queries, before the first query
    /// of each new block.
    pub fn due_for_reset(&self, query_reset: u32) -> bool {
        query_reset > 0 && self.query_count > 0 && self.query_count % query_reset == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_every_block_of_queries() {
        let mut session = Session::default();
        assert!(!session.due_for_reset(40));
        session.query_count = 39;
        assert!(!session.due_for_reset(40));
        session.query_count = 40;
        assert!(session.due_for_reset(40));
        session.query_count = 80;
        assert!(session.due_for_reset(40));
        assert!(!session.due_for_reset(0));
    }
}
