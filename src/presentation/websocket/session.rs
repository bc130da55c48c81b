//! WebSocket Session Management

use std::time::Instant;

/// Per-connection state owned by the connection task
#[derive(Debug)]
pub struct SessionState {
    pub user_id: i64,
    pub session_id: String,
    pub last_heartbeat: Instant,
    pub identified: bool,
}

impl SessionState {
    pub fn new(session_id: String) -> Self {
        Self {
            user_id: 0,
            session_id,
            last_heartbeat: Instant::now(),
            identified: false,
        }
    }

    pub fn identify(&mut self, user_id: i64) {
        self.user_id = user_id;
        self.identified = true;
        self.heartbeat();
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn is_alive(&self, timeout_ms: u64) -> bool {
        self.last_heartbeat.elapsed().as_millis() < u128::from(timeout_ms)
    }
}
