//! Session key computation.
//!
//! Key templates:
//! - `llamar:<sessionId>`                  (main conversations)
//! - `agent:main:subagent:<sessionId>`     (child tool servers)

/// Key for a main conversation session.
pub fn main_session_key(session_id: &str) -> String {
    format!("llamar:{session_id}")
}

/// Key for a subagent session spawned by the main agent.
pub fn subagent_session_key(session_id: &str) -> String {
    format!("agent:main:subagent:{session_id}")
}

/// Extract the session id from either key form.
pub fn session_id_of(key: &str) -> Option<&str> {
    key.strip_prefix("llamar:")
        .or_else(|| key.strip_prefix("agent:main:subagent:"))
}

/// Whether a key names a subagent session.
pub fn is_subagent_key(key: &str) -> bool {
    key.starts_with("agent:main:subagent:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_key_shape() {
        assert_eq!(main_session_key("abc123"), "llamar:abc123");
    }

    #[test]
    fn subagent_key_shape() {
        assert_eq!(
            subagent_session_key("abc123"),
            "agent:main:subagent:abc123"
        );
    }

    #[test]
    fn id_extraction_round_trips() {
        assert_eq!(session_id_of(&main_session_key("x1")), Some("x1"));
        assert_eq!(session_id_of(&subagent_session_key("x2")), Some("x2"));
        assert_eq!(session_id_of("unrelated:key"), None);
    }

    #[test]
    fn subagent_detection() {
        assert!(is_subagent_key("agent:main:subagent:x"));
        assert!(!is_subagent_key("llamar:x"));
    }
}
