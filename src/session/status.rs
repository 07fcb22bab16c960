use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Allocated on the server, not yet attached
    Unknown = 0,
    /// Attached and usable
    Idle = 1,
    /// Teardown in progress
    Closing = 2,
    /// Terminal
    Closed = 3,
}

impl Status {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Status::Unknown,
            1 => Status::Idle,
            2 => Status::Closing,
            _ => Status::Closed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Closing | Status::Closed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unknown => write!(f, "Unknown"),
            Status::Idle => write!(f, "Idle"),
            Status::Closing => write!(f, "Closing"),
            Status::Closed => write!(f, "Closed"),
        }
    }
}

/// Status cell shared by the API caller and the keepalive task.
///
/// Every transition is a single compare-and-swap, so readers never see an
/// intermediate value and a terminated session never becomes `Idle` again.
#[derive(Debug)]
pub struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub fn new() -> Self {
        Self(AtomicU8::new(Status::Unknown as u8))
    }

    pub fn load(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Unknown -> Idle`. Returns false if the session already left `Unknown`.
    pub fn set_idle(&self) -> bool {
        self.0
            .compare_exchange(
                Status::Unknown as u8,
                Status::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves to `Closing` unless the session is already closing or closed.
    pub fn set_closing(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match Status::from_u8(current) {
                    Status::Unknown | Status::Idle => Some(Status::Closing as u8),
                    Status::Closing | Status::Closed => None,
                }
            })
            .is_ok()
    }

    /// Forces the terminal state. Returns the previous status.
    pub fn set_closed(&self) -> Status {
        Status::from_u8(self.0.swap(Status::Closed as u8, Ordering::AcqRel))
    }
}

impl Default for AtomicStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_forward_path() {
        let status = AtomicStatus::new();
        assert_eq!(status.load(), Status::Unknown);
        assert!(status.set_idle());
        assert_eq!(status.load(), Status::Idle);
        assert!(status.set_closing());
        assert_eq!(status.load(), Status::Closing);
        assert_eq!(status.set_closed(), Status::Closing);
        assert_eq!(status.load(), Status::Closed);
    }

    #[test]
    fn test_no_way_back_to_idle() {
        let status = AtomicStatus::new();
        status.set_closed();
        assert!(!status.set_idle());
        assert!(!status.set_closing());
        assert_eq!(status.load(), Status::Closed);

        let status = AtomicStatus::new();
        status.set_idle();
        status.set_closing();
        assert!(!status.set_idle());
        assert_eq!(status.load(), Status::Closing);
    }

    #[test]
    fn test_idle_is_entered_once() {
        let status = AtomicStatus::new();
        assert!(status.set_idle());
        assert!(!status.set_idle());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!Status::Unknown.is_terminal());
        assert!(!Status::Idle.is_terminal());
        assert!(Status::Closing.is_terminal());
        assert!(Status::Closed.is_terminal());
    }

    #[test]
    fn test_concurrent_transitions_stay_consistent() {
        let status = Arc::new(AtomicStatus::new());
        status.set_idle();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let status = status.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        status.set_closing()
                    } else {
                        status.set_idle()
                    }
                })
            })
            .collect();

        let closing_wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .enumerate()
            .filter(|(i, won)| i % 2 == 0 && *won)
            .count();

        assert_eq!(closing_wins, 1);
        assert_eq!(status.load(), Status::Closing);
    }
}
