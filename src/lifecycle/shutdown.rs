use std::sync::atomic::{AtomicU8, Ordering};

/// Process-wide shutdown guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShutdownState {
    /// Signal handlers not registered yet.
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Every transition is a compare-and-set, so each one happens at most once
/// no matter how many callers race on it.
#[derive(Debug)]
pub struct ShutdownFlag(AtomicU8);

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self(AtomicU8::new(ShutdownState::Idle as u8))
    }
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Idle → Running`
    pub fn arm(&self) -> bool {
        self.advance(ShutdownState::Idle, ShutdownState::Running)
    }

    /// `Running → Stopping`. Only the caller that gets `true` runs the stop
    /// sequence.
    pub fn begin(&self) -> bool {
        self.advance(ShutdownState::Running, ShutdownState::Stopping)
    }

    /// `Stopping → Stopped`
    pub fn finish(&self) -> bool {
        self.advance(ShutdownState::Stopping, ShutdownState::Stopped)
    }

    fn advance(&self, from: ShutdownState, to: ShutdownState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn transitions_in_order_only() {
        let flag = ShutdownFlag::new();
        assert!(!flag.begin());
        assert!(flag.arm());
        assert!(!flag.arm());
        assert!(flag.begin());
        assert!(!flag.begin());
        assert!(flag.finish());
        assert_eq!(flag.state(), ShutdownState::Stopped);
    }

    #[test]
    fn racing_callers_begin_once() {
        let flag = Arc::new(ShutdownFlag::new());
        flag.arm();
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let flag = flag.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if flag.begin() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(flag.state(), ShutdownState::Stopping);
    }
}
