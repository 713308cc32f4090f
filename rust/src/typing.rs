//! Typing indicator state: outbound leading-edge throttle and inbound decay.
//!
//! Both halves take the current `Instant` from the caller so they can be driven
//! deterministically; the actor owns the actual timer task.

use std::time::{Duration, Instant};

pub const TYPING_EVENT: &str = "typing";
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(1500);
pub const DEFAULT_DECAY: Duration = Duration::from_millis(3000);

/// At most one outbound signal per `interval`. The first keystroke of a
/// window fires immediately; the rest of that window is suppressed.
#[derive(Debug)]
pub struct TypingThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl TypingThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    pub fn should_send(&mut self, now: Instant) -> bool {
        let due = match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        };
        if due {
            self.last_sent = Some(now);
        }
        due
    }
}

/// `peer_is_typing` plus the generation of the decay timer currently armed.
/// Every inbound signal bumps the generation, which invalidates the timer that
/// was running before it.
#[derive(Debug)]
pub struct TypingIndicator {
    decay: Duration,
    generation: u64,
    peer_is_typing: bool,
}

impl TypingIndicator {
    pub fn new(decay: Duration) -> Self {
        Self {
            decay,
            generation: 0,
            peer_is_typing: false,
        }
    }

    pub fn decay(&self) -> Duration {
        self.decay
    }

    pub fn peer_is_typing(&self) -> bool {
        self.peer_is_typing
    }

    /// Returns the generation the caller should arm a decay timer for.
    pub fn signal_received(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.peer_is_typing = true;
        self.generation
    }

    /// A decay timer fired. Returns true if the flag flipped back to false;
    /// timers from superseded generations do nothing.
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.peer_is_typing {
            return false;
        }
        self.peer_is_typing = false;
        true
    }

    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.peer_is_typing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_changes_in_a_second_send_once() {
        let start = Instant::now();
        let mut t = TypingThrottle::new(DEFAULT_THROTTLE);
        let sent = [0u64, 200, 400, 700, 1000]
            .iter()
            .filter(|ms| t.should_send(start + Duration::from_millis(**ms)))
            .count();
        assert_eq!(sent, 1);
        assert!(t.should_send(start + Duration::from_millis(1600)));
    }

    #[test]
    fn window_restarts_from_last_signal() {
        let start = Instant::now();
        let mut t = TypingThrottle::new(DEFAULT_THROTTLE);
        assert!(t.should_send(start));
        assert!(t.should_send(start + Duration::from_millis(1501)));
        assert!(!t.should_send(start + Duration::from_millis(2000)));
    }

    #[test]
    fn each_signal_supersedes_previous_timer() {
        let mut ind = TypingIndicator::new(DEFAULT_DECAY);
        let first = ind.signal_received();
        let second = ind.signal_received();
        assert!(!ind.expire(first));
        assert!(ind.peer_is_typing());
        assert!(ind.expire(second));
        assert!(!ind.peer_is_typing());
        assert!(!ind.expire(second));
    }

    #[test]
    fn reset_invalidates_armed_timer() {
        let mut ind = TypingIndicator::new(DEFAULT_DECAY);
        let generation = ind.signal_received();
        ind.reset();
        assert!(!ind.peer_is_typing());
        assert!(!ind.expire(generation));
    }
}
