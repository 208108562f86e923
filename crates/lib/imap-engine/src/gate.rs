//! Spurious IDLE notification suppression.

use std::time::{Duration, Instant};

/// Window within which a second notification is treated as a duplicate.
pub(crate) const DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Message counts reported for a mailbox.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MailboxCounts {
    /// Total messages in the mailbox.
    pub messages: u32,

    /// Messages flagged recent.
    pub recent: u32,
}

/// Decides whether an IDLE notification warrants a fetch.
///
/// Servers emit bursts of untagged updates for a single delivery; a
/// notification is admitted only when it arrives outside the duplicate
/// window of the previously admitted one and reports counts that differ
/// from it. State is written only on admission.
#[derive(Debug)]
pub(crate) struct NotificationGate {
    /// Duplicate window length.
    window: Duration,

    /// When the last admitted notification was processed.
    last_admitted_at: Option<Instant>,

    /// Counts reported by the last admitted notification.
    last_counts: Option<MailboxCounts>,
}

impl NotificationGate {
    /// Create a gate with the given duplicate window.
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted_at: None,
            last_counts: None,
        }
    }

    /// Admit or suppress a notification observed at `now`.
    pub(crate) fn admit(&mut self, counts: MailboxCounts, now: Instant) -> bool {
        if let Some(last) = self.last_admitted_at
            && now.duration_since(last) < self.window
        {
            return false;
        }

        if self.last_counts == Some(counts) {
            return false;
        }

        self.last_admitted_at = Some(now);
        self.last_counts = Some(counts);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(messages: u32, recent: u32) -> MailboxCounts {
        MailboxCounts { messages, recent }
    }

    #[test]
    fn first_notification_is_admitted() {
        let mut gate = NotificationGate::new(DEDUP_WINDOW);
        assert!(gate.admit(counts(42, 1), Instant::now()));
    }

    #[test]
    fn notification_within_the_window_is_suppressed() {
        let mut gate = NotificationGate::new(DEDUP_WINDOW);
        let start = Instant::now();

        assert!(gate.admit(counts(42, 1), start));
        assert!(!gate.admit(counts(43, 2), start + Duration::from_secs(1)));
    }

    #[test]
    fn equal_counts_after_the_window_are_suppressed() {
        let mut gate = NotificationGate::new(DEDUP_WINDOW);
        let start = Instant::now();

        assert!(gate.admit(counts(42, 1), start));
        assert!(!gate.admit(counts(42, 1), start + Duration::from_secs(10)));
    }

    #[test]
    fn changed_counts_after_the_window_are_admitted() {
        let mut gate = NotificationGate::new(DEDUP_WINDOW);
        let start = Instant::now();

        assert!(gate.admit(counts(42, 1), start));
        assert!(gate.admit(counts(43, 1), start + Duration::from_secs(10)));
    }

    #[test]
    fn suppression_does_not_move_the_window() {
        let mut gate = NotificationGate::new(DEDUP_WINDOW);
        let start = Instant::now();

        assert!(gate.admit(counts(42, 1), start));
        // A duplicate at 4s is suppressed and must not extend the window.
        assert!(!gate.admit(counts(43, 1), start + Duration::from_secs(4)));
        assert!(gate.admit(counts(43, 1), start + Duration::from_secs(6)));
    }

    #[test]
    fn at_most_one_admission_for_a_burst_with_equal_counts() {
        let mut gate = NotificationGate::new(DEDUP_WINDOW);
        let start = Instant::now();

        let admitted = [
            gate.admit(counts(42, 1), start),
            gate.admit(counts(42, 1), start + Duration::from_secs(1)),
            gate.admit(counts(42, 1), start + Duration::from_secs(2)),
        ];
        assert_eq!(admitted.iter().filter(|admitted| **admitted).count(), 1);
    }
}
