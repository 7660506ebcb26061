//! Write-through cell for a settable provider property.
//!
//! ConnMan does not use the standard `org.freedesktop.DBus.Properties`
//! interface, so read/write properties have to be tracked manually. The
//! cell keeps four slots:
//!
//! - `value`: last value confirmed by the provider,
//! - `pending`: a write currently in flight,
//! - `queued`: the latest write requested while one was in flight,
//! - `received`: a value the provider reported while a write was in flight.
//!
//! The observed value is `queued`, else `pending`, else `value`. At most
//! one write is ever outstanding; a burst of `set()` calls collapses to
//! "issue the most recent". If a write fails the observed value snaps back
//! to the provider's truth and the caller is told to emit a change event.

/// What the caller must do after an operation on the cell.
#[derive(Debug, PartialEq, Eq)]
pub struct Outcome<T> {
    /// Write this value to the provider now.
    pub issue: Option<T>,
    /// The observed value changed; emit a change notification.
    pub changed: bool,
}

#[derive(Debug)]
pub struct SettableProperty<T> {
    value: T,
    pending: Option<T>,
    queued: Option<T>,
    received: Option<T>,
}

impl<T: Clone + PartialEq> SettableProperty<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            pending: None,
            queued: None,
            received: None,
        }
    }

    /// The value observed by the rest of the system.
    pub fn value(&self) -> &T {
        self.queued
            .as_ref()
            .or(self.pending.as_ref())
            .unwrap_or(&self.value)
    }

    /// Request a write. No-op if the observed value already matches.
    pub fn set(&mut self, new_value: T) -> Outcome<T> {
        if *self.value() == new_value {
            return Outcome {
                issue: None,
                changed: false,
            };
        }

        let issue = if self.pending.is_none() {
            self.pending = Some(new_value.clone());
            Some(new_value)
        } else {
            // Only the latest queued write is ever issued.
            self.queued = Some(new_value);
            None
        };

        Outcome {
            issue,
            changed: true,
        }
    }

    /// The in-flight write completed.
    pub fn write_finished(&mut self, success: bool) -> Outcome<T> {
        let before = self.value().clone();

        if let Some(pending) = self.pending.take() {
            if success {
                self.value = pending;
            }
        }

        let mut issue = None;
        if let Some(queued) = self.queued.take() {
            if queued != self.value {
                self.pending = Some(queued.clone());
                issue = Some(queued);
            }
        }

        // A value received mid-flight is only adopted once no write is
        // outstanding; until then the outcome of the write decides.
        if self.pending.is_none() {
            if let Some(received) = self.received.take() {
                self.value = received;
            }
        }

        Outcome {
            issue,
            changed: before != *self.value(),
        }
    }

    /// The provider reported a new value. Returns whether the observed
    /// value changed (and a change notification is due).
    pub fn received_from_provider(&mut self, received: T) -> bool {
        if self.pending.is_some() {
            self.received = Some(received);
            return false;
        }

        if self.value != received {
            self.value = received;
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_to_current_value_is_a_no_op() {
        let mut cell = SettableProperty::new(false);

        let outcome = cell.set(false);
        assert_eq!(outcome, Outcome { issue: None, changed: false });
        assert!(!cell.value());
    }

    #[test]
    fn set_issues_a_write_and_changes_observed_value() {
        let mut cell = SettableProperty::new(false);

        let outcome = cell.set(true);
        assert_eq!(outcome.issue, Some(true));
        assert!(outcome.changed);
        assert!(cell.value());
    }

    #[test]
    fn writes_coalesce_to_the_latest_request() {
        let mut cell = SettableProperty::new(false);

        assert_eq!(cell.set(true).issue, Some(true));

        // Two more requests while the first is in flight: only the latest
        // survives as queued, and observed follows it.
        assert_eq!(cell.set(false).issue, None);
        assert!(!cell.value());
        assert_eq!(cell.set(true).issue, None);
        assert!(cell.value());

        // The in-flight write confirmed the value the queue ended up at,
        // so no second write goes out.
        let outcome = cell.write_finished(true);
        assert_eq!(outcome, Outcome { issue: None, changed: false });
        assert!(cell.value());
    }

    #[test]
    fn queued_write_is_issued_when_still_needed() {
        let mut cell = SettableProperty::new(false);

        assert_eq!(cell.set(true).issue, Some(true));
        assert_eq!(cell.set(false).issue, None);

        let outcome = cell.write_finished(true);
        assert_eq!(outcome.issue, Some(false));
        assert!(!outcome.changed);
        assert!(!cell.value());

        let outcome = cell.write_finished(true);
        assert_eq!(outcome, Outcome { issue: None, changed: false });
        assert!(!cell.value());
    }

    #[test]
    fn failed_write_reverts_and_notifies() {
        let mut cell = SettableProperty::new(false);

        assert_eq!(cell.set(true).issue, Some(true));

        let outcome = cell.write_finished(false);
        assert_eq!(outcome.issue, None);
        assert!(outcome.changed);
        assert!(!cell.value());
    }

    #[test]
    fn value_received_while_pending_wins_after_failure() {
        let mut cell = SettableProperty::new(false);

        assert_eq!(cell.set(true).issue, Some(true));
        assert!(!cell.received_from_provider(true));

        // The write failed but the provider reported true on its own, so
        // that is the truth to converge on; observed stays true throughout.
        let outcome = cell.write_finished(false);
        assert_eq!(outcome, Outcome { issue: None, changed: false });
        assert!(cell.value());
    }

    #[test]
    fn value_received_while_pending_is_adopted_after_success() {
        let mut cell = SettableProperty::new(String::from("a"));

        assert!(cell.set("b".to_owned()).issue.is_some());
        assert!(!cell.received_from_provider("c".to_owned()));

        let outcome = cell.write_finished(true);
        assert_eq!(outcome.issue, None);
        assert!(outcome.changed);
        assert_eq!(cell.value(), "c");
    }

    #[test]
    fn received_without_pending_is_adopted_directly() {
        let mut cell = SettableProperty::new(false);

        assert!(cell.received_from_provider(true));
        assert!(cell.value());
        assert!(!cell.received_from_provider(true));
    }
}
