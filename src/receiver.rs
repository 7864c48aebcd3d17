//! Sinks for streamed results.

use crate::{LogEntry, SvnError};

/// Handler for streamed [`LogEntry`] values.
///
/// Entries arrive in traversal order, one call per entry, on the caller's
/// task. Returning an error stops the traversal and becomes the result of
/// [`crate::RepositorySession::get_log`].
pub trait LogEntryReceiver {
    /// Called for each log entry.
    fn receive(&mut self, entry: LogEntry) -> Result<(), SvnError>;
}

impl<F> LogEntryReceiver for F
where
    F: FnMut(LogEntry) -> Result<(), SvnError>,
{
    fn receive(&mut self, entry: LogEntry) -> Result<(), SvnError> {
        self(entry)
    }
}

impl LogEntryReceiver for Vec<LogEntry> {
    fn receive(&mut self, entry: LogEntry) -> Result<(), SvnError> {
        self.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn deliver(receiver: &mut dyn LogEntryReceiver, revs: &[u64]) -> Result<(), SvnError> {
        for rev in revs {
            receiver.receive(LogEntry::new(*rev))?;
        }
        Ok(())
    }

    #[test]
    fn vec_collects_entries() {
        let mut entries = Vec::new();
        deliver(&mut entries, &[3, 2, 1]).unwrap();
        let revs: Vec<u64> = entries.iter().map(|e| e.rev).collect();
        assert_eq!(revs, vec![3, 2, 1]);
    }

    #[test]
    fn closure_errors_stop_delivery() {
        let mut seen = Vec::new();
        let mut receiver = |entry: LogEntry| {
            if entry.rev == 2 {
                return Err(SvnError::Protocol("stop".into()));
            }
            seen.push(entry.rev);
            Ok(())
        };
        let err = deliver(&mut receiver, &[3, 2, 1]).unwrap_err();
        assert!(matches!(err, SvnError::Protocol(_)));
        assert_eq!(seen, vec![3]);
    }
}
