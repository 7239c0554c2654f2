//! Finding where two event sequences stop agreeing.

use chainsync_protocol::ChainEvent;

/// Returns the first index at which `existing` and `incoming` hold
/// different events, or the length of the shorter sequence if they agree
/// on every overlapping position.
pub fn find_divergence_point<E: ChainEvent>(existing: &[E], incoming: &[E]) -> usize {
    existing
        .iter()
        .zip(incoming)
        .position(|(ours, theirs)| !ours.is_same_event(theirs))
        .unwrap_or_else(|| existing.len().min(incoming.len()))
}

/// How pending events line up against an upstream batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// Number of batch events found in pending.
    pub matched: usize,
    /// Length of the pending prefix covered by the matched events
    /// (including skipped local events interleaved with them).
    pub confirmed: usize,
    /// True if a pending event disagrees with the batch.
    pub diverged: bool,
}

/// Lines `pending` up against `incoming` position by position.
///
/// With `skip_local`, local pending events are stepped over when looking
/// for the next counterpart in `incoming`; they still count towards
/// `confirmed` when they sit between matched events.
pub fn align_pending<E: ChainEvent>(pending: &[E], incoming: &[E], skip_local: bool) -> Alignment {
    if !skip_local {
        let point = find_divergence_point(pending, incoming);
        return Alignment {
            matched: point,
            confirmed: point,
            diverged: point < pending.len().min(incoming.len()),
        };
    }

    let mut matched = 0;
    let mut confirmed = 0;
    for (index, event) in pending.iter().enumerate() {
        if event.is_local() {
            continue;
        }
        let Some(counterpart) = incoming.get(matched) else {
            break;
        };
        if !event.is_same_event(counterpart) {
            return Alignment {
                matched,
                confirmed,
                diverged: true,
            };
        }
        matched += 1;
        confirmed = index + 1;
    }

    Alignment {
        matched,
        confirmed,
        diverged: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsync_testkit::{local, upstream};

    #[test]
    fn identical_sequences_do_not_diverge() {
        let a = vec![upstream(0, 0, "a"), upstream(1, 0, "b")];
        assert_eq!(find_divergence_point(&a, &a.clone()), 2);
    }

    #[test]
    fn shorter_incoming_stops_at_its_length() {
        let existing = vec![upstream(0, 0, "a"), upstream(1, 0, "b")];
        let incoming = vec![upstream(0, 0, "a")];
        assert_eq!(find_divergence_point(&existing, &incoming), 1);
        assert_eq!(find_divergence_point(&incoming, &existing), 1);
    }

    #[test]
    fn payload_difference_is_divergence() {
        let existing = vec![upstream(0, 0, "a"), upstream(1, 0, "b")];
        let incoming = vec![upstream(0, 0, "a"), upstream(1, 0, "c")];
        assert_eq!(find_divergence_point(&existing, &incoming), 1);
    }

    #[test]
    fn empty_sequences() {
        let events = vec![upstream(0, 0, "a")];
        assert_eq!(find_divergence_point(&[], &events), 0);
        assert_eq!(find_divergence_point(&events, &[]), 0);
    }

    #[test]
    fn align_without_skipping_matches_divergence_point() {
        let pending = vec![local(0, 1, "x"), upstream(1, 0, "b")];
        let incoming = vec![upstream(1, 0, "b")];
        assert_eq!(
            align_pending(&pending, &incoming, false),
            Alignment {
                matched: 0,
                confirmed: 0,
                diverged: true,
            }
        );
    }

    // Interleaving policy for local events; revisit once real upstream
    // echo patterns are recorded.
    #[test]
    fn align_skips_interleaved_local_events() {
        let pending = vec![
            upstream(0, 0, "a"),
            local(0, 1, "x"),
            upstream(1, 0, "b"),
            local(1, 1, "y"),
        ];
        let incoming = vec![upstream(0, 0, "a"), upstream(1, 0, "b")];
        assert_eq!(
            align_pending(&pending, &incoming, true),
            Alignment {
                matched: 2,
                confirmed: 3,
                diverged: false,
            }
        );
    }

    #[test]
    fn align_reports_divergence_after_skipped_local() {
        let pending = vec![upstream(0, 0, "a"), local(0, 1, "x"), upstream(1, 0, "b")];
        let incoming = vec![upstream(0, 0, "a"), upstream(1, 0, "z")];
        assert_eq!(
            align_pending(&pending, &incoming, true),
            Alignment {
                matched: 1,
                confirmed: 1,
                diverged: true,
            }
        );
    }
}
