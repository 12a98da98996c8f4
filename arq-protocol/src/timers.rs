//! Per-sequence retransmission timer table
//!
//! Maps each sequence number to the handle of its outstanding timer. Go-Back-N
//! uses the table as one retransmission epoch that is cleared as a whole;
//! Selective-Repeat treats every entry independently.

use crate::endpoint::{TimerHandle, TimerService};
use crate::sequence::SeqNumber;
use std::collections::BTreeMap;
use std::time::Duration;

/// Outstanding timers keyed by sequence number
#[derive(Debug, Default, Clone)]
pub struct TimerTable {
    timers: BTreeMap<SeqNumber, TimerHandle>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Whether a timer is outstanding for `seq`
    pub fn contains(&self, seq: SeqNumber) -> bool {
        self.timers.contains_key(&seq)
    }

    /// Handle of the timer outstanding for `seq`
    pub fn handle(&self, seq: SeqNumber) -> Option<TimerHandle> {
        self.timers.get(&seq).copied()
    }

    /// Sequence numbers with an outstanding timer, ascending
    pub fn sequences(&self) -> impl Iterator<Item = SeqNumber> + '_ {
        self.timers.keys().copied()
    }

    /// Arm a timer for `seq`, replacing (and cancelling) any existing one
    pub fn arm<T>(&mut self, svc: &mut T, seq: SeqNumber, delay: Duration)
    where
        T: TimerService + ?Sized,
    {
        let handle = svc.schedule(delay, seq);
        if let Some(old) = self.timers.insert(seq, handle) {
            svc.cancel(old);
        }
    }

    /// Arm a timer for `seq` only if none is outstanding
    ///
    /// Returns true if a new timer was armed.
    pub fn arm_if_absent<T>(&mut self, svc: &mut T, seq: SeqNumber, delay: Duration) -> bool
    where
        T: TimerService + ?Sized,
    {
        if self.contains(seq) {
            return false;
        }
        self.arm(svc, seq, delay);
        true
    }

    /// Forget the entry for `seq` without cancelling it (its timer has fired)
    pub fn forget(&mut self, seq: SeqNumber) -> Option<TimerHandle> {
        self.timers.remove(&seq)
    }

    /// Cancel and remove the timer for `seq`
    pub fn cancel<T>(&mut self, svc: &mut T, seq: SeqNumber) -> bool
    where
        T: TimerService + ?Sized,
    {
        match self.timers.remove(&seq) {
            Some(handle) => {
                svc.cancel(handle);
                true
            }
            None => false,
        }
    }

    /// Cancel and remove every timer for sequences `<= seq`
    ///
    /// Returns the number of timers cancelled.
    pub fn cancel_up_to<T>(&mut self, svc: &mut T, seq: SeqNumber) -> usize
    where
        T: TimerService + ?Sized,
    {
        let keep = self.timers.split_off(&seq.next());
        let acked = std::mem::replace(&mut self.timers, keep);
        let count = acked.len();
        for handle in acked.into_values() {
            svc.cancel(handle);
        }
        count
    }

    /// Cancel and remove every outstanding timer
    pub fn cancel_all<T>(&mut self, svc: &mut T) -> usize
    where
        T: TimerService + ?Sized,
    {
        let count = self.timers.len();
        for (_, handle) in std::mem::take(&mut self.timers) {
            svc.cancel(handle);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockContext;

    const RTO: Duration = Duration::from_secs(2);

    fn seq(n: u32) -> SeqNumber {
        SeqNumber::new(n)
    }

    #[test]
    fn test_arm_if_absent_keeps_existing_timer() {
        let mut ctx = MockContext::new();
        let mut table = TimerTable::new();

        assert!(table.arm_if_absent(&mut ctx, seq(1), RTO));
        let first = table.handle(seq(1)).unwrap();
        assert!(!table.arm_if_absent(&mut ctx, seq(1), RTO));

        assert_eq!(table.handle(seq(1)), Some(first));
        assert_eq!(ctx.live_timer_seqs(), vec![1]);
    }

    #[test]
    fn test_rearm_cancels_previous() {
        let mut ctx = MockContext::new();
        let mut table = TimerTable::new();

        table.arm(&mut ctx, seq(3), RTO);
        let first = table.handle(seq(3)).unwrap();
        table.arm(&mut ctx, seq(3), RTO);

        assert_ne!(table.handle(seq(3)), Some(first));
        assert!(!ctx.is_live(first));
        assert_eq!(ctx.live_timer_seqs(), vec![3]);
    }

    #[test]
    fn test_cancel_up_to() {
        let mut ctx = MockContext::new();
        let mut table = TimerTable::new();
        for n in 0..5 {
            table.arm(&mut ctx, seq(n), RTO);
        }

        assert_eq!(table.cancel_up_to(&mut ctx, seq(2)), 3);
        assert_eq!(table.sequences().map(u32::from).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(ctx.live_timer_seqs(), vec![3, 4]);
    }

    #[test]
    fn test_cancel_all_and_cancel_twice() {
        let mut ctx = MockContext::new();
        let mut table = TimerTable::new();
        table.arm(&mut ctx, seq(0), RTO);
        table.arm(&mut ctx, seq(1), RTO);

        assert!(table.cancel(&mut ctx, seq(0)));
        assert!(!table.cancel(&mut ctx, seq(0)));
        assert_eq!(table.cancel_all(&mut ctx), 1);
        assert_eq!(table.cancel_all(&mut ctx), 0);
        assert!(table.is_empty());
        assert!(ctx.live_timer_seqs().is_empty());
    }
}
