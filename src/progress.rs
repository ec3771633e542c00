use crate::error::{ModError, ModResult};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Receives (status, percent) updates from the thread doing the I/O.
pub trait ProgressSink {
    fn report(&mut self, status: &str, percent: f32);
}

impl<F> ProgressSink for F
where
    F: FnMut(&str, f32),
{
    fn report(&mut self, status: &str, percent: f32) {
        self(status, percent)
    }
}

#[cfg(test)]
pub(crate) struct NoProgress;

#[cfg(test)]
impl ProgressSink for NoProgress {
    fn report(&mut self, _status: &str, _percent: f32) {}
}

pub fn percent_of(done: usize, total: usize) -> f32 {
    if total == 0 {
        return 100.0;
    }
    let done = done.min(total);
    (done as f32 / total as f32) * 100.0
}

/// Per-file progress for copy loops.
pub(crate) struct CopyProgress<'a> {
    sink: &'a mut dyn ProgressSink,
    label: &'static str,
    copied: usize,
    total: usize,
}

impl<'a> CopyProgress<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink, label: &'static str, total: usize) -> Self {
        Self {
            sink,
            label,
            copied: 0,
            total,
        }
    }

    pub(crate) fn bump(&mut self) {
        self.copied = self.copied.saturating_add(1);
        self.sink
            .report(self.label, percent_of(self.copied, self.total));
    }

    /// An empty tree still reports completion once.
    pub(crate) fn finish(&mut self) {
        if self.total == 0 {
            self.sink.report(self.label, 100.0);
        }
    }

    pub(crate) fn copied(&self) -> usize {
        self.copied
    }
}

/// Exclusive-operation lock shared by every mutating action.
#[derive(Debug, Clone, Default)]
pub struct OperationLock {
    busy: Arc<AtomicBool>,
}

impl OperationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> ModResult<BusyGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ModError::Busy);
        }
        Ok(BusyGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
pub(crate) struct RecordingProgress {
    pub reports: Vec<(String, f32)>,
}

#[cfg(test)]
impl RecordingProgress {
    pub(crate) fn new() -> Self {
        Self {
            reports: Vec::new(),
        }
    }

    pub(crate) fn last(&self) -> Option<&(String, f32)> {
        self.reports.last()
    }
}

#[cfg(test)]
impl ProgressSink for RecordingProgress {
    fn report(&mut self, status: &str, percent: f32) {
        self.reports.push((status.to_string(), percent));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_empty_totals() {
        assert_eq!(percent_of(0, 0), 100.0);
        assert_eq!(percent_of(1, 4), 25.0);
        assert_eq!(percent_of(9, 4), 100.0);
    }

    #[test]
    fn copy_progress_reports_each_file() {
        let mut sink = RecordingProgress::new();
        {
            let mut progress = CopyProgress::new(&mut sink, "Copying", 2);
            progress.bump();
            progress.bump();
            progress.finish();
            assert_eq!(progress.copied(), 2);
        }
        assert_eq!(
            sink.reports,
            vec![("Copying".to_string(), 50.0), ("Copying".to_string(), 100.0)]
        );
    }

    #[test]
    fn copy_progress_finishes_empty_tree_once() {
        let mut sink = RecordingProgress::new();
        CopyProgress::new(&mut sink, "Copying", 0).finish();
        assert_eq!(sink.reports, vec![("Copying".to_string(), 100.0)]);
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |status: &str, percent: f32| seen.push((status.to_string(), percent));
            sink.report("hi", 10.0);
        }
        assert_eq!(seen, vec![("hi".to_string(), 10.0)]);
    }

    #[test]
    fn busy_guard_releases_on_drop() {
        let lock = OperationLock::new();
        {
            let _guard = lock.try_acquire().unwrap();
            assert!(lock.is_busy());
            assert!(matches!(lock.try_acquire(), Err(ModError::Busy)));
        }
        assert!(!lock.is_busy());
        assert!(lock.try_acquire().is_ok());
    }

    #[test]
    fn busy_guard_releases_on_error_path() {
        let lock = OperationLock::new();
        let run = |lock: &OperationLock| -> ModResult<()> {
            let _guard = lock.try_acquire()?;
            Err(ModError::validation("boom"))
        };
        assert!(run(&lock).is_err());
        assert!(!lock.is_busy());
    }
}
