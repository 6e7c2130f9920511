//! Observable snapshot of a store and its state transitions
//!
//! Transitions are pure: each takes the current snapshot by value and
//! returns the next one. Only [`super::Binding`] applies them.

/// Coarse state of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A full load is in flight
    Loading,
    /// Records reflect the last successful load or mutation
    Ready,
    /// The most recent operation failed; records are the last known ones
    Failed,
}

/// In-memory mirror of a store's contents plus loading and error state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    records: Vec<T>,
    /// No full load has settled yet
    awaiting_first_load: bool,
    pending_loads: usize,
    error: Option<String>,
}

impl<T> Snapshot<T> {
    /// Initial snapshot: no records, loading until the first full load
    /// settles.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            awaiting_first_load: true,
            pending_loads: 0,
            error: None,
        }
    }

    /// Records currently known to be in the store, in key order.
    pub fn data(&self) -> &[T] {
        &self.records
    }

    pub fn into_data(self) -> Vec<T> {
        self.records
    }

    /// True before the first full load settles and while any full load is
    /// in flight.
    pub fn is_loading(&self) -> bool {
        self.awaiting_first_load || self.pending_loads > 0
    }

    /// Description of the most recent failure, if the most recent
    /// operation failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> Status {
        if self.is_loading() {
            Status::Loading
        } else if self.error.is_some() {
            Status::Failed
        } else {
            Status::Ready
        }
    }

    pub(crate) fn begin_load(self) -> Self {
        Self {
            pending_loads: self.pending_loads + 1,
            error: None,
            ..self
        }
    }

    pub(crate) fn loaded(self, records: Vec<T>) -> Self {
        Self {
            records,
            awaiting_first_load: false,
            pending_loads: self.pending_loads.saturating_sub(1),
            ..self
        }
    }

    pub(crate) fn load_failed(self, error: String) -> Self {
        Self {
            awaiting_first_load: false,
            pending_loads: self.pending_loads.saturating_sub(1),
            error: Some(error),
            ..self
        }
    }

    pub(crate) fn begin_op(self) -> Self {
        Self { error: None, ..self }
    }

    pub(crate) fn op_failed(self, error: String) -> Self {
        Self {
            error: Some(error),
            ..self
        }
    }

    /// Drop every record for which `matches` returns true.
    pub(crate) fn removed(mut self, mut matches: impl FnMut(&T) -> bool) -> Self {
        self.records.retain(|r| !matches(r));
        self
    }

    pub(crate) fn cleared(self) -> Self {
        Self {
            records: Vec::new(),
            ..self
        }
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initial_is_loading() {
        let snapshot: Snapshot<u32> = Snapshot::new();
        assert!(snapshot.is_loading());
        assert_eq!(snapshot.status(), Status::Loading);
        assert!(snapshot.data().is_empty());
        assert_eq!(snapshot.error(), None);
    }

    #[test]
    fn test_load_cycle() {
        let snapshot = Snapshot::new().loaded(vec![1, 2]);
        assert_eq!(snapshot.status(), Status::Ready);
        assert_eq!(snapshot.data(), &[1, 2]);

        let snapshot = snapshot.begin_load();
        assert!(snapshot.is_loading());
        // Records stay visible during a reload
        assert_eq!(snapshot.data(), &[1, 2]);

        let snapshot = snapshot.load_failed("boom".into());
        assert_eq!(snapshot.status(), Status::Failed);
        assert_eq!(snapshot.data(), &[1, 2]);
        assert_eq!(snapshot.error(), Some("boom"));
    }

    #[test]
    fn test_first_reload_settles_loading() {
        let snapshot: Snapshot<u32> = Snapshot::new().begin_load();
        assert!(snapshot.is_loading());
        let snapshot = snapshot.loaded(vec![1]);
        assert!(!snapshot.is_loading());
        assert_eq!(snapshot.status(), Status::Ready);

        let failed: Snapshot<u32> = Snapshot::new()
            .op_failed("early".into())
            .begin_load()
            .load_failed("io".into());
        assert!(!failed.is_loading());
        assert_eq!(failed.error(), Some("io"));
    }

    #[test]
    fn test_overlapping_loads() {
        let snapshot = Snapshot::new().loaded(vec![1]).begin_load().begin_load();
        let snapshot = snapshot.loaded(vec![1, 2]);
        assert!(snapshot.is_loading());
        let snapshot = snapshot.loaded(vec![1, 2, 3]);
        assert!(!snapshot.is_loading());
        assert_eq!(snapshot.data(), &[1, 2, 3]);
    }

    #[test]
    fn test_op_error_cleared_by_next_op() {
        let snapshot = Snapshot::new().loaded(vec![1]).op_failed("nope".into());
        assert_eq!(snapshot.status(), Status::Failed);
        let snapshot = snapshot.begin_op();
        assert_eq!(snapshot.status(), Status::Ready);
        assert_eq!(snapshot.data(), &[1]);
    }

    #[test]
    fn test_removed_and_cleared() {
        let snapshot = Snapshot::new().loaded(vec![1, 2, 3, 2]);
        let snapshot = snapshot.removed(|r| *r == 2);
        assert_eq!(snapshot.data(), &[1, 3]);
        assert!(snapshot.cleared().data().is_empty());
    }
}
