//! Dependency Tracker
//!
//! The tracker records which fields a computation reads. This enables
//! automatic dependency tracking: when a view reads a field, the field and
//! its current version are recorded in the innermost tracking frame.
//!
//! # Implementation
//!
//! A `Tracker` is an explicit stack of frames, created for one top-level read
//! or action and passed down through every view. When a derived field starts
//! evaluating, its frame is pushed; when it finishes, the frame is popped and
//! its recorded dependencies are handed back.
//!
//! This design supports nested evaluation (a derived field that reads another
//! derived field). Only the innermost frame records, so dependencies propagate
//! one level: the outer frame sees the inner derived field, not the inner
//! field's own inputs.
//!
//! A field that is already on the stack cannot be entered again. That is how
//! cycles are detected.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::FieldId;

/// Dependencies recorded by one computation: field id and version at read time.
pub type DepSet = SmallVec<[(FieldId, u64); 4]>;

/// An entry in the tracking stack.
#[derive(Debug)]
struct Frame {
    /// The derived field being evaluated.
    field: FieldId,
    /// Dependencies collected during this evaluation, in read order.
    dependencies: DepSet,
}

/// Raised when a field is entered while already on the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDetected {
    /// Fields on the stack, outermost first, followed by the re-entered field.
    pub path: Vec<FieldId>,
}

/// Result of [`Tracker::run_tracked`].
#[derive(Debug)]
pub struct Tracked<R> {
    /// What the computation returned.
    pub result: R,
    /// What the computation read.
    pub deps: DepSet,
}

/// Explicit dependency-tracking scope.
#[derive(Debug, Default)]
pub struct Tracker {
    frames: RefCell<Vec<Frame>>,
}

impl Tracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a frame for `field`.
    ///
    /// The frame is popped when the returned guard is dropped or finished.
    pub fn enter(&self, field: FieldId) -> Result<FrameGuard<'_>, CycleDetected> {
        let mut frames = self.frames.borrow_mut();
        if frames.iter().any(|frame| frame.field == field) {
            let mut path: Vec<FieldId> = frames.iter().map(|frame| frame.field).collect();
            path.push(field);
            return Err(CycleDetected { path });
        }
        frames.push(Frame {
            field,
            dependencies: DepSet::new(),
        });

        Ok(FrameGuard {
            tracker: self,
            field,
            finished: false,
        })
    }

    /// Run `f` inside a frame for `field`, returning its result and the
    /// dependencies it recorded.
    pub fn run_tracked<R, F>(&self, field: FieldId, f: F) -> Result<Tracked<R>, CycleDetected>
    where
        F: FnOnce() -> R,
    {
        let frame = self.enter(field)?;
        let result = f();
        let deps = frame.finish();
        Ok(Tracked { result, deps })
    }

    /// Record a read of `field` at `version` into the innermost frame.
    ///
    /// Does nothing when no frame is active. Repeated reads of the same field
    /// within one frame are recorded once.
    pub fn record(&self, field: FieldId, version: u64) {
        let mut frames = self.frames.borrow_mut();
        if let Some(frame) = frames.last_mut() {
            if !frame.dependencies.iter().any(|(id, _)| *id == field) {
                frame.dependencies.push((field, version));
            }
        }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    fn pop(&self, field: FieldId) -> DepSet {
        let popped = self.frames.borrow_mut().pop();

        match popped {
            Some(frame) => {
                debug_assert_eq!(
                    frame.field, field,
                    "Tracker frame mismatch: expected {:?}, got {:?}",
                    field, frame.field
                );
                frame.dependencies
            }
            None => DepSet::new(),
        }
    }
}

/// Guard that pops its frame when dropped.
///
/// This keeps the stack balanced even when a computation returns early with
/// an error or panics.
pub struct FrameGuard<'a> {
    tracker: &'a Tracker,
    field: FieldId,
    finished: bool,
}

impl FrameGuard<'_> {
    /// Pop the frame and return what it recorded.
    pub fn finish(mut self) -> DepSet {
        self.finished = true;
        self.tracker.pop(self.field)
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.pop(self.field);
        }
    }
}
