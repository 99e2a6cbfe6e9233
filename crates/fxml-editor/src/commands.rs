//! Undo/Redo job manager.
//!
//! Every user action is an executed `Job` pushed here. Undo pops the
//! executed side and reverses the job; redo pops the undone side and
//! replays it. A new push clears the redo side.

use crate::job::{Job, JobContext, JobError, JobState};

#[derive(Debug)]
struct Entry {
    job: Job,
    description: String,
}

/// Bounded undo/redo stacks of executed jobs.
#[derive(Debug)]
pub struct JobManager {
    undo_stack: Vec<Entry>,
    redo_stack: Vec<Entry>,
    /// Maximum undo depth; the oldest entries are dropped beyond it.
    max_depth: usize,
    /// Bumped on every push, undo and redo.
    revision: u64,
}

impl JobManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::with_capacity(max_depth.min(256)),
            redo_stack: Vec::new(),
            max_depth,
            revision: 0,
        }
    }

    /// Execute `job` and push it. A job that fails is not pushed and the
    /// stacks are left untouched.
    pub fn execute(&mut self, mut job: Job, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        job.execute(ctx)?;
        let description = job.description(ctx.document);
        self.push(job, description);
        Ok(())
    }

    /// Record a job that has already been executed once.
    pub fn push(&mut self, job: Job, description: String) {
        debug_assert_eq!(job.state(), JobState::Executed);
        self.undo_stack.push(Entry { job, description });
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }

        // Undone jobs cannot be redone past a new one.
        self.redo_stack.clear();
        self.revision += 1;
    }

    /// Undo the last job. Returns its description, or `None` when there is
    /// nothing to undo. A job whose undo fails stays on the undo side.
    pub fn undo(&mut self, ctx: &mut JobContext<'_>) -> Result<Option<String>, JobError> {
        let Some(mut entry) = self.undo_stack.pop() else {
            return Ok(None);
        };
        if let Err(err) = entry.job.undo(ctx) {
            self.undo_stack.push(entry);
            return Err(err);
        }
        let description = entry.description.clone();
        self.redo_stack.push(entry);
        self.revision += 1;
        Ok(Some(description))
    }

    /// Redo the last undone job.
    pub fn redo(&mut self, ctx: &mut JobContext<'_>) -> Result<Option<String>, JobError> {
        let Some(mut entry) = self.redo_stack.pop() else {
            return Ok(None);
        };
        if let Err(err) = entry.job.redo(ctx) {
            self.redo_stack.push(entry);
            return Err(err);
        }
        let description = entry.description.clone();
        self.undo_stack.push(entry);
        self.revision += 1;
        Ok(Some(description))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|e| e.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.description.as_str())
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Forget all history, e.g. after the document is reloaded.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.revision += 1;
    }
}
