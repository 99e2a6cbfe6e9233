pub mod commands;
pub mod drop_target;
pub mod job;
pub mod mask;
pub mod selection;
pub mod sync;

pub use commands::JobManager;
pub use drop_target::{DropTarget, accepts_drop, make_drop_job, resolve_accessory};
pub use job::{Job, JobContext, JobError, JobKind, JobState};
pub use mask::HierarchyMask;
pub use selection::{
    GridAxis, GridGroup, ObjectGroup, Selection, SelectionEvent, SelectionGroup, grid_size,
};
pub use sync::{EditorConfig, EditorSession};
