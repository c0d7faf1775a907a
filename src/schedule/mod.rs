//! Shift grid state: the working copy of (employee, date) entries, the buffer
//! of unsaved edits, undo/redo history and save coordination.

pub mod calendar;
pub mod employee;
pub mod entry;
pub mod history;
pub mod pending;
pub mod save;
pub mod session;
pub mod store;

pub use calendar::{DateRange, WeekStart};
pub use employee::Employee;
pub use entry::{CellKey, EditOperation, ShiftEntry, ShiftKind};
pub use save::{SaveOutcome, SavePlan, SaveReport, ShiftNotice};
pub use session::{AutoFillOutcome, ScheduleSession};
pub use store::ShiftStore;
