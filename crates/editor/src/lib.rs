//! Update, checkout and switch editor for working copies
//!
//! This crate provides:
//! - The tree-edit driver contract (`Editor`)
//! - Baton arena with reference-counted directory finalization
//! - Text delta windows and the staging sink
//! - The update editor (update, checkout, switch)
//! - Removal from revision control and conflict resolution
//! - JSON edit scripts for driving an editor from a file

pub mod baton;
pub mod delta;
pub mod driver;
pub mod modified;
pub mod notify;
pub mod remove;
pub mod resolve;
pub mod script;
pub mod update;

// Re-exports
pub use baton::{CopySource, DirId, FileId};
pub use delta::{
    delta_window, send_windows, text_windows, ApplyDelta, DeltaOp, DeltaWindow, StagedText,
    WindowHandler, DEFAULT_WINDOW_SIZE,
};
pub use driver::Editor;
pub use modified::{props_modified, text_modified};
pub use notify::{CancelCheck, Notification, NotifyAction, NotifySink};
pub use remove::remove_from_revision_control;
pub use resolve::{resolved, ResolveWhat};
pub use script::{drive, parse_script, EditOp};
pub use update::{checkout_editor, switch_editor, update_editor, EditorOptions, UpdateEditor};
