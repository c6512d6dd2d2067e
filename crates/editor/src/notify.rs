//! Notification and cancellation callbacks

use merge::ChangeState;
use serde::Serialize;
use std::path::PathBuf;
use wc_core::{NodeKind, Result, Revnum, WcError};

/// What happened to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyAction {
    Added,
    Updated,
    Merged,
    Conflicted,
    Deleted,
}

/// One finalized node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub path: PathBuf,
    pub action: NotifyAction,
    pub kind: NodeKind,
    pub content_state: ChangeState,
    pub prop_state: ChangeState,
    pub revision: Option<Revnum>,
}

impl Notification {
    pub(crate) fn action_for(added: bool, content: ChangeState, props: ChangeState) -> NotifyAction {
        if added {
            NotifyAction::Added
        } else if content == ChangeState::Conflicted || props == ChangeState::Conflicted {
            NotifyAction::Conflicted
        } else if content == ChangeState::Merged || props == ChangeState::Merged {
            NotifyAction::Merged
        } else {
            NotifyAction::Updated
        }
    }
}

/// Output channel for notifications
pub trait NotifySink {
    fn notify(&mut self, notification: &Notification);
}

impl<F> NotifySink for F
where
    F: FnMut(&Notification),
{
    fn notify(&mut self, notification: &Notification) {
        self(notification)
    }
}

/// Poll-style cancellation source
pub trait CancelCheck {
    /// Return `true` to abort the edit
    fn is_cancelled(&mut self) -> bool;
}

impl<F> CancelCheck for F
where
    F: FnMut() -> bool,
{
    fn is_cancelled(&mut self) -> bool {
        self()
    }
}

/// Turn a positive cancellation poll into `Cancelled`
pub(crate) fn poll(cancel: &mut Option<Box<dyn CancelCheck>>) -> Result<()> {
    if let Some(check) = cancel.as_mut() {
        if check.is_cancelled() {
            return Err(WcError::Cancelled);
        }
    }
    Ok(())
}
