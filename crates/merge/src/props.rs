//! Three-way property merge
//!
//! For every incoming change the local value is compared with the pristine
//! one. Untouched properties take the incoming value, locally changed
//! properties that already match the incoming value are left alone, and
//! anything else is rejected and described in a reject file. The pristine
//! list always moves to the incoming value.

use crate::ChangeState;
use smallvec::SmallVec;
use std::fmt::Write;
use wc_core::{PropChange, PropList};

/// A property change that could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropReject {
    pub name: String,
    /// Pristine value before the change
    pub older: Option<String>,
    /// Value the change tried to set
    pub incoming: Option<String>,
    /// Local value that blocked it
    pub working: Option<String>,
}

/// Outcome of merging a batch of property changes
#[derive(Debug, Clone)]
pub struct PropMerge {
    /// New working properties
    pub working: PropList,
    /// New pristine properties
    pub base: PropList,
    pub rejects: SmallVec<[PropReject; 2]>,
    pub state: ChangeState,
}

impl PropMerge {
    pub fn has_conflicts(&self) -> bool {
        !self.rejects.is_empty()
    }
}

/// Merge `changes` into the working and pristine property lists
pub fn merge_props(base: &PropList, working: &PropList, changes: &[PropChange]) -> PropMerge {
    let mut new_working = working.clone();
    let mut new_base = base.clone();
    let mut rejects = SmallVec::new();
    let mut applied = false;
    let mut convergent = false;

    // A later change to the same name merges against the earlier result
    for change in changes {
        let older = new_base.get(&change.name).cloned();
        let local = new_working.get(&change.name).cloned();
        let (older, local) = (older.as_ref(), local.as_ref());
        let incoming = change.value.as_ref();

        if local == older {
            if local != incoming {
                set(&mut new_working, &change.name, incoming);
                applied = true;
            }
        } else if local == incoming {
            convergent = true;
        } else {
            rejects.push(PropReject {
                name: change.name.clone(),
                older: older.cloned(),
                incoming: incoming.cloned(),
                working: local.cloned(),
            });
        }
        set(&mut new_base, &change.name, incoming);
    }

    let state = if !rejects.is_empty() {
        ChangeState::Conflicted
    } else if convergent {
        ChangeState::Merged
    } else if applied {
        ChangeState::Changed
    } else {
        ChangeState::Unchanged
    };

    PropMerge {
        working: new_working,
        base: new_base,
        rejects,
        state,
    }
}

fn set(props: &mut PropList, name: &str, value: Option<&String>) {
    match value {
        Some(value) => {
            props.insert(name.to_string(), value.clone());
        }
        None => {
            props.remove(name);
        }
    }
}

/// Human-readable reject file content for a batch of rejected changes
pub fn format_rejects(rejects: &[PropReject]) -> String {
    let mut out = String::new();
    for reject in rejects {
        let name = &reject.name;
        // Writes into a String cannot fail
        let _ = match (&reject.older, &reject.incoming, &reject.working) {
            (None, Some(new), Some(local)) => writeln!(
                out,
                "Trying to add new property '{}' with value '{}',\nbut property already exists with value '{}'.",
                name, new, local
            ),
            (Some(old), None, Some(local)) => writeln!(
                out,
                "Trying to delete property '{}' but value has been modified from '{}' to '{}'.",
                name, old, local
            ),
            (Some(old), Some(new), None) => writeln!(
                out,
                "Trying to change property '{}' from '{}' to '{}',\nbut the property has been locally deleted.",
                name, old, new
            ),
            (old, new, local) => writeln!(
                out,
                "Trying to change property '{}' from '{}' to '{}',\nbut it has been locally changed to '{}'.",
                name,
                display(old),
                display(new),
                display(local)
            ),
        };
    }
    out
}

fn display(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<none>")
}
