use std::fmt;

use serde::Serialize;

/// Kinds of operations a stressor can request or a store call can perform.
///
/// `Put`, `Remove` and `Get` are the logical operations picked by a stressor;
/// the remaining kinds tag the individual store calls the log logic issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    Put,
    Remove,
    PutIfAbsent,
    Replace,
    ConditionalRemove,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Get,
        Operation::Put,
        Operation::Remove,
        Operation::PutIfAbsent,
        Operation::Replace,
        Operation::ConditionalRemove,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Remove => "remove",
            Operation::PutIfAbsent => "put_if_absent",
            Operation::Replace => "replace",
            Operation::ConditionalRemove => "conditional_remove",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
