use std::fmt;

use crate::error::{IntrospectError, Result};

/// Lifecycle of a session. `Running` is only reachable from `Transformed`;
/// `CleanedUp` is reachable from anywhere and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Transformed,
    Running,
    Completed,
    CleanedUp,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Transformed => "Transformed",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::CleanedUp => "CleanedUp",
        }
    }

    pub fn can_advance_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Transformed)
                | (Self::Transformed, Self::Running)
                | (Self::Running, Self::Completed)
                | (_, Self::CleanedUp)
        )
    }

    /// Check a transition without performing it.
    pub fn check(self, next: SessionState) -> Result<()> {
        if self.can_advance_to(next) {
            Ok(())
        } else {
            Err(IntrospectError::InvalidTransition {
                from: self.name(),
                to: next.name(),
            })
        }
    }

    pub fn advance(&mut self, next: SessionState) -> Result<()> {
        self.check(next)?;
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
