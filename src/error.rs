// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error taxonomy shared by every layer of the IFE configuration stack.

/// Errors raised while configuring or driving the IFE.
///
/// Waiting on upstream data (3A stats) is not an error and is reported through
/// [`crate::node::ProcessOutcome::Deferred`] instead.
#[derive(Debug, thiserror::Error)]
pub enum IfeError {
    // ─── Per-call validation ────────────────────────────────────────────────
    /// Bad or missing input to a module or node call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A computed value or buffer write exceeded a hardware limit.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    // ─── Platform ───────────────────────────────────────────────────────────
    /// The chip or requested feature has no capability entry.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Allocation failed in a setup path.
    #[error("out of memory: {0}")]
    NoMemory(String),

    // ─── Lifecycle ──────────────────────────────────────────────────────────
    /// A node operation was called from the wrong lifecycle state.
    #[error("invalid state: {operation} not allowed in {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Two-pass buffer negotiation produced an unsatisfiable requirement.
    #[error("buffer negotiation failed: {0}")]
    Negotiation(String),

    // ─── External collaborators ─────────────────────────────────────────────
    /// The kernel device rejected an acquire, submit or release.
    #[error("device error: {0}")]
    Device(String),

    /// Settings or sensor-mode JSON could not be parsed.
    #[error("settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IfeError {
    /// Stable integer result code handed to the framework on a failed frame.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 1,
            Self::OutOfBounds(_) => 2,
            Self::Unsupported(_) => 3,
            Self::NoMemory(_) => 4,
            Self::InvalidState { .. } => 5,
            Self::Negotiation(_) => 6,
            Self::Device(_) => 7,
            Self::Settings(_) => 8,
            Self::Io(_) => 9,
        }
    }

    /// True when a failure inside an IQ or stats module only disables that
    /// module for the current frame instead of failing the request.
    pub fn is_module_soft_failure(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

pub type Result<T, E = IfeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_failures() {
        assert!(IfeError::InvalidArgument("roi".into()).is_module_soft_failure());
        assert!(!IfeError::OutOfBounds("cmd".into()).is_module_soft_failure());
        assert!(!IfeError::Device("busy".into()).is_module_soft_failure());
    }

    #[test]
    fn codes_are_distinct() {
        let errs = [
            IfeError::InvalidArgument(String::new()),
            IfeError::OutOfBounds(String::new()),
            IfeError::Unsupported(String::new()),
            IfeError::NoMemory(String::new()),
            IfeError::Negotiation(String::new()),
            IfeError::Device(String::new()),
        ];
        let mut codes: Vec<i32> = errs.iter().map(IfeError::code).collect();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
    }
}
