//! The error taxonomy (section 7).
//!
//! Internal-assertion and unrecognized-opcode conditions never halt the
//! pipeline: passes report them with [`report_internal_error`] /
//! [`report_giving_up`] and return `false` ("no change") instead of
//! propagating an `Err`. Only resource exhaustion surfaces as a real
//! `Result<_, OptError>` all the way to `optimize_function`.

use thiserror::Error;

/// A 1-based source line, threaded through from the frontend so
/// diagnostics can point at user code.
pub type SourceLoc = u32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptError {
    /// An invariant the pass assumed turned out false (e.g. a jump whose
    /// target label was not found in the layout). The pass backs out and
    /// reports no change; compilation continues.
    #[error("internal error in {pass}: {detail}")]
    Internal { pass: &'static str, detail: String },

    /// User-written inline assembly the optimizer cannot safely preserve,
    /// e.g. an apparently-dead CORDIC command not marked `volatile`.
    #[error("line {line:?}: {detail}")]
    UserDiagnostic { line: Option<SourceLoc>, detail: String },

    /// A fixed ceiling was exceeded (e.g. local-register numbering ran
    /// past its 150-slot limit). This is the one variant that halts
    /// compilation.
    #[error("{resource} exhausted (limit {limit})")]
    ResourceExhausted { resource: &'static str, limit: u32 },

    /// A helper encountered an opcode it has no rewrite rule for. The
    /// caller is expected to retry with a coarser strategy, typically by
    /// skipping the rewrite outright.
    #[error("{pass}: no rule for opcode {opcode:?}")]
    UnrecognizedOpcode { pass: &'static str, opcode: crate::ir::Opcode },
}

/// Log an internal-assertion failure and keep going. Called from the
/// handful of places a pass would otherwise `panic!`/`unwrap`.
pub fn report_internal_error(pass: &'static str, detail: impl Into<String>) {
    let err = OptError::Internal { pass, detail: detail.into() };
    log::warn!("{err}");
}

/// Log a "giving up" condition for an unrecognized opcode.
pub fn report_giving_up(pass: &'static str, opcode: crate::ir::Opcode) {
    let err = OptError::UnrecognizedOpcode { pass, opcode };
    log::debug!("{err}");
}

/// Report user-written inline assembly the optimizer could not preserve.
/// Never halts compilation; the caller decides separately whether to
/// remove the offending instruction (it must not, if the user marked it
/// `volatile`).
pub fn report_user_diagnostic(line: Option<SourceLoc>, detail: impl Into<String>) {
    let err = OptError::UserDiagnostic { line, detail: detail.into() };
    log::warn!("{err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_pass_and_detail() {
        let err = OptError::Internal { pass: "dce", detail: "dangling jump target".into() };
        assert_eq!(err.to_string(), "internal error in dce: dangling jump target");
    }

    #[test]
    fn resource_exhausted_display() {
        let err = OptError::ResourceExhausted { resource: "local registers", limit: 150 };
        assert_eq!(err.to_string(), "local registers exhausted (limit 150)");
    }
}
