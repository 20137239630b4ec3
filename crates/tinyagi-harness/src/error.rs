// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Translation of internal failures into user-facing text. The pipeline
//! itself runs on `anyhow::Result` (spec 4.L is an orchestration layer
//! composing several typed-error crates), so translation works by
//! downcasting to the specific error types callers actually raise.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Repository(#[from] tinyagi_repository::RepositoryError),
    #[error(transparent)]
    Invoker(#[from] tinyagi_invoker::InvokerError),
}

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Translate a known agent-invocation failure into text safe to show the
/// end user, instead of leaking a raw subprocess error.
pub fn user_facing_error(err: &anyhow::Error) -> String {
    if let Some(inner) = err.downcast_ref::<tinyagi_invoker::InvokerError>() {
        return match inner {
            tinyagi_invoker::InvokerError::BinaryMissing { .. } => {
                "The assigned agent is unavailable right now. Please try again shortly.".to_string()
            }
            tinyagi_invoker::InvokerError::ModelUnavailable { .. } => {
                "The configured model for this agent is unavailable.".to_string()
            }
            tinyagi_invoker::InvokerError::NoPriorSession => {
                "There's no prior conversation to continue; please restate your request.".to_string()
            }
            tinyagi_invoker::InvokerError::Subprocess(_) | tinyagi_invoker::InvokerError::Io(_) => {
                "The assigned agent encountered an internal error while handling this request.".to_string()
            }
        };
    }
    if err.downcast_ref::<tinyagi_repository::RepositoryError>().is_some() {
        return "Something went wrong while recording this request.".to_string();
    }
    "Something went wrong while processing this request.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_known_invoker_error() {
        let err = anyhow::Error::new(tinyagi_invoker::InvokerError::BinaryMissing { binary: "agent-x".into() });
        assert!(user_facing_error(&err).contains("unavailable"));
    }

    #[test]
    fn falls_back_to_generic_message_for_unknown_error() {
        let err = anyhow::anyhow!("some opaque failure");
        assert_eq!(user_facing_error(&err), "Something went wrong while processing this request.");
    }
}
