//! Error taxonomy for the decoder, tick buffer and power model (spec.md §7).
//!
//! [`ModelNotInitialized`] is its own type rather than a variant of
//! [`DecodeError`] or [`ReleaseError`]: it is an expected warm-up condition,
//! not a failure, and callers must be able to match on it without
//! downcasting.

use thiserror::Error;

use crate::report::Timestamp;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("target `{target}` is missing the `{group}` group")]
    MissingGroup { group: &'static str, target: String },

    #[error("target `{target}` has no `{group}` data for socket `{socket}`")]
    MissingSocket {
        group: &'static str,
        socket: String,
        target: String,
    },

    #[error("socket `{socket}` has no CPUs reporting in the `{group}` group")]
    EmptySocket { group: &'static str, socket: String },

    #[error("reference event `{event}` is missing from the `rapl` group on socket `{socket}`")]
    MissingEvent { event: String, socket: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum ReleaseError {
    #[error("released tick at {timestamp} has no `all` report")]
    IncompleteTick { timestamp: Timestamp },
}

/// Returned by [`crate::model::PowerModel::predict`] before the model has
/// accumulated `min_samples` and been fitted at least once. Not a failure:
/// expected during warm-up (spec.md §7).
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("power model has not been fitted yet")]
pub struct ModelNotInitialized;
