// SPDX-License-Identifier: Apache-2.0

//! Pieces shared by the `rotail` binary: arguments, the output sink and task
//! supervision.

pub mod args;
pub mod sink;
pub mod wait;

pub use tower::BoxError;
