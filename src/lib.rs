//! `splitio_core` is the evaluation and storage core of a Split feature-flag SDK.
//!
//! # Overview
//!
//! Feature flags are called *splits*. A [`Split`](models::Split) holds ordered targeting
//! [conditions](models::Condition) and a default treatment. Evaluating a split for a [`Key`]
//! yields a *treatment*, a plain string such as `"on"`, or the [`CONTROL`](models::CONTROL)
//! treatment when no decision could be made.
//!
//! [`storage`] defines the versioned definition store and the telemetry aggregator as traits with
//! two implementations: in process memory, and in a key-value backend (Redis) shared by many
//! processes. Shared storage confines itself to keys under a configurable prefix.
//!
//! [`Evaluator`] resolves a split against storage: matchers, traffic allocation and
//! [bucketing](bucketing) of keys into partitions. [`SplitClient`] wraps the evaluator with key
//! validation, panic recovery and impression/latency recording. Evaluation never fails: any problem
//! results in CONTROL.
//!
//! [`sync`] keeps storage up to date in the background and flushes telemetry. Talking to the
//! control plane is delegated to user-provided [fetchers](sync::SplitFetcher) and
//! [recorders](sync::ImpressionRecorder).
//!
//! [`SplitFactory`] wires everything together according to [`SdkConfig`](config::SdkConfig).
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Storage reports backend failures, and the layers
//! above degrade: evaluation serves CONTROL, telemetry is dropped and sync retries at the next
//! tick.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with structured key-values
//! and the `splitio` target. Install a `log`-compatible logger for visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod bucketing;
pub mod config;
pub mod evaluator;
pub mod latency;
pub mod models;
pub mod storage;
pub mod sync;

mod attributes;
mod client;
mod error;
mod factory;
mod impression_listener;
mod key;
mod matchers;
mod sdk_metadata;

pub use attributes::{AttributeValue, Attributes};
pub use client::{SplitClient, TREATMENT_LATENCY_METRIC};
pub use error::{Error, Result};
pub use evaluator::{EvaluationResult, Evaluator};
pub use factory::{Collaborators, SplitFactory};
pub use impression_listener::ImpressionListener;
pub use key::{Key, MAX_KEY_LENGTH};
pub use sdk_metadata::SdkMetadata;
pub use storage::Impression;
