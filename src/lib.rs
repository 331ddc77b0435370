//! `crystalfield`: a tick-based signal field that grows detectors for
//! recurring token patterns.
//!
//! Tokens enter one per tick. Sensors turn them into activations, learned
//! detectors turn activations into structures, structures compete, and the
//! winner arms a prediction for the next tick. Mispredictions come back as
//! error signals that suppress the culprit and open a short window of
//! boosted plasticity. Structures that fall silent are eventually forgotten.
//!
//! ```
//! use crystalfield::prelude::*;
//!
//! let mut field = Field::new();
//! let report = field.run_episode(&["1", "2", "1", "2", "1", "2"]).unwrap();
//! assert!(field.registry().contains("COACT:[1-2]"));
//! assert!(report.events().any(|e| e.is_growth()));
//! ```

#[path = "core/signal.rs"]
pub mod signal;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/memory.rs"]
pub mod memory;

#[path = "core/detector.rs"]
pub mod detector;

#[path = "core/registry.rs"]
pub mod registry;

#[path = "core/transitions.rs"]
pub mod transitions;

#[path = "core/plasticity.rs"]
pub mod plasticity;

#[path = "core/energy.rs"]
pub mod energy;

#[path = "core/pruning.rs"]
pub mod pruning;

#[path = "core/report.rs"]
pub mod report;

#[path = "core/field.rs"]
pub mod field;

pub mod observer;

pub mod prelude {
    pub use crate::config::{DetectorParams, FieldConfig};
    pub use crate::detector::{Detector, DetectorKind};
    pub use crate::error::FieldError;
    pub use crate::field::{Field, FieldDiagnostics, Modes};
    pub use crate::observer::{Board, BoardFilter, FieldAdapter, FieldSnapshot};
    pub use crate::report::{EpisodeReport, FieldEvent, TickReport};
    pub use crate::signal::{Origin, Signal, SignalKind, Tick};
}
