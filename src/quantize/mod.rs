//! Quantisers and reformers (C4): linear-fit scalar quantisation and the
//! two-stage RaBitQ reformer (spec §4.4).

pub mod rabitq;
pub mod scalar;

pub use rabitq::{RabitqCode, RabitqMetric, RabitqReformer};
pub use scalar::{QuantKind, ScalarQuantizer};
