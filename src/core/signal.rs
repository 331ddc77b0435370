use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Field tick counter. Tick 0 is "before any input".
pub type Tick = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SignalKind {
    /// Raw input token.
    Sensory,
    /// Sensor passthrough; the only kind that feeds pattern detectors directly.
    Activation,
    /// A learned structure fired.
    Structure,
    /// The model expects a token next.
    Prediction,
    /// Misprediction: `"<structure>:<expected>-><actual>"`.
    Error,
    /// Visible output of an action unit.
    Action,
}

impl SignalKind {
    pub fn label(self) -> &'static str {
        match self {
            SignalKind::Sensory => "SENS",
            SignalKind::Activation => "ACT",
            SignalKind::Structure => "STRUCT",
            SignalKind::Prediction => "PRED",
            SignalKind::Error => "ERR",
            SignalKind::Action => "ACTION",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who produced a signal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Origin {
    /// Token delivered by the caller.
    External,
    /// The field itself (expectation check, prediction pulses).
    Field,
    /// A detector unit, by registry identity.
    Detector(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::External => f.write_str("USER"),
            Origin::Field => f.write_str("FIELD"),
            Origin::Detector(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Signal {
    pub kind: SignalKind,
    pub value: String,
    pub magnitude: f32,
    pub tick: Tick,
    pub origin: Origin,
}

impl Signal {
    pub fn new(kind: SignalKind, value: impl Into<String>, magnitude: f32, tick: Tick, origin: Origin) -> Self {
        Self {
            kind,
            value: value.into(),
            magnitude: magnitude.max(0.0),
            tick,
            origin,
        }
    }

    pub fn sensory(token: &str, tick: Tick) -> Self {
        Self::new(SignalKind::Sensory, token, 1.0, tick, Origin::External)
    }

    /// Same signal with a new magnitude (clamped non-negative).
    pub fn with_magnitude(mut self, magnitude: f32) -> Self {
        self.magnitude = magnitude.max(0.0);
        self
    }

    pub fn is(&self, kind: SignalKind, value: &str) -> bool {
        self.kind == kind && self.value == value
    }

    /// Identity of the detector that emitted this signal, if any.
    pub fn detector(&self) -> Option<&str> {
        match &self.origin {
            Origin::Detector(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) m={:.3} t={} from={}",
            self.kind, self.value, self.magnitude, self.tick, self.origin
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_is_never_negative() {
        let s = Signal::new(SignalKind::Structure, "[1-2]", -0.5, 3, Origin::Field);
        assert_eq!(s.magnitude, 0.0);
        assert_eq!(s.with_magnitude(-1.0).magnitude, 0.0);
    }

    #[test]
    fn detector_origin_is_exposed() {
        let s = Signal::new(
            SignalKind::Activation,
            "1",
            1.0,
            1,
            Origin::Detector("SENSOR:1".to_string()),
        );
        assert_eq!(s.detector(), Some("SENSOR:1"));
        assert_eq!(Signal::sensory("1", 1).detector(), None);
        assert_eq!(s.to_string(), "ACT(1) m=1.000 t=1 from=SENSOR:1");
    }
}
