//! Ports: named, typed configuration values of a recall.

use arrayvec::ArrayString;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum length of a port name.
pub const PORT_NAME_LEN: usize = 32;

/// Value held by a port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PortValue {
    Float(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl PortValue {
    pub fn as_f64(self) -> f64 {
        match self {
            PortValue::Float(v) => v,
            PortValue::Int(v) => v as f64,
            PortValue::UInt(v) => v as f64,
            PortValue::Bool(v) => v as u8 as f64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            PortValue::Float(v) => v.max(0.0) as u64,
            PortValue::Int(v) => v.max(0) as u64,
            PortValue::UInt(v) => v,
            PortValue::Bool(v) => v as u64,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            PortValue::Bool(v) => v,
            other => other.as_f64() != 0.0,
        }
    }

    /// Convert `value` to this value's variant.
    fn coerce(self, value: PortValue) -> PortValue {
        match self {
            PortValue::Float(_) => PortValue::Float(value.as_f64()),
            PortValue::Int(_) => PortValue::Int(value.as_f64() as i64),
            PortValue::UInt(_) => PortValue::UInt(value.as_u64()),
            PortValue::Bool(_) => PortValue::Bool(value.as_bool()),
        }
    }
}

/// A named configuration value with an optional range.
#[derive(Clone, Debug, PartialEq)]
pub struct Port {
    /// Specifier, e.g. `volume` or `bpm`
    pub name: ArrayString<PORT_NAME_LEN>,
    value: PortValue,
    /// Default value
    pub default: PortValue,
    /// Inclusive lower bound for numeric values
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric values
    pub max: Option<f64>,
}

impl Port {
    /// Create a port holding `default`. Names longer than
    /// [`PORT_NAME_LEN`] are truncated.
    pub fn new(name: &str, default: PortValue) -> Self {
        let mut port_name = ArrayString::new();
        for c in name.chars() {
            if port_name.try_push(c).is_err() {
                break;
            }
        }
        Self {
            name: port_name,
            value: default,
            default,
            min: None,
            max: None,
        }
    }

    /// Builder: restrict numeric values to `min..=max`.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.value = self.clamp(self.value);
        self
    }

    pub fn value(&self) -> PortValue {
        self.value
    }

    /// Set the value, coercing to the port's type and clamping to its range.
    pub fn set(&mut self, value: PortValue) {
        self.value = self.clamp(self.default.coerce(value));
    }

    pub fn reset(&mut self) {
        self.value = self.default;
    }

    fn clamp(&self, value: PortValue) -> PortValue {
        let v = value.as_f64();
        let lo = self.min.unwrap_or(f64::MIN);
        let hi = self.max.unwrap_or(f64::MAX);
        if v >= lo && v <= hi {
            return value;
        }
        value.coerce(PortValue::Float(v.clamp(lo, hi)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_coerces_and_clamps() {
        let mut port = Port::new("volume", PortValue::Float(1.0)).with_range(0.0, 2.0);
        port.set(PortValue::Int(5));
        assert_eq!(port.value(), PortValue::Float(2.0));
        port.set(PortValue::Float(0.5));
        assert_eq!(port.value(), PortValue::Float(0.5));
        port.reset();
        assert_eq!(port.value(), PortValue::Float(1.0));
    }

    #[test]
    fn bool_ports_accept_numbers() {
        let mut port = Port::new("loop", PortValue::Bool(false));
        port.set(PortValue::UInt(1));
        assert_eq!(port.value(), PortValue::Bool(true));
        assert!(port.value().as_bool());
    }

    #[test]
    fn long_names_are_truncated() {
        let port = Port::new("a-very-long-port-specifier-that-keeps-going", PortValue::UInt(0));
        assert_eq!(port.name.len(), PORT_NAME_LEN);
    }
}
