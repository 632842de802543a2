//! Typed device options.
//!
//! An [`OptionDescriptor`] is built from one raw adapter description plus its
//! current value. The value type and constraint kind are folded into a single
//! [`OptionKind`], so combinations the hardware format can't express (a range
//! on a boolean, choices on a button) never reach the rest of the crate.

pub mod constraint;
pub mod table;

pub use constraint::{format_real, Constraint, TextConstraint};
pub use table::{OptionEntry, OptionTable, ScanArea, SetOutcome};

use crate::adapter::{
    fixed_from_f64, fixed_to_f64, OptionCaps, RawConstraint, RawOption, RawValue, Unit,
    ValueType,
};
use crate::error::{AppResult, CapabilityReason, ScanError};
use serde::Serialize;

/// Smallest value a fixed-point word can hold.
pub const FIXED_MIN: f64 = -32768.0;
/// Largest fixed-point value, as the hardware format documents it.
pub const FIXED_MAX: f64 = 32767.9999;

impl Unit {
    /// Short unit label for display, e.g. `dpi`; empty for no unit.
    pub fn suffix(&self) -> &'static str {
        match self {
            Unit::None => "",
            Unit::Pixel => "px",
            Unit::Bit => "bit",
            Unit::Millimeter => "mm",
            Unit::Dpi => "dpi",
            Unit::Percent => "%",
            Unit::Microsecond => "us",
        }
    }
}

/// Value type, constraint and current value of an option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OptionKind {
    /// Boolean value
    Bool(bool),
    /// Integer option, one value per element
    Int {
        /// Current values
        values: Vec<i32>,
        /// Allowed values
        constraint: Constraint<i32>,
    },
    /// Fixed-point option, one value per element
    Fixed {
        /// Current values
        values: Vec<f64>,
        /// Allowed values
        constraint: Constraint<f64>,
    },
    /// String option
    Text {
        /// Current value
        value: String,
        /// Buffer size including the terminator
        max_len: usize,
        /// Allowed values
        constraint: TextConstraint,
    },
    /// Action without a value
    Button,
    /// Section header
    Group,
}

impl OptionKind {
    /// Type name used in messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionKind::Bool(_) => "boolean",
            OptionKind::Int { .. } => "integer",
            OptionKind::Fixed { .. } => "fixed-point",
            OptionKind::Text { .. } => "string",
            OptionKind::Button => "button",
            OptionKind::Group => "group",
        }
    }
}

/// Value a caller wants to write.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Boolean value
    Bool(bool),
    /// Integer values
    Int(Vec<i32>),
    /// Real values, converted to fixed-point words
    Fixed(Vec<f64>),
    /// String value
    Text(String),
    /// Press a button
    Press,
}

impl OptionValue {
    fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "boolean",
            OptionValue::Int(_) => "integer",
            OptionValue::Fixed(_) => "fixed-point",
            OptionValue::Text(_) => "string",
            OptionValue::Press => "button press",
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(vec![v])
    }
}

impl From<Vec<i32>> for OptionValue {
    fn from(v: Vec<i32>) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Fixed(vec![v])
    }
}

impl From<Vec<f64>> for OptionValue {
    fn from(v: Vec<f64>) -> Self {
        OptionValue::Fixed(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

/// One validated device option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionDescriptor {
    /// Identifier used for reads and writes
    pub name: String,
    /// Display name; the name when the device gives none
    pub title: String,
    /// Long description
    pub description: String,
    /// Unit of the value
    pub unit: Unit,
    /// Capability flags
    pub caps: OptionCaps,
    /// Type, constraint and current value
    pub kind: OptionKind,
}

impl OptionDescriptor {
    /// Build a descriptor from the adapter's description and current value.
    ///
    /// Buttons and groups carry no value; pass [`RawValue::None`].
    pub fn from_raw(raw: RawOption, value: RawValue) -> AppResult<Self> {
        let RawOption {
            name,
            title,
            description,
            value_type,
            unit,
            size,
            constraint,
            caps,
        } = raw;

        let kind = match (value_type, constraint, value) {
            (ValueType::Bool, RawConstraint::None, RawValue::Bool(v)) => OptionKind::Bool(v),
            (ValueType::Int, constraint, RawValue::Words(values)) => OptionKind::Int {
                constraint: numeric_constraint(&name, constraint, |w| w)?,
                values,
            },
            (ValueType::Fixed, constraint, RawValue::Words(words)) => OptionKind::Fixed {
                constraint: numeric_constraint(&name, constraint, fixed_to_f64)?,
                values: words.into_iter().map(fixed_to_f64).collect(),
            },
            (ValueType::String, constraint, RawValue::Text(value)) => {
                let constraint = match constraint {
                    RawConstraint::None => TextConstraint::None,
                    RawConstraint::StringList(choices) => TextConstraint::Choices(choices),
                    other => {
                        return Err(ScanError::validation(
                            name,
                            format!("string option can't have constraint {:?}", other),
                        ))
                    }
                };
                OptionKind::Text {
                    value,
                    max_len: size,
                    constraint,
                }
            }
            (ValueType::Button, RawConstraint::None, _) => OptionKind::Button,
            (ValueType::Group, _, _) => OptionKind::Group,
            (value_type, constraint, value) => {
                return Err(ScanError::validation(
                    name,
                    format!(
                        "unsupported combination of {:?} type, {:?} constraint and {:?} value",
                        value_type, constraint, value
                    ),
                ))
            }
        };

        let caps = match kind {
            OptionKind::Group => OptionCaps::read_only(),
            _ => caps,
        };

        Ok(Self {
            title: if title.is_empty() { name.clone() } else { title },
            name,
            description,
            unit,
            caps,
            kind,
        })
    }

    /// Display suffix of the option's unit.
    pub fn unit_suffix(&self) -> &'static str {
        self.unit.suffix()
    }

    /// Whether this entry is a group header.
    pub fn is_group(&self) -> bool {
        matches!(self.kind, OptionKind::Group)
    }

    /// Settable and active.
    pub fn is_writable(&self) -> bool {
        self.check_writable().is_ok()
    }

    /// Human-readable constraint, e.g. "min value: 50, max value: 1200".
    pub fn constraint_text(&self, max_listed: usize) -> Option<String> {
        match &self.kind {
            OptionKind::Int { constraint, .. } => constraint::int_text(constraint, max_listed),
            OptionKind::Fixed { constraint, .. } => constraint::fixed_text(constraint, max_listed),
            OptionKind::Text { constraint, .. } => constraint::string_text(constraint, max_listed),
            _ => None,
        }
    }

    /// Current value for display; array elements are joined with "; ".
    pub fn display_value(&self) -> String {
        match &self.kind {
            OptionKind::Bool(v) => v.to_string(),
            OptionKind::Int { values, .. } => values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; "),
            OptionKind::Fixed { values, .. } => values
                .iter()
                .map(|v| format_real(*v))
                .collect::<Vec<_>>()
                .join("; "),
            OptionKind::Text { value, .. } => value.clone(),
            OptionKind::Button | OptionKind::Group => String::new(),
        }
    }

    /// Single numeric value, for options such as coordinates and resolution.
    pub fn scalar(&self) -> Option<f64> {
        match &self.kind {
            OptionKind::Int { values, .. } if values.len() == 1 => Some(values[0] as f64),
            OptionKind::Fixed { values, .. } if values.len() == 1 => Some(values[0]),
            _ => None,
        }
    }

    fn check_writable(&self) -> AppResult<()> {
        let reason = if self.is_group() || !self.caps.settable {
            CapabilityReason::ReadOnly
        } else if !self.caps.active {
            CapabilityReason::Inactive
        } else {
            return Ok(());
        };
        Err(ScanError::Capability {
            option: self.name.clone(),
            reason,
        })
    }

    /// Validate `value` against this option and convert it to the wire form.
    ///
    /// Range violations are clamped (and snapped to the step), choice
    /// violations rejected. Nothing here contacts the adapter.
    pub fn prepare(&self, value: OptionValue) -> AppResult<RawValue> {
        self.check_writable()?;

        match (&self.kind, value) {
            (OptionKind::Bool(_), OptionValue::Bool(v)) => Ok(RawValue::Bool(v)),
            (OptionKind::Int { values, constraint }, OptionValue::Int(requested)) => {
                let fitted = self.fit_array(requested, values.len(), constraint.pad_value(0), |v| {
                    constraint.fit(v).ok_or_else(|| format!("{} is not a valid choice", v))
                })?;
                Ok(RawValue::Words(fitted))
            }
            (OptionKind::Fixed { .. }, OptionValue::Int(requested)) => self.prepare(
                OptionValue::Fixed(requested.into_iter().map(f64::from).collect()),
            ),
            (OptionKind::Fixed { values, constraint }, OptionValue::Fixed(requested)) => {
                let fitted = self.fit_array(requested, values.len(), constraint.pad_value(0.0), |v| {
                    constraint
                        .fit(v)
                        .ok_or_else(|| format!("{} is not a valid choice", format_real(v)))
                })?;
                Ok(RawValue::Words(fitted.into_iter().map(fixed_from_f64).collect()))
            }
            (
                OptionKind::Text {
                    max_len,
                    constraint,
                    ..
                },
                OptionValue::Text(text),
            ) => {
                if !constraint.allows(&text) {
                    return Err(ScanError::validation(
                        &self.name,
                        format!("\"{}\" is not a valid choice", text),
                    ));
                }
                if *max_len > 0 && text.len() >= *max_len {
                    return Err(ScanError::validation(
                        &self.name,
                        format!("value is longer than {} characters", max_len - 1),
                    ));
                }
                Ok(RawValue::Text(text))
            }
            (OptionKind::Button, OptionValue::Press) => Ok(RawValue::None),
            (kind, value) => Err(ScanError::validation(
                &self.name,
                format!(
                    "expected {} value, got {}",
                    kind.type_name(),
                    value.type_name()
                ),
            )),
        }
    }

    /// Fit every element; pad short arrays, reject long ones.
    fn fit_array<T: Copy>(
        &self,
        mut requested: Vec<T>,
        count: usize,
        pad: T,
        fit: impl Fn(T) -> Result<T, String>,
    ) -> AppResult<Vec<T>> {
        if requested.len() > count {
            return Err(ScanError::validation(
                &self.name,
                format!("expected at most {} values, got {}", count, requested.len()),
            ));
        }
        requested.resize(count, pad);
        requested
            .into_iter()
            .map(|v| fit(v).map_err(|reason| ScanError::validation(&self.name, reason)))
            .collect()
    }

    /// Parse user text into a value of this option's type.
    ///
    /// Arrays are separated by ';' or ','. Buttons accept any text as a press.
    pub fn parse_value(&self, text: &str) -> AppResult<OptionValue> {
        let invalid = |reason: String| ScanError::validation(&self.name, reason);
        let items = || {
            text.split([';', ','])
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        match &self.kind {
            OptionKind::Bool(_) => match text.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(OptionValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(OptionValue::Bool(false)),
                other => Err(invalid(format!("\"{}\" is not a boolean", other))),
            },
            OptionKind::Int { .. } => items()
                .map(|s| {
                    s.parse::<i32>()
                        .map_err(|_| invalid(format!("\"{}\" is not an integer", s)))
                })
                .collect::<AppResult<Vec<_>>>()
                .map(OptionValue::Int),
            OptionKind::Fixed { .. } => items()
                .map(|s| {
                    s.parse::<f64>()
                        .map_err(|_| invalid(format!("\"{}\" is not a number", s)))
                })
                .collect::<AppResult<Vec<_>>>()
                .map(OptionValue::Fixed),
            OptionKind::Text { .. } => Ok(OptionValue::Text(text.to_string())),
            OptionKind::Button => Ok(OptionValue::Press),
            OptionKind::Group => Err(invalid("groups have no value".to_string())),
        }
    }
}

fn numeric_constraint<T>(
    name: &str,
    raw: RawConstraint,
    convert: impl Fn(i32) -> T,
) -> AppResult<Constraint<T>> {
    match raw {
        RawConstraint::None => Ok(Constraint::None),
        RawConstraint::Range { min, max, quant } => {
            if min > max {
                return Err(ScanError::validation(
                    name,
                    format!("range minimum {} is above maximum {}", min, max),
                ));
            }
            if quant < 0 {
                return Err(ScanError::validation(
                    name,
                    format!("negative range step {}", quant),
                ));
            }
            Ok(Constraint::Range {
                min: convert(min),
                max: convert(max),
                step: convert(quant),
            })
        }
        RawConstraint::WordList(words) => {
            Ok(Constraint::Choices(words.into_iter().map(convert).collect()))
        }
        RawConstraint::StringList(_) => Err(ScanError::validation(
            name,
            "numeric option can't have a string list constraint",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, value_type: ValueType, constraint: RawConstraint) -> RawOption {
        RawOption {
            name: name.to_string(),
            title: String::new(),
            description: String::new(),
            value_type,
            unit: Unit::None,
            size: 1,
            constraint,
            caps: OptionCaps::default(),
        }
    }

    fn fixed_range(min: f64, max: f64, step: f64) -> RawConstraint {
        RawConstraint::Range {
            min: fixed_from_f64(min),
            max: fixed_from_f64(max),
            quant: fixed_from_f64(step),
        }
    }

    #[test]
    fn test_unit_suffixes() {
        assert_eq!(Unit::Pixel.suffix(), "px");
        assert_eq!(Unit::Bit.suffix(), "bit");
        assert_eq!(Unit::Millimeter.suffix(), "mm");
        assert_eq!(Unit::Dpi.suffix(), "dpi");
        assert_eq!(Unit::Percent.suffix(), "%");
        assert_eq!(Unit::Microsecond.suffix(), "us");
        assert_eq!(Unit::None.suffix(), "");
    }

    #[test]
    fn test_title_falls_back_to_name() {
        let d = OptionDescriptor::from_raw(
            raw("preview", ValueType::Bool, RawConstraint::None),
            RawValue::Bool(true),
        )
        .unwrap();
        assert_eq!(d.title, "preview");
        assert_eq!(d.display_value(), "true");
    }

    #[test]
    fn test_illegal_combination_rejected() {
        let err = OptionDescriptor::from_raw(
            raw("preview", ValueType::Bool, RawConstraint::WordList(vec![0, 1])),
            RawValue::Bool(true),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::Validation { .. }));

        let err = OptionDescriptor::from_raw(
            raw("resolution", ValueType::Int, RawConstraint::None),
            RawValue::Text("300".into()),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::Validation { .. }));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = OptionDescriptor::from_raw(
            raw(
                "resolution",
                ValueType::Int,
                RawConstraint::Range {
                    min: 1200,
                    max: 50,
                    quant: 0,
                },
            ),
            RawValue::Words(vec![300]),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for option \"resolution\": range minimum 1200 is above maximum 50"
        );

        let err = OptionDescriptor::from_raw(
            raw("tl-x", ValueType::Fixed, fixed_range(0.0, 215.9, -1.0)),
            RawValue::Words(vec![0]),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::Validation { .. }));
    }

    #[test]
    fn test_fixed_option_display_and_constraint() {
        let mut r = raw("fixed-array", ValueType::Fixed, RawConstraint::None);
        r.size = 3;
        let d = OptionDescriptor::from_raw(
            r,
            RawValue::Words(vec![
                fixed_from_f64(1.0),
                fixed_from_f64(2.0),
                fixed_from_f64(2.5),
            ]),
        )
        .unwrap();
        assert_eq!(d.display_value(), "1; 2; 2.5");
        assert_eq!(
            d.constraint_text(10).unwrap(),
            "min value: -32768, max value: 32767.9999"
        );
    }

    #[test]
    fn test_int_written_to_fixed_is_converted() {
        let d = OptionDescriptor::from_raw(
            raw("tl-x", ValueType::Fixed, fixed_range(0.0, 215.9, 0.0)),
            RawValue::Words(vec![0]),
        )
        .unwrap();
        assert_eq!(
            d.prepare(OptionValue::Int(vec![100])).unwrap(),
            RawValue::Words(vec![fixed_from_f64(100.0)])
        );
        assert_eq!(
            d.prepare(OptionValue::Fixed(vec![500.0])).unwrap(),
            RawValue::Words(vec![fixed_from_f64(215.9)])
        );
    }

    #[test]
    fn test_wrong_kind_is_validation_error() {
        let d = OptionDescriptor::from_raw(
            raw("preview", ValueType::Bool, RawConstraint::None),
            RawValue::Bool(false),
        )
        .unwrap();
        let err = d.prepare(OptionValue::Int(vec![1])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for option \"preview\": expected boolean value, got integer"
        );
    }

    #[test]
    fn test_short_arrays_padded_long_rejected() {
        let mut r = raw(
            "gamma",
            ValueType::Int,
            RawConstraint::Range {
                min: -10,
                max: 10,
                quant: 1,
            },
        );
        r.size = 3;
        let d = OptionDescriptor::from_raw(r, RawValue::Words(vec![1, 2, 3])).unwrap();

        assert_eq!(
            d.prepare(OptionValue::Int(vec![5])).unwrap(),
            RawValue::Words(vec![5, -10, -10])
        );
        assert!(d.prepare(OptionValue::Int(vec![1, 2, 3, 4])).is_err());
    }

    #[test]
    fn test_text_length_limit() {
        let mut r = raw("label", ValueType::String, RawConstraint::None);
        r.size = 4;
        let d = OptionDescriptor::from_raw(r, RawValue::Text("ab".into())).unwrap();
        assert!(d.prepare("abc".into()).is_ok());
        let err = d.prepare("abcd".into()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for option \"label\": value is longer than 3 characters"
        );
    }

    #[test]
    fn test_button_press_and_group() {
        let button = OptionDescriptor::from_raw(
            raw("calibrate", ValueType::Button, RawConstraint::None),
            RawValue::None,
        )
        .unwrap();
        assert_eq!(button.prepare(OptionValue::Press).unwrap(), RawValue::None);

        let group = OptionDescriptor::from_raw(
            raw("", ValueType::Group, RawConstraint::None),
            RawValue::None,
        )
        .unwrap();
        assert!(!group.is_writable());
        assert!(matches!(
            group.prepare(OptionValue::Press),
            Err(ScanError::Capability {
                reason: CapabilityReason::ReadOnly,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_value() {
        let mut r = raw("gamma", ValueType::Int, RawConstraint::None);
        r.size = 3;
        let d = OptionDescriptor::from_raw(r, RawValue::Words(vec![0, 0, 0])).unwrap();
        assert_eq!(
            d.parse_value("1; 2,3").unwrap(),
            OptionValue::Int(vec![1, 2, 3])
        );
        assert!(d.parse_value("one").is_err());

        let b = OptionDescriptor::from_raw(
            raw("preview", ValueType::Bool, RawConstraint::None),
            RawValue::Bool(false),
        )
        .unwrap();
        assert_eq!(b.parse_value("yes").unwrap(), OptionValue::Bool(true));
    }
}
