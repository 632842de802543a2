//! Option constraints: fitting values into them and describing them to users.

use super::{FIXED_MAX, FIXED_MIN};
use serde::{Deserialize, Serialize};

/// Constraint on a numeric (integer or fixed-point) option.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Constraint<T> {
    /// Any value the representation can hold.
    #[default]
    None,

    /// Inclusive range, optionally quantized.
    ///
    /// Values outside `[min, max]` are clamped; with a non-zero `step` they
    /// are also snapped to the nearest `min + k * step` inside the range.
    Range {
        /// Minimum allowed value (inclusive).
        min: T,
        /// Maximum allowed value (inclusive).
        max: T,
        /// Quantization step; zero means continuous.
        step: T,
    },

    /// Value must be one of these exactly.
    Choices(Vec<T>),
}

/// Constraint on a string option. Strings have no range form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextConstraint {
    /// Any string up to the option's length
    #[default]
    None,
    /// Value must be one of these exactly
    Choices(Vec<String>),
}

impl<T: Copy> Constraint<T> {
    /// Value used to pad short arrays.
    pub fn pad_value(&self, fallback: T) -> T {
        match self {
            Constraint::Range { min, .. } => *min,
            Constraint::Choices(choices) => choices.first().copied().unwrap_or(fallback),
            Constraint::None => fallback,
        }
    }
}

impl Constraint<i32> {
    /// Clamps and snaps `value`; `None` means it is not an allowed choice.
    pub fn fit(&self, value: i32) -> Option<i32> {
        match self {
            Constraint::None => Some(value),
            Constraint::Range { min, max, step } => Some(fit_int(value, *min, *max, *step)),
            Constraint::Choices(choices) => choices.contains(&value).then_some(value),
        }
    }
}

impl Constraint<f64> {
    /// Clamps and snaps `value`; `None` means it is not an allowed choice.
    ///
    /// Choices are compared in the device's fixed-point representation.
    pub fn fit(&self, value: f64) -> Option<f64> {
        match self {
            Constraint::None => Some(value.clamp(FIXED_MIN, FIXED_MAX)),
            Constraint::Range { min, max, step } => Some(fit_real(value, *min, *max, *step)),
            Constraint::Choices(choices) => {
                let word = crate::adapter::fixed_from_f64(value);
                choices
                    .iter()
                    .copied()
                    .find(|c| crate::adapter::fixed_from_f64(*c) == word)
            }
        }
    }
}

impl TextConstraint {
    /// Whether `value` satisfies the constraint.
    pub fn allows(&self, value: &str) -> bool {
        match self {
            TextConstraint::None => true,
            TextConstraint::Choices(choices) => choices.iter().any(|c| c == value),
        }
    }
}

fn fit_int(value: i32, min: i32, max: i32, step: i32) -> i32 {
    // not `clamp`: an inverted range must not panic
    let clamped = value.max(min).min(max);
    if step <= 0 {
        return clamped;
    }
    let (min, max, step) = (min as i64, max as i64, step as i64);
    let offset = clamped as i64 - min;
    let mut snapped = min + ((offset + step / 2) / step) * step;
    if snapped > max {
        snapped -= step;
    }
    snapped as i32
}

fn fit_real(value: f64, min: f64, max: f64, step: f64) -> f64 {
    let clamped = value.max(min).min(max);
    if step <= 0.0 {
        return clamped;
    }
    let mut snapped = min + ((clamped - min) / step).round() * step;
    if snapped > max {
        snapped -= step;
    }
    snapped
}

/// Formats a real number with at most four decimals and no trailing zeros.
pub fn format_real(value: f64) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn range_text(min: String, max: String, step: Option<String>) -> String {
    let mut text = format!("min value: {}, max value: {}", min, max);
    if let Some(step) = step {
        text.push_str(&format!(", step: {}", step));
    }
    text
}

fn choices_text(items: Vec<String>, max_listed: usize) -> String {
    if items.is_empty() {
        return "Valid values: []".to_string();
    }
    let mut text = format!(
        "Valid values: {}",
        items.iter().take(max_listed).cloned().collect::<Vec<_>>().join(", ")
    );
    if items.len() > max_listed {
        text.push_str(", ...");
    }
    text
}

/// Constraint description of an integer option.
pub fn int_text(constraint: &Constraint<i32>, max_listed: usize) -> Option<String> {
    match constraint {
        Constraint::None => None,
        Constraint::Range { min, max, step } => Some(range_text(
            min.to_string(),
            max.to_string(),
            (*step > 0).then(|| step.to_string()),
        )),
        Constraint::Choices(choices) => Some(choices_text(
            choices.iter().map(|c| c.to_string()).collect(),
            max_listed,
        )),
    }
}

/// Constraint description of a fixed-point option.
///
/// Bounds at the limits of the fixed-point representation always render as
/// the literal "-32768" / "32767.9999" pair.
pub fn fixed_text(constraint: &Constraint<f64>, max_listed: usize) -> Option<String> {
    const FULL_RANGE: &str = "min value: -32768, max value: 32767.9999";
    match constraint {
        Constraint::None => Some(FULL_RANGE.to_string()),
        Constraint::Range { min, max, step } => {
            let step = (*step > 0.0).then(|| format_real(*step));
            if *min <= FIXED_MIN && *max >= FIXED_MAX {
                Some(match step {
                    Some(step) => format!("{}, step: {}", FULL_RANGE, step),
                    None => FULL_RANGE.to_string(),
                })
            } else {
                Some(range_text(format_real(*min), format_real(*max), step))
            }
        }
        Constraint::Choices(choices) => Some(choices_text(
            choices.iter().map(|c| format_real(*c)).collect(),
            max_listed,
        )),
    }
}

/// Constraint text of a string option.
pub fn string_text(constraint: &TextConstraint, max_listed: usize) -> Option<String> {
    match constraint {
        TextConstraint::None => None,
        TextConstraint::Choices(choices) => Some(choices_text(choices.clone(), max_listed)),
    }
}
