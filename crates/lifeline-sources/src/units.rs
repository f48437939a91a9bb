//! Physical units and conversion into payload units.
//!
//! Platforms report quantities in whatever unit they store; payloads always
//! use one fixed unit per field (kilocalories, meters, kilograms, ...).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SourceError};

/// Unit attached to a raw quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Dimensionless count.
    Count,
    /// Beats per minute.
    BeatsPerMinute,
    /// Breaths per minute.
    BreathsPerMinute,
    /// Meters.
    Meters,
    /// Kilometers.
    Kilometers,
    /// Miles.
    Miles,
    /// Feet.
    Feet,
    /// Kilocalories.
    Kilocalories,
    /// Kilojoules.
    Kilojoules,
    /// Joules.
    Joules,
    /// Kilograms.
    Kilograms,
    /// Grams.
    Grams,
    /// Pounds.
    Pounds,
    /// Millimeters of mercury.
    MillimetersOfMercury,
    /// Millimoles per liter.
    MillimolesPerLiter,
    /// Milligrams per deciliter.
    MilligramsPerDeciliter,
    /// Percent, 0 to 100.
    Percent,
    /// Degrees Celsius.
    Celsius,
    /// Degrees Fahrenheit.
    Fahrenheit,
    /// Liters.
    Liters,
    /// Milliliters.
    Milliliters,
    /// Fluid ounces (US).
    FluidOunces,
    /// Milliseconds.
    Milliseconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Count,
    Frequency,
    Length,
    Energy,
    Mass,
    Pressure,
    Concentration,
    Ratio,
    Temperature,
    Volume,
    Time,
}

impl Unit {
    fn dimension(self) -> Dimension {
        match self {
            Self::Count => Dimension::Count,
            Self::BeatsPerMinute | Self::BreathsPerMinute => Dimension::Frequency,
            Self::Meters | Self::Kilometers | Self::Miles | Self::Feet => Dimension::Length,
            Self::Kilocalories | Self::Kilojoules | Self::Joules => Dimension::Energy,
            Self::Kilograms | Self::Grams | Self::Pounds => Dimension::Mass,
            Self::MillimetersOfMercury => Dimension::Pressure,
            Self::MillimolesPerLiter | Self::MilligramsPerDeciliter => Dimension::Concentration,
            Self::Percent => Dimension::Ratio,
            Self::Celsius | Self::Fahrenheit => Dimension::Temperature,
            Self::Liters | Self::Milliliters | Self::FluidOunces => Dimension::Volume,
            Self::Milliseconds => Dimension::Time,
        }
    }

    /// Converts a value in this unit to the dimension's base unit.
    fn to_base(self, value: f64) -> f64 {
        match self {
            Self::Kilometers => value * 1000.0,
            Self::Miles => value * 1609.344,
            Self::Feet => value * 0.3048,
            Self::Kilojoules => value / 4.184,
            Self::Joules => value / 4184.0,
            Self::Grams => value / 1000.0,
            Self::Pounds => value * 0.453_592_37,
            Self::MilligramsPerDeciliter => value / 18.0,
            Self::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
            Self::Milliliters => value / 1000.0,
            Self::FluidOunces => value * 0.029_573_53,
            _ => value,
        }
    }

    /// Converts a value in the dimension's base unit to this unit.
    fn from_base(self, value: f64) -> f64 {
        match self {
            Self::Kilometers => value / 1000.0,
            Self::Miles => value / 1609.344,
            Self::Feet => value / 0.3048,
            Self::Kilojoules => value * 4.184,
            Self::Joules => value * 4184.0,
            Self::Grams => value * 1000.0,
            Self::Pounds => value / 0.453_592_37,
            Self::MilligramsPerDeciliter => value * 18.0,
            Self::Fahrenheit => value * 9.0 / 5.0 + 32.0,
            Self::Milliliters => value * 1000.0,
            Self::FluidOunces => value / 0.029_573_53,
            _ => value,
        }
    }
}

/// A measured value with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// Numeric value.
    pub value: f64,
    /// Unit of `value`.
    pub unit: Unit,
}

impl Quantity {
    /// Creates a quantity.
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Returns the value expressed in `target`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::MalformedRecord` when the units measure
    /// different things, e.g. kilograms into meters.
    pub fn in_unit(&self, target: Unit) -> Result<f64> {
        if self.unit == target {
            return Ok(self.value);
        }
        if self.unit.dimension() != target.dimension() {
            return Err(SourceError::malformed(format!(
                "cannot convert {:?} to {:?}",
                self.unit, target
            )));
        }
        Ok(target.from_base(self.unit.to_base(self.value)))
    }
}
