//! The unit and constant name resolver. This is the boundary the evaluator
//! consults for bare identifiers; the full conversion tables of a real unit
//! database live outside the core and are not carried here.

use crate::value::Value;

/// What a bare identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Unit,
    Constant,
    Neither,
}

/// A unit name. `multipliable` units attach to an adjacent numeric, list,
/// or sequence operand; time units carry their second-equivalent so
/// date-time arithmetic can use them.
pub struct UnitInfo {
    pub name: &'static str,
    pub plural: &'static str,
    pub seconds: Option<f64>,
}

const UNITS: &[UnitInfo] = &[
    UnitInfo { name: "second", plural: "seconds", seconds: Some(1.0) },
    UnitInfo { name: "minute", plural: "minutes", seconds: Some(60.0) },
    UnitInfo { name: "hour", plural: "hours", seconds: Some(3600.0) },
    UnitInfo { name: "day", plural: "days", seconds: Some(86400.0) },
    UnitInfo { name: "week", plural: "weeks", seconds: Some(604800.0) },
    UnitInfo { name: "meter", plural: "meters", seconds: None },
    UnitInfo { name: "kilometer", plural: "kilometers", seconds: None },
    UnitInfo { name: "mile", plural: "miles", seconds: None },
    UnitInfo { name: "foot", plural: "feet", seconds: None },
    UnitInfo { name: "inch", plural: "inches", seconds: None },
    UnitInfo { name: "gram", plural: "grams", seconds: None },
    UnitInfo { name: "kilogram", plural: "kilograms", seconds: None },
    UnitInfo { name: "pound", plural: "pounds", seconds: None },
    UnitInfo { name: "liter", plural: "liters", seconds: None },
    UnitInfo { name: "gallon", plural: "gallons", seconds: None },
];

/// Fixed-value names. Unlike units these never attach to an operand; they
/// push their value directly.
pub fn constant_value(name: &str) -> Option<Value> {
    let value = match name {
        "pi" => Value::decimal(std::f64::consts::PI),
        "e" => Value::decimal(std::f64::consts::E),
        "phi" => Value::decimal((1.0 + 5.0_f64.sqrt()) / 2.0),
        "silver_ratio" => Value::decimal(1.0 + std::f64::consts::SQRT_2),
        "infinity" => Value::decimal(f64::INFINITY),
        "negative_infinity" => Value::decimal(f64::NEG_INFINITY),
        "true" => Value::integer(1),
        "false" => Value::integer(0),
        "default" => Value::integer(-1),

        // day-of-week indices
        "monday" => Value::integer(1),
        "tuesday" => Value::integer(2),
        "wednesday" => Value::integer(3),
        "thursday" => Value::integer(4),
        "friday" => Value::integer(5),
        "saturday" => Value::integer(6),
        "sunday" => Value::integer(7),

        // month indices
        "january" => Value::integer(1),
        "february" => Value::integer(2),
        "march" => Value::integer(3),
        "april" => Value::integer(4),
        "may" => Value::integer(5),
        "june" => Value::integer(6),
        "july" => Value::integer(7),
        "august" => Value::integer(8),
        "september" => Value::integer(9),
        "october" => Value::integer(10),
        "november" => Value::integer(11),
        "december" => Value::integer(12),

        _ => return None,
    };
    Some(value)
}

/// Canonical unit record for a name, accepting plural spellings.
pub fn unit_info(name: &str) -> Option<&'static UnitInfo> {
    UNITS
        .iter()
        .find(|unit| unit.name == name || unit.plural == name)
}

/// Report what a bare identifier names. Units are checked first, matching
/// the classification order of term evaluation.
pub fn resolve(name: &str) -> NameKind {
    if unit_info(name).is_some() {
        NameKind::Unit
    } else if constant_value(name).is_some() {
        NameKind::Constant
    } else {
        NameKind::Neither
    }
}

/// Every resolvable name, for keyword suggestions.
pub fn known_names() -> impl Iterator<Item = &'static str> {
    const CONSTANTS: &[&str] = &[
        "pi", "e", "phi", "silver_ratio", "infinity", "negative_infinity", "true", "false",
        "default", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];
    UNITS
        .iter()
        .map(|unit| unit.name)
        .chain(CONSTANTS.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_resolve_in_singular_and_plural() {
        assert_eq!(resolve("meter"), NameKind::Unit);
        assert!(unit_info("meters").is_some());
        assert_eq!(unit_info("feet").unwrap().name, "foot");
    }

    #[test]
    fn constants_resolve() {
        assert_eq!(resolve("pi"), NameKind::Constant);
        assert_eq!(constant_value("true"), Some(Value::integer(1)));
        assert_eq!(constant_value("october"), Some(Value::integer(10)));
    }

    #[test]
    fn unknown_names_resolve_to_neither() {
        assert_eq!(resolve("parsec"), NameKind::Neither);
        assert_eq!(constant_value("parsec"), None);
    }

    #[test]
    fn time_units_carry_second_equivalents() {
        assert_eq!(unit_info("hour").unwrap().seconds, Some(3600.0));
        assert_eq!(unit_info("meter").unwrap().seconds, None);
    }
}
