use serde_json::{Number, Value};

use super::{Field, Options, filter_attributes};
use crate::datatype::Datatype;
use crate::error::FieldError;

const NUMERIC_ATTRIBUTES: &[&str] = &["min", "max", "step"];

/// Text input for integer, float and double variables.
#[derive(Debug, Clone)]
pub struct NumericField {
    datatype: Datatype,
    attributes: Options,
    text: String,
}

impl NumericField {
    #[must_use]
    pub fn new(datatype: Datatype, options: &Options) -> Self {
        Self {
            datatype,
            attributes: filter_attributes(NUMERIC_ATTRIBUTES, options),
            text: String::new(),
        }
    }

    fn invalid(&self, text: &str) -> FieldError {
        FieldError::InvalidInput {
            datatype: self.datatype.clone(),
            text: text.to_string(),
        }
    }
}

impl Field for NumericField {
    fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    fn allowed_attributes(&self) -> &'static [&'static str] {
        NUMERIC_ATTRIBUTES
    }

    fn filtered_options(&self) -> &Options {
        &self.attributes
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn serialize(&self) -> Result<Value, FieldError> {
        let raw = self.text.trim();

        match self.datatype {
            Datatype::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| self.invalid(raw)),
            _ => {
                let parsed = raw.parse::<f64>().map_err(|_| self.invalid(raw))?;
                Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| self.invalid(raw))
            }
        }
    }

    fn unserialize(&mut self, value: &Value) -> Result<(), FieldError> {
        let Value::Number(number) = value else {
            return Err(FieldError::TypeMismatch {
                datatype: self.datatype.clone(),
                found: json_type_name(value).to_string(),
            });
        };

        self.text = match self.datatype {
            Datatype::Integer => integral_text(number).ok_or_else(|| FieldError::TypeMismatch {
                datatype: self.datatype.clone(),
                found: if number.is_u64() {
                    "integer beyond i64 range".to_string()
                } else {
                    "fractional number".to_string()
                },
            })?,
            _ => number.to_string(),
        };
        Ok(())
    }

    fn input(&mut self, text: String) {
        self.text = text;
    }
}

/// Text for values an `i64` can hold, so whatever is shown also serializes.
fn integral_text(number: &Number) -> Option<String> {
    if let Some(integer) = number.as_i64() {
        return Some(integer.to_string());
    }
    if number.is_u64() {
        return None;
    }

    let float = number.as_f64()?;
    (float.fract() == 0.0 && float.abs() < i64::MAX as f64).then(|| (float as i64).to_string())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn options(value: Value) -> Options {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn keeps_only_range_attributes() {
        let field = NumericField::new(
            Datatype::Float,
            &options(json!({"min": 0, "max": 10, "step": 0.1, "unit": "dB"})),
        );
        assert_eq!(field.allowed_attributes(), ["min", "max", "step"]);
        assert_eq!(field.filtered_options().len(), 3);
        assert_eq!(field.filtered_options()["step"], 0.1);
        assert!(!field.filtered_options().contains_key("unit"));
    }

    #[test]
    fn float_value_displays_as_sent() {
        let mut field = NumericField::new(Datatype::Float, &Options::new());
        field.unserialize(&json!(4.0)).expect("unserialize");
        assert_eq!(field.text(), "4.0");
        field.unserialize(&json!(1.5)).expect("unserialize");
        assert_eq!(field.text(), "1.5");
    }

    #[test]
    fn integer_field_accepts_whole_floats() {
        let mut field = NumericField::new(Datatype::Integer, &Options::new());
        field.unserialize(&json!(12.0)).expect("unserialize");
        assert_eq!(field.text(), "12");
        assert_eq!(field.serialize().expect("serialize"), json!(12));
    }

    #[test]
    fn mismatched_values_leave_text_untouched() {
        let mut field = NumericField::new(Datatype::Integer, &Options::new());
        field.unserialize(&json!(3)).expect("unserialize");

        let err = field.unserialize(&json!("three")).expect_err("string rejected");
        assert!(matches!(err, FieldError::TypeMismatch { .. }));
        let err = field.unserialize(&json!(3.5)).expect_err("fraction rejected");
        assert!(matches!(err, FieldError::TypeMismatch { .. }));
        assert_eq!(field.text(), "3");
    }

    #[test]
    fn integers_beyond_i64_are_rejected() {
        let mut field = NumericField::new(Datatype::Integer, &Options::new());
        field.unserialize(&json!(i64::MAX)).expect("unserialize");
        assert_eq!(field.serialize().expect("serialize"), json!(i64::MAX));

        let err = field
            .unserialize(&json!(u64::MAX))
            .expect_err("u64::MAX cannot serialize back");
        assert!(matches!(
            err,
            FieldError::TypeMismatch { ref found, .. } if found == "integer beyond i64 range"
        ));
        assert_eq!(field.text(), i64::MAX.to_string());
    }

    #[test]
    fn non_numeric_input_does_not_serialize() {
        let mut field = NumericField::new(Datatype::Double, &Options::new());
        field.input("fast".to_string());
        assert!(field.serialize().is_err());

        field.input("NaN".to_string());
        assert!(field.serialize().is_err());

        let mut field = NumericField::new(Datatype::Integer, &Options::new());
        field.input("3.7".to_string());
        assert!(field.serialize().is_err());
    }

    #[test]
    fn user_input_is_trimmed_before_parsing() {
        let mut field = NumericField::new(Datatype::Float, &Options::new());
        field.input(" 3.2 ".to_string());
        assert_eq!(field.serialize().expect("serialize"), json!(3.2));
    }

    proptest! {
        #[test]
        fn integer_round_trip(x in any::<i64>()) {
            let mut field = NumericField::new(Datatype::Integer, &Options::new());
            field.unserialize(&json!(x)).expect("unserialize");
            prop_assert_eq!(field.serialize().expect("serialize"), json!(x));
        }

        #[test]
        fn double_round_trip(x in -1.0e12f64..1.0e12f64) {
            let mut field = NumericField::new(Datatype::Double, &Options::new());
            field.unserialize(&json!(x)).expect("unserialize");
            let back = field.serialize().expect("serialize");
            prop_assert_eq!(back.as_f64(), Some(x));
        }
    }
}
