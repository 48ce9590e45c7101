//! Datatype-specific presentation strategies.
//!
//! A [`Field`] owns the presentation text of one variable and converts
//! between that text and the wire value. Two write paths exist and must stay
//! distinct: [`Field::unserialize`] applies an authoritative value and never
//! produces outbound traffic, while [`Field::input`] records a user commit
//! that the owning variable turns into an `update` message.

mod numeric;
mod registry;

pub use numeric::NumericField;
pub use registry::{FieldFactory, FieldRegistry};

use serde_json::{Map, Value};
use std::fmt;

use crate::datatype::Datatype;
use crate::error::FieldError;

pub type Options = Map<String, Value>;

pub trait Field: fmt::Debug + Send {
    fn datatype(&self) -> &Datatype;

    /// Option keys this field variant understands.
    fn allowed_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// The variable's options intersected with [`Field::allowed_attributes`],
    /// captured at construction.
    fn filtered_options(&self) -> &Options;

    /// Current presentation text.
    fn text(&self) -> &str;

    /// Reads presentation state into a wire value.
    fn serialize(&self) -> Result<Value, FieldError>;

    /// Writes a wire value into presentation state without notifying.
    fn unserialize(&mut self, value: &Value) -> Result<(), FieldError>;

    /// Records a committed user edit.
    fn input(&mut self, text: String);
}

/// Keeps only the allowed keys of `options`; anything else is dropped.
pub fn filter_attributes(allowed: &[&str], options: &Options) -> Options {
    options
        .iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
