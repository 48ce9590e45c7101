use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Field, NumericField, Options};
use crate::datatype::Datatype;
use crate::error::{PanelError, Result};

pub type FieldFactory = Arc<dyn Fn(&Datatype, &Options) -> Box<dyn Field> + Send + Sync>;

/// Maps a datatype to the constructor of its field.
///
/// Owned by one session; there is no process-wide registry.
#[derive(Clone, Default)]
pub struct FieldRegistry {
    factories: HashMap<Datatype, FieldFactory>,
}

impl FieldRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in numeric field installed.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.install_defaults();
        registry
    }

    /// Installs the numeric field for numeric datatypes nobody has claimed
    /// yet. Host registrations are never replaced.
    pub fn install_defaults(&mut self) {
        let missing: Vec<Datatype> = Datatype::NUMERIC
            .into_iter()
            .filter(|datatype| !self.contains(datatype))
            .collect();
        self.register(missing, numeric_factory);
    }

    /// Registers `factory` for every datatype given. A later registration
    /// for the same datatype replaces the earlier one.
    pub fn register<I, F>(&mut self, datatypes: I, factory: F)
    where
        I: IntoIterator<Item = Datatype>,
        F: Fn(&Datatype, &Options) -> Box<dyn Field> + Send + Sync + 'static,
    {
        let factory: FieldFactory = Arc::new(factory);
        for datatype in datatypes {
            self.factories.insert(datatype, factory.clone());
        }
    }

    pub fn create(&self, datatype: &Datatype, options: &Options) -> Result<Box<dyn Field>> {
        self.factories
            .get(datatype)
            .map(|factory| factory(datatype, options))
            .ok_or_else(|| PanelError::UnknownDatatype(datatype.clone()))
    }

    #[must_use]
    pub fn contains(&self, datatype: &Datatype) -> bool {
        self.factories.contains_key(datatype)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

fn numeric_factory(datatype: &Datatype, options: &Options) -> Box<dyn Field> {
    Box::new(NumericField::new(datatype.clone(), options))
}

impl fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut datatypes: Vec<&str> = self.factories.keys().map(Datatype::name).collect();
        datatypes.sort_unstable();
        f.debug_struct("FieldRegistry")
            .field("datatypes", &datatypes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use serde_json::{Value, json};

    #[derive(Debug)]
    struct LabelField {
        datatype: Datatype,
        options: Options,
        text: String,
    }

    impl Field for LabelField {
        fn datatype(&self) -> &Datatype {
            &self.datatype
        }

        fn filtered_options(&self) -> &Options {
            &self.options
        }

        fn text(&self) -> &str {
            &self.text
        }

        fn serialize(&self) -> std::result::Result<Value, FieldError> {
            Ok(Value::String(self.text.clone()))
        }

        fn unserialize(&mut self, value: &Value) -> std::result::Result<(), FieldError> {
            self.text = value.to_string();
            Ok(())
        }

        fn input(&mut self, text: String) {
            self.text = text;
        }
    }

    fn label_factory(datatype: &Datatype, _options: &Options) -> Box<dyn Field> {
        Box::new(LabelField {
            datatype: datatype.clone(),
            options: Options::new(),
            text: String::new(),
        })
    }

    #[test]
    fn defaults_cover_numeric_datatypes_only() {
        let registry = FieldRegistry::with_defaults();
        assert_eq!(registry.len(), 3);
        for datatype in Datatype::NUMERIC {
            assert!(registry.contains(&datatype));
        }
        assert!(!registry.contains(&Datatype::Time));
    }

    #[test]
    fn create_passes_datatype_and_options_to_factory() {
        let registry = FieldRegistry::with_defaults();
        let options = json!({"min": 1, "colour": "red"})
            .as_object()
            .cloned()
            .expect("object");

        let field = registry
            .create(&Datatype::Double, &options)
            .expect("double field");
        assert_eq!(field.datatype(), &Datatype::Double);
        assert_eq!(field.filtered_options().len(), 1);
    }

    #[test]
    fn unknown_datatype_is_reported() {
        let registry = FieldRegistry::with_defaults();
        let err = registry
            .create(&Datatype::Other("color".to_string()), &Options::new())
            .expect_err("no factory");
        assert!(matches!(err, PanelError::UnknownDatatype(Datatype::Other(_))));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = FieldRegistry::with_defaults();
        registry.register([Datatype::Float, Datatype::Time], label_factory);

        let mut field = registry
            .create(&Datatype::Float, &Options::new())
            .expect("float field");
        field.input("x".to_string());
        assert_eq!(field.serialize().expect("serialize"), json!("x"));

        assert!(registry.create(&Datatype::Time, &Options::new()).is_ok());
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn defaults_fill_gaps_without_replacing_host_fields() {
        let mut registry = FieldRegistry::new();
        registry.register([Datatype::Integer], label_factory);
        registry.install_defaults();

        assert_eq!(registry.len(), 3);
        let mut field = registry
            .create(&Datatype::Integer, &Options::new())
            .expect("integer field");
        field.input("seven".to_string());
        assert_eq!(field.serialize().expect("serialize"), json!("seven"));
    }
}
