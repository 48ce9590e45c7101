use serde_json::Value;
use tracing::{debug, error};

use crate::datatype::Datatype;
use crate::error::{PanelError, Result};
use crate::field::{Field, FieldRegistry, Options};
use crate::protocol::{ClientMessage, Handle, VariableDescriptor, update_message};

/// Everything the host needs to attach one variable's wrapper and field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldView {
    pub handle: Handle,
    pub name: String,
    pub description: Option<String>,
    pub datatype: Datatype,
    pub attributes: Options,
    pub text: String,
}

/// One tunable variable and the field that presents it.
#[derive(Debug)]
pub struct Variable {
    handle: Handle,
    name: String,
    datatype: Datatype,
    description: Option<String>,
    options: Options,
    value: Option<Value>,
    field: Option<Box<dyn Field>>,
}

impl Variable {
    /// Creates a variable from its first descriptor. A datatype is required.
    pub fn from_descriptor(handle: Handle, descriptor: VariableDescriptor) -> Result<Self> {
        let datatype = descriptor.datatype.ok_or_else(|| {
            PanelError::invalid_entry(format!("hello entry {handle} missing datatype"))
        })?;

        Ok(Self {
            name: descriptor.name.unwrap_or_else(|| handle.to_string()),
            handle,
            datatype,
            description: descriptor.description,
            options: descriptor.options.unwrap_or_default(),
            value: descriptor.value,
            field: None,
        })
    }

    /// Overwrites every field the descriptor carries.
    ///
    /// The datatype is immutable once a field exists: a differing datatype is
    /// a backend bug, fatal in debug builds and ignored otherwise.
    pub fn merge(&mut self, descriptor: VariableDescriptor) -> Result<()> {
        if let Some(datatype) = descriptor.datatype {
            if datatype != self.datatype {
                if self.field.is_some() {
                    debug_assert!(
                        false,
                        "datatype of {} changed from {} to {}",
                        self.handle, self.datatype, datatype
                    );
                    error!(handle = %self.handle, from = %self.datatype, to = %datatype, "datatype change ignored");
                    return Err(PanelError::DatatypeChanged {
                        handle: self.handle.clone(),
                        from: self.datatype.clone(),
                        to: datatype,
                    });
                }
                self.datatype = datatype;
            }
        }

        if let Some(name) = descriptor.name {
            self.name = name;
        }
        if let Some(description) = descriptor.description {
            self.description = Some(description);
        }
        if let Some(options) = descriptor.options {
            self.options = options;
        }
        if let Some(value) = descriptor.value {
            self.value = Some(value);
        }
        Ok(())
    }

    /// Builds the field on first call and returns the view to attach.
    /// Later calls return `Ok(None)`.
    pub fn render(&mut self, registry: &FieldRegistry) -> Result<Option<FieldView>> {
        if self.field.is_some() {
            return Ok(None);
        }

        let mut field = registry.create(&self.datatype, &self.options)?;
        if let Some(value) = &self.value {
            if let Err(source) = field.unserialize(value) {
                debug!(handle = %self.handle, %source, "initial value not shown");
            }
        }

        let view = FieldView {
            handle: self.handle.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            datatype: self.datatype.clone(),
            attributes: field.filtered_options().clone(),
            text: field.text().to_string(),
        };
        self.field = Some(field);
        Ok(Some(view))
    }

    /// Applies an authoritative value. Never produces an outbound message.
    ///
    /// Returns the text now presented, or `None` when no field exists yet.
    /// A value the field cannot present is rejected and not stored.
    pub fn apply_update(&mut self, value: Value) -> Result<Option<&str>> {
        let Some(field) = self.field.as_mut() else {
            self.value = Some(value);
            return Ok(None);
        };

        field.unserialize(&value).map_err(|source| PanelError::Field {
            handle: self.handle.clone(),
            source,
        })?;
        self.value = Some(value);
        Ok(Some(field.text()))
    }

    /// Records a user commit and builds the matching `update` message.
    pub fn commit_edit(&mut self, text: String) -> Result<ClientMessage> {
        let field = self.field_mut()?;
        field.input(text);
        self.request_update()
    }

    /// Builds an `update` carrying what the field serializes right now.
    pub fn request_update(&self) -> Result<ClientMessage> {
        let field = self
            .field
            .as_ref()
            .ok_or_else(|| PanelError::UnknownDatatype(self.datatype.clone()))?;
        let value = field.serialize().map_err(|source| PanelError::Field {
            handle: self.handle.clone(),
            source,
        })?;
        Ok(update_message(self.handle.clone(), value))
    }

    /// Puts the last authoritative value back into the field, discarding
    /// a rejected local edit.
    pub fn revert(&mut self) -> Option<&str> {
        let value = self.value.as_ref()?;
        let field = self.field.as_mut()?;
        field.unserialize(value).ok()?;
        Some(field.text())
    }

    fn field_mut(&mut self) -> Result<&mut Box<dyn Field>> {
        let datatype = self.datatype.clone();
        self.field
            .as_mut()
            .ok_or(PanelError::UnknownDatatype(datatype))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn field(&self) -> Option<&dyn Field> {
        self.field.as_deref()
    }

    pub fn is_rendered(&self) -> bool {
        self.field.is_some()
    }
}
