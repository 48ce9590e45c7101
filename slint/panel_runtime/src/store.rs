use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::error::{PanelError, Result};
use crate::field::FieldRegistry;
use crate::protocol::{ClientMessage, Handle, ValueEntry, VariableDescriptor};
use crate::session::Command;
use crate::variable::Variable;

/// Result of applying one batch. Entries fail independently.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub commands: Vec<Command>,
    pub issues: Vec<PanelError>,
}

impl BatchOutcome {
    fn record(&mut self, result: Result<Option<Command>>) {
        match result {
            Ok(Some(command)) => self.commands.push(command),
            Ok(None) => {}
            Err(issue) => self.issues.push(issue),
        }
    }
}

/// Handle to variable mapping. `hello` is the only way in; nothing is ever
/// removed.
#[derive(Debug, Default)]
pub struct VariableStore {
    vars: HashMap<Handle, Variable>,
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or merges each entry, then renders it or shows its value.
    pub fn apply_hello(&mut self, entries: Vec<Value>, registry: &FieldRegistry) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for entry in entries {
            let result = self.apply_hello_entry(entry, registry);
            outcome.record(result);
        }
        outcome
    }

    fn apply_hello_entry(
        &mut self,
        entry: Value,
        registry: &FieldRegistry,
    ) -> Result<Option<Command>> {
        let (handle, mut descriptor) = VariableDescriptor::from_entry(entry)?;

        // A rendered variable takes a new value only once its field accepts it.
        let mut incoming = None;
        let var = match self.vars.entry(handle) {
            Entry::Occupied(entry) => {
                let existing = entry.into_mut();
                if existing.is_rendered() {
                    incoming = descriptor.value.take();
                }
                existing.merge(descriptor)?;
                existing
            }
            Entry::Vacant(entry) => {
                let created = Variable::from_descriptor(entry.key().clone(), descriptor)?;
                entry.insert(created)
            }
        };

        if !var.is_rendered() {
            return Ok(var.render(registry)?.map(Command::Render));
        }

        match incoming.or_else(|| var.value().cloned()) {
            Some(value) => show_value(var, value),
            None => Ok(None),
        }
    }

    /// Pushes new values into known variables. Never creates one.
    pub fn apply_refresh(&mut self, entries: Vec<Value>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for entry in entries {
            let result = self.apply_refresh_entry(entry);
            outcome.record(result);
        }
        outcome
    }

    fn apply_refresh_entry(&mut self, entry: Value) -> Result<Option<Command>> {
        let ValueEntry { handle, value } = ValueEntry::from_entry(entry)?;
        let var = self
            .vars
            .get_mut(&handle)
            .ok_or(PanelError::UnknownHandle(handle))?;
        show_value(var, value)
    }

    /// Turns a committed edit into an `update`.
    ///
    /// When the edit cannot be serialized the field is reverted and the
    /// returned command restores the presented text.
    pub fn commit_edit(
        &mut self,
        key: &str,
        text: String,
    ) -> std::result::Result<ClientMessage, (PanelError, Option<Command>)> {
        let Some(handle) = self.resolve(key) else {
            let handle = Handle::from_key(key).unwrap_or_else(|| Handle::from(key));
            return Err((PanelError::UnknownHandle(handle), None));
        };
        let Some(var) = self.vars.get_mut(&handle) else {
            return Err((PanelError::UnknownHandle(handle), None));
        };

        var.commit_edit(text).map_err(|issue| {
            let restore = var.revert().map(|text| Command::ShowValue {
                handle: handle.clone(),
                text: text.to_string(),
            });
            (issue, restore)
        })
    }

    /// Maps a host key from [`Handle::key`] back to a stored handle.
    pub fn resolve(&self, key: &str) -> Option<Handle> {
        Handle::from_key(key).filter(|handle| self.vars.contains_key(handle))
    }

    pub fn get(&self, handle: &Handle) -> Option<&Variable> {
        self.vars.get(handle)
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.vars.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

}

fn show_value(var: &mut Variable, value: Value) -> Result<Option<Command>> {
    let handle = var.handle().clone();
    Ok(var
        .apply_update(value)?
        .map(|text| Command::ShowValue {
            handle,
            text: text.to_string(),
        }))
}
