use slint::{Model, ModelRc, SharedString, VecModel};
use tracing::warn;
use tweak_panel_runtime::{ConnectionStatus, FieldView, HostBindings, Options, Progress};

use crate::{AppWindow, VariableRow};

/// Attribute keys shown as the editor's placeholder, in display order.
const HINT_KEYS: [&str; 3] = ["min", "max", "step"];

pub struct PanelWindow;

impl HostBindings for PanelWindow {
    type Ui = AppWindow;

    fn new_ui() -> Result<Self::Ui, slint::PlatformError> {
        let ui = AppWindow::new()?;
        ui.set_variables(ModelRc::new(VecModel::<VariableRow>::default()));
        Ok(ui)
    }

    fn bind_field_committed<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(String, String) + Send + 'static,
    {
        ui.on_field_committed(move |key, text| {
            handler(key.to_string(), text.to_string());
        });
    }

    fn bind_reconnect<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn() + Send + 'static,
    {
        ui.on_reconnect(move || handler());
    }

    fn attach_variable(ui: &Self::Ui, view: &FieldView) {
        let model = ui.get_variables();
        let Some(rows) = model.as_any().downcast_ref::<VecModel<VariableRow>>() else {
            warn!("variable model is not a VecModel; row dropped");
            return;
        };

        let row = row_from_view(view);
        match find_row(rows, &row.key) {
            Some(index) => rows.set_row_data(index, row),
            None => rows.push(row),
        }
    }

    fn show_value(ui: &Self::Ui, key: &str, text: &str) {
        let model = ui.get_variables();
        let Some(rows) = model.as_any().downcast_ref::<VecModel<VariableRow>>() else {
            return;
        };
        let Some(index) = find_row(rows, key) else {
            warn!(key, "value for unattached field ignored");
            return;
        };
        if let Some(mut row) = rows.row_data(index) {
            row.text = text.into();
            row.revision = row.revision.wrapping_add(1);
            rows.set_row_data(index, row);
        }
    }

    fn set_status(ui: &Self::Ui, status: ConnectionStatus) {
        ui.set_status_label(status.label().into());
        ui.set_can_reconnect(status.can_reconnect());
    }

    fn set_progress(ui: &Self::Ui, progress: &Progress) {
        ui.set_progress(f32::from(progress.percent) / 100.0);
        ui.set_progress_label(format!("{}...", progress.label).into());
    }

    fn show_failure(ui: &Self::Ui, message: &str) {
        ui.set_failure(message.into());
        ui.set_can_reconnect(false);
    }

    fn reveal_panel(ui: &Self::Ui) {
        ui.set_panel_visible(true);
    }
}

fn find_row(rows: &VecModel<VariableRow>, key: &str) -> Option<usize> {
    rows.iter().position(|row| row.key == key)
}

fn row_from_view(view: &FieldView) -> VariableRow {
    VariableRow {
        key: view.handle.key().into(),
        name: view.name.as_str().into(),
        description: view.description.as_deref().unwrap_or_default().into(),
        datatype: view.datatype.name().into(),
        hint: attribute_hint(&view.attributes),
        text: view.text.as_str().into(),
        revision: 0,
    }
}

/// `min 0, max 10, step 0.5` for whichever attributes are present.
fn attribute_hint(attributes: &Options) -> SharedString {
    HINT_KEYS
        .iter()
        .filter_map(|key| attributes.get(*key).map(|value| format!("{key} {value}")))
        .collect::<Vec<_>>()
        .join(", ")
        .into()
}
