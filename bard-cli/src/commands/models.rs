use anyhow::Result;
use client::{ModelAvailability, ModelsChecker, SessionController, models::NO_MODELS_HINT};
use shared::models::ModelDescriptor;

pub(crate) fn warn_no_models() {
    eprintln!("warning: No models found. {NO_MODELS_HINT}");
}

pub(crate) fn model_line(model: &ModelDescriptor, selected: Option<&str>) -> String {
    let marker = if selected == Some(model.identifier.as_str()) {
        '*'
    } else {
        ' '
    };
    if model.name == model.identifier {
        format!("{marker} {}", model.identifier)
    } else {
        format!("{marker} {} ({})", model.identifier, model.name)
    }
}

/// Prints the model inventory, marking the one chat would use by default.
pub async fn list_models(controller: &SessionController, default_model: &str) -> Result<()> {
    let models = controller.models().await;
    if ModelsChecker::check(&models) == ModelAvailability::NoneFound {
        warn_no_models();
        return Ok(());
    }

    let selected = ModelsChecker::select(&models, default_model);
    for model in models.iter() {
        println!("{}", model_line(model, selected));
    }
    Ok(())
}
