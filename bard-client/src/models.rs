use shared::models::ModelDescriptor;
use tracing::{info, warn};

/// Hint shown when the backend reports no models.
pub const NO_MODELS_HINT: &str = "Please check your backend server configuration and make sure \
     that Ollama is running and that the models are loaded.";

/// Whether the backend has anything to generate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelAvailability {
    Available(usize),
    NoneFound,
}

impl ModelAvailability {
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// Inspects a model inventory. An empty inventory is worth a warning, never a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelsChecker;

impl ModelsChecker {
    #[must_use]
    pub fn check(models: &[ModelDescriptor]) -> ModelAvailability {
        if models.is_empty() {
            warn!("no models found on the backend");
            ModelAvailability::NoneFound
        } else {
            info!(count = models.len(), "found backend models");
            ModelAvailability::Available(models.len())
        }
    }

    /// Picks `preferred` when the inventory offers it, otherwise the first model listed.
    #[must_use]
    pub fn select<'a>(models: &'a [ModelDescriptor], preferred: &str) -> Option<&'a str> {
        models
            .iter()
            .find(|model| model.identifier == preferred || model.name == preferred)
            .or_else(|| models.first())
            .map(|model| model.identifier.as_str())
    }
}
