//! Entity registry backed by a JSON model file

use metasync_core::{model_from_json, EntityModel, EntityRegistry, ModelError};
use std::path::{Path, PathBuf};

/// Reads declared entities from a JSON array on disk
pub struct JsonFileRegistry {
    path: PathBuf,
    model: EntityModel,
}

impl JsonFileRegistry {
    /// Load the model file once
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let mut registry = Self {
            path: path.to_path_buf(),
            model: EntityModel::new(),
        };
        registry.reload()?;
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntityRegistry for JsonFileRegistry {
    fn get_all_entities(&self) -> EntityModel {
        self.model.clone()
    }

    fn reload(&mut self) -> Result<(), ModelError> {
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            ModelError::LoadError(format!("{}: {}", self.path.display(), e))
        })?;
        self.model = model_from_json(&json)?;
        tracing::debug!(path = %self.path.display(), entities = self.model.len(), "Loaded entity model");
        Ok(())
    }
}
