//! Model registry
//!
//! Cached list of model identifiers available on the inference server.
//! The server holds the authoritative list; this cache is refreshed from it,
//! mutated through it, and mirrored to a flat file.

pub mod persistence;

use crate::error::AppError;
use crate::history::{HistoryStore, UserId};
use crate::inference::OllamaClient;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub use persistence::ModelListFile;

/// Parameters for creating a model
#[derive(Debug, Clone, Default)]
pub struct CreateModelSpec {
    /// Requested name; spaces become underscores
    pub name: String,
    /// System prompt baked into the model
    pub system_prompt: String,
    /// Model to derive from
    pub base_model: String,
    /// Full modelfile; when non-empty it is sent as-is
    pub modelfile: Option<String>,
    /// Sampling temperature baked into the model
    pub temperature: f32,
}

/// Normalize a user-supplied model name
pub fn normalize_name(name: &str) -> String {
    name.trim().replace(' ', "_")
}

/// Build a modelfile from its parts
pub fn build_modelfile(base_model: &str, system_prompt: &str, temperature: f32) -> String {
    let mut lines = Vec::with_capacity(3);
    if !base_model.trim().is_empty() {
        lines.push(format!("FROM {}", base_model.trim()));
    }
    lines.push(format!("SYSTEM \"\"\"{}\"\"\"", system_prompt));
    lines.push(format!("PARAMETER temperature {}", temperature));
    lines.join("\n")
}

/// Shared, lock-guarded cache of model names
pub struct ModelRegistry {
    models: RwLock<Vec<String>>,
    // Serializes refresh/create/delete across their network call
    write_lock: Mutex<()>,
    client: Arc<OllamaClient>,
    store: ModelListFile,
    default_model: String,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new(client: Arc<OllamaClient>, store: ModelListFile, default_model: String) -> Self {
        Self {
            models: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
            client,
            store,
            default_model,
        }
    }

    /// Model used for users without history
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Snapshot of the cached names
    pub async fn list(&self) -> Vec<String> {
        self.models.read().await.clone()
    }

    /// Whether `name` is cached
    pub async fn contains(&self, name: &str) -> bool {
        self.models.read().await.iter().any(|m| m == name)
    }

    /// Cached names containing `query`, case-insensitive (autocomplete)
    pub async fn matching(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        self.models
            .read()
            .await
            .iter()
            .filter(|m| m.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    /// Populate the cache from the model list file
    ///
    /// # Returns
    /// * Number of names loaded
    pub async fn load_cached(&self) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let models = self.store.load().await?;
        let count = models.len();
        *self.models.write().await = models;
        Ok(count)
    }

    /// Make sure at least the default model is listed
    pub async fn seed_default(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut models = self.models.write().await;
        if models.is_empty() {
            models.push(self.default_model.clone());
            self.store.save(&models).await?;
        }
        Ok(())
    }

    /// Replace the cache with the server's listing
    ///
    /// On failure the previous set is left untouched.
    pub async fn refresh(&self) -> Result<Vec<String>, AppError> {
        let _guard = self.write_lock.lock().await;
        let models = self.client.list_models().await?;

        self.store.save(&models).await?;
        *self.models.write().await = models.clone();

        info!(count = models.len(), "Model list refreshed");
        Ok(models)
    }

    /// Create a model on the server and add it to the cache
    ///
    /// Validation happens before any network call.
    ///
    /// # Returns
    /// * The normalized name of the created model
    pub async fn create(&self, spec: CreateModelSpec) -> Result<String, AppError> {
        if spec.name.trim().is_empty() {
            return Err(AppError::Validation("Model name cannot be empty.".to_string()));
        }
        let name = normalize_name(&spec.name);

        let _guard = self.write_lock.lock().await;
        if self.contains(&name).await {
            return Err(AppError::Validation(format!(
                "A model with the name '{}' already exists.",
                name
            )));
        }

        let modelfile = match spec.modelfile.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => custom.to_string(),
            _ => build_modelfile(&spec.base_model, &spec.system_prompt, spec.temperature),
        };

        self.client.create_model(&name, &modelfile).await?;

        let snapshot = {
            let mut models = self.models.write().await;
            models.push(name.clone());
            models.clone()
        };
        self.store.save(&snapshot).await?;

        info!(model = %name, "Model added to registry");
        Ok(name)
    }

    /// Delete a model on the server and drop it from the cache
    ///
    /// A name missing from the cache is a `Validation` error; a name the
    /// server does not know is `NotFoundOnServer` and keeps the cache as is.
    pub async fn delete(&self, name: &str) -> Result<String, AppError> {
        let name = normalize_name(name);

        let _guard = self.write_lock.lock().await;
        if !self.contains(&name).await {
            return Err(AppError::Validation(format!("Model '{}' not found.", name)));
        }

        if let Err(e) = self.client.delete_model(&name).await {
            warn!(model = %name, error = %e, "Model deletion failed");
            return Err(e);
        }

        let snapshot = {
            let mut models = self.models.write().await;
            models.retain(|m| m != &name);
            models.clone()
        };
        self.store.save(&snapshot).await?;

        info!(model = %name, "Model removed from registry");
        Ok(name)
    }

    /// Model the user talked to most recently, or the default model
    pub async fn current_for(
        &self,
        history: &HistoryStore,
        user_id: UserId,
    ) -> Result<String, AppError> {
        Ok(history
            .last_model_for_user(user_id)
            .await?
            .unwrap_or_else(|| self.default_model.clone()))
    }
}
