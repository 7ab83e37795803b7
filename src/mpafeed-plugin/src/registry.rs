use std::sync::Arc;

use crate::plugin::{extension_of, InputPlugin, PluginError, PluginResult};

/// The input plugins known to a host, in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn InputPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self.plugins.iter().map(|p| p.info().id).collect();
        f.debug_struct("PluginRegistry").field("plugins", &ids).finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the MPEG plugin over local files.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.plugins.push(Arc::new(crate::MpegInputPlugin::default()));
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn InputPlugin>) -> PluginResult<()> {
        let id = plugin.info().id;
        if self.plugins.iter().any(|p| p.info().id == id) {
            return Err(PluginError::Duplicate(id));
        }
        tracing::debug!(plugin = %id, "registered input plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn plugins(&self) -> &[Arc<dyn InputPlugin>] {
        &self.plugins
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn InputPlugin>> {
        self.plugins.iter().find(|p| p.info().id == id).cloned()
    }

    /// Plugins that advertise `ext` (case-insensitive, without the dot).
    pub fn for_extension(&self, ext: &str) -> Vec<Arc<dyn InputPlugin>> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.plugins
            .iter()
            .filter(|p| p.extensions().iter().any(|e| *e == ext))
            .cloned()
            .collect()
    }

    /// The first plugin that recognizes `location`.
    ///
    /// Plugins claiming the location's extension are asked first, then the
    /// rest in registration order.
    pub fn detect(&self, location: &str) -> Option<Arc<dyn InputPlugin>> {
        let preferred = extension_of(location)
            .map(|ext| self.for_extension(&ext))
            .unwrap_or_default();
        let others = self
            .plugins
            .iter()
            .filter(|p| !preferred.iter().any(|q| Arc::ptr_eq(p, q)))
            .cloned();

        let found = preferred
            .iter()
            .cloned()
            .chain(others)
            .find(|plugin| plugin.is_our_file(location));
        match &found {
            Some(plugin) => tracing::debug!(location, plugin = %plugin.info().id, "detected"),
            None => tracing::debug!(location, "no plugin recognizes location"),
        }
        found
    }

    /// Initializes every plugin; returns the ids and errors of those that
    /// failed.
    pub fn init_all(&self) -> Vec<(String, PluginError)> {
        let mut failures = Vec::new();
        for plugin in &self.plugins {
            if let Err(err) = plugin.init() {
                let id = plugin.info().id;
                tracing::warn!(plugin = %id, "plugin failed to initialize: {err}");
                failures.push((id, err));
            }
        }
        failures
    }

    pub fn cleanup_all(&self) {
        for plugin in self.plugins.iter().rev() {
            plugin.cleanup();
        }
    }
}
