use anyhow::Context;
use std::sync::Arc;

use crate::module::{InitCtx, Module};

/// Identity modules run before feature modules and stop after them
const CORE_MODULE_ORDER: &[&str] = &[
    "auth",    // Sessions must exist before anything checks them
    "profile", // User directory
];

/// Module registry for managing module lifecycle with core/feature separation
pub struct ModuleRegistry {
    core_modules: Vec<Arc<dyn Module>>,
    feature_modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new module registry
    pub fn new() -> Self {
        Self {
            core_modules: Vec::new(),
            feature_modules: Vec::new(),
        }
    }

    /// Register a module. Names listed in the core order are kept apart so
    /// they can be driven in that order regardless of registration order.
    pub fn register(&mut self, module: Arc<dyn Module>) {
        if CORE_MODULE_ORDER.contains(&module.name()) {
            self.core_modules.push(module);
        } else {
            self.feature_modules.push(module);
        }
    }

    /// Get all registered modules, core modules first in their fixed order
    pub fn modules(&self) -> Vec<&Arc<dyn Module>> {
        let mut all_modules: Vec<&Arc<dyn Module>> = CORE_MODULE_ORDER
            .iter()
            .filter_map(|name| self.core_modules.iter().find(|m| m.name() == *name))
            .collect();
        all_modules.extend(self.feature_modules.iter());
        all_modules
    }

    /// Get a module by name
    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.core_modules
            .iter()
            .chain(self.feature_modules.iter())
            .find(|module| module.name() == name)
    }

    pub fn core_module_count(&self) -> usize {
        self.core_modules.len()
    }

    pub fn feature_module_count(&self) -> usize {
        self.feature_modules.len()
    }

    /// Initialize every module, core modules first
    pub async fn init_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("initializing modules, core order: {:?}", CORE_MODULE_ORDER);

        for module in self.modules() {
            tracing::info!(module = module.name(), "initializing module");

            module
                .init(ctx)
                .await
                .with_context(|| format!("failed to initialize module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Start every module, core modules first
    pub async fn start_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("starting {} modules", self.modules().len());

        for module in self.modules() {
            tracing::info!(module = module.name(), "starting module");

            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Stop every module in reverse start order
    pub async fn stop_all(&self) -> anyhow::Result<()> {
        tracing::info!("stopping modules in reverse order");

        for module in self.modules().into_iter().rev() {
            tracing::info!(module = module.name(), "stopping module");

            module
                .stop()
                .await
                .with_context(|| format!("failed to stop module '{}'", module.name()))?;
        }

        Ok(())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
