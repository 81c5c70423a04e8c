//! Named stage factories.
//!
//! A [`StageSpec`] describes a stage by factory name plus JSON arguments,
//! so it can be constructed later or in another process. Stages that hold
//! resources which cannot cross a process boundary are always built from a
//! spec inside the worker that will run them.

use crate::error::{FrameChainError, Result};
use crate::pipeline::stage::Stage;
use crate::pipeline::stages::{Inlay, InlayConfig, SbsConfig, SideBySide};
use crate::processors::{SlowDetector, SlowDetectorConfig};
use crate::sources::{ImageFile, ImageFileConfig, TestPattern, TestPatternConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a stage from its JSON arguments.
pub type StageFactory = Arc<dyn Fn(&Value) -> Result<Box<dyn Stage>> + Send + Sync>;

/// Factory name plus constructor arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub factory: String,
    #[serde(default)]
    pub args: Value,
}

impl StageSpec {
    /// Spec with serialised arguments.
    pub fn new(factory: impl Into<String>, args: impl Serialize) -> Result<Self> {
        Ok(Self {
            factory: factory.into(),
            args: serde_json::to_value(args)?,
        })
    }

    /// Spec with no arguments; the factory uses its defaults.
    pub fn bare(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            args: Value::Null,
        }
    }
}

/// Lookup table from factory name to constructor.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every stage shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_config::<TestPatternConfig, _>("test_pattern", TestPattern::from_config);
        registry.register_config::<ImageFileConfig, _>("image_file", ImageFile::from_config);
        registry
            .register_config::<SlowDetectorConfig, _>("slow_detector", SlowDetector::from_config);
        registry.register_config::<InlayConfig, _>("inlay", Inlay::from_config);
        registry.register_config::<SbsConfig, _>("sbs", SideBySide::from_config);
        registry
    }

    /// Register a raw factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Stage>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register a factory taking a typed config deserialised from the args.
    /// Null args yield the config's defaults.
    pub fn register_config<C, S>(&mut self, name: &str, build: fn(C) -> S)
    where
        C: DeserializeOwned + Default + 'static,
        S: Stage + 'static,
    {
        let factory_name = name.to_string();
        self.register(name, move |args: &Value| {
            let config = parse_args::<C>(&factory_name, args)?;
            Ok(Box::new(build(config)) as Box<dyn Stage>)
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered factory names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the stage described by `spec`.
    pub fn build(&self, spec: &StageSpec) -> Result<Box<dyn Stage>> {
        let factory = self.factories.get(&spec.factory).ok_or_else(|| {
            FrameChainError::Config(format!("Unknown stage factory '{}'", spec.factory))
        })?;
        let stage = factory(&spec.args)?;
        tracing::debug!("Built stage '{}' from factory '{}'", stage.name(), spec.factory);
        Ok(stage)
    }
}

fn parse_args<C: DeserializeOwned + Default>(factory: &str, args: &Value) -> Result<C> {
    if args.is_null() {
        return Ok(C::default());
    }
    serde_json::from_value(args.clone()).map_err(|e| {
        FrameChainError::Config(format!("Invalid arguments for '{}': {}", factory, e))
    })
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("factories", &self.names())
            .finish()
    }
}
