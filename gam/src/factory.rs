use std::collections::HashMap;

use reflex_config::Node;
use reflex_error::{Error, Result};

use crate::Gam;

/// Constructs a module from its configuration node.
pub type GamBuilder = fn(&Node) -> Result<Box<dyn Gam>>;

/// Explicit class-name-to-constructor registry, injected into the
/// application builder. There is no ambient global registry.
#[derive(Default)]
pub struct GamFactory {
    builders: HashMap<String, GamBuilder>,
}

impl GamFactory {
    pub fn new() -> Self {
        GamFactory::default()
    }

    /// Registers a class. Registering the same name twice is refused.
    pub fn register(&mut self, class: &str, builder: GamBuilder) -> Result<()> {
        if self.builders.insert(class.to_owned(), builder).is_some() {
            return Err(Error::parameters(format!(
                "module class {class} is already registered"
            )));
        }
        Ok(())
    }

    pub fn build(&self, class: &str, parameters: &Node) -> Result<Box<dyn Gam>> {
        let builder = self.builders.get(class).ok_or_else(|| {
            Error::initialisation(format!("unknown module class {class}"))
        })?;
        builder(parameters)
    }
}
