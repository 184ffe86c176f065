//! Host page access used during bootstrap and mounting.

use std::collections::HashMap;

/// Read-only view of the embedding page's elements
pub trait HostPage: Send + Sync {
    /// Attribute value of the element with the given id
    fn attribute(&self, element_id: &str, name: &str) -> Option<String>;

    /// Whether an element with the given id exists
    fn has_element(&self, element_id: &str) -> bool;
}

/// In-memory host page
#[derive(Debug, Clone, Default)]
pub struct StaticPage {
    elements: HashMap<String, HashMap<String, String>>,
}

impl StaticPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element without attributes
    pub fn with_element(mut self, id: &str) -> Self {
        self.add_element(id);
        self
    }

    /// Add an embed script element carrying a `data-config` attribute
    pub fn with_script(mut self, id: &str, data_config: &str) -> Self {
        self.set_attribute(id, "data-config", data_config);
        self
    }

    pub fn add_element(&mut self, id: &str) {
        self.elements.entry(id.to_string()).or_default();
    }

    pub fn set_attribute(&mut self, id: &str, name: &str, value: &str) {
        self.elements
            .entry(id.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    pub fn element_ids(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }
}

impl HostPage for StaticPage {
    fn attribute(&self, element_id: &str, name: &str) -> Option<String> {
        self.elements.get(element_id)?.get(name).cloned()
    }

    fn has_element(&self, element_id: &str) -> bool {
        self.elements.contains_key(element_id)
    }
}
