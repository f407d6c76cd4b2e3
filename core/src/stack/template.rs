use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{DeployError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackParameter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTag {
    pub key: String,
    pub value: String,
}

/// Where the template body comes from when a stack is created or updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Url(String),
    Body(String),
}

/// A deployable stack: name, template location and its parameters and tags.
///
/// Parameter and tag keys are unique. Setting a key again replaces the value
/// in place and keeps the original position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTemplate {
    name: String,
    template_path: String,
    parameters: Vec<StackParameter>,
    tags: Vec<StackTag>,
}

impl StackTemplate {
    pub fn new(name: impl Into<String>, template_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_path: template_path.into(),
            parameters: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template_path(&self) -> &str {
        &self.template_path
    }

    pub fn parameters(&self) -> &[StackParameter] {
        &self.parameters
    }

    pub fn tags(&self) -> &[StackTag] {
        &self.tags
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert_parameter(&mut self.parameters, key.into(), value.into());
        self
    }

    pub fn with_parameters<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            upsert_parameter(&mut self.parameters, key.into(), value.into());
        }
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert_tag(&mut self.tags, key.into(), value.into());
        self
    }

    pub fn with_tags<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            upsert_tag(&mut self.tags, key.into(), value.into());
        }
        self
    }

    /// Paths starting with `http` are passed to the provider as a URL, all
    /// other paths are read from disk and sent as the template body.
    pub async fn load_source(&self) -> Result<TemplateSource> {
        if self.template_path.starts_with("http") {
            return Ok(TemplateSource::Url(self.template_path.clone()));
        }
        tokio::fs::read_to_string(&self.template_path)
            .await
            .map(TemplateSource::Body)
            .map_err(|source| DeployError::TemplateUnreadable {
                path: Path::new(&self.template_path).to_path_buf(),
                source,
            })
    }
}

/// Build a [`StackTemplate`] in one expression.
///
/// ```
/// use deckhand_core::stack::stack;
///
/// let template = stack("Api", "templates/api.yaml", |s| {
///     s.parameters(|p| {
///         p.put("Stage", "prod");
///     });
///     s.tags(|t| {
///         t.put("team", "platform");
///     });
/// });
/// assert_eq!(template.parameters().len(), 1);
/// ```
pub fn stack(
    name: impl Into<String>,
    template_path: impl Into<String>,
    configure: impl FnOnce(&mut StackBuilder),
) -> StackTemplate {
    let mut builder = StackBuilder {
        template: StackTemplate::new(name, template_path),
    };
    configure(&mut builder);
    builder.template
}

pub struct StackBuilder {
    template: StackTemplate,
}

impl StackBuilder {
    pub fn parameters(&mut self, configure: impl FnOnce(&mut Entries<'_>)) {
        let mut entries = Entries {
            target: EntryTarget::Parameters(&mut self.template.parameters),
        };
        configure(&mut entries);
    }

    pub fn tags(&mut self, configure: impl FnOnce(&mut Entries<'_>)) {
        let mut entries = Entries {
            target: EntryTarget::Tags(&mut self.template.tags),
        };
        configure(&mut entries);
    }
}

enum EntryTarget<'a> {
    Parameters(&'a mut Vec<StackParameter>),
    Tags(&'a mut Vec<StackTag>),
}

/// Key/value sink handed to the closures of [`StackBuilder`].
pub struct Entries<'a> {
    target: EntryTarget<'a>,
}

impl Entries<'_> {
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        match &mut self.target {
            EntryTarget::Parameters(list) => upsert_parameter(list, key.into(), value.into()),
            EntryTarget::Tags(list) => upsert_tag(list, key.into(), value.into()),
        }
        self
    }

    pub fn put_all<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.put(key, value);
        }
        self
    }
}

fn upsert_parameter(list: &mut Vec<StackParameter>, key: String, value: String) {
    match list.iter_mut().find(|p| p.key == key) {
        Some(existing) => existing.value = value,
        None => list.push(StackParameter { key, value }),
    }
}

fn upsert_tag(list: &mut Vec<StackTag>, key: String, value: String) {
    match list.iter_mut().find(|t| t.key == key) {
        Some(existing) => existing.value = value,
        None => list.push(StackTag { key, value }),
    }
}
