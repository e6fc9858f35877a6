//! Localized prompt templates.
//!
//! Templates are grouped by purpose (e.g. `rag`) and keyed by name within a
//! group. Each language ships as an embedded TOML file:
//!
//! ```toml
//! [rag]
//! footer_prompt = "## Question:\n{{query}}"
//! ```
//!
//! Lookups try the primary language first, then the fallback language.
//! Rendering is strict: a variable referenced by a template but absent from
//! the supplied values is an error, never an empty string.

use std::collections::HashMap;

use handlebars::{no_escape, Handlebars};
use ragline_config::TemplateConfig;
use thiserror::Error;
use tracing::{debug, warn};

/// Locale definitions compiled into the binary.
const BUILTIN_LOCALES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.toml")),
    ("ar", include_str!("../locales/ar.toml")),
];

/// Template groups used by the retrieval pipeline.
pub mod keys {
    pub const RAG_GROUP: &str = "rag";
    pub const SYSTEM_PROMPT: &str = "system_prompt";
    pub const DOCUMENT_PROMPT: &str = "document_prompt";
    pub const FOOTER_PROMPT: &str = "footer_prompt";
}

#[derive(Debug, Error)]
pub enum TemplateError {
    /// The fallback language has no definitions at all.
    #[error("No templates defined for language '{0}'")]
    UnknownLanguage(String),

    /// A locale file is not a `group -> key -> string` table.
    #[error("Invalid template definitions for '{lang}': {message}")]
    InvalidDefinition { lang: String, message: String },

    #[error("Template {group}.{key} not found for '{primary}' or '{fallback}'")]
    NotFound {
        group: String,
        key: String,
        primary: String,
        fallback: String,
    },

    /// Template text failed to parse or referenced a missing variable.
    #[error("Failed to render template {group}.{key}: {message}")]
    Render {
        group: String,
        key: String,
        message: String,
    },
}

type Groups = HashMap<String, HashMap<String, String>>;

/// Read-only catalog of templates, built once at startup.
pub struct TemplateCatalog {
    primary: String,
    fallback: String,
    locales: HashMap<String, Groups>,
    engine: Handlebars<'static>,
}

impl TemplateCatalog {
    /// Build a catalog from the embedded locales.
    pub fn from_config(config: &TemplateConfig) -> Result<Self, TemplateError> {
        Self::with_definitions(&config.primary_lang, &config.default_lang, BUILTIN_LOCALES)
    }

    /// Build a catalog from `(language, toml)` definitions.
    ///
    /// A primary language without definitions is tolerated (lookups fall
    /// through to the fallback); a fallback without definitions is an error.
    pub fn with_definitions(
        primary: &str,
        fallback: &str,
        definitions: &[(&str, &str)],
    ) -> Result<Self, TemplateError> {
        let mut engine = Handlebars::new();
        engine.set_strict_mode(true);
        engine.register_escape_fn(no_escape);

        let mut locales = HashMap::new();
        for (lang, source) in definitions {
            let groups = parse_locale(lang, source)?;
            for (group, templates) in &groups {
                for (key, template) in templates {
                    engine
                        .register_template_string(&template_name(lang, group, key), template)
                        .map_err(|e| TemplateError::Render {
                            group: group.clone(),
                            key: key.clone(),
                            message: e.to_string(),
                        })?;
                }
            }
            locales.insert(lang.to_string(), groups);
        }

        if !locales.contains_key(fallback) {
            return Err(TemplateError::UnknownLanguage(fallback.to_string()));
        }
        if !locales.contains_key(primary) {
            warn!(
                "No templates for language '{}', using '{}'",
                primary, fallback
            );
        }

        debug!("Loaded template locales: {:?}", locales.keys().collect::<Vec<_>>());

        Ok(Self {
            primary: primary.to_string(),
            fallback: fallback.to_string(),
            locales,
            engine,
        })
    }

    /// Resolve and render `group.key` with `vars`.
    pub fn get(
        &self,
        group: &str,
        key: &str,
        vars: &serde_json::Value,
    ) -> Result<String, TemplateError> {
        let lang = [self.primary.as_str(), self.fallback.as_str()]
            .into_iter()
            .find(|lang| self.has_template(lang, group, key))
            .ok_or_else(|| TemplateError::NotFound {
                group: group.to_string(),
                key: key.to_string(),
                primary: self.primary.clone(),
                fallback: self.fallback.clone(),
            })?;

        self.engine
            .render(&template_name(lang, group, key), vars)
            .map_err(|e| TemplateError::Render {
                group: group.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    pub fn primary_language(&self) -> &str {
        &self.primary
    }

    pub fn fallback_language(&self) -> &str {
        &self.fallback
    }

    /// Languages with at least one template, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.locales.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    fn has_template(&self, lang: &str, group: &str, key: &str) -> bool {
        self.locales
            .get(lang)
            .and_then(|groups| groups.get(group))
            .is_some_and(|templates| templates.contains_key(key))
    }
}

fn template_name(lang: &str, group: &str, key: &str) -> String {
    format!("{}/{}/{}", lang, group, key)
}

fn parse_locale(lang: &str, source: &str) -> Result<Groups, TemplateError> {
    toml::from_str::<Groups>(source).map_err(|e| TemplateError::InvalidDefinition {
        lang: lang.to_string(),
        message: e.to_string(),
    })
}
