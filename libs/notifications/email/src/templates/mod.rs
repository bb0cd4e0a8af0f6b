//! Email templates with Handlebars
//!
//! This module provides:
//! - `TemplateSource`: where raw template text comes from, keyed by path
//! - `BuiltinTemplates` (compiled-in defaults) and `FsTemplates` (directory)
//! - `TemplateEngine`: the two parsed templates, reply and verification
//!
//! Templates are parsed once when the engine is built. A template that can't
//! be read or parsed fails construction, never a send.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{ReplyTemplateData, VerificationTemplateData};
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

pub const DEFAULT_REPLY_TEMPLATE_PATH: &str = "email_reply.html.tmpl";
pub const DEFAULT_VERIFICATION_TEMPLATE_PATH: &str = "email_confirmation.html.tmpl";

const REPLY_TEMPLATE: &str = "reply";
const VERIFICATION_TEMPLATE: &str = "verification";

/// Source of raw template text
pub trait TemplateSource: Send + Sync {
    /// Read the template stored under `path`.
    fn read(&self, path: &str) -> io::Result<String>;
}

/// Templates compiled into the binary, plus any registered overrides
#[derive(Debug, Clone)]
pub struct BuiltinTemplates {
    templates: HashMap<String, String>,
}

impl BuiltinTemplates {
    pub fn new() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            DEFAULT_REPLY_TEMPLATE_PATH.to_string(),
            include_str!("../../templates/email_reply.html.tmpl").to_string(),
        );
        templates.insert(
            DEFAULT_VERIFICATION_TEMPLATE_PATH.to_string(),
            include_str!("../../templates/email_confirmation.html.tmpl").to_string(),
        );
        Self { templates }
    }

    /// Register (or replace) a template under `path`.
    pub fn with_template(mut self, path: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(path.into(), body.into());
        self
    }
}

impl Default for BuiltinTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateSource for BuiltinTemplates {
    fn read(&self, path: &str) -> io::Result<String> {
        self.templates.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no built-in template {}", path),
            )
        })
    }
}

/// Templates read from files under a root directory
#[derive(Debug, Clone)]
pub struct FsTemplates {
    root: PathBuf,
}

impl FsTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateSource for FsTemplates {
    fn read(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.root.join(path))
    }
}

/// Handlebars-based template engine holding the reply and verification templates
///
/// Supports variables (`{{user_name}}`), conditionals (`{{#if parent_user_name}}`)
/// and raw output (`{{{comment_text}}}`). Missing values render as empty.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    /// Read and parse both templates from `source`.
    pub fn load(
        source: &dyn TemplateSource,
        reply_path: &str,
        verification_path: &str,
    ) -> NotificationResult<Self> {
        let mut engine = Self {
            handlebars: Handlebars::new(),
        };
        engine.register(source, REPLY_TEMPLATE, reply_path)?;
        engine.register(source, VERIFICATION_TEMPLATE, verification_path)?;
        Ok(engine)
    }

    /// Engine with the compiled-in default templates
    pub fn builtin() -> NotificationResult<Self> {
        Self::load(
            &BuiltinTemplates::new(),
            DEFAULT_REPLY_TEMPLATE_PATH,
            DEFAULT_VERIFICATION_TEMPLATE_PATH,
        )
    }

    fn register(
        &mut self,
        source: &dyn TemplateSource,
        kind: &'static str,
        path: &str,
    ) -> NotificationResult<()> {
        let text = source.read(path).map_err(|e| NotificationError::TemplateRead {
            kind,
            path: path.to_string(),
            source: e,
        })?;

        self.handlebars
            .register_template_string(kind, text)
            .map_err(|e| NotificationError::TemplateParse {
                kind,
                source: Box::new(e),
            })
    }

    pub fn render_reply(&self, data: &ReplyTemplateData) -> NotificationResult<String> {
        self.render(REPLY_TEMPLATE, "comment reply", data)
    }

    pub fn render_verification(&self, data: &VerificationTemplateData) -> NotificationResult<String> {
        self.render(VERIFICATION_TEMPLATE, "verification", data)
    }

    fn render<T: Serialize>(
        &self,
        name: &str,
        kind: &'static str,
        data: &T,
    ) -> NotificationResult<String> {
        self.handlebars
            .render(name, data)
            .map_err(|e| NotificationError::Render {
                kind,
                source: Box::new(e),
            })
    }
}
