/// Per-user theme preference

use crate::error::Result;
use crate::listeners::Subscription;
use crate::mirror::Mirror;
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::rc::Rc;

pub const THEME_DOCUMENT: &str = "theme";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

/// Concrete palette after `System` has been resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedTheme {
    Light,
    Dark,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemePreference {
    pub mode: ThemeMode,
    pub accent: Option<String>,
}

impl ThemePreference {
    pub fn resolve(&self, prefers_dark: bool) -> ResolvedTheme {
        match self.mode {
            ThemeMode::Light => ResolvedTheme::Light,
            ThemeMode::Dark => ResolvedTheme::Dark,
            ThemeMode::System if prefers_dark => ResolvedTheme::Dark,
            ThemeMode::System => ResolvedTheme::Light,
        }
    }
}

pub struct Theme {
    mirror: Mirror<ThemePreference>,
    store: Rc<dyn DocumentStore>,
}

impl Theme {
    pub fn new(store: Rc<dyn DocumentStore>) -> Self {
        Theme {
            mirror: Mirror::new(store.clone(), THEME_DOCUMENT),
            store,
        }
    }

    pub fn mirror(&self) -> &Mirror<ThemePreference> {
        &self.mirror
    }

    pub fn current(&self) -> ThemePreference {
        self.mirror.snapshot().unwrap_or_default()
    }

    pub fn on_change(&self, listener: impl Fn(&ThemePreference) + 'static) -> Subscription {
        self.mirror
            .on_change(move |theme| listener(&theme.clone().unwrap_or_default()))
    }

    /// Theme edits are single-field, so a merge-write cannot lose a sibling update
    pub async fn set_mode(&self, mode: ThemeMode) -> Result<ThemePreference> {
        let path = self.mirror.require_path()?;
        self.store.merge(&path, json!({ "mode": mode })).await?;
        Ok(self.current())
    }

    pub async fn set_accent(&self, accent: Option<&str>) -> Result<ThemePreference> {
        let path = self.mirror.require_path()?;
        self.store.merge(&path, json!({ "accent": accent })).await?;
        Ok(self.current())
    }
}
