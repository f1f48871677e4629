/// Per-user label collection: label name -> color, creation time and the
/// profiles carrying it

use crate::error::{Error, Result};
use crate::listeners::Subscription;
use crate::mirror::Mirror;
use crate::platform::{Clock, Millis};
use crate::store::{DocumentStore, update_document};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::OnceLock;

pub const LABELS_DOCUMENT: &str = "labels";
pub const DEFAULT_COLOR: &str = "#0a66c2";
const MAX_NAME_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub color: String,
    pub created_at: Millis,
    #[serde(default)]
    pub profiles: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCollection {
    #[serde(default)]
    pub labels: BTreeMap<String, Label>,
}

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid regex"))
}

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("label name is empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "label name longer than {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn clean_color(color: &str) -> Result<String> {
    if color_pattern().is_match(color) {
        Ok(color.to_lowercase())
    } else {
        Err(Error::InvalidInput(format!("bad color {:?}", color)))
    }
}

impl LabelCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing key matching `name` case-insensitively
    fn find_key(&self, name: &str) -> Option<String> {
        let wanted = name.trim().to_lowercase();
        self.labels
            .keys()
            .find(|k| k.to_lowercase() == wanted)
            .cloned()
    }

    fn label_mut(&mut self, name: &str) -> Result<&mut Label> {
        let key = self
            .find_key(name)
            .ok_or_else(|| Error::LabelNotFound(name.to_string()))?;
        self.labels
            .get_mut(&key)
            .ok_or_else(|| Error::LabelNotFound(name.to_string()))
    }

    pub fn add_label(&mut self, name: &str, color: Option<&str>, now: Millis) -> Result<()> {
        let name = clean_name(name)?;
        if let Some(existing) = self.find_key(&name) {
            return Err(Error::LabelExists(existing));
        }
        let color = clean_color(color.unwrap_or(DEFAULT_COLOR))?;

        self.labels.insert(
            name,
            Label {
                color,
                created_at: now,
                profiles: BTreeSet::new(),
            },
        );
        Ok(())
    }

    pub fn remove_label(&mut self, name: &str) -> Result<Label> {
        let key = self
            .find_key(name)
            .ok_or_else(|| Error::LabelNotFound(name.to_string()))?;
        self.labels
            .remove(&key)
            .ok_or_else(|| Error::LabelNotFound(name.to_string()))
    }

    /// Renaming to a different-case spelling of the same label is allowed
    pub fn rename_label(&mut self, from: &str, to: &str) -> Result<()> {
        let to = clean_name(to)?;
        let key = self
            .find_key(from)
            .ok_or_else(|| Error::LabelNotFound(from.to_string()))?;
        if let Some(clash) = self.find_key(&to) {
            if clash != key {
                return Err(Error::LabelExists(clash));
            }
        }

        if let Some(label) = self.labels.remove(&key) {
            self.labels.insert(to, label);
        }
        Ok(())
    }

    pub fn set_color(&mut self, name: &str, color: &str) -> Result<()> {
        let color = clean_color(color)?;
        self.label_mut(name)?.color = color;
        Ok(())
    }

    /// Returns false if the profile already carried the label
    pub fn attach(&mut self, name: &str, profile_id: &str) -> Result<bool> {
        if profile_id.is_empty() {
            return Err(Error::InvalidInput("profile id is empty".to_string()));
        }
        Ok(self
            .label_mut(name)?
            .profiles
            .insert(profile_id.to_string()))
    }

    /// Returns false if the profile did not carry the label
    pub fn detach(&mut self, name: &str, profile_id: &str) -> Result<bool> {
        Ok(self.label_mut(name)?.profiles.remove(profile_id))
    }

    pub fn get_label(&self, name: &str) -> Option<&Label> {
        self.find_key(name).and_then(|k| self.labels.get(&k))
    }

    pub fn labels_for_profile(&self, profile_id: &str) -> Vec<String> {
        self.labels
            .iter()
            .filter(|(_, label)| label.profiles.contains(profile_id))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Case-insensitive substring match on label names, in name order
    pub fn search(&self, query: &str) -> Vec<(&String, &Label)> {
        let query = query.trim().to_lowercase();
        self.labels
            .iter()
            .filter(|(name, _)| name.to_lowercase().contains(&query))
            .collect()
    }
}

/// Mirror of `users/{uid}/labels` with compare-and-swap edits
pub struct Labels {
    mirror: Mirror<LabelCollection>,
    store: Rc<dyn DocumentStore>,
    clock: Rc<dyn Clock>,
    attempts: u32,
}

impl Labels {
    pub fn new(store: Rc<dyn DocumentStore>, clock: Rc<dyn Clock>, attempts: u32) -> Self {
        Labels {
            mirror: Mirror::new(store.clone(), LABELS_DOCUMENT),
            store,
            clock,
            attempts,
        }
    }

    pub fn mirror(&self) -> &Mirror<LabelCollection> {
        &self.mirror
    }

    pub fn current(&self) -> LabelCollection {
        self.mirror.snapshot().unwrap_or_default()
    }

    pub fn on_change(&self, listener: impl Fn(&LabelCollection) + 'static) -> Subscription {
        self.mirror
            .on_change(move |labels| listener(&labels.clone().unwrap_or_default()))
    }

    async fn update<R>(
        &self,
        mutate: impl FnMut(&mut LabelCollection) -> Result<R>,
    ) -> Result<(LabelCollection, R)> {
        let path = self.mirror.require_path()?;
        update_document(self.store.as_ref(), &path, self.attempts, mutate).await
    }

    pub async fn add_label(&self, name: &str, color: Option<&str>) -> Result<LabelCollection> {
        let now = self.clock.now();
        let (labels, _) = self.update(|c| c.add_label(name, color, now)).await?;
        Ok(labels)
    }

    pub async fn remove_label(&self, name: &str) -> Result<LabelCollection> {
        let (labels, _) = self.update(|c| c.remove_label(name)).await?;
        Ok(labels)
    }

    pub async fn rename_label(&self, from: &str, to: &str) -> Result<LabelCollection> {
        let (labels, _) = self.update(|c| c.rename_label(from, to)).await?;
        Ok(labels)
    }

    pub async fn set_color(&self, name: &str, color: &str) -> Result<LabelCollection> {
        let (labels, _) = self.update(|c| c.set_color(name, color)).await?;
        Ok(labels)
    }

    pub async fn attach(&self, name: &str, profile_id: &str) -> Result<LabelCollection> {
        let (labels, _) = self.update(|c| c.attach(name, profile_id)).await?;
        Ok(labels)
    }

    pub async fn detach(&self, name: &str, profile_id: &str) -> Result<LabelCollection> {
        let (labels, _) = self.update(|c| c.detach(name, profile_id)).await?;
        Ok(labels)
    }
}
