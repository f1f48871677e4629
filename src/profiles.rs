/// Profile identity from host-site URLs and the per-user profile directory
/// kept current by content-script sightings

use crate::config::SiteConfig;
use crate::error::Result;
use crate::listeners::Subscription;
use crate::mirror::Mirror;
use crate::platform::{Clock, Millis};
use crate::store::{Change, DocumentStore, update_document_if};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::OnceLock;
use url::Url;

pub const PROFILES_DOCUMENT: &str = "profiles";

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\p{L}\p{N}._-]{2,100}$").expect("valid regex"))
}

/// Canonical profile id from a profile page URL
///
/// The id is the path segment after `segment`, percent-decoded and
/// lowercased. Query strings, fragments and trailing sub-pages are ignored.
///
/// Examples (segment `in`):
/// - https://www.linkedin.com/in/Jane-Doe/ → jane-doe
/// - https://www.linkedin.com/in/jane-doe/details/experience/ → jane-doe
/// - https://www.linkedin.com/in/j%C3%BCrgen-m → jürgen-m
pub fn profile_id_from_url(url: &str, segment: &str) -> Option<String> {
    let url = Url::parse(url.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    segments.find(|s| *s == segment)?;
    let raw = segments.next()?;

    let slug = urlencoding::decode(raw).ok()?.trim().to_lowercase();
    if slug_pattern().is_match(&slug) {
        Some(slug)
    } else {
        None
    }
}

/// Profile page URL for a canonical id
pub fn profile_url(base_url: &str, profile_id: &str) -> String {
    format!(
        "{}/{}/",
        base_url.trim_end_matches('/'),
        urlencoding::encode(profile_id)
    )
}

/// What a content script saw on a profile page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSighting {
    pub page_url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub updated_at: Millis,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDirectory {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileRecord>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ProfileDirectory {
    pub fn get(&self, profile_id: &str) -> Option<&ProfileRecord> {
        self.profiles.get(profile_id)
    }

    /// Fold a sighting into the record for `profile_id`. Returns false when
    /// nothing changed and the record is younger than `max_age`.
    pub fn apply(
        &mut self,
        profile_id: &str,
        sighting: &ProfileSighting,
        now: Millis,
        max_age: Millis,
    ) -> bool {
        let existing = self.profiles.get(profile_id);

        let name = non_empty(sighting.name.as_deref())
            .or_else(|| existing.map(|r| r.name.clone()))
            .unwrap_or_else(|| profile_id.to_string());
        let avatar_url = non_empty(sighting.avatar_url.as_deref())
            .or_else(|| existing.and_then(|r| r.avatar_url.clone()));

        if let Some(record) = existing {
            let fresh = now.saturating_sub(record.updated_at) < max_age;
            if fresh && record.name == name && record.avatar_url == avatar_url {
                return false;
            }
        }

        self.profiles.insert(
            profile_id.to_string(),
            ProfileRecord {
                name,
                avatar_url,
                updated_at: now,
            },
        );
        true
    }
}

/// Mirror of `users/{uid}/profiles` with best-effort write-back
pub struct Profiles {
    mirror: Mirror<ProfileDirectory>,
    store: Rc<dyn DocumentStore>,
    clock: Rc<dyn Clock>,
    site: SiteConfig,
    attempts: u32,
}

impl Profiles {
    pub fn new(
        store: Rc<dyn DocumentStore>,
        clock: Rc<dyn Clock>,
        site: SiteConfig,
        attempts: u32,
    ) -> Self {
        Profiles {
            mirror: Mirror::new(store.clone(), PROFILES_DOCUMENT),
            store,
            clock,
            site,
            attempts,
        }
    }

    pub fn mirror(&self) -> &Mirror<ProfileDirectory> {
        &self.mirror
    }

    pub fn profile_id(&self, page_url: &str) -> Option<String> {
        profile_id_from_url(page_url, &self.site.profile_path_segment)
    }

    pub fn url_for(&self, profile_id: &str) -> String {
        profile_url(&self.site.profile_base_url, profile_id)
    }

    pub fn get(&self, profile_id: &str) -> Option<ProfileRecord> {
        self.mirror
            .snapshot()
            .and_then(|d| d.profiles.get(profile_id).cloned())
    }

    pub fn on_change(&self, listener: impl Fn(&ProfileDirectory) + 'static) -> Subscription {
        self.mirror
            .on_change(move |d| listener(&d.clone().unwrap_or_default()))
    }

    /// Record a sighting. Never fails: returns whether a write happened.
    pub async fn observe(&self, sighting: &ProfileSighting) -> bool {
        let Some(profile_id) = self.profile_id(&sighting.page_url) else {
            debug!("Not a profile page: {}", sighting.page_url);
            return false;
        };

        match self.write_back(&profile_id, sighting).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Profile write-back for {} failed: {}", profile_id, e);
                false
            }
        }
    }

    async fn write_back(&self, profile_id: &str, sighting: &ProfileSighting) -> Result<bool> {
        let path = self.mirror.require_path()?;
        let now = self.clock.now();
        let max_age = self.site.profile_refresh_secs * 1000;

        // Skip the round trip when the mirrored copy is already current
        let mut cached = self.mirror.snapshot().unwrap_or_default();
        if self.mirror.version().is_some() && !cached.apply(profile_id, sighting, now, max_age) {
            return Ok(false);
        }

        let (_, written) = update_document_if(
            self.store.as_ref(),
            &path,
            self.attempts,
            |directory: &mut ProfileDirectory| {
                Ok(if directory.apply(profile_id, sighting, now, max_age) {
                    Change::Write(true)
                } else {
                    Change::Unchanged(false)
                })
            },
        )
        .await?;
        Ok(written)
    }
}
