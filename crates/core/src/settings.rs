//! Application settings with a publish/subscribe interface.
//!
//! Components subscribe on mount and unsubscribe on teardown instead of
//! attaching ad hoc global listeners. Settings persist as a versioned JSON
//! envelope; loading tolerates a missing file by falling back to defaults.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::color::Color;

const SETTINGS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub pen_color: Color,
    pub pen_width: f32,
    pub highlighter_color: Color,
    pub autosave_quiet_ms: u64,
    pub export_scale: f32,
    pub zoom: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pen_color: Color::BLACK,
            pen_width: 2.5,
            highlighter_color: Color::YELLOW,
            autosave_quiet_ms: 1500,
            export_scale: 2.0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    settings: Settings,
}

pub type SubscriptionId = u64;

type Listener = Box<dyn Fn(&Settings) + Send + Sync>;

/// Shared settings store. Every update notifies subscribers and persists
/// the new state when a path is configured.
pub struct SettingsStore {
    settings: Mutex<Settings>,
    listeners: Mutex<HashMap<SubscriptionId, Listener>>,
    next_id: AtomicU64,
    path: Option<PathBuf>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            path: None,
        }
    }

    /// Load from `path`, falling back to defaults when the file is missing
    /// or unreadable. Updates are persisted back to the same path.
    pub fn load_or_default(path: PathBuf) -> Self {
        let settings = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<SettingsEnvelope>(&bytes).ok())
            .map(|envelope| envelope.settings)
            .unwrap_or_default();
        let mut store = Self::new(settings);
        store.path = Some(path);
        store
    }

    pub fn get(&self) -> Settings {
        self.lock_settings().clone()
    }

    /// Mutate the settings, persist, and notify every subscriber.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let snapshot = {
            let mut settings = self.lock_settings();
            f(&mut settings);
            settings.clone()
        };
        if let Some(path) = &self.path {
            if let Err(err) = persist(path, &snapshot) {
                log::warn!("failed to persist settings: {err}");
            }
        }
        let listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
        for listener in listeners.values() {
            listener(&snapshot);
        }
    }

    /// Register a listener called on every update.
    pub fn subscribe(&self, listener: impl Fn(&Settings) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, Box::new(listener));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id)
            .is_some()
    }

    fn lock_settings(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn persist(path: &std::path::Path, settings: &Settings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let envelope =
        SettingsEnvelope { version: SETTINGS_SCHEMA_VERSION, settings: settings.clone() };
    let bytes = serde_json::to_vec_pretty(&envelope)?;
    let temp = path.with_extension("tmp");
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn subscribers_are_notified_on_update() {
        let store = SettingsStore::new(Settings::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let id = store.subscribe(move |settings| {
            assert_eq!(settings.pen_width, 4.0);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.update(|s| s.pen_width = 4.0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(store.unsubscribe(id));
        store.update(|s| s.pen_width = 4.0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn settings_persist_across_loads() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("settings.json");

        let store = SettingsStore::load_or_default(path.clone());
        store.update(|s| {
            s.pen_color = Color::BLUE;
            s.zoom = 1.5;
        });

        let reloaded = SettingsStore::load_or_default(path);
        assert_eq!(reloaded.get().pen_color, Color::BLUE);
        assert_eq!(reloaded.get().zoom, 1.5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SettingsStore::load_or_default(temp.path().join("absent.json"));
        assert_eq!(store.get(), Settings::default());
    }
}
