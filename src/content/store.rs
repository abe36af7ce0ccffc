//! Content store: read-only snapshot access for the scheduler.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::{AutomationLane, LaneId, Pattern, PatternId, PatternTrack, PlaylistInstance};

/// Read access to the content a scheduling pass plays.
///
/// Each pass takes one snapshot and works from it; edits made afterwards
/// become visible on the next pass.
pub trait ContentStore: Send + Sync {
    fn snapshot(&self) -> ContentLibrary;
}

/// Patterns, the active pattern and the playlist. Cloning is cheap: patterns
/// are shared behind `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ContentLibrary {
    patterns: BTreeMap<PatternId, Arc<Pattern>>,
    active_pattern: Option<PatternId>,
    playlist: Arc<Vec<PlaylistInstance>>,
}

/// On-disk form of a [`ContentLibrary`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentFile {
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub active_pattern: Option<PatternId>,
    #[serde(default)]
    pub playlist: Vec<PlaylistInstance>,
}

impl ContentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a pattern. The first pattern added becomes active.
    pub fn insert_pattern(&mut self, pattern: Pattern) {
        let id = pattern.id;
        self.patterns.insert(id, Arc::new(pattern));
        if self.active_pattern.is_none() {
            self.active_pattern = Some(id);
        }
    }

    /// Remove a pattern, deactivating it if it was active.
    pub fn remove_pattern(&mut self, id: PatternId) -> Option<Arc<Pattern>> {
        if self.active_pattern == Some(id) {
            self.active_pattern = None;
        }
        self.patterns.remove(&id)
    }

    /// Edit a pattern in place (copy-on-write if a snapshot still holds it).
    pub fn edit_pattern<F: FnOnce(&mut Pattern)>(&mut self, id: PatternId, edit: F) -> bool {
        match self.patterns.get_mut(&id) {
            Some(pattern) => {
                edit(Arc::make_mut(pattern));
                true
            }
            None => false,
        }
    }

    pub fn set_active_pattern(&mut self, id: Option<PatternId>) {
        self.active_pattern = id;
    }

    pub fn pattern(&self, id: PatternId) -> Option<&Arc<Pattern>> {
        self.patterns.get(&id)
    }

    /// All patterns, ordered by id.
    pub fn patterns(&self) -> impl Iterator<Item = &Arc<Pattern>> {
        self.patterns.values()
    }

    /// The active pattern, if one is set and still exists.
    pub fn active_pattern(&self) -> Option<&Arc<Pattern>> {
        self.active_pattern.and_then(|id| self.patterns.get(&id))
    }

    /// Find an automation lane and the track that owns it, across all patterns.
    pub fn lane(&self, id: LaneId) -> Option<(&PatternTrack, &AutomationLane)> {
        self.patterns.values().find_map(|pattern| {
            pattern.tracks.iter().find_map(|track| {
                track
                    .automation
                    .iter()
                    .find(|lane| lane.id == id)
                    .map(|lane| (track, lane))
            })
        })
    }

    /// Place an instance on the playlist, keeping it ordered by start time.
    pub fn add_instance(&mut self, instance: PlaylistInstance) {
        let playlist = Arc::make_mut(&mut self.playlist);
        let pos = playlist
            .iter()
            .position(|i| i.start_time_beats > instance.start_time_beats)
            .unwrap_or(playlist.len());
        playlist.insert(pos, instance);
    }

    pub fn clear_playlist(&mut self) {
        self.playlist = Arc::new(Vec::new());
    }

    pub fn playlist(&self) -> &[PlaylistInstance] {
        &self.playlist
    }

    /// End of the last playlist instance, in beats.
    pub fn playlist_end_beats(&self) -> f64 {
        self.playlist
            .iter()
            .map(PlaylistInstance::end_beats)
            .fold(0.0, f64::max)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let file: ContentFile = serde_yaml::from_str(yaml)?;
        Ok(Self::from(file))
    }
}

impl From<ContentFile> for ContentLibrary {
    fn from(file: ContentFile) -> Self {
        let mut library = ContentLibrary::new();
        for pattern in file.patterns {
            library.insert_pattern(pattern);
        }
        if file.active_pattern.is_some() {
            library.active_pattern = file.active_pattern;
        }
        for instance in file.playlist {
            library.add_instance(instance);
        }
        library
    }
}

impl ContentStore for ContentLibrary {
    fn snapshot(&self) -> ContentLibrary {
        self.clone()
    }
}

impl ContentStore for Arc<RwLock<ContentLibrary>> {
    fn snapshot(&self) -> ContentLibrary {
        match self.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
