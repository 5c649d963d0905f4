//! # Recommendation Module
//!
//! Builds a candidate list from ranked listening preferences.
//!
//! ## Tiers
//!
//! Candidates are collected strictly in this order, skipping anything already
//! picked:
//!
//! 1. up to [`PER_BUCKET`] tracks for each of the top 3 artists
//! 2. up to [`PER_BUCKET`] tracks for each of the top 2 decades
//! 3. up to [`PER_BUCKET`] tracks for each of the top 2 genres
//!
//! Whatever is still missing is filled with random tracks not yet picked.
//! Without any artist or decade history the whole list is random.

use crate::db::{MusicStore, SearchField, Track};
use crate::preferences::{self, UserPreferences};
use anyhow::{Context, Result};
use log::debug;
use std::collections::HashSet;

/// Cap on tracks taken from a single artist, decade or genre.
pub const PER_BUCKET: usize = 5;

const ARTIST_TIERS: usize = 3;
const DECADE_TIERS: usize = 2;
const GENRE_TIERS: usize = 2;

/// Accumulates unique tracks in insertion order.
#[derive(Debug, Default)]
struct Picks {
    tracks: Vec<Track>,
    seen: HashSet<i64>,
}

impl Picks {
    fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) {
        for track in tracks {
            if self.seen.insert(track.id) {
                self.tracks.push(track);
            }
        }
    }

    fn len(&self) -> usize {
        self.tracks.len()
    }
}

/// Up to `limit` unique tracks steered by the stored preferences.
///
/// # Errors
///
/// Returns an error if the preference or track queries fail.
pub fn get_recommended_tracks(store: &MusicStore, limit: usize) -> Result<Vec<Track>> {
    let prefs = preferences::get_user_preferences(store)
        .context("Failed to load preferences for recommendation")?;
    recommend_from(store, &prefs, limit)
}

/// Same as [`get_recommended_tracks`] with preferences already loaded.
pub fn recommend_from(store: &MusicStore, prefs: &UserPreferences, limit: usize) -> Result<Vec<Track>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    if prefs.is_empty() {
        debug!("No listening history yet, recommending {limit} random tracks");
        return store.random_tracks(limit);
    }

    let mut picks = Picks::default();

    for artist in prefs.top_artists.iter().take(ARTIST_TIERS) {
        picks.extend(store.search(SearchField::Artist, artist, Some(PER_BUCKET))?);
    }
    for decade in prefs.top_decades.iter().take(DECADE_TIERS) {
        picks.extend(store.tracks_in_decade(*decade, Some(PER_BUCKET))?);
    }
    for genre in prefs.top_genres.iter().take(GENRE_TIERS) {
        picks.extend(store.search(SearchField::Genre, genre, Some(PER_BUCKET))?);
    }

    let from_preferences = picks.len();
    if picks.len() < limit {
        // Over-fetch so already picked tracks can be dropped without a second query.
        let random = store.random_tracks(limit + picks.seen.len())?;
        picks.extend(random);
    }

    let mut tracks = picks.tracks;
    tracks.truncate(limit);
    debug!(
        "Recommended {} tracks ({} from preferences)",
        tracks.len(),
        from_preferences.min(limit)
    );
    Ok(tracks)
}
