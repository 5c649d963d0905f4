//! Listening preference aggregation.
//!
//! Every play appends a row to `play_history` and bumps one counter per
//! [`Category`] in `user_preference`. Counters are only ever incremented, so
//! ranking is a plain `SUM ... GROUP BY` over the counter table rather than a
//! scan of the whole history.

use crate::db::MusicStore;
use anyhow::{Context, Result};
use log::{debug, trace};
use rusqlite::{params, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};

/// How many artists [`get_user_preferences`] reports.
pub const TOP_ARTISTS: usize = 5;
/// How many decades [`get_user_preferences`] reports.
pub const TOP_DECADES: usize = 3;
/// How many genres [`get_user_preferences`] reports.
pub const TOP_GENRES: usize = 3;

/// Dimension a preference counter is kept for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Artist,
    Album,
    Genre,
    Decade,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Artist,
        Category::Album,
        Category::Genre,
        Category::Decade,
    ];

    /// Key stored in the `category` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Artist => "artist",
            Category::Album => "album",
            Category::Genre => "genre",
            Category::Decade => "decade",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranked listening preferences, most played first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub top_artists: Vec<String>,
    pub top_decades: Vec<i32>,
    pub top_genres: Vec<String>,
}

impl UserPreferences {
    /// True when there is no artist and no decade history to steer by.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top_artists.is_empty() && self.top_decades.is_empty()
    }
}

/// Truncate a year down to its decade: 1987 -> 1980, -5 -> -10.
#[must_use]
pub const fn decade_of(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

/// Log one play of `track_id` and update the preference counters.
///
/// `completion_rate` is clamped to `[0.0, 1.0]`. If the track is not in the
/// store only the history row is written. Empty tag values are not counted.
///
/// # Errors
///
/// Returns an error if any statement fails; the transaction is then rolled
/// back and nothing is recorded.
pub fn record_play(store: &mut MusicStore, track_id: i64, completion_rate: f64) -> Result<()> {
    let completion_rate = if completion_rate.is_nan() {
        1.0
    } else {
        completion_rate.max(0.0).min(1.0)
    };

    let tx = store
        .conn
        .transaction()
        .context("Failed to start play transaction")?;

    tx.execute(
        "INSERT INTO play_history (music_id, completion_rate) VALUES (?1, ?2)",
        params![track_id, completion_rate],
    )
    .with_context(|| format!("Failed to log play of track {track_id}"))?;

    let tags = tx
        .query_row(
            "SELECT artist, album, genre, year FROM music WHERE id = ?1",
            [track_id],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i32>>(3)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("Failed to look up track {track_id}"))?;

    match tags {
        Some((artist, album, genre, year)) => {
            let values = [
                (Category::Artist, artist),
                (Category::Album, album),
                (Category::Genre, genre),
                (Category::Decade, year.map(|y| decade_of(y).to_string())),
            ];
            for (category, value) in values {
                if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                    bump(&tx, category, &value)?;
                }
            }
        }
        None => debug!("Play logged for unknown track {track_id}; preferences untouched"),
    }

    tx.commit().context("Commiting SQL transaction failed.")?;
    Ok(())
}

fn bump(tx: &Transaction<'_>, category: Category, value: &str) -> Result<()> {
    trace!("Incrementing {category} preference '{value}'");
    tx.execute(
        "INSERT INTO user_preference (category, value, play_count) VALUES (?1, ?2, 1)
         ON CONFLICT(category, value) DO UPDATE SET
             play_count = play_count + 1,
             last_played = CURRENT_TIMESTAMP",
        params![category.as_str(), value],
    )
    .with_context(|| format!("Failed to update {category} preference '{value}'"))?;
    Ok(())
}

/// The `limit` most played values of one category with their summed counts.
/// Ties keep the order in which the values were first seen.
pub fn top_values(store: &MusicStore, category: Category, limit: usize) -> Result<Vec<(String, u32)>> {
    let mut stmt = store.conn.prepare(
        "SELECT value, SUM(play_count) AS total FROM user_preference
         WHERE category = ?1
         GROUP BY value
         ORDER BY total DESC, MIN(id) ASC
         LIMIT ?2",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(params![category.as_str(), limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("Failed to rank {category} preferences"))?;
    Ok(rows)
}

/// Current play count for one `(category, value)` pair, 0 if never played.
pub fn preference_count(store: &MusicStore, category: Category, value: &str) -> Result<u32> {
    let count = store
        .conn
        .query_row(
            "SELECT play_count FROM user_preference WHERE category = ?1 AND value = ?2",
            params![category.as_str(), value],
            |row| row.get::<_, u32>(0),
        )
        .optional()?;
    Ok(count.unwrap_or(0))
}

/// Top 5 artists, top 3 decades and top 3 genres by play count.
pub fn get_user_preferences(store: &MusicStore) -> Result<UserPreferences> {
    let names = |category, limit| -> Result<Vec<String>> {
        Ok(top_values(store, category, limit)?
            .into_iter()
            .map(|(value, _)| value)
            .collect())
    };

    let top_decades = names(Category::Decade, TOP_DECADES)?
        .into_iter()
        .filter_map(|d| d.parse::<i32>().ok())
        .collect();

    Ok(UserPreferences {
        top_artists: names(Category::Artist, TOP_ARTISTS)?,
        top_decades,
        top_genres: names(Category::Genre, TOP_GENRES)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::new_track;

    fn store_with(tracks: &[(&str, &str, Option<i32>, &str)]) -> (MusicStore, Vec<i64>) {
        let mut store = MusicStore::open_in_memory().unwrap();
        let ids = tracks
            .iter()
            .enumerate()
            .map(|(i, (title, artist, year, genre))| {
                store
                    .add_track(&new_track(&format!("/m/{i}.mp3"), title, artist, *year, genre))
                    .unwrap()
                    .id
            })
            .collect();
        (store, ids)
    }

    #[test]
    fn test_decade_of() {
        assert_eq!(decade_of(1987), 1980);
        assert_eq!(decade_of(1980), 1980);
        assert_eq!(decade_of(1989), 1980);
        assert_eq!(decade_of(2000), 2000);
        assert_eq!(decade_of(-5), -10);
    }

    #[test]
    fn test_record_play_counts_every_category() {
        let (mut store, ids) = store_with(&[("Song", "Artist A", Some(1987), "Rock")]);
        record_play(&mut store, ids[0], 1.0).unwrap();
        record_play(&mut store, ids[0], 0.5).unwrap();

        assert_eq!(preference_count(&store, Category::Artist, "Artist A").unwrap(), 2);
        assert_eq!(preference_count(&store, Category::Album, "Artist A Album").unwrap(), 2);
        assert_eq!(preference_count(&store, Category::Genre, "Rock").unwrap(), 2);
        assert_eq!(preference_count(&store, Category::Decade, "1980").unwrap(), 2);
        assert_eq!(preference_count(&store, Category::Decade, "1990").unwrap(), 0);
        assert_eq!(store.play_count().unwrap(), 2);
    }

    #[test]
    fn test_record_play_unknown_track_keeps_event_only() {
        let (mut store, _) = store_with(&[]);
        record_play(&mut store, 999, 1.0).unwrap();

        assert_eq!(store.play_count().unwrap(), 1);
        assert!(get_user_preferences(&store).unwrap().is_empty());
    }

    #[test]
    fn test_record_play_skips_missing_tags() {
        let (mut store, ids) = store_with(&[("Song", "", None, "")]);
        record_play(&mut store, ids[0], 1.0).unwrap();

        let prefs = get_user_preferences(&store).unwrap();
        assert!(prefs.top_artists.is_empty());
        assert!(prefs.top_decades.is_empty());
        assert!(prefs.top_genres.is_empty());
    }

    #[test]
    fn test_completion_rate_is_clamped() {
        let (mut store, ids) = store_with(&[("Song", "A", None, "Pop")]);
        record_play(&mut store, ids[0], 7.0).unwrap();
        record_play(&mut store, ids[0], -1.0).unwrap();

        let rates: Vec<f64> = store
            .conn
            .prepare("SELECT completion_rate FROM play_history ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(rates, vec![1.0, 0.0]);
    }

    #[test]
    fn test_preferences_are_ranked_and_capped() {
        let tracks: Vec<(String, i32)> = (0..7).map(|i| (format!("Artist {i}"), 1950 + i * 10)).collect();
        let specs: Vec<(&str, &str, Option<i32>, &str)> = tracks
            .iter()
            .map(|(artist, year)| ("Song", artist.as_str(), Some(*year), "Genre"))
            .collect();
        let (mut store, ids) = store_with(&specs);

        // Artist i gets i + 1 plays.
        for (i, id) in ids.iter().enumerate() {
            for _ in 0..=i {
                record_play(&mut store, *id, 1.0).unwrap();
            }
        }

        let prefs = get_user_preferences(&store).unwrap();
        assert_eq!(
            prefs.top_artists,
            vec!["Artist 6", "Artist 5", "Artist 4", "Artist 3", "Artist 2"]
        );
        assert_eq!(prefs.top_decades, vec![2010, 2000, 1990]);
        assert_eq!(prefs.top_genres, vec!["Genre"]);
    }

    #[test]
    fn test_artist_scenario() {
        let (mut store, ids) = store_with(&[
            ("One", "Artist A", Some(1985), "Rock"),
            ("Two", "Artist A", Some(1986), "Rock"),
            ("Three", "Artist A", Some(1999), "Rock"),
            ("Four", "Artist B", Some(2005), "Pop"),
            ("Five", "Artist B", Some(2010), "Pop"),
        ]);

        for id in [ids[0], ids[1], ids[2], ids[0], ids[1]] {
            record_play(&mut store, id, 1.0).unwrap();
        }

        let prefs = get_user_preferences(&store).unwrap();
        assert_eq!(prefs.top_artists, vec!["Artist A"]);
        assert_eq!(prefs.top_decades, vec![1980, 1990]);
        assert_eq!(prefs.top_genres, vec!["Rock"]);
    }

    #[test]
    fn test_category_keys() {
        let keys: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(keys, vec!["artist", "album", "genre", "decade"]);
    }
}
