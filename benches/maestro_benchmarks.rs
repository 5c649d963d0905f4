//! # Maestro Performance Benchmarks
//!
//! Benchmarks for the library paths that run on every tool call.
//!
//! ## Benchmark Categories
//!
//! - **Preferences**: Recording plays and ranking counters
//! - **Recommendations**: Tier filling at different library sizes
//! - **Search**: Substring lookups on the catalogue
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark group
//! cargo bench preferences
//! cargo bench recommend
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use maestro::db::{MusicStore, NewTrack, SearchField};
use maestro::{preferences, recommend};
use std::hint::black_box;
use tempfile::TempDir;

const GENRES: [&str; 6] = ["Rock", "Jazz", "Pop", "Folk", "Electronic", "Classical"];

/// Helper function to create a library with `count` tracks spread over
/// artists, decades and genres.
fn create_benchmark_library(count: usize) -> (TempDir, MusicStore) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut store = MusicStore::open(&temp_dir.path().join("benchmark_music.db"))
        .expect("Failed to open database");

    let tracks: Vec<NewTrack> = (1..=count)
        .map(|i| NewTrack {
            file_path: format!("/music/bench/track{i:05}.flac"),
            title: format!("Track {i:05}"),
            artist: Some(format!("Artist {}", (i - 1) / 20 + 1)),
            album: Some(format!("Album {}", (i - 1) / 10 + 1)),
            year: Some(1960 + (i % 60) as i32),
            genre: Some(GENRES[i % GENRES.len()].to_string()),
            duration: Some(180 + (i % 120) as u32),
            format: Some("flac".to_string()),
        })
        .collect();
    store.add_tracks(&tracks).expect("Failed to insert tracks");

    (temp_dir, store)
}

/// Give the library a listening history skewed toward the first artists.
fn seed_history(store: &mut MusicStore, plays: usize) {
    for i in 0..plays {
        let id = (i % 40) as i64 + 1;
        preferences::record_play(store, id, 1.0).expect("Failed to record play");
    }
}

fn benchmark_preferences(c: &mut Criterion) {
    let mut group = c.benchmark_group("preferences");
    let (_dir, mut store) = create_benchmark_library(1000);
    seed_history(&mut store, 200);

    group.bench_function("record_play", |b| {
        let mut id = 0;
        b.iter(|| {
            id = id % 1000 + 1;
            preferences::record_play(&mut store, black_box(id), black_box(0.9))
        })
    });

    group.bench_function("get_user_preferences", |b| {
        b.iter(|| preferences::get_user_preferences(black_box(&store)))
    });

    group.finish();
}

fn benchmark_recommendations(c: &mut Criterion) {
    let mut group = c.benchmark_group("recommend");

    for size in [100, 1000, 5000] {
        let (_dir, mut store) = create_benchmark_library(size);
        group.bench_with_input(BenchmarkId::new("no_history", size), &store, |b, store| {
            b.iter(|| recommend::get_recommended_tracks(black_box(store), black_box(10)))
        });

        seed_history(&mut store, 100);
        group.bench_with_input(BenchmarkId::new("with_history", size), &store, |b, store| {
            b.iter(|| recommend::get_recommended_tracks(black_box(store), black_box(10)))
        });
    }

    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let (_dir, store) = create_benchmark_library(5000);

    group.bench_function("title_substring", |b| {
        b.iter(|| store.search(SearchField::Title, black_box("042"), None))
    });

    group.bench_function("artist_limited", |b| {
        b.iter(|| store.search(SearchField::Artist, black_box("Artist 1"), Some(20)))
    });

    group.bench_function("decade", |b| {
        b.iter(|| store.tracks_in_decade(black_box(1980), None))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_preferences,
    benchmark_recommendations,
    benchmark_search
);
criterion_main!(benches);
