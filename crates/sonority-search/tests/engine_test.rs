//! Integration tests for training, caching and querying the features engine
//! against an on-disk library.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use sonority_core::model::{
    ArtistId, FeatureMap, LinkType, ReleaseId, TrackId, TrackListId, TrackListKind,
};
use sonority_core::schema::Database;
use sonority_search::settings::FeatureSettingsMap;
use sonority_search::{
    codec, CacheStore, FeatureProvider, FeatureSettings, FeaturesEngine, FileCache, LoadError,
    LoadSource, MediaLibrary, SimilarityClassifier, SqliteLibrary, TrainSettings,
};
use tempfile::TempDir;

/// Ids of the objects created by [`seed_library`].
struct Fixture {
    slow: Vec<TrackId>,
    fast: Vec<TrackId>,
    varied: Vec<TrackId>,
    silent: TrackId,
    slow_a: ReleaseId,
    slow_b: ReleaseId,
    fast_release: ReleaseId,
    slow_performer_a: ArtistId,
    slow_performer_b: ArtistId,
    composer: ArtistId,
    slow_list: TrackListId,
}

fn features(bpm: f64, loudness: f64) -> FeatureMap {
    let mut map = FeatureMap::new();
    map.insert("rhythm.bpm".to_string(), vec![bpm]);
    map.insert("lowlevel.average_loudness".to_string(), vec![loudness]);
    map
}

/// Six identical slow tracks on two releases, four identical fast tracks,
/// ten tracks spread in between and one track without features.
fn seed_library(db: &Database) -> Fixture {
    let slow_a = db.insert_release("Slow A").unwrap();
    let slow_b = db.insert_release("Slow B").unwrap();
    let fast_release = db.insert_release("Fast").unwrap();
    let various = db.insert_release("Various").unwrap();

    let slow_performer_a = db.insert_artist("Adagio Ensemble", None).unwrap();
    let slow_performer_b = db.insert_artist("Largo Trio", None).unwrap();
    let fast_performer = db.insert_artist("Presto", None).unwrap();
    let composer = db.insert_artist("Satie", None).unwrap();

    let mut slow = Vec::new();
    for i in 0..6 {
        let release = if i < 3 { slow_a } else { slow_b };
        let performer = if i < 3 { slow_performer_a } else { slow_performer_b };
        let track = db.insert_track(&format!("slow {i}"), Some(release)).unwrap();
        db.link_artist(track, performer, LinkType::Performer).unwrap();
        db.set_track_features(track, &features(60.0, 0.1)).unwrap();
        slow.push(track);
    }
    db.link_artist(slow[0], composer, LinkType::Composer).unwrap();

    let mut fast = Vec::new();
    for i in 0..4 {
        let track = db.insert_track(&format!("fast {i}"), Some(fast_release)).unwrap();
        db.link_artist(track, fast_performer, LinkType::Performer).unwrap();
        db.set_track_features(track, &features(170.0, 0.9)).unwrap();
        fast.push(track);
    }

    let mut varied = Vec::new();
    for i in 0..10 {
        let track = db.insert_track(&format!("varied {i}"), Some(various)).unwrap();
        db.set_track_features(track, &features(70.0 + f64::from(i) * 10.0, f64::from(i) / 10.0))
            .unwrap();
        varied.push(track);
    }

    let silent = db.insert_track("silent", None).unwrap();

    let slow_list = db.create_track_list("slow picks", TrackListKind::Playlist).unwrap();
    db.append_track_list_entry(slow_list, slow[1]).unwrap();
    db.append_track_list_entry(slow_list, slow[0]).unwrap();

    Fixture {
        slow,
        fast,
        varied,
        silent,
        slow_a,
        slow_b,
        fast_release,
        slow_performer_a,
        slow_performer_b,
        composer,
        slow_list,
    }
}

fn settings() -> TrainSettings {
    let mut features = FeatureSettingsMap::new();
    for name in ["rhythm.bpm", "lowlevel.average_loudness"] {
        features.insert(name.to_string(), FeatureSettings::known(name, 1.0).unwrap());
    }
    TrainSettings {
        iteration_count: 5,
        sample_count_per_neuron: 2.0,
        seed: 42,
        features,
    }
}

fn setup(dir: &Path) -> (Fixture, Arc<SqliteLibrary>, FileCache) {
    let db = Database::open(dir.join("library.db")).unwrap();
    let fixture = seed_library(&db);
    let library = Arc::new(SqliteLibrary::new(db));
    (fixture, library, FileCache::new(dir.join("features.cache")))
}

fn engine(library: &Arc<SqliteLibrary>, cache: &FileCache, settings: TrainSettings) -> FeaturesEngine {
    FeaturesEngine::new(Arc::clone(library), Arc::new(cache.clone()), settings)
}

fn assert_well_formed<T: Ord + Copy + std::fmt::Debug>(result: &[T], seeds: &[T], max_count: usize) {
    assert!(result.len() <= max_count, "too many results: {result:?}");
    let distinct: BTreeSet<T> = result.iter().copied().collect();
    assert_eq!(distinct.len(), result.len(), "duplicates in {result:?}");
    for seed in seeds {
        assert!(!result.contains(seed), "seed {seed:?} returned in {result:?}");
    }
}

#[test]
fn test_queries_are_empty_before_load() {
    let temp_dir = TempDir::new().unwrap();
    let (fixture, library, cache) = setup(temp_dir.path());
    let engine = engine(&library, &cache, settings());

    assert!(!engine.is_ready());
    assert!(engine.similar_tracks(&[fixture.slow[0]], 5).is_empty());
    assert!(engine.similar_tracks_from_list(fixture.slow_list, 5).is_empty());
    assert!(engine.similar_releases(fixture.slow_a, 5).is_empty());
    assert!(engine
        .similar_artists(fixture.slow_performer_a, &[LinkType::Performer], 5)
        .is_empty());
}

#[test]
fn test_train_then_query() {
    let temp_dir = TempDir::new().unwrap();
    let (fixture, library, cache) = setup(temp_dir.path());
    let engine = engine(&library, &cache, settings());

    let seen = std::sync::Mutex::new(Vec::new());
    let source = engine
        .load(false, &|p| seen.lock().unwrap().push(p))
        .unwrap();
    assert_eq!(source, LoadSource::Training);
    assert!(engine.is_ready());

    let progress = seen.into_inner().unwrap();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(progress.last().copied(), Some(1.0));

    let snapshot = engine.snapshot().unwrap();
    assert!(snapshot.is_consistent());
    assert!(!snapshot.tracks().contains(fixture.silent));
    for track in fixture.slow.iter().chain(&fixture.fast).chain(&fixture.varied) {
        assert!(snapshot.tracks().contains(*track));
    }

    // Identical slow tracks share a cell and come back first, in id order.
    let similar = engine.similar_tracks(&[fixture.slow[0]], 3);
    assert_eq!(similar, fixture.slow[1..4].to_vec());

    let similar = engine.similar_tracks(&[fixture.fast[2]], 20);
    assert_well_formed(&similar, &[fixture.fast[2]], 20);
    assert!(similar.starts_with(&[fixture.fast[0], fixture.fast[1], fixture.fast[3]]));

    assert!(engine.similar_tracks(&[], 5).is_empty());
    assert!(engine.similar_tracks(&[fixture.silent], 5).is_empty());
    assert!(engine.similar_tracks(&[fixture.slow[0]], 0).is_empty());
}

#[test]
fn test_similar_tracks_from_list() {
    let temp_dir = TempDir::new().unwrap();
    let (fixture, library, cache) = setup(temp_dir.path());
    let engine = engine(&library, &cache, settings());
    engine.load(false, &|_| {}).unwrap();

    let similar = engine.similar_tracks_from_list(fixture.slow_list, 2);
    assert_eq!(similar, vec![fixture.slow[2], fixture.slow[3]]);

    assert!(engine
        .similar_tracks_from_list(TrackListId::new(999), 5)
        .is_empty());
}

#[test]
fn test_similar_releases_and_artists() {
    let temp_dir = TempDir::new().unwrap();
    let (fixture, library, cache) = setup(temp_dir.path());
    let engine = engine(&library, &cache, settings());
    engine.load(false, &|_| {}).unwrap();

    let releases = engine.similar_releases(fixture.slow_a, 10);
    assert_well_formed(&releases, &[fixture.slow_a], 10);
    assert_eq!(releases.first(), Some(&fixture.slow_b));

    let releases = engine.similar_releases(fixture.fast_release, 10);
    assert_well_formed(&releases, &[fixture.fast_release], 10);

    let artists = engine.similar_artists(fixture.slow_performer_a, &[LinkType::Performer], 10);
    assert_well_formed(&artists, &[fixture.slow_performer_a], 10);
    assert_eq!(artists.first(), Some(&fixture.slow_performer_b));

    // The performer has no composer credit, so only the performer index helps.
    assert!(engine
        .similar_artists(fixture.slow_performer_a, &[LinkType::Composer], 10)
        .is_empty());
    let artists = engine.similar_artists(
        fixture.slow_performer_a,
        &[LinkType::Composer, LinkType::Performer, LinkType::Performer],
        10,
    );
    assert_eq!(artists.first(), Some(&fixture.slow_performer_b));
    assert_well_formed(&artists, &[fixture.slow_performer_a], 10);

    let snapshot = engine.snapshot().unwrap();
    assert_eq!(
        snapshot.artists(LinkType::Composer).unwrap().positions(fixture.composer),
        snapshot.tracks().positions(fixture.slow[0])
    );
}

#[test]
fn test_reload_from_cache() {
    let temp_dir = TempDir::new().unwrap();
    let (_fixture, library, cache) = setup(temp_dir.path());

    let first = engine(&library, &cache, settings());
    assert_eq!(first.load(false, &|_| {}).unwrap(), LoadSource::Training);
    assert!(cache.read().unwrap().is_some());

    let second = engine(&library, &cache, settings());
    assert_eq!(second.load(false, &|_| {}).unwrap(), LoadSource::Cache);
    assert_eq!(*first.snapshot().unwrap(), *second.snapshot().unwrap());

    // Same seed, same library: retraining gives the same map.
    assert_eq!(second.load(true, &|_| {}).unwrap(), LoadSource::Training);
    assert_eq!(*first.snapshot().unwrap(), *second.snapshot().unwrap());
}

#[test]
fn test_unusable_cache_falls_back_to_training() {
    let temp_dir = TempDir::new().unwrap();
    let (_fixture, library, cache) = setup(temp_dir.path());

    cache.write(b"definitely not a snapshot").unwrap();
    let engine_a = engine(&library, &cache, settings());
    assert_eq!(engine_a.load(false, &|_| {}).unwrap(), LoadSource::Training);
    let blob = cache.read().unwrap().unwrap();
    assert!(codec::decode(&blob, settings().dimension()).is_ok());

    // A cache trained on other features is not reused.
    let mut wider = settings();
    wider.features.insert(
        "rhythm.danceability".to_string(),
        FeatureSettings::known("rhythm.danceability", 1.0).unwrap(),
    );
    let engine_b = engine(&library, &cache, wider);
    // No track has the extra feature, so retraining has nothing to work with.
    assert!(matches!(
        engine_b.load(false, &|_| {}).unwrap_err(),
        LoadError::NoTrainingData
    ));

    // Same features, other weights: retrained as well.
    let mut reweighted = settings();
    if let Some(bpm) = reweighted.features.get_mut("rhythm.bpm") {
        bpm.weight = 3.0;
    }
    let engine_c = engine(&library, &cache, reweighted);
    assert_eq!(engine_c.load(false, &|_| {}).unwrap(), LoadSource::Training);
}

#[test]
fn test_cancelled_load_keeps_previous_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let (fixture, library, cache) = setup(temp_dir.path());
    let engine = engine(&library, &cache, settings());
    engine.load(false, &|_| {}).unwrap();

    let before = engine.snapshot().unwrap();
    let cached_before = cache.read().unwrap();
    let results_before = engine.similar_tracks(&[fixture.varied[4]], 10);

    // Cancel as soon as training starts reporting.
    let err = engine
        .load(true, &|p| {
            if p >= 0.3 {
                engine.request_cancel_load();
            }
        })
        .unwrap_err();
    assert!(err.is_cancelled());

    let after = engine.snapshot().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(cache.read().unwrap(), cached_before);
    assert_eq!(engine.similar_tracks(&[fixture.varied[4]], 10), results_before);

    // The engine accepts new loads afterwards.
    assert_eq!(engine.load(true, &|_| {}).unwrap(), LoadSource::Training);
}

#[test]
fn test_cancelled_first_load_leaves_engine_not_ready() {
    let temp_dir = TempDir::new().unwrap();
    let (fixture, library, cache) = setup(temp_dir.path());
    let engine = engine(&library, &cache, settings());

    let err = engine
        .load(false, &|_| engine.request_cancel_load())
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!engine.is_ready());
    assert!(engine.similar_tracks(&[fixture.slow[0]], 5).is_empty());
    assert!(cache.read().unwrap().is_none());
}

struct FailingProvider;

impl FeatureProvider for FailingProvider {
    fn fetch(
        &self,
        _track_id: TrackId,
        _features: &BTreeSet<String>,
    ) -> sonority_core::Result<Option<FeatureMap>> {
        Err(sonority_core::Error::InvalidData("analyzer offline".to_string()))
    }
}

#[test]
fn test_failing_provider_fails_the_load() {
    let temp_dir = TempDir::new().unwrap();
    let (_fixture, library, cache) = setup(temp_dir.path());
    let engine = FeaturesEngine::with_feature_provider(
        Arc::clone(&library) as Arc<dyn MediaLibrary>,
        Arc::new(FailingProvider),
        Arc::new(cache.clone()),
        settings(),
    );

    let err = engine.load(false, &|_| {}).unwrap_err();
    assert!(matches!(err, LoadError::ProviderFailed { failures: 21 }));
    assert!(!engine.is_ready());
}

#[test]
fn test_tracks_with_mismatched_features_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let (fixture, library, cache) = setup(temp_dir.path());
    {
        let db = Database::open(temp_dir.path().join("library.db")).unwrap();
        let mut bad = features(100.0, 0.5);
        bad.insert("rhythm.bpm".to_string(), vec![100.0, 101.0]);
        db.set_track_features(fixture.varied[0], &bad).unwrap();
    }

    let engine = engine(&library, &cache, settings());
    engine.load(false, &|_| {}).unwrap();
    let snapshot = engine.snapshot().unwrap();
    assert!(!snapshot.tracks().contains(fixture.varied[0]));
    assert!(snapshot.tracks().contains(fixture.varied[1]));
}

#[test]
fn test_shared_classifier_across_threads() {
    let temp_dir = TempDir::new().unwrap();
    let (fixture, library, cache) = setup(temp_dir.path());
    let classifier: Arc<dyn SimilarityClassifier> = Arc::new(engine(&library, &cache, settings()));
    assert_eq!(classifier.name(), "features");

    let loader = {
        let classifier = Arc::clone(&classifier);
        std::thread::spawn(move || classifier.load(false, &|_| {}))
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let classifier = Arc::clone(&classifier);
            let seed = fixture.slow[0];
            std::thread::spawn(move || {
                let result = classifier.similar_tracks(&[seed], 5);
                assert!(result.len() <= 5);
                assert!(!result.contains(&seed));
            })
        })
        .collect();

    assert!(loader.join().unwrap().is_ok());
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(classifier.similar_tracks(&[fixture.slow[0]], 2).len(), 2);
}
