//! The self-organizing map similarity engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;

use sonority_core::model::{ArtistId, LinkType, ReleaseId, TrackId, TrackListId};

use crate::cache::CacheStore;
use crate::cancel::{CancelCheck, CancellationToken};
use crate::classifier::{LoadSource, SimilarityClassifier};
use crate::codec;
use crate::error::{LoadError, LoadResult};
use crate::index::{Snapshot, SnapshotBuilder};
use crate::network::Network;
use crate::normalizer::DataNormalizer;
use crate::ports::{FeatureProvider, MediaLibrary};
use crate::progress::{LoadStage, ProgressReporter};
use crate::search::{merge_ranked, similar_objects};
use crate::settings::TrainSettings;

/// Number of feature fetches between two cancellation checks.
const FETCH_BATCH_SIZE: usize = 64;

/// Similarity engine backed by a self-organizing map of track features.
///
/// Loads run one at a time; queries may run concurrently with a load and
/// always see either the previous snapshot or the new one, never a mix.
pub struct FeaturesEngine {
    library: Arc<dyn MediaLibrary>,
    features: Arc<dyn FeatureProvider>,
    cache: Arc<dyn CacheStore>,
    settings: TrainSettings,
    snapshot: ArcSwapOption<Snapshot>,
    /// Token of the running load; `None` while idle.
    current_load: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for FeaturesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturesEngine")
            .field("settings", &self.settings)
            .field("ready", &self.is_ready())
            .field("loading", &self.is_loading())
            .finish_non_exhaustive()
    }
}

/// Marks the engine as loading for as long as it lives.
///
/// The load's token is published under the same lock that marks the engine
/// as loading, so a cancel request can never see a load without its token.
struct LoadGuard<'a> {
    engine: &'a FeaturesEngine,
    token: CancellationToken,
}

impl<'a> LoadGuard<'a> {
    fn acquire(engine: &'a FeaturesEngine) -> LoadResult<Self> {
        let mut current = engine.current_load();
        if current.is_some() {
            return Err(LoadError::AlreadyLoading);
        }
        let token = CancellationToken::new();
        *current = Some(token.clone());
        Ok(Self { engine, token })
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        *self.engine.current_load() = None;
    }
}

impl FeaturesEngine {
    /// Create an engine reading both the library and the track features
    /// from `library`.
    pub fn new<L>(library: Arc<L>, cache: Arc<dyn CacheStore>, settings: TrainSettings) -> Self
    where
        L: MediaLibrary + FeatureProvider + 'static,
    {
        let features: Arc<dyn FeatureProvider> = Arc::clone(&library) as Arc<dyn FeatureProvider>;
        Self::with_feature_provider(library, features, cache, settings)
    }

    /// Create an engine taking the track features from a separate provider.
    pub fn with_feature_provider(
        library: Arc<dyn MediaLibrary>,
        features: Arc<dyn FeatureProvider>,
        cache: Arc<dyn CacheStore>,
        settings: TrainSettings,
    ) -> Self {
        Self {
            library,
            features,
            cache,
            settings,
            snapshot: ArcSwapOption::empty(),
            current_load: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &TrainSettings {
        &self.settings
    }

    /// The installed snapshot, if a load has succeeded.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    pub fn is_loading(&self) -> bool {
        self.current_load().is_some()
    }

    fn current_load(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current_load.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_snapshot<T: Default>(&self, query: impl FnOnce(&Snapshot) -> T) -> T {
        let guard = self.snapshot.load();
        match guard.as_ref() {
            Some(snapshot) => query(snapshot),
            None => T::default(),
        }
    }

    fn run_load(
        &self,
        force_retrain: bool,
        cancel: &CancellationToken,
        reporter: &ProgressReporter<'_>,
    ) -> LoadResult<LoadSource> {
        self.settings.validate()?;

        if force_retrain {
            log::info!("Retraining {} (forced)", self.name());
        } else {
            reporter.stage(LoadStage::ReadingCache, 0.0);
            if let Some(snapshot) = self.read_cache() {
                cancel.check()?;
                self.install(snapshot);
                reporter.finish();
                return Ok(LoadSource::Cache);
            }
        }

        let snapshot = self.train(cancel, reporter)?;
        cancel.check()?;

        reporter.stage(LoadStage::WritingCache, 0.0);
        self.write_cache(&snapshot);
        self.install(snapshot);
        reporter.finish();
        Ok(LoadSource::Training)
    }

    /// The cached snapshot, when one exists and fits the current settings.
    fn read_cache(&self) -> Option<Snapshot> {
        let blob = match self.cache.read() {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                log::info!("No cached {} snapshot, training", self.name());
                return None;
            }
            Err(e) => {
                log::warn!("Cannot read the {} cache, training: {}", self.name(), e);
                return None;
            }
        };

        match codec::decode_for(&blob, &self.settings) {
            Ok(snapshot) => {
                log::info!(
                    "Loaded {} snapshot from cache ({}x{} grid, {} tracks)",
                    self.name(),
                    snapshot.network().rows(),
                    snapshot.network().columns(),
                    snapshot.tracks().len()
                );
                Some(snapshot)
            }
            Err(e) => {
                log::warn!("Ignoring {} cache: {}", self.name(), e);
                None
            }
        }
    }

    fn write_cache(&self, snapshot: &Snapshot) {
        let written = codec::encode(snapshot).and_then(|blob| self.cache.write(&blob));
        if let Err(e) = written {
            log::warn!("Cannot write the {} cache: {}", self.name(), e);
        }
    }

    fn install(&self, snapshot: Snapshot) {
        self.snapshot.store(Some(Arc::new(snapshot)));
    }

    fn train(&self, cancel: &CancellationToken, reporter: &ProgressReporter<'_>) -> LoadResult<Snapshot> {
        let samples = self.collect_samples(cancel, reporter)?;
        let (track_ids, mut vectors): (Vec<TrackId>, Vec<Vec<f64>>) = samples.into_iter().unzip();

        let normalizer = DataNormalizer::fit(&vectors, self.settings.dimension());
        normalizer.normalize_all(&mut vectors);

        let network = Network::train(
            &vectors,
            self.settings.dimension_weights(),
            &self.settings,
            cancel,
            &reporter.stage_callback(LoadStage::Training),
        )?;

        let samples: Vec<(TrackId, Vec<f64>)> = track_ids.into_iter().zip(vectors).collect();
        SnapshotBuilder::new(self.library.as_ref(), cancel).build(
            network,
            &samples,
            &reporter.stage_callback(LoadStage::Indexing),
        )
    }

    /// Fetch and assemble the training sample of every library track.
    ///
    /// Tracks without features, with unusable features or whose fetch failed
    /// are left out.
    fn collect_samples(
        &self,
        cancel: &CancellationToken,
        reporter: &ProgressReporter<'_>,
    ) -> LoadResult<Vec<(TrackId, Vec<f64>)>> {
        let names = self.settings.feature_names();
        let track_ids = self.library.track_ids()?;
        let total = track_ids.len().max(1);

        let mut samples = Vec::with_capacity(track_ids.len());
        let mut without_features = 0;
        let mut rejected = 0;
        let mut failures = 0;

        for (i, &track_id) in track_ids.iter().enumerate() {
            if i % FETCH_BATCH_SIZE == 0 {
                cancel.check()?;
                reporter.stage(LoadStage::FetchingFeatures, i as f64 / total as f64);
            }

            match self.features.fetch(track_id, &names) {
                Ok(Some(features)) => match self.settings.build_sample(&features) {
                    Ok(sample) if sample.iter().all(|v| v.is_finite()) => {
                        samples.push((track_id, sample));
                    }
                    Ok(_) => {
                        rejected += 1;
                        log::warn!("Skipping track {}: non-finite feature value", track_id);
                    }
                    Err(e) if e.is_sample_rejection() => {
                        rejected += 1;
                        log::warn!("Skipping track {}: {}", track_id, e);
                    }
                    Err(e) => return Err(e),
                },
                Ok(None) => without_features += 1,
                Err(e) => {
                    failures += 1;
                    log::warn!("Cannot fetch features of track {}: {}", track_id, e);
                }
            }
        }
        reporter.stage(LoadStage::FetchingFeatures, 1.0);

        log::info!(
            "Collected {} samples from {} tracks ({} without features, {} rejected, {} failed)",
            samples.len(),
            track_ids.len(),
            without_features,
            rejected,
            failures
        );

        if samples.is_empty() {
            return Err(if failures > 0 {
                LoadError::ProviderFailed { failures }
            } else {
                LoadError::NoTrainingData
            });
        }
        Ok(samples)
    }
}

impl SimilarityClassifier for FeaturesEngine {
    fn name(&self) -> &str {
        "features"
    }

    fn load(&self, force_retrain: bool, progress: &dyn Fn(f64)) -> LoadResult<LoadSource> {
        let guard = LoadGuard::acquire(self)?;
        let reporter = ProgressReporter::new(progress);

        let result = self.run_load(force_retrain, guard.token(), &reporter);
        match &result {
            Ok(source) => log::info!("{} engine ready ({:?})", self.name(), source),
            Err(e) if e.is_cancelled() => log::info!("{} engine load cancelled", self.name()),
            Err(e) => log::error!("{} engine load failed: {}", self.name(), e),
        }
        result
    }

    fn request_cancel_load(&self) {
        if let Some(token) = self.current_load().as_ref() {
            log::info!("Cancelling {} engine load", self.name());
            token.cancel();
        }
    }

    fn is_ready(&self) -> bool {
        self.snapshot.load().is_some()
    }

    fn similar_tracks(&self, track_ids: &[TrackId], max_count: usize) -> Vec<TrackId> {
        self.with_snapshot(|snapshot| {
            similar_objects(track_ids, snapshot.tracks(), snapshot.network(), max_count)
        })
    }

    fn similar_tracks_from_list(&self, track_list_id: TrackListId, max_count: usize) -> Vec<TrackId> {
        if !self.is_ready() {
            return Vec::new();
        }
        match self.library.track_list_tracks(track_list_id) {
            Ok(track_ids) => self.similar_tracks(&track_ids, max_count),
            Err(e) => {
                log::warn!("Cannot read track list {}: {}", track_list_id, e);
                Vec::new()
            }
        }
    }

    fn similar_releases(&self, release_id: ReleaseId, max_count: usize) -> Vec<ReleaseId> {
        self.with_snapshot(|snapshot| {
            similar_objects(&[release_id], snapshot.releases(), snapshot.network(), max_count)
        })
    }

    fn similar_artists(
        &self,
        artist_id: ArtistId,
        link_types: &[LinkType],
        max_count: usize,
    ) -> Vec<ArtistId> {
        self.with_snapshot(|snapshot| {
            let mut seen = Vec::with_capacity(link_types.len());
            let lists = link_types.iter().filter_map(|&link_type| {
                if seen.contains(&link_type) {
                    return None;
                }
                seen.push(link_type);
                let index = snapshot.artists(link_type)?;
                Some(similar_objects(&[artist_id], index, snapshot.network(), max_count))
            });
            merge_ranked(lists, max_count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{FeatureSettings, FeatureSettingsMap};
    use sonority_core::model::{ArtistLink, FeatureMap};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryCache {
        blob: Mutex<Option<Vec<u8>>>,
    }

    impl CacheStore for MemoryCache {
        fn read(&self) -> Result<Option<Vec<u8>>, crate::error::CacheError> {
            Ok(self.blob.lock().unwrap().clone())
        }

        fn write(&self, blob: &[u8]) -> Result<(), crate::error::CacheError> {
            *self.blob.lock().unwrap() = Some(blob.to_vec());
            Ok(())
        }

        fn clear(&self) -> Result<(), crate::error::CacheError> {
            *self.blob.lock().unwrap() = None;
            Ok(())
        }
    }

    /// Tracks 1..=n with a single one-dimensional feature equal to the id,
    /// all on release 1.
    struct Library {
        features: BTreeMap<TrackId, Option<f64>>,
    }

    impl Library {
        fn new(values: &[(i64, Option<f64>)]) -> Self {
            Self {
                features: values.iter().map(|(id, v)| (TrackId::new(*id), *v)).collect(),
            }
        }
    }

    impl MediaLibrary for Library {
        fn track_ids(&self) -> sonority_core::Result<Vec<TrackId>> {
            Ok(self.features.keys().copied().collect())
        }

        fn track_release(&self, _: TrackId) -> sonority_core::Result<Option<ReleaseId>> {
            Ok(Some(ReleaseId::new(1)))
        }

        fn track_artist_links(&self, _: TrackId) -> sonority_core::Result<Vec<ArtistLink>> {
            Ok(Vec::new())
        }

        fn track_list_tracks(&self, _: TrackListId) -> sonority_core::Result<Vec<TrackId>> {
            Ok(Vec::new())
        }
    }

    impl FeatureProvider for Library {
        fn fetch(
            &self,
            track_id: TrackId,
            _: &BTreeSet<String>,
        ) -> sonority_core::Result<Option<FeatureMap>> {
            Ok(self.features.get(&track_id).copied().flatten().map(|v| {
                let mut map = FeatureMap::new();
                map.insert("value".to_string(), vec![v]);
                map
            }))
        }
    }

    fn settings() -> TrainSettings {
        let mut features = FeatureSettingsMap::new();
        features.insert(
            "value".to_string(),
            FeatureSettings {
                dimension: 1,
                weight: 1.0,
            },
        );
        TrainSettings {
            iteration_count: 3,
            sample_count_per_neuron: 1.0,
            seed: 7,
            features,
        }
    }

    fn engine(library: Library) -> FeaturesEngine {
        FeaturesEngine::new(Arc::new(library), Arc::new(MemoryCache::default()), settings())
    }

    #[test]
    fn test_not_ready_until_loaded() {
        let engine = engine(Library::new(&[(1, Some(0.0)), (2, Some(1.0))]));
        assert!(!engine.is_ready());
        assert!(engine.similar_tracks(&[TrackId::new(1)], 5).is_empty());
        assert!(engine.similar_releases(ReleaseId::new(1), 5).is_empty());

        assert_eq!(engine.load(false, &|_| {}).unwrap(), LoadSource::Training);
        assert!(engine.is_ready());
        assert!(!engine.is_loading());
    }

    #[test]
    fn test_tracks_without_features_are_left_out() {
        let engine = engine(Library::new(&[(1, Some(0.0)), (2, None), (3, Some(1.0))]));
        engine.load(false, &|_| {}).unwrap();

        let snapshot = engine.snapshot().unwrap();
        assert!(snapshot.tracks().contains(TrackId::new(1)));
        assert!(!snapshot.tracks().contains(TrackId::new(2)));
        assert!(snapshot.tracks().contains(TrackId::new(3)));
    }

    #[test]
    fn test_nothing_to_train_on() {
        let engine = engine(Library::new(&[(1, None)]));
        let err = engine.load(false, &|_| {}).unwrap_err();
        assert!(matches!(err, LoadError::NoTrainingData));
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_concurrent_load_is_refused() {
        let engine = engine(Library::new(&[(1, Some(0.0))]));
        let _guard = LoadGuard::acquire(&engine).unwrap();
        assert!(matches!(
            engine.load(false, &|_| {}).unwrap_err(),
            LoadError::AlreadyLoading
        ));
    }

    #[test]
    fn test_cancel_right_after_load_start_is_kept() {
        let engine = engine(Library::new(&[(1, Some(0.0)), (2, Some(1.0))]));
        let guard = LoadGuard::acquire(&engine).unwrap();
        engine.request_cancel_load();
        assert!(guard.token().is_cancelled());

        let progress = |_: f64| {};
        let reporter = ProgressReporter::new(&progress);
        let err = engine.run_load(true, guard.token(), &reporter).unwrap_err();
        assert!(err.is_cancelled());
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_each_load_gets_a_fresh_token() {
        let engine = engine(Library::new(&[(1, Some(0.0)), (2, Some(1.0))]));
        {
            let guard = LoadGuard::acquire(&engine).unwrap();
            engine.request_cancel_load();
            assert!(guard.token().is_cancelled());
        }
        assert!(!engine.is_loading());

        let guard = LoadGuard::acquire(&engine).unwrap();
        assert!(!guard.token().is_cancelled());
    }

    #[test]
    fn test_cancel_when_idle_is_ignored() {
        let engine = engine(Library::new(&[(1, Some(0.0)), (2, Some(1.0))]));
        engine.request_cancel_load();
        assert!(engine.load(false, &|_| {}).is_ok());
    }
}
