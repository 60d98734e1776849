//! Snapshot ownership: load-or-build, publish, refresh.
//!
//! Queries run against an `Arc<GuidelineSnapshot>` cloned out of the
//! [`SnapshotCell`]; a rebuild never touches a published snapshot, it swaps
//! in a new one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{info, warn};

use crate::cache::{
    CachePaths, CacheState, RetrievalCacheContents, load_retrieval_cache, load_rule_cache,
    write_retrieval_cache, write_rule_cache,
};
use crate::compile::RuleCompiler;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::matcher::RuleMatcher;
use crate::model::{Chunk, RetrievalResult, Rule, SectionContainer};
use crate::retrieval::{ChunkEmbeddings, RetrievalIndex, SearchQuery};
use crate::segment::Segmenter;
use crate::semantic::{EmbeddingProvider, LocalHashEmbedder, resolve_model_config};
use crate::terms::TermsNormalizer;
use crate::util::sha256_hex;

pub type SharedProvider = Box<dyn EmbeddingProvider + Send + Sync>;

/// One immutable version of everything derived from the guideline.
#[derive(Debug)]
pub struct GuidelineSnapshot {
    pub content_hash: String,
    pub containers: Vec<SectionContainer>,
    pub matcher: RuleMatcher,
    pub index: RetrievalIndex,
}

impl GuidelineSnapshot {
    pub fn chunks(&self) -> &[Chunk] {
        self.index.chunks()
    }

    pub fn rules(&self) -> &[Rule] {
        self.matcher.rules()
    }
}

/// Publishes snapshots by swapping an `Arc` under a short write lock.
#[derive(Debug)]
pub struct SnapshotCell {
    current: RwLock<Arc<GuidelineSnapshot>>,
}

impl SnapshotCell {
    pub fn new(snapshot: GuidelineSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn get(&self) -> Arc<GuidelineSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `snapshot` and returns the one it replaced.
    pub fn publish(&self, snapshot: Arc<GuidelineSnapshot>) -> Arc<GuidelineSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, snapshot)
    }
}

/// Host-owned engine for one guideline document and one cache directory.
pub struct Engine {
    document_path: PathBuf,
    cache: CachePaths,
    config: EngineConfig,
    provider: SharedProvider,
    segmenter: Segmenter,
    compiler: RuleCompiler,
    cell: SnapshotCell,
    rebuild_lock: Mutex<()>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("document_path", &self.document_path)
            .field("cache", &self.cache)
            .field("model_id", &self.provider.model_id())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Loads caches when they match the document, otherwise compiles and
    /// rewrites them. Uses the local hashed embedder named by the config.
    pub fn open(
        document_path: impl Into<PathBuf>,
        cache_root: impl Into<PathBuf>,
        config: EngineConfig,
    ) -> Result<Self> {
        let provider = local_provider(&config);
        Self::start(document_path.into(), cache_root.into(), config, provider, false)
    }

    /// Like [`Engine::open`] but ignores any cache, e.g. after an embedding
    /// dimension mismatch.
    pub fn open_rebuilt(
        document_path: impl Into<PathBuf>,
        cache_root: impl Into<PathBuf>,
        config: EngineConfig,
    ) -> Result<Self> {
        let provider = local_provider(&config);
        Self::start(document_path.into(), cache_root.into(), config, provider, true)
    }

    pub fn with_provider(
        document_path: impl Into<PathBuf>,
        cache_root: impl Into<PathBuf>,
        config: EngineConfig,
        provider: SharedProvider,
    ) -> Result<Self> {
        Self::start(document_path.into(), cache_root.into(), config, provider, false)
    }

    fn start(
        document_path: PathBuf,
        cache_root: PathBuf,
        config: EngineConfig,
        provider: SharedProvider,
        force: bool,
    ) -> Result<Self> {
        config.validate()?;
        let segmenter = Segmenter::new()?;
        let compiler = RuleCompiler::new(TermsNormalizer::new()?)?;
        let cache = CachePaths::new(cache_root);

        let document = read_document(&document_path)?;
        let snapshot = build_snapshot(
            &document,
            &cache,
            &config,
            provider.as_ref(),
            &segmenter,
            &compiler,
            force,
        )?;

        Ok(Self {
            document_path,
            cache,
            config,
            provider,
            segmenter,
            compiler,
            cell: SnapshotCell::new(snapshot),
            rebuild_lock: Mutex::new(()),
        })
    }

    pub fn current(&self) -> Arc<GuidelineSnapshot> {
        self.cell.get()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn cache_paths(&self) -> &CachePaths {
        &self.cache
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Re-reads the document and publishes a new snapshot only when its
    /// content hash changed. Returns whether a new snapshot was published.
    pub fn refresh(&self) -> Result<bool> {
        let _guard = self.rebuild_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let document = read_document(&self.document_path)?;
        let content_hash = sha256_hex(document.as_bytes());
        if content_hash == self.cell.get().content_hash {
            return Ok(false);
        }

        let snapshot = self.build(&document, false)?;
        let previous = self.cell.publish(Arc::new(snapshot));
        info!(
            previous = %previous.content_hash,
            current = %content_hash,
            "published refreshed snapshot"
        );
        Ok(true)
    }

    /// Recompiles from the document regardless of caches and publishes.
    pub fn rebuild(&self) -> Result<Arc<GuidelineSnapshot>> {
        let _guard = self.rebuild_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let document = read_document(&self.document_path)?;
        let snapshot = Arc::new(self.build(&document, true)?);
        self.cell.publish(snapshot.clone());
        info!(content_hash = %snapshot.content_hash, "published rebuilt snapshot");
        Ok(snapshot)
    }

    /// Searches the current snapshot, embedding the query text with the
    /// engine's provider when no vector is supplied.
    pub fn search(&self, mut query: SearchQuery) -> Result<Vec<RetrievalResult>> {
        let snapshot = self.current();
        if query.embedding.is_none() && snapshot.index.embeddings().is_some() {
            query.embedding = Some(self.provider.embed(&query.text));
        }
        snapshot.index.search(&query)
    }

    fn build(&self, document: &str, force: bool) -> Result<GuidelineSnapshot> {
        build_snapshot(
            document,
            &self.cache,
            &self.config,
            self.provider.as_ref(),
            &self.segmenter,
            &self.compiler,
            force,
        )
    }
}

fn local_provider(config: &EngineConfig) -> SharedProvider {
    Box::new(LocalHashEmbedder::new(resolve_model_config(
        &config.embedding.model_id,
        Some(config.embedding.dimensions),
    )))
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => EngineError::DocumentNotFound {
            path: path.to_path_buf(),
        },
        _ => EngineError::io(path, err),
    })
}

enum RetrievalSource {
    Cached(RetrievalCacheContents),
    Compiled {
        containers: Vec<SectionContainer>,
        chunks: Vec<Chunk>,
    },
}

/// Recoverable cache faults read as a miss; everything else propagates.
fn or_rebuild<T>(path: &Path, loaded: Result<CacheState<T>>) -> Result<Option<T>> {
    match loaded {
        Ok(state) => Ok(state.fresh()),
        Err(err) if err.is_recoverable() => {
            warn!(path = %path.display(), error = %err, "discarding corrupt cache");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn build_snapshot(
    document: &str,
    cache: &CachePaths,
    config: &EngineConfig,
    provider: &dyn EmbeddingProvider,
    segmenter: &Segmenter,
    compiler: &RuleCompiler,
    force: bool,
) -> Result<GuidelineSnapshot> {
    let content_hash = sha256_hex(document.as_bytes());
    let rules_path = cache.rules();
    let retrieval_path = cache.retrieval();

    let (cached_rules, cached_retrieval) = if force {
        (None, None)
    } else {
        (
            or_rebuild(&rules_path, load_rule_cache(&rules_path, &content_hash))?,
            or_rebuild(
                &retrieval_path,
                load_retrieval_cache(
                    &retrieval_path,
                    &content_hash,
                    provider.model_id(),
                    provider.dimensions(),
                ),
            )?,
        )
    };

    let (rules, source) = match (cached_rules, cached_retrieval) {
        (Some(rules), Some(contents)) => (rules, RetrievalSource::Cached(contents)),
        (cached_rules, cached_retrieval) => {
            let compiled = compiler.compile_document(segmenter, document);
            let rules = match cached_rules {
                Some(rules) => rules,
                None => {
                    write_rule_cache(&rules_path, &content_hash, &compiled.rules)?;
                    compiled.rules
                }
            };
            let source = match cached_retrieval {
                Some(contents) => RetrievalSource::Cached(contents),
                None => RetrievalSource::Compiled {
                    containers: compiled.containers,
                    chunks: compiled.chunks,
                },
            };
            (rules, source)
        }
    };

    let (containers, index) = match source {
        RetrievalSource::Cached(contents) => {
            let stale_vectors = contents.embeddings.is_none();
            let embeddings = match contents.embeddings {
                Some(embeddings) => embeddings,
                None => ChunkEmbeddings::compute(provider, &contents.chunks)?,
            };
            let index = RetrievalIndex::from_parts(
                contents.chunks,
                contents.lexical,
                Some(embeddings),
                config.retrieval.clone(),
            )?;
            if stale_vectors {
                write_retrieval_cache(&retrieval_path, &content_hash, &contents.containers, &index)?;
            }
            (contents.containers, index)
        }
        RetrievalSource::Compiled { containers, chunks } => {
            let embeddings = ChunkEmbeddings::compute(provider, &chunks)?;
            let index = RetrievalIndex::build(chunks, Some(embeddings), config.retrieval.clone())?;
            write_retrieval_cache(&retrieval_path, &content_hash, &containers, &index)?;
            (containers, index)
        }
    };

    let matcher = RuleMatcher::new(rules, compiler.terms().clone(), config.matcher.clone())?;
    info!(
        content_hash = %content_hash,
        rules = matcher.len(),
        chunks = index.chunks().len(),
        "snapshot ready"
    );

    Ok(GuidelineSnapshot {
        content_hash,
        containers,
        matcher,
        index,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use super::{Engine, GuidelineSnapshot};
    use crate::cache::load_retrieval_cache;
    use crate::config::{EmbeddingConfig, EngineConfig};
    use crate::error::EngineError;
    use crate::model::{Facts, MatchType};
    use crate::retrieval::SearchQuery;
    use crate::semantic::{EmbeddingProvider, embed_text_local};
    use crate::test_support::NG12_EXCERPT;

    /// Hashed embeddings under a caller-chosen model id.
    struct NamedProvider {
        model_id: &'static str,
        dimensions: usize,
    }

    impl EmbeddingProvider for NamedProvider {
        fn model_id(&self) -> &str {
            self.model_id
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn embed(&self, text: &str) -> Vec<f32> {
            embed_text_local(text, self.dimensions)
        }
    }

    fn open_with(
        document: &std::path::Path,
        cache_root: &std::path::Path,
        model_id: &'static str,
        dimensions: usize,
    ) -> crate::error::Result<Engine> {
        Engine::with_provider(
            document,
            cache_root,
            config(dimensions),
            Box::new(NamedProvider {
                model_id,
                dimensions,
            }),
        )
    }

    fn config(dimensions: usize) -> EngineConfig {
        EngineConfig {
            embedding: EmbeddingConfig {
                dimensions,
                ..EmbeddingConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn full_match_count(snapshot: &GuidelineSnapshot) -> usize {
        let facts = Facts {
            age: Some(45),
            symptoms: vec!["cough".to_string(), "weight loss".to_string()],
            ..Facts::default()
        };
        snapshot
            .matcher
            .match_facts(&facts)
            .iter()
            .filter(|result| result.match_type == MatchType::Full)
            .count()
    }

    #[test]
    fn open_builds_caches_and_reopen_reads_them() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = dir.path().join("ng12.md");
        fs::write(&document, NG12_EXCERPT).expect("write document");
        let cache_root = dir.path().join("cache");

        let first = Engine::open(&document, &cache_root, config(64)).expect("open");
        assert!(first.cache_paths().rules().exists());
        assert!(first.cache_paths().retrieval().exists());
        let built = first.current();
        assert_eq!(built.rules().len(), 8);
        assert_eq!(built.chunks().len(), 9);
        assert!(full_match_count(&built) >= 1);

        let second = Engine::open(&document, &cache_root, config(64)).expect("reopen");
        let loaded = second.current();
        assert_eq!(loaded.content_hash, built.content_hash);
        assert_eq!(loaded.rules(), built.rules());
        assert_eq!(loaded.containers, built.containers);
        assert_eq!(loaded.index.embeddings(), built.index.embeddings());
    }

    #[test]
    fn refresh_only_republishes_on_content_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = dir.path().join("ng12.md");
        fs::write(&document, NG12_EXCERPT).expect("write document");

        let engine = Engine::open(&document, dir.path().join("cache"), config(64)).expect("open");
        let before = engine.current();
        assert!(!engine.refresh().expect("refresh"));
        assert!(Arc::ptr_eq(&before, &engine.current()));

        let amended = NG12_EXCERPT.replace(
            "1.13.1 Consider a non-urgent referral in people with unexplained bleeding. [2015]",
            "1.13.1 Consider a non-urgent referral in people with unexplained bleeding. [2015]\n\n1.13.2 Consider an urgent referral in people with unexplained night sweats. [2025]",
        );
        fs::write(&document, amended).expect("amend document");
        assert!(engine.refresh().expect("refresh"));

        let after = engine.current();
        assert_ne!(after.content_hash, before.content_hash);
        assert!(after.matcher.rule("1.13.2").is_some());
        // A reader holding the old snapshot still sees the old rule set.
        assert!(before.matcher.rule("1.13.2").is_none());
    }

    #[test]
    fn corrupt_rule_cache_is_rebuilt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = dir.path().join("ng12.md");
        fs::write(&document, NG12_EXCERPT).expect("write document");
        let cache_root = dir.path().join("cache");

        let engine = Engine::open(&document, &cache_root, config(64)).expect("open");
        let rules_path = engine.cache_paths().rules();
        fs::write(&rules_path, b"{not json").expect("corrupt cache");

        let reopened = Engine::open(&document, &cache_root, config(64)).expect("reopen");
        assert_eq!(reopened.current().rules().len(), 8);
        let rewritten = fs::read_to_string(&rules_path).expect("read cache");
        assert!(rewritten.contains("\"rule_count\": 8"));
    }

    #[test]
    fn dimension_mismatch_is_surfaced_until_rebuilt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = dir.path().join("ng12.md");
        fs::write(&document, NG12_EXCERPT).expect("write document");
        let cache_root = dir.path().join("cache");

        Engine::open(&document, &cache_root, config(64)).expect("open");
        let err = Engine::open(&document, &cache_root, config(32)).expect_err("mismatch");
        assert!(matches!(err, EngineError::EmbeddingDimensionMismatch { .. }));

        let rebuilt = Engine::open_rebuilt(&document, &cache_root, config(32)).expect("rebuild");
        let embeddings = rebuilt.current();
        assert_eq!(
            embeddings.index.embeddings().map(|value| value.dimensions),
            Some(32)
        );
        Engine::open(&document, &cache_root, config(32)).expect("cache now matches");
    }

    #[test]
    fn missing_document_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Engine::open(
            dir.path().join("absent.md"),
            dir.path().join("cache"),
            EngineConfig::default(),
        )
        .expect_err("missing document");
        assert!(matches!(err, EngineError::DocumentNotFound { .. }));
    }

    #[test]
    fn readers_keep_querying_while_a_rebuild_publishes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = dir.path().join("ng12.md");
        fs::write(&document, NG12_EXCERPT).expect("write document");
        let engine = Engine::open(&document, dir.path().join("cache"), config(64)).expect("open");

        std::thread::scope(|scope| {
            let readers = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        for _ in 0..20 {
                            let snapshot = engine.current();
                            assert!(full_match_count(&snapshot) >= 1);
                            let results = engine
                                .search(SearchQuery::new("haemoptysis"))
                                .expect("search");
                            assert!(!results.is_empty());
                        }
                    })
                })
                .collect::<Vec<_>>();

            engine.rebuild().expect("rebuild");
            for reader in readers {
                reader.join().expect("reader thread");
            }
        });
    }

    #[test]
    fn new_provider_model_recomputes_and_rewrites_vectors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = dir.path().join("ng12.md");
        fs::write(&document, NG12_EXCERPT).expect("write document");
        let cache_root = dir.path().join("cache");

        let local = Engine::open(&document, &cache_root, config(64)).expect("open");
        let content_hash = local.current().content_hash.clone();
        let retrieval_path = local.cache_paths().retrieval();

        let engine = open_with(&document, &cache_root, "clinical-test-v1", 16).expect("provider");
        let snapshot = engine.current();
        let embeddings = snapshot.index.embeddings().expect("vectors computed");
        assert_eq!(embeddings.model_id, "clinical-test-v1");
        assert_eq!(embeddings.dimensions, 16);
        assert_eq!(embeddings.vectors.len(), snapshot.chunks().len());

        let cached = load_retrieval_cache(&retrieval_path, &content_hash, "clinical-test-v1", 16)
            .expect("load rewritten cache")
            .fresh()
            .expect("cache is fresh");
        assert_eq!(cached.embeddings.as_ref(), Some(embeddings));
    }

    #[test]
    fn provider_width_disagreeing_with_cached_vectors_is_surfaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = dir.path().join("ng12.md");
        fs::write(&document, NG12_EXCERPT).expect("write document");
        let cache_root = dir.path().join("cache");

        open_with(&document, &cache_root, "clinical-test-v1", 16).expect("provider");
        let err = open_with(&document, &cache_root, "clinical-test-v1", 8).expect_err("mismatch");
        assert!(matches!(
            err,
            EngineError::EmbeddingDimensionMismatch {
                expected: 8,
                actual: 16,
                ..
            }
        ));
    }

    #[test]
    fn matching_provider_scores_search_semantically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = dir.path().join("ng12.md");
        fs::write(&document, NG12_EXCERPT).expect("write document");
        let cache_root = dir.path().join("cache");

        open_with(&document, &cache_root, "clinical-test-v1", 32).expect("build");
        let engine = open_with(&document, &cache_root, "clinical-test-v1", 32).expect("reopen");
        let results = engine
            .search(SearchQuery::new("unexplained haemoptysis"))
            .expect("search");

        assert!(!results.is_empty());
        assert!(results.iter().any(|result| result.semantic_score > 0.0));
        assert!(results.iter().all(|result| result.semantic_score <= 1.0));
    }
}
