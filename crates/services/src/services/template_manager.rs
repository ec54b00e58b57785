//! Template variable resolution.
//!
//! Resolution order for a template id: in-memory cache, stored fallback
//! variables, the HeyGen template API, then the built-in table. A source that
//! errors or returns nothing is skipped. Only successful resolutions are cached.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::fallback_variable::{FallbackVariable, FallbackVariableError};
use moka::future::Cache;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::Display;
use thiserror::Error;
use ts_rs::TS;

use super::{
    config::TemplateCacheConfig,
    heygen::{HeyGenClient, HeyGenError, HeyGenTemplate},
    template_variables::{TemplateVariable, VariableType, normalize_variables},
};

const TEMPLATE_LIST_KEY: &str = "heygen";

#[derive(Debug, Error)]
pub enum VariableSourceError {
    #[error(transparent)]
    Database(#[from] FallbackVariableError),
    #[error(transparent)]
    HeyGen(#[from] HeyGenError),
}

#[derive(Debug, Error)]
pub enum TemplateManagerError {
    #[error("HeyGen is not configured")]
    HeyGenNotConfigured,
    #[error(transparent)]
    HeyGen(#[from] HeyGenError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariableSourceKind {
    Database,
    HeyGen,
    Builtin,
}

/// One place template variables can be looked up.
#[async_trait]
pub trait VariableSource: Send + Sync {
    fn kind(&self) -> VariableSourceKind;

    /// An empty list means the source knows nothing about the template.
    async fn fetch(&self, template_id: &str) -> Result<Vec<TemplateVariable>, VariableSourceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ResolvedTemplate {
    pub template_id: String,
    pub variables: Vec<TemplateVariable>,
    pub source: VariableSourceKind,
    #[ts(type = "Date")]
    pub resolved_at: DateTime<Utc>,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TemplateCacheStats {
    pub entry_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Stored fallback variables.
pub struct DatabaseSource {
    pool: SqlitePool,
}

impl DatabaseSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VariableSource for DatabaseSource {
    fn kind(&self) -> VariableSourceKind {
        VariableSourceKind::Database
    }

    async fn fetch(&self, template_id: &str) -> Result<Vec<TemplateVariable>, VariableSourceError> {
        let rows = FallbackVariable::find_by_template(&self.pool, template_id).await?;
        Ok(rows.into_iter().map(variable_from_row).collect())
    }
}

pub fn variable_from_row(row: FallbackVariable) -> TemplateVariable {
    let char_limit = row.char_limit.and_then(|l| u32::try_from(l).ok());
    TemplateVariable::new(
        row.variable_name,
        VariableType::from_loose(&row.variable_type),
        char_limit,
    )
}

/// Variables reported by the HeyGen template API.
pub struct HeyGenSource {
    client: Arc<HeyGenClient>,
}

impl HeyGenSource {
    pub fn new(client: Arc<HeyGenClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VariableSource for HeyGenSource {
    fn kind(&self) -> VariableSourceKind {
        VariableSourceKind::HeyGen
    }

    async fn fetch(&self, template_id: &str) -> Result<Vec<TemplateVariable>, VariableSourceError> {
        let raw = self.client.get_template_variables(template_id).await?;
        Ok(normalize_variables(&raw))
    }
}

/// Hardcoded variables for the templates in regular use.
pub struct BuiltinSource {
    table: &'static HashMap<&'static str, Vec<TemplateVariable>>,
}

impl Default for BuiltinSource {
    fn default() -> Self {
        Self {
            table: &BUILTIN_TEMPLATES,
        }
    }
}

#[async_trait]
impl VariableSource for BuiltinSource {
    fn kind(&self) -> VariableSourceKind {
        VariableSourceKind::Builtin
    }

    async fn fetch(&self, template_id: &str) -> Result<Vec<TemplateVariable>, VariableSourceError> {
        Ok(self.table.get(template_id).cloned().unwrap_or_default())
    }
}

static BUILTIN_TEMPLATES: Lazy<HashMap<&'static str, Vec<TemplateVariable>>> = Lazy::new(|| {
    use VariableType::*;

    let entries: &[(&str, &[(&str, VariableType, Option<u32>)])] = &[
        // Product spotlight, 16:9
        (
            "a3f1c2d4e5b6478899aabbccddeeff01",
            &[
                ("product_name", Text, Some(40)),
                ("product_description", Text, Some(150)),
                ("price", Text, Some(20)),
                ("call_to_action", Text, Some(30)),
                ("product_image", Image, None),
            ],
        ),
        // Brand announcement, 9:16
        (
            "b7e2d9f0c1a3456789abcdef01234567",
            &[
                ("headline", Text, Some(50)),
                ("subheadline", Text, Some(90)),
                ("brand_logo", Image, None),
                ("background_video", Video, None),
            ],
        ),
        // Testimonial
        (
            "c5d8e1f2a3b4456789cdef0123456789",
            &[
                ("customer_name", Text, Some(40)),
                ("testimonial", Text, Some(250)),
                ("company_name", Text, Some(40)),
                ("customer_photo", Image, None),
            ],
        ),
        // Event promo
        (
            "d2c4e6f8a0b2468ace13579bdf024680",
            &[
                ("event_name", Text, Some(60)),
                ("event_date", Text, Some(30)),
                ("location", Text, Some(60)),
                ("registration_url", Text, Some(80)),
            ],
        ),
    ];

    entries
        .iter()
        .map(|(id, vars)| {
            let variables = vars
                .iter()
                .map(|(name, kind, limit)| TemplateVariable::new(*name, *kind, *limit))
                .collect();
            (*id, variables)
        })
        .collect()
});

pub struct TemplateManager {
    sources: Vec<Arc<dyn VariableSource>>,
    variables: Cache<String, Arc<ResolvedTemplate>>,
    templates: Cache<&'static str, Arc<Vec<HeyGenTemplate>>>,
    heygen: Option<Arc<HeyGenClient>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for TemplateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateManager")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.kind()).collect::<Vec<_>>(),
            )
            .field("heygen", &self.heygen.is_some())
            .finish()
    }
}

impl TemplateManager {
    /// Standard chain: database, HeyGen (when configured), built-in table.
    pub fn new(
        pool: SqlitePool,
        heygen: Option<Arc<HeyGenClient>>,
        cache: &TemplateCacheConfig,
    ) -> Self {
        let mut sources: Vec<Arc<dyn VariableSource>> = vec![Arc::new(DatabaseSource::new(pool))];
        if let Some(client) = &heygen {
            sources.push(Arc::new(HeyGenSource::new(client.clone())));
        }
        sources.push(Arc::new(BuiltinSource::default()));
        Self::with_sources(sources, heygen, cache)
    }

    pub fn with_sources(
        sources: Vec<Arc<dyn VariableSource>>,
        heygen: Option<Arc<HeyGenClient>>,
        cache: &TemplateCacheConfig,
    ) -> Self {
        let ttl = Duration::from_secs(cache.ttl_secs);
        Self {
            sources,
            variables: Cache::builder()
                .max_capacity(cache.max_capacity)
                .time_to_live(ttl)
                .build(),
            templates: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            heygen,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Resolve a template's variables. `bypass_cache` skips the cache lookup
    /// but still stores a fresh result. Returns `None` when no source knows
    /// the template.
    pub async fn resolve(&self, template_id: &str, bypass_cache: bool) -> Option<ResolvedTemplate> {
        let template_id = template_id.trim();
        if template_id.is_empty() {
            return None;
        }

        if !bypass_cache {
            if let Some(hit) = self.variables.get(template_id).await {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Template {} served from cache", template_id);
                return Some(ResolvedTemplate {
                    cached: true,
                    ..(*hit).clone()
                });
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        for source in &self.sources {
            match source.fetch(template_id).await {
                Ok(variables) if !variables.is_empty() => {
                    tracing::info!(
                        "Resolved {} variables for template {} from {}",
                        variables.len(),
                        template_id,
                        source.kind()
                    );
                    let resolved = ResolvedTemplate {
                        template_id: template_id.to_string(),
                        variables,
                        source: source.kind(),
                        resolved_at: Utc::now(),
                        cached: false,
                    };
                    self.variables
                        .insert(template_id.to_string(), Arc::new(resolved.clone()))
                        .await;
                    return Some(resolved);
                }
                Ok(_) => {
                    tracing::debug!("{} has no variables for template {}", source.kind(), template_id);
                }
                Err(e) => {
                    tracing::warn!(
                        "Variable source {} failed for template {}: {}",
                        source.kind(),
                        template_id,
                        e
                    );
                }
            }
        }

        tracing::warn!("No variable source could resolve template {}", template_id);
        None
    }

    /// HeyGen template list, cached under the same TTL as variables.
    pub async fn list_templates(
        &self,
        bypass_cache: bool,
    ) -> Result<Arc<Vec<HeyGenTemplate>>, TemplateManagerError> {
        let client = self
            .heygen
            .as_ref()
            .ok_or(TemplateManagerError::HeyGenNotConfigured)?;

        if !bypass_cache && let Some(list) = self.templates.get(TEMPLATE_LIST_KEY).await {
            return Ok(list);
        }

        let list = Arc::new(client.list_templates().await?);
        self.templates.insert(TEMPLATE_LIST_KEY, list.clone()).await;
        Ok(list)
    }

    pub async fn invalidate(&self, template_id: &str) {
        self.variables.invalidate(template_id.trim()).await;
    }

    pub async fn invalidate_all(&self) {
        self.variables.invalidate_all();
        self.templates.invalidate_all();
        self.variables.run_pending_tasks().await;
        self.templates.run_pending_tasks().await;
    }

    pub async fn stats(&self) -> TemplateCacheStats {
        self.variables.run_pending_tasks().await;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        TemplateCacheStats {
            entry_count: self.variables.entry_count(),
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use db::{DBService, models::fallback_variable::CreateFallbackVariable};

    use super::*;

    /// Records calls and answers from a fixed script.
    struct StubSource {
        kind: VariableSourceKind,
        answer: Mutex<Result<Vec<TemplateVariable>, ()>>,
        calls: AtomicU64,
    }

    impl StubSource {
        fn returning(kind: VariableSourceKind, vars: Vec<TemplateVariable>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                answer: Mutex::new(Ok(vars)),
                calls: AtomicU64::new(0),
            })
        }

        fn failing(kind: VariableSourceKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                answer: Mutex::new(Err(())),
                calls: AtomicU64::new(0),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }

        fn set(&self, vars: Vec<TemplateVariable>) {
            *self.answer.lock().unwrap() = Ok(vars);
        }
    }

    #[async_trait]
    impl VariableSource for StubSource {
        fn kind(&self) -> VariableSourceKind {
            self.kind
        }

        async fn fetch(&self, template_id: &str) -> Result<Vec<TemplateVariable>, VariableSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.answer.lock().unwrap() {
                Ok(vars) => Ok(vars.clone()),
                Err(()) => Err(HeyGenError::NotFound(template_id.to_string()).into()),
            }
        }
    }

    fn chain(sources: &[&Arc<StubSource>]) -> Vec<Arc<dyn VariableSource>> {
        sources
            .iter()
            .map(|s| Arc::clone(*s) as Arc<dyn VariableSource>)
            .collect()
    }

    fn manager(sources: &[&Arc<StubSource>]) -> TemplateManager {
        TemplateManager::with_sources(chain(sources), None, &TemplateCacheConfig::default())
    }

    fn vars(names: &[&str]) -> Vec<TemplateVariable> {
        names.iter().map(|n| TemplateVariable::text(*n, None)).collect()
    }

    #[tokio::test]
    async fn first_non_empty_source_wins() {
        let db = StubSource::returning(VariableSourceKind::Database, vec![]);
        let api = StubSource::returning(VariableSourceKind::HeyGen, vars(&["headline"]));
        let builtin = StubSource::returning(VariableSourceKind::Builtin, vars(&["other"]));
        let manager = manager(&[&db, &api, &builtin]);

        let resolved = manager.resolve("tpl_1", false).await.unwrap();
        assert_eq!(resolved.source, VariableSourceKind::HeyGen);
        assert_eq!(resolved.variables, vars(&["headline"]));
        assert!(!resolved.cached);
        assert_eq!((db.calls(), api.calls(), builtin.calls()), (1, 1, 0));
    }

    #[tokio::test]
    async fn failing_source_falls_through() {
        let db = StubSource::returning(VariableSourceKind::Database, vec![]);
        let api = StubSource::failing(VariableSourceKind::HeyGen);
        let builtin = StubSource::returning(VariableSourceKind::Builtin, vars(&["cta"]));
        let manager = manager(&[&db, &api, &builtin]);

        let resolved = manager.resolve("tpl_1", false).await.unwrap();
        assert_eq!(resolved.source, VariableSourceKind::Builtin);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn total_failure_returns_none_and_caches_nothing() {
        let db = StubSource::returning(VariableSourceKind::Database, vec![]);
        let api = StubSource::failing(VariableSourceKind::HeyGen);
        let manager = manager(&[&db, &api]);

        assert!(manager.resolve("tpl_1", false).await.is_none());
        assert!(manager.resolve("tpl_1", false).await.is_none());
        assert_eq!(db.calls(), 2);
        assert_eq!(manager.stats().await.entry_count, 0);
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups_until_bypassed() {
        let db = StubSource::returning(VariableSourceKind::Database, vars(&["v1"]));
        let manager = manager(&[&db]);

        manager.resolve("tpl_1", false).await.unwrap();
        let second = manager.resolve("tpl_1", false).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.source, VariableSourceKind::Database);
        assert_eq!(db.calls(), 1);

        db.set(vars(&["v2"]));
        let bypassed = manager.resolve("tpl_1", true).await.unwrap();
        assert!(!bypassed.cached);
        assert_eq!(bypassed.variables, vars(&["v2"]));
        assert_eq!(db.calls(), 2);

        // the bypassing read refreshed the cache
        let third = manager.resolve("tpl_1", false).await.unwrap();
        assert_eq!(third.variables, vars(&["v2"]));
        assert_eq!(db.calls(), 2);

        let stats = manager.stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let db = StubSource::returning(VariableSourceKind::Database, vars(&["v1"]));
        let manager = manager(&[&db]);

        manager.resolve("tpl_1", false).await.unwrap();
        manager.invalidate("tpl_1").await;
        manager.resolve("tpl_1", false).await.unwrap();
        assert_eq!(db.calls(), 2);

        manager.invalidate_all().await;
        manager.resolve("tpl_1", false).await.unwrap();
        assert_eq!(db.calls(), 3);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let db = StubSource::returning(VariableSourceKind::Database, vars(&["v1"]));
        let manager = TemplateManager::with_sources(
            chain(&[&db]),
            None,
            &TemplateCacheConfig {
                ttl_secs: 1,
                max_capacity: 10,
            },
        );

        manager.resolve("tpl_1", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        let again = manager.resolve("tpl_1", false).await.unwrap();
        assert!(!again.cached);
        assert_eq!(db.calls(), 2);
    }

    #[tokio::test]
    async fn blank_template_id_resolves_to_none() {
        let db = StubSource::returning(VariableSourceKind::Database, vars(&["v1"]));
        let manager = manager(&[&db]);
        assert!(manager.resolve("  ", false).await.is_none());
        assert_eq!(db.calls(), 0);
    }

    #[tokio::test]
    async fn default_chain_prefers_stored_variables_over_builtin() {
        let db = DBService::new_in_memory().await.unwrap();
        let builtin_id = "a3f1c2d4e5b6478899aabbccddeeff01";
        let manager = TemplateManager::new(db.pool.clone(), None, &TemplateCacheConfig::default());

        let from_table = manager.resolve(builtin_id, false).await.unwrap();
        assert_eq!(from_table.source, VariableSourceKind::Builtin);
        assert_eq!(from_table.variables[0].name, "product_name");
        assert_eq!(from_table.variables[0].char_limit, Some(40));

        FallbackVariable::create(
            &db.pool,
            builtin_id,
            CreateFallbackVariable {
                variable_name: "custom_line".into(),
                variable_type: Some("TEXT".into()),
                char_limit: Some(25),
                display_order: None,
            },
        )
        .await
        .unwrap();
        manager.invalidate(builtin_id).await;

        let from_db = manager.resolve(builtin_id, false).await.unwrap();
        assert_eq!(from_db.source, VariableSourceKind::Database);
        assert_eq!(from_db.variables, vec![TemplateVariable::text("custom_line", Some(25))]);

        assert!(manager.resolve("unknown_template", false).await.is_none());
    }

    #[tokio::test]
    async fn template_list_requires_heygen() {
        let manager = manager(&[]);
        assert!(matches!(
            manager.list_templates(false).await,
            Err(TemplateManagerError::HeyGenNotConfigured)
        ));
    }
}
