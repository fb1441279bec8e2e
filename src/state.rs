use crate::auth::jwt::JwtKeys;
use crate::cache::{Cache, CacheBackend, MemoryCache, RedisCache};
use crate::config::AppConfig;
use crate::internships::{repo::PgInternships, Internships};
use crate::mail::{self, Mailer};
use crate::store::{CredentialStore, LogObserver, Repository};
use crate::users::{repo::PgUsers, Users};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub credentials: Arc<dyn CredentialStore>,
    pub users: Arc<dyn Repository<Users>>,
    pub internships: Arc<dyn Repository<Internships>>,
    pub cache: Cache,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let pg_users = Arc::new(PgUsers::new(db.clone(), Arc::new(LogObserver)));
        let internships = Arc::new(PgInternships::new(db)) as Arc<dyn Repository<Internships>>;

        let backend: Arc<dyn CacheBackend> = match &config.cache.redis_url {
            Some(url) => {
                tracing::info!("using redis cache");
                Arc::new(RedisCache::new(url)?)
            }
            None => {
                tracing::warn!("REDIS_URL not set; using in-process cache");
                Arc::new(MemoryCache::default())
            }
        };
        let cache = Cache::new(backend, Duration::from_secs(config.cache.ttl_secs));
        let mailer = mail::from_config(&config.mail)?;

        Ok(Self {
            jwt: JwtKeys::new(&config.jwt),
            config: Arc::new(config),
            credentials: pg_users.clone(),
            users: pg_users,
            internships,
            cache,
            mailer,
        })
    }

    #[cfg(test)]
    pub fn fake(mailer: Arc<dyn Mailer>) -> (Self, Arc<crate::store::memory::MemoryStore>) {
        use crate::store::memory::MemoryStore;

        let config = AppConfig::for_tests();
        let store = Arc::new(MemoryStore::default());
        let cache = Cache::new(
            Arc::new(MemoryCache::default()),
            Duration::from_secs(config.cache.ttl_secs),
        );
        let state = Self {
            jwt: JwtKeys::new(&config.jwt),
            config: Arc::new(config),
            credentials: store.clone(),
            users: store.clone(),
            internships: store.clone(),
            cache,
            mailer,
        };
        (state, store)
    }
}
