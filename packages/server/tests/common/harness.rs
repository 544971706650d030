//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is shared by every test in the binary. Each test
//! gets its own freshly migrated database inside it, so sweeps that scan the
//! whole `bookings` table only ever see the rows that test created.

use anyhow::{Context, Result};
use booking_core::kernel::test_dependencies::RecordingCollaborators;
use booking_core::kernel::{ServerDeps, TestDependencies};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::sync::Arc;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    /// Server URL without a database name
    server_url: String,
    admin_pool: PgPool,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=booking_core=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let server_url = format!("postgresql://postgres:postgres@{}:{}", pg_host, pg_port);

        let admin_pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&format!("{}/postgres", server_url))
            .await
            .context("Failed to connect to Postgres")?;

        Ok(Self {
            server_url,
            admin_pool,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Test harness that manages test infrastructure.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let deps = ctx.deps();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    /// Database pool - use this for test fixtures.
    pub db_pool: PgPool,
    /// Records every collaborator call made by effects
    pub collaborators: Arc<RecordingCollaborators>,
    test_deps: TestDependencies,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    /// Creates a new harness with its own migrated database.
    pub async fn new() -> Result<Self> {
        Self::with_collaborators(RecordingCollaborators::new()).await
    }

    /// Same as [`TestHarness::new`] but with a custom recorder, e.g. one whose
    /// notifications fail.
    pub async fn with_collaborators(collaborators: RecordingCollaborators) -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_name = format!("booking_test_{}", Uuid::new_v4().simple());
        infra
            .admin_pool
            .execute(format!("CREATE DATABASE {}", db_name).as_str())
            .await
            .context("Failed to create test database")?;

        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&format!("{}/{}", infra.server_url, db_name))
            .await
            .context("Failed to connect to test database")?;

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run migrations")?;

        let test_deps = TestDependencies::with_collaborators(collaborators);
        Ok(Self {
            db_pool,
            collaborators: test_deps.collaborators.clone(),
            test_deps,
        })
    }

    /// Server dependencies wired to this harness's database and recorder
    pub fn deps(&self) -> ServerDeps {
        self.test_deps.into_server_deps(self.db_pool.clone())
    }
}
