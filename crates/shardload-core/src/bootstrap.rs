//! One-shot cluster bootstrap: admin credential plus database-level sharding.
//! Re-running against a bootstrapped cluster changes nothing.

use tracing::{error, info};

use crate::config::{Settings, StoreSettings};
use crate::error::Result;
use crate::traits::{DocumentStore, StoreConnector};
use crate::types::{AdminCredential, StepOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub steps: Vec<StepOutcome>,
}

impl BootstrapReport {
    /// True when at least one step mutated the cluster.
    pub fn changed(&self) -> bool { self.steps.iter().any(|s| !s.is_noop()) }
}

pub struct Bootstrapper {
    credential: AdminCredential,
    database: String,
}

impl Bootstrapper {
    pub fn new(credential: AdminCredential, database: &str) -> Self {
        Self { credential, database: database.to_string() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.bootstrap.credential(), &settings.store.database)
    }

    pub async fn run<C: StoreConnector>(
        &self,
        connector: &C,
        settings: &StoreSettings,
    ) -> Result<BootstrapReport> {
        let store = connector.connect(settings).await.map_err(|e| {
            error!(error = %e, "could not connect to document store");
            e
        })?;
        let result = self.apply(&store).await;
        store.close().await;
        result
    }

    pub async fn apply<S: DocumentStore + ?Sized>(&self, store: &S) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();

        let user = store.ensure_user(&self.credential).await.map_err(|e| {
            error!(user = %self.credential.user, error = %e, "ensure admin user failed");
            e
        })?;
        log_outcome(&user);
        report.steps.push(user);

        let sharding = store.enable_partitioning(&self.database).await.map_err(|e| {
            error!(database = %self.database, error = %e, "enable sharding failed");
            e
        })?;
        log_outcome(&sharding);
        report.steps.push(sharding);

        info!("initialization complete, ready to load data");
        Ok(report)
    }
}

fn log_outcome(outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Applied(note) => info!("{}", note),
        StepOutcome::AlreadySatisfied(note) => info!("Note: {}", note),
    }
}
