use std::path::Path;

use charging_core::{
    Station, SubscriptionCatalog, SubscriptionPlan, UserSubscription,
    pricing::DEFAULT_BATTERY_CAPACITY_KWH,
};
use charging_engine::{Cadence, http::RemoteConfig};
use serde::{Deserialize, Serialize};

/// Everything the server needs at startup, read from one JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Usable battery capacity assumed for every vehicle, in kWh
    #[serde(default = "default_battery_capacity")]
    pub battery_capacity_kwh: f64,
    /// Operator backend used for monitoring, ending sessions and payments
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cadence: Cadence,
    #[serde(default)]
    pub stations: Vec<Station>,
    /// Plans on offer; the built-in catalog is used when empty
    #[serde(default)]
    pub subscription_plans: Vec<SubscriptionPlan>,
    #[serde(default)]
    pub subscriptions: Vec<UserSubscription>,
}

fn default_battery_capacity() -> f64 {
    DEFAULT_BATTERY_CAPACITY_KWH
}

impl AppConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        serde_json::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })
    }

    pub fn catalog(&self) -> SubscriptionCatalog {
        let catalog = if self.subscription_plans.is_empty() {
            SubscriptionCatalog::builtin()
        } else {
            SubscriptionCatalog::new(self.subscription_plans.clone(), Vec::new())
        };
        catalog.with_subscriptions(self.subscriptions.clone())
    }
}
