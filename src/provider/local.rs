// Copyright Istio Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use tracing::{info, instrument};

use super::{Error, MeshSpec};
use crate::identity::K8sServiceAccount;
use crate::k8s::{KubeController, KubeService, Pod};
use crate::state::{MeshService, TrafficSplit, TrafficTarget};

/// LocalConfig is the file format of [LocalStore].
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalConfig {
    #[serde(default)]
    pub services: Vec<KubeService>,
    #[serde(default)]
    pub pods: Vec<Pod>,
    /// Service accounts without running pods. Accounts of listed pods are included implicitly.
    #[serde(default)]
    pub service_accounts: Vec<K8sServiceAccount>,
    #[serde(default)]
    pub traffic_splits: Vec<TrafficSplit>,
    #[serde(default)]
    pub traffic_targets: Vec<TrafficTarget>,
}

/// LocalStore serves cluster state and policy from a static [LocalConfig], standing in for a
/// live API server. The whole state is swapped atomically on [LocalStore::replace].
#[derive(Debug, Default)]
pub struct LocalStore {
    state: RwLock<LocalConfig>,
}

impl LocalStore {
    pub fn new(cfg: LocalConfig) -> Self {
        LocalStore {
            state: RwLock::new(cfg),
        }
    }

    #[instrument(skip_all, name = "local_store", fields(path=%path.display()))]
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let cfg: LocalConfig = serde_yaml::from_str(&tokio::fs::read_to_string(path).await?)?;
        info!(
            services = cfg.services.len(),
            pods = cfg.pods.len(),
            traffic_splits = cfg.traffic_splits.len(),
            traffic_targets = cfg.traffic_targets.len(),
            "loaded local config"
        );
        Ok(LocalStore::new(cfg))
    }

    pub fn replace(&self, cfg: LocalConfig) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = cfg;
    }

    fn read<T>(&self, f: impl FnOnce(&LocalConfig) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl KubeController for LocalStore {
    fn get_service(&self, svc: &MeshService) -> Option<KubeService> {
        self.read(|s| {
            s.services
                .iter()
                .find(|k| k.name == svc.name && k.namespace == svc.namespace)
                .cloned()
        })
    }

    fn list_services(&self) -> Vec<KubeService> {
        self.read(|s| s.services.clone())
    }

    fn list_pods(&self) -> Vec<Pod> {
        self.read(|s| s.pods.clone())
    }

    fn list_service_accounts(&self) -> Vec<K8sServiceAccount> {
        self.read(|s| {
            s.service_accounts
                .iter()
                .cloned()
                .chain(s.pods.iter().map(Pod::service_account))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }
}

impl MeshSpec for LocalStore {
    fn list_traffic_splits(&self) -> Result<Vec<TrafficSplit>, Error> {
        Ok(self.read(|s| s.traffic_splits.clone()))
    }

    fn list_traffic_targets(&self) -> Result<Vec<TrafficTarget>, Error> {
        Ok(self.read(|s| s.traffic_targets.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers;

    #[tokio::test]
    async fn load_from_file() {
        let store = LocalStore::from_file(Path::new("./src/test_helpers/local_config.yaml"))
            .await
            .unwrap();
        assert!(store.get_service(&test_helpers::bookstore_v1()).is_some());
        assert_eq!(store.list_traffic_splits().unwrap().len(), 1);
        assert_eq!(store.list_traffic_targets().unwrap().len(), 1);
    }

    #[test]
    fn service_accounts_include_pods() {
        let store = LocalStore::new(test_helpers::local_config());
        let sas = store.list_service_accounts();
        assert!(sas.contains(&test_helpers::bookstore_service_account()));
        assert!(sas.contains(&test_helpers::bookbuyer_service_account()));
        // Deduplicated even though several pods share an account.
        let unique: BTreeSet<_> = sas.iter().collect();
        assert_eq!(unique.len(), sas.len());
    }

    #[test]
    fn replace_swaps_state() {
        let store = LocalStore::new(test_helpers::local_config());
        store.replace(LocalConfig::default());
        assert!(store.list_services().is_empty());
        assert!(store.get_service(&test_helpers::bookstore_v1()).is_none());
    }
}
