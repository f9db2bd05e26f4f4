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

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::strng::{self, Strng};
use crate::tls;

pub mod manager;
pub use manager::*;

pub mod metrics;

mod proxy;
pub use proxy::*;

#[cfg(any(test, feature = "testing"))]
pub mod mock {
    pub use super::manager::mock::{FailingCertManager, new_cert_manager};
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("failed to issue certificate: {0}")]
    Signing(Arc<tls::Error>),
    #[error("failed to load root certificate: {0}")]
    LoadRoot(Arc<tls::Error>),
    #[error("certificate issuance for {0} did not complete within {1:?}")]
    IssuanceTimeout(tls::CommonName, Duration),
    #[error("certificate issuance task failed: {0}")]
    IssuanceTask(String),
    #[error("invalid service identity {0:?}: expected <name>.<namespace>")]
    InvalidServiceIdentity(String),
    #[error("invalid certificate common name {0:?}: {1}")]
    InvalidCommonName(String, &'static str),
}

impl From<tls::Error> for Error {
    fn from(value: tls::Error) -> Self {
        Error::Signing(Arc::new(value))
    }
}

/// K8sServiceAccount is the Kubernetes principal a workload runs as. The mesh derives every
/// [ServiceIdentity] from one.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct K8sServiceAccount {
    pub name: Strng,
    pub namespace: Strng,
}

impl K8sServiceAccount {
    pub fn new(name: impl AsRef<str>, namespace: impl AsRef<str>) -> Self {
        K8sServiceAccount {
            name: strng::new(name),
            namespace: strng::new(namespace),
        }
    }

    pub fn to_service_identity(&self) -> ServiceIdentity {
        ServiceIdentity(strng::new(format!("{}.{}", self.name, self.namespace)))
    }
}

impl fmt::Display for K8sServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// ServiceIdentity is the normalized principal name, `<name>.<namespace>`, used as the subject of
/// issued certificates and as the SAN matched by peers.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceIdentity(Strng);

impl ServiceIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the service account backing this identity. Namespaces are DNS labels and cannot
    /// contain dots, so the namespace is everything after the last dot.
    pub fn to_k8s_service_account(&self) -> Result<K8sServiceAccount, Error> {
        match self.0.rsplit_once('.') {
            Some((name, namespace)) if !name.is_empty() && !namespace.is_empty() => {
                Ok(K8sServiceAccount::new(name, namespace))
            }
            _ => Err(Error::InvalidServiceIdentity(self.0.to_string())),
        }
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServiceIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ServiceIdentity(strng::new(s));
        id.to_k8s_service_account()?;
        Ok(id)
    }
}

impl TryFrom<String> for ServiceIdentity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceIdentity> for String {
    fn from(value: ServiceIdentity) -> Self {
        value.0.to_string()
    }
}

impl From<&K8sServiceAccount> for ServiceIdentity {
    fn from(value: &K8sServiceAccount) -> Self {
        value.to_service_identity()
    }
}

impl From<&ServiceIdentity> for tls::CommonName {
    fn from(value: &ServiceIdentity) -> Self {
        tls::CommonName::new(value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn service_account_round_trip() {
        let sa = K8sServiceAccount::new("bookbuyer", "default");
        let id = sa.to_service_identity();
        assert_eq!(id.as_str(), "bookbuyer.default");
        assert_eq!(id.to_k8s_service_account().unwrap(), sa);
        assert_eq!(sa.to_string(), "default/bookbuyer");
    }

    #[test]
    fn dotted_service_account_name() {
        let sa = K8sServiceAccount::new("my.account", "ns");
        let id = sa.to_service_identity();
        assert_eq!(id.to_k8s_service_account().unwrap(), sa);
    }

    #[test_case("bookstore.default", true; "valid")]
    #[test_case("bookstore", false; "no namespace")]
    #[test_case(".default", false; "empty name")]
    #[test_case("bookstore.", false; "empty namespace")]
    fn parse_identity(input: &str, ok: bool) {
        assert_eq!(input.parse::<ServiceIdentity>().is_ok(), ok);
    }

    #[test]
    fn identity_serde() {
        let id: ServiceIdentity = serde_json::from_str("\"sa-1.ns-1\"").unwrap();
        assert_eq!(id, K8sServiceAccount::new("sa-1", "ns-1").to_service_identity());
        assert!(serde_json::from_str::<ServiceIdentity>("\"nodots\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sa-1.ns-1\"");
    }
}
