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

use super::Error;
use crate::identity::K8sServiceAccount;
use crate::state::MeshService;
use crate::strng::{self, Strng};

const KIND_SEPARATOR: char = ':';
const NAMESPACE_SEPARATOR: char = '/';

/// SdsCertKind is the prefix of a requested secret name, selecting what the secret holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdsCertKind {
    /// The proxy's own certificate and key.
    ServiceCert,
    /// Root certificate plus the identities an upstream service may present.
    RootCertForMtlsOutbound,
    /// Root certificate used to validate downstream peers.
    RootCertForMtlsInbound,
}

impl SdsCertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdsCertKind::ServiceCert => "service-cert",
            SdsCertKind::RootCertForMtlsOutbound => "root-cert-for-mtls-outbound",
            SdsCertKind::RootCertForMtlsInbound => "root-cert-for-mtls-inbound",
        }
    }
}

impl FromStr for SdsCertKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service-cert" => Ok(SdsCertKind::ServiceCert),
            "root-cert-for-mtls-outbound" => Ok(SdsCertKind::RootCertForMtlsOutbound),
            "root-cert-for-mtls-inbound" => Ok(SdsCertKind::RootCertForMtlsInbound),
            _ => Err(()),
        }
    }
}

/// SdsCert is a parsed secret name, `<kind>:<namespace>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SdsCert {
    pub kind: SdsCertKind,
    pub namespace: Strng,
    pub name: Strng,
}

impl SdsCert {
    pub fn new(kind: SdsCertKind, namespace: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        SdsCert {
            kind,
            namespace: strng::new(namespace),
            name: strng::new(name),
        }
    }

    /// The target read as a service, for outbound validation.
    pub fn mesh_service(&self) -> MeshService {
        MeshService::new(&self.name, &self.namespace)
    }

    /// The target read as a service account, for service certs and inbound validation.
    pub fn service_account(&self) -> K8sServiceAccount {
        K8sServiceAccount::new(&self.name, &self.namespace)
    }
}

impl fmt::Display for SdsCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KIND_SEPARATOR}{}{NAMESPACE_SEPARATOR}{}",
            self.kind.as_str(),
            self.namespace,
            self.name
        )
    }
}

impl FromStr for SdsCert {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| Error::Malformed(s.to_string(), reason);
        let (kind, target) = s
            .split_once(KIND_SEPARATOR)
            .ok_or_else(|| malformed("missing kind separator"))?;
        let kind = kind.parse().map_err(|_| malformed("unknown kind"))?;
        let (namespace, name) = target
            .split_once(NAMESPACE_SEPARATOR)
            .ok_or_else(|| malformed("expected <namespace>/<name>"))?;
        if namespace.is_empty() || name.is_empty() {
            return Err(malformed("empty namespace or name"));
        }
        if namespace.contains(KIND_SEPARATOR)
            || name.contains(NAMESPACE_SEPARATOR)
            || name.contains(KIND_SEPARATOR)
        {
            return Err(malformed("too many separators"));
        }
        Ok(SdsCert::new(kind, namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("service-cert:default/bookbuyer", SdsCertKind::ServiceCert; "service cert")]
    #[test_case(
        "root-cert-for-mtls-outbound:default/bookstore",
        SdsCertKind::RootCertForMtlsOutbound;
        "outbound"
    )]
    #[test_case(
        "root-cert-for-mtls-inbound:default/bookstore",
        SdsCertKind::RootCertForMtlsInbound;
        "inbound"
    )]
    fn parse_valid(name: &str, kind: SdsCertKind) {
        let cert: SdsCert = name.parse().unwrap();
        assert_eq!(cert.kind, kind);
        assert_eq!(cert.namespace.as_str(), "default");
        assert_eq!(cert.to_string(), name);
    }

    #[test_case("service-cert"; "no target")]
    #[test_case("default/bookbuyer"; "no kind")]
    #[test_case("client-cert:default/bookbuyer"; "unknown kind")]
    #[test_case("service-cert:bookbuyer"; "no namespace")]
    #[test_case("service-cert:/bookbuyer"; "empty namespace")]
    #[test_case("service-cert:default/"; "empty name")]
    #[test_case("service-cert:default/a/b"; "extra slash")]
    #[test_case("service-cert:a:b/c"; "colon in namespace")]
    #[test_case("service-cert:default/a:b"; "colon in name")]
    fn parse_invalid(name: &str) {
        let err = name.parse::<SdsCert>().unwrap_err();
        assert!(matches!(err, Error::Malformed(..)), "{err}");
    }

    #[test]
    fn target_views() {
        let cert: SdsCert = "root-cert-for-mtls-inbound:ns-1/sa-1".parse().unwrap();
        assert_eq!(cert.service_account(), K8sServiceAccount::new("sa-1", "ns-1"));
        assert_eq!(cert.mesh_service(), MeshService::new("sa-1", "ns-1"));
    }
}
