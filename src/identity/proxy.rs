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

use uuid::Uuid;

use super::{Error, K8sServiceAccount, ServiceIdentity};
use crate::tls::CommonName;

const DOMAIN_DELIMITER: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Sidecar,
    Gateway,
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyKind::Sidecar => f.write_str("sidecar"),
            ProxyKind::Gateway => f.write_str("gateway"),
        }
    }
}

impl FromStr for ProxyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sidecar" => Ok(ProxyKind::Sidecar),
            "gateway" => Ok(ProxyKind::Gateway),
            _ => Err(Error::InvalidCommonName(s.to_string(), "unknown proxy kind")),
        }
    }
}

/// ProxyIdentity is the metadata encoded in the common name of the bootstrap certificate a proxy
/// presents: `<uuid>.<kind>.<service-account>.<namespace>`, optionally followed by more labels
/// (a trust domain suffix) which are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyIdentity {
    pub uuid: Uuid,
    pub kind: ProxyKind,
    pub service_account: K8sServiceAccount,
}

impl ProxyIdentity {
    pub fn new(kind: ProxyKind, service_account: K8sServiceAccount) -> Self {
        ProxyIdentity {
            uuid: Uuid::new_v4(),
            kind,
            service_account,
        }
    }

    pub fn common_name(&self) -> CommonName {
        CommonName::new(self.to_string())
    }

    pub fn service_identity(&self) -> ServiceIdentity {
        self.service_account.to_service_identity()
    }
}

impl fmt::Display for ProxyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.uuid, self.kind, self.service_account.name, self.service_account.namespace
        )
    }
}

impl FromStr for ProxyIdentity {
    type Err = Error;

    fn from_str(cn: &str) -> Result<Self, Self::Err> {
        let chunks: Vec<&str> = cn.split(DOMAIN_DELIMITER).collect();
        if chunks.len() < 4 {
            return Err(Error::InvalidCommonName(
                cn.to_string(),
                "expected at least 4 labels",
            ));
        }
        let uuid = Uuid::parse_str(chunks[0])
            .map_err(|_| Error::InvalidCommonName(cn.to_string(), "invalid proxy uuid"))?;
        let kind = chunks[1]
            .parse()
            .map_err(|_| Error::InvalidCommonName(cn.to_string(), "unknown proxy kind"))?;
        let (name, namespace) = (chunks[2], chunks[3]);
        if name.is_empty() || namespace.is_empty() {
            return Err(Error::InvalidCommonName(
                cn.to_string(),
                "empty service account or namespace",
            ));
        }
        Ok(ProxyIdentity {
            uuid,
            kind,
            service_account: K8sServiceAccount::new(name, namespace),
        })
    }
}

impl TryFrom<&CommonName> for ProxyIdentity {
    type Error = Error;

    fn try_from(cn: &CommonName) -> Result<Self, Self::Error> {
        cn.as_str().parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;
    use test_case::test_case;

    const PROXY_UUID: &str = "5f8b7ee0-4a2f-4c8b-a9c2-9f4d1b8e8c4a";

    #[test]
    fn round_trip() {
        let id = ProxyIdentity::new(
            ProxyKind::Sidecar,
            K8sServiceAccount::new("bookbuyer", "default"),
        );
        let cn = id.common_name();
        let parsed = ProxyIdentity::try_from(&cn).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(
            parsed.service_identity(),
            K8sServiceAccount::new("bookbuyer", "default").to_service_identity()
        );
    }

    #[test]
    fn trust_domain_suffix_is_ignored() {
        let cn = format!("{PROXY_UUID}.gateway.bookstore.bookstore-ns.cluster.local");
        let parsed: ProxyIdentity = cn.parse().unwrap();
        assert_eq!(parsed.kind, ProxyKind::Gateway);
        assert_eq!(
            parsed.service_account,
            K8sServiceAccount::new("bookstore", "bookstore-ns")
        );
    }

    #[test_case("sidecar.bookbuyer.default"; "too few labels")]
    #[test_case("not-a-uuid.sidecar.bookbuyer.default"; "bad uuid")]
    #[test_case("5f8b7ee0-4a2f-4c8b-a9c2-9f4d1b8e8c4a.ingress.bookbuyer.default"; "bad kind")]
    #[test_case("5f8b7ee0-4a2f-4c8b-a9c2-9f4d1b8e8c4a.sidecar..default"; "empty service account")]
    fn invalid(cn: &str) {
        assert_matches!(
            cn.parse::<ProxyIdentity>(),
            Err(Error::InvalidCommonName(_, _))
        );
    }
}
