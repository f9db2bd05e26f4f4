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
use std::io::Cursor;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rustls_pemfile::Item;
use x509_parser::certificate::X509Certificate;

use crate::strng::{self, Strng};
use crate::tls::Error;

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct CommonName(Strng);

impl CommonName {
    pub fn new(s: impl AsRef<str>) -> Self {
        CommonName(strng::new(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(Strng);

impl SerialNumber {
    pub fn new(s: impl AsRef<str>) -> Self {
        SerialNumber(strng::new(s))
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Certificate is an issued, immutable leaf (or root) certificate with its key material.
/// Rotation never mutates a Certificate; a new one with a new serial number is issued instead.
/// All PEM fields are [Bytes], so handing a copy to a proxy is cheap.
#[derive(Clone, Debug)]
pub struct Certificate {
    common_name: CommonName,
    serial_number: SerialNumber,
    cert_chain: Bytes,
    private_key: Bytes,
    /// The trust anchor used by peers to validate this certificate.
    issuing_ca: Bytes,
    expiration: SystemTime,
}

impl Certificate {
    /// Builds a certificate from its parts without inspecting the PEM data.
    pub fn from_parts(
        common_name: CommonName,
        serial_number: SerialNumber,
        cert_chain: Bytes,
        private_key: Bytes,
        issuing_ca: Bytes,
        expiration: SystemTime,
    ) -> Certificate {
        Certificate {
            common_name,
            serial_number,
            cert_chain,
            private_key,
            issuing_ca,
            expiration,
        }
    }

    /// Builds a certificate from PEM data. The common name, serial number and expiration are read
    /// from the leaf, which is the first certificate of `cert_chain`.
    pub fn from_pem(
        cert_chain: Bytes,
        private_key: Bytes,
        issuing_ca: Bytes,
    ) -> Result<Certificate, Error> {
        let der = parse_cert_der(&cert_chain)?;
        let (_, leaf) = x509_parser::parse_x509_certificate(&der)?;
        let common_name = leaf
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(CommonName::new)
            .ok_or_else(|| Error::CertificateParseError("no common name".to_string()))?;
        if private_key.is_empty() {
            return Err(Error::CertificateParseError("no key".to_string()));
        }
        Ok(Certificate {
            common_name,
            serial_number: SerialNumber::new(leaf.serial.to_string()),
            expiration: expiration(&leaf),
            cert_chain,
            private_key,
            issuing_ca,
        })
    }

    pub fn common_name(&self) -> &CommonName {
        &self.common_name
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.serial_number
    }

    pub fn cert_chain(&self) -> &Bytes {
        &self.cert_chain
    }

    pub fn private_key(&self) -> &Bytes {
        &self.private_key
    }

    pub fn issuing_ca(&self) -> &Bytes {
        &self.issuing_ca
    }

    pub fn expiration(&self) -> SystemTime {
        self.expiration
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expiration
    }
}

fn expiration(cert: &X509Certificate) -> SystemTime {
    UNIX_EPOCH
        + Duration::from_secs(
            cert.validity()
                .not_after
                .timestamp()
                .try_into()
                .unwrap_or_default(),
        )
}

/// Returns the DER encoding of the first certificate in a PEM bundle.
pub(super) fn parse_cert_der(mut pem: &[u8]) -> Result<Vec<u8>, Error> {
    let mut reader = std::io::BufReader::new(Cursor::new(&mut pem));
    let parsed = rustls_pemfile::read_one(&mut reader)
        .map_err(|e| Error::CertificateParseError(e.to_string()))?
        .ok_or_else(|| Error::CertificateParseError("no certificate".to_string()))?;
    let Item::X509Certificate(der) = parsed else {
        return Err(Error::CertificateParseError("no certificate".to_string()));
    };
    Ok(der.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::CertificateAuthority;

    #[test]
    fn from_pem_reads_leaf_metadata() {
        let ca = CertificateAuthority::new("test-root", "test-org", Duration::from_secs(3600))
            .unwrap();
        let cert = ca
            .sign(
                &CommonName::new("bookstore-v1.default"),
                Duration::from_secs(600),
            )
            .unwrap();
        assert_eq!(cert.common_name().as_str(), "bookstore-v1.default");
        assert!(!cert.is_expired());
        assert!(cert.expiration() <= SystemTime::now() + Duration::from_secs(601));

        let reparsed = Certificate::from_pem(
            cert.cert_chain().clone(),
            cert.private_key().clone(),
            cert.issuing_ca().clone(),
        )
        .unwrap();
        assert_eq!(reparsed.serial_number(), cert.serial_number());
        assert_eq!(reparsed.common_name(), cert.common_name());
    }

    #[test]
    fn from_pem_rejects_garbage() {
        let res = Certificate::from_pem(
            Bytes::from_static(b"not a pem"),
            Bytes::from_static(b"key"),
            Bytes::new(),
        );
        assert!(res.is_err());
    }
}
