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

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, Issuer, KeyPair, KeyUsagePurpose, SerialNumber,
};

use crate::tls::certificate::parse_cert_der;
use crate::tls::{Certificate, CommonName, Error};

/// CertificateAuthority holds the root of trust of the mesh and signs workload certificates.
/// The root private key never leaves this type.
pub struct CertificateAuthority {
    root: Certificate,
    organization: String,
}

impl CertificateAuthority {
    /// Creates a new self-signed root.
    pub fn new(
        common_name: &str,
        organization: &str,
        validity: Duration,
    ) -> Result<CertificateAuthority, Error> {
        let key = KeyPair::generate().map_err(Error::KeyGeneration)?;
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        dn.push(DnType::OrganizationName, organization);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let now = SystemTime::now();
        params.not_before = now.into();
        params.not_after = (now + validity).into();
        params.serial_number = Some(random_serial());

        let cert = params.self_signed(&key).map_err(Error::Signing)?;
        let pem = Bytes::from(cert.pem());
        let root = Certificate::from_pem(pem.clone(), Bytes::from(key.serialize_pem()), pem)?;
        Ok(CertificateAuthority {
            root,
            organization: organization.to_string(),
        })
    }

    /// Loads an existing root from PEM encoded certificate and key.
    pub fn from_pem(cert_pem: Bytes, key_pem: Bytes) -> Result<CertificateAuthority, Error> {
        let key = std::str::from_utf8(&key_pem)
            .map_err(|e| Error::InvalidRootCert(format!("key is not valid utf8: {e}")))?;
        KeyPair::from_pem(key)
            .map_err(|e| Error::InvalidRootCert(format!("failed to parse key: {e}")))?;

        let der = parse_cert_der(&cert_pem)?;
        let (_, parsed) = x509_parser::parse_x509_certificate(&der)?;
        if !parsed.is_ca() {
            return Err(Error::InvalidRootCert(
                "certificate is not a CA".to_string(),
            ));
        }
        let organization = parsed
            .subject()
            .iter_organization()
            .next()
            .and_then(|o| o.as_str().ok())
            .unwrap_or_default()
            .to_string();
        let root = Certificate::from_pem(cert_pem.clone(), key_pem, cert_pem)?;
        Ok(CertificateAuthority { root, organization })
    }

    pub fn root(&self) -> &Certificate {
        &self.root
    }

    /// Signs a new leaf for `common_name` with a freshly generated key pair. The common name is
    /// also the only DNS SAN, which is what peers match against.
    pub fn sign(&self, common_name: &CommonName, validity: Duration) -> Result<Certificate, Error> {
        let issuer = self.issuer()?;
        let key = KeyPair::generate().map_err(Error::KeyGeneration)?;

        let mut params =
            CertificateParams::new(vec![common_name.to_string()]).map_err(Error::Signing)?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name.as_str());
        dn.push(DnType::OrganizationName, self.organization.as_str());
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let now = SystemTime::now();
        params.not_before = now.into();
        params.not_after = (now + validity).into();
        params.serial_number = Some(random_serial());

        let cert = params.signed_by(&key, &issuer).map_err(Error::Signing)?;
        Certificate::from_pem(
            Bytes::from(cert.pem()),
            Bytes::from(key.serialize_pem()),
            self.root.cert_chain().clone(),
        )
    }

    fn issuer(&self) -> Result<Issuer<'static, KeyPair>, Error> {
        let key = std::str::from_utf8(self.root.private_key())
            .map_err(|e| Error::InvalidRootCert(e.to_string()))?;
        let key = KeyPair::from_pem(key).map_err(|e| Error::InvalidRootCert(e.to_string()))?;
        let cert = std::str::from_utf8(self.root.cert_chain())
            .map_err(|e| Error::InvalidRootCert(e.to_string()))?;
        Issuer::from_ca_cert_pem(cert, key).map_err(|e| Error::InvalidRootCert(e.to_string()))
    }
}

fn random_serial() -> SerialNumber {
    let mut data = [0u8; 20];
    rand::rng().fill_bytes(&mut data);
    // Clear the most significant bit to make the resulting bignum effectively 159 bit long.
    data[0] &= 0x7f;
    SerialNumber::from_slice(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_parser::prelude::*;

    fn test_ca() -> CertificateAuthority {
        CertificateAuthority::new("mesh-root", "mesh", Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn signs_leaf_with_san() {
        let ca = test_ca();
        let cn = CommonName::new("bookstore.default");
        let leaf = ca.sign(&cn, Duration::from_secs(60)).unwrap();
        assert_eq!(leaf.common_name(), &cn);
        assert_eq!(leaf.issuing_ca(), ca.root().cert_chain());

        let der = parse_cert_der(leaf.cert_chain()).unwrap();
        let (_, parsed) = parse_x509_certificate(&der).unwrap();
        let sans: Vec<String> = parsed
            .subject_alternative_name()
            .unwrap()
            .unwrap()
            .value
            .general_names
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(sans, vec!["DNSName(bookstore.default)".to_string()]);
        assert!(!parsed.is_ca());

        let root_der = parse_cert_der(ca.root().cert_chain()).unwrap();
        let (_, root) = parse_x509_certificate(&root_der).unwrap();
        assert!(parsed.verify_signature(Some(root.public_key())).is_ok());
    }

    #[test]
    fn serials_are_unique() {
        let ca = test_ca();
        let cn = CommonName::new("bookstore.default");
        let a = ca.sign(&cn, Duration::from_secs(60)).unwrap();
        let b = ca.sign(&cn, Duration::from_secs(60)).unwrap();
        assert_ne!(a.serial_number(), b.serial_number());
    }

    #[test]
    fn load_from_pem() {
        let ca = test_ca();
        let loaded = CertificateAuthority::from_pem(
            ca.root().cert_chain().clone(),
            ca.root().private_key().clone(),
        )
        .unwrap();
        assert_eq!(loaded.organization, "mesh");
        assert!(
            loaded
                .sign(&CommonName::new("a.b"), Duration::from_secs(60))
                .is_ok()
        );
    }

    #[test]
    fn load_rejects_leaf_as_root() {
        let ca = test_ca();
        let leaf = ca
            .sign(&CommonName::new("a.b"), Duration::from_secs(60))
            .unwrap();
        let res =
            CertificateAuthority::from_pem(leaf.cert_chain().clone(), leaf.private_key().clone());
        assert!(matches!(res, Err(Error::InvalidRootCert(_))));
    }
}
