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

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;

use crate::strng::{self, Strng};

const SERVICE_CERT_VALIDITY: &str = "SERVICE_CERT_VALIDITY";
const CERT_ISSUANCE_TIMEOUT: &str = "CERT_ISSUANCE_TIMEOUT";
const PERMISSIVE_TRAFFIC_POLICY_MODE: &str = "PERMISSIVE_TRAFFIC_POLICY_MODE";
const INBOUND_SAN_VALIDATION: &str = "INBOUND_SAN_VALIDATION";
const DEFAULT_APP_PROTOCOL: &str = "DEFAULT_APP_PROTOCOL";
const CA_COMMON_NAME: &str = "CA_COMMON_NAME";
const CA_ORGANIZATION: &str = "CA_ORGANIZATION";
const CA_VALIDITY: &str = "CA_VALIDITY";
const CA_CERT_PATH: &str = "CA_CERT_PATH";
const CA_KEY_PATH: &str = "CA_KEY_PATH";
const LOCAL_CONFIG_PATH: &str = "LOCAL_CONFIG_PATH";
const MESH_CONFIG: &str = "MESH_CONFIG";

const MESH_CONFIG_PATH: &str = "./etc/mesh/config.yaml";

const DEFAULT_SERVICE_CERT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CERT_ISSUANCE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CA_VALIDITY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);
const DEFAULT_CA_COMMON_NAME: &str = "meshcontrol-root.mesh.local";
const DEFAULT_CA_ORGANIZATION: &str = "mesh.local";
const DEFAULT_APP_PROTOCOL_VALUE: Strng = strng::literal!("http");

#[derive(serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Validity of the leaf certificates handed to proxies.
    pub service_cert_validity: Duration,
    /// Upper bound on a single issuance. A slow signer fails the request instead of stalling it.
    pub cert_issuance_timeout: Duration,
    /// If true, any service account may connect to any service.
    pub permissive_traffic_policy_mode: bool,
    /// If true, inbound validation contexts carry the permitted client identities as SAN matchers.
    pub inbound_san_validation: bool,
    /// Protocol used for ports that declare none.
    pub default_app_protocol: Strng,

    pub ca: CaConfig,

    /// YAML file backing the local provider.
    pub local_config: Option<PathBuf>,
}

#[derive(serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CaConfig {
    pub common_name: String,
    pub organization: String,
    pub validity: Duration,
    /// When both are set the root is loaded from disk instead of generated at startup.
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_cert_validity: DEFAULT_SERVICE_CERT_VALIDITY,
            cert_issuance_timeout: DEFAULT_CERT_ISSUANCE_TIMEOUT,
            permissive_traffic_policy_mode: false,
            inbound_san_validation: false,
            default_app_protocol: DEFAULT_APP_PROTOCOL_VALUE,
            ca: CaConfig {
                common_name: DEFAULT_CA_COMMON_NAME.to_string(),
                organization: DEFAULT_CA_ORGANIZATION.to_string(),
                validity: DEFAULT_CA_VALIDITY,
                cert_path: None,
                key_path: None,
            },
            local_config: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid env var {0}={1}")]
    EnvVar(String, String),
    #[error("error parsing mesh config: {0}")]
    MeshConfig(anyhow::Error),
    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

/// HumanDuration parses durations such as `24h`, `90s` or `1h30m`.
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        duration_str::parse(s)
            .map(HumanDuration)
            .map_err(|e| e.to_string())
    }
}

fn parse<T: FromStr>(env: &str) -> Result<Option<T>, Error> {
    match std::env::var(env) {
        Ok(val) => val
            .parse()
            .map(|v| Some(v))
            .map_err(|_| Error::EnvVar(env.to_string(), val)),
        Err(_) => Ok(None),
    }
}

fn parse_duration(env: &str) -> Result<Option<Duration>, Error> {
    parse::<HumanDuration>(env).map(|d| d.map(|d| d.0))
}

pub fn parse_config() -> Result<Config, Error> {
    let mc_env = parse::<String>(MESH_CONFIG)?;
    let mc = construct_mesh_config(MESH_CONFIG_PATH, mc_env.as_deref()).map_err(Error::MeshConfig)?;
    construct_config(mc)
}

/// Builds the final config. Environment variables take precedence over the mesh config, which
/// takes precedence over the defaults.
pub fn construct_config(mc: MeshConfig) -> Result<Config, Error> {
    let defaults = Config::default();
    let mc_duration = |field: &Option<String>, name: &str| -> Result<Option<Duration>, Error> {
        field
            .as_deref()
            .map(|s| {
                duration_str::parse(s).map_err(|_| {
                    Error::MeshConfig(anyhow!("invalid duration for {name}: {s:?}"))
                })
            })
            .transpose()
    };

    let cert_path = parse::<PathBuf>(CA_CERT_PATH)?.or(mc.ca_cert_path);
    let key_path = parse::<PathBuf>(CA_KEY_PATH)?.or(mc.ca_key_path);
    if cert_path.is_some() != key_path.is_some() {
        return Err(Error::Incomplete(CA_CERT_PATH, CA_KEY_PATH));
    }

    Ok(Config {
        service_cert_validity: parse_duration(SERVICE_CERT_VALIDITY)?
            .or(mc_duration(&mc.service_cert_validity, "serviceCertValidity")?)
            .unwrap_or(defaults.service_cert_validity),
        cert_issuance_timeout: parse_duration(CERT_ISSUANCE_TIMEOUT)?
            .or(mc_duration(
                &mc.cert_issuance_timeout,
                "certIssuanceTimeout",
            )?)
            .unwrap_or(defaults.cert_issuance_timeout),
        permissive_traffic_policy_mode: parse(PERMISSIVE_TRAFFIC_POLICY_MODE)?
            .or(mc.permissive_traffic_policy_mode)
            .unwrap_or(defaults.permissive_traffic_policy_mode),
        inbound_san_validation: parse(INBOUND_SAN_VALIDATION)?
            .or(mc.inbound_san_validation)
            .unwrap_or(defaults.inbound_san_validation),
        default_app_protocol: empty_to_none(parse::<String>(DEFAULT_APP_PROTOCOL)?)
            .or(empty_to_none(mc.default_app_protocol))
            .map(strng::new)
            .unwrap_or(defaults.default_app_protocol),
        ca: CaConfig {
            common_name: empty_to_none(parse(CA_COMMON_NAME)?)
                .or(empty_to_none(mc.ca_common_name))
                .unwrap_or(defaults.ca.common_name),
            organization: empty_to_none(parse(CA_ORGANIZATION)?)
                .or(empty_to_none(mc.ca_organization))
                .unwrap_or(defaults.ca.organization),
            validity: parse_duration(CA_VALIDITY)?
                .or(mc_duration(&mc.ca_validity, "caValidity")?)
                .unwrap_or(defaults.ca.validity),
            cert_path,
            key_path,
        },
        local_config: parse::<PathBuf>(LOCAL_CONFIG_PATH)?.or(mc.local_config_path),
    })
}

/// MeshConfig is the file/env form of the configuration. Every field is optional; unset fields
/// fall through to the next source.
#[derive(serde::Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshConfig {
    pub service_cert_validity: Option<String>,
    pub cert_issuance_timeout: Option<String>,
    pub permissive_traffic_policy_mode: Option<bool>,
    pub inbound_san_validation: Option<bool>,
    pub default_app_protocol: Option<String>,
    pub ca_common_name: Option<String>,
    pub ca_organization: Option<String>,
    pub ca_validity: Option<String>,
    pub ca_cert_path: Option<PathBuf>,
    pub ca_key_path: Option<PathBuf>,
    pub local_config_path: Option<PathBuf>,
}

impl MeshConfig {
    fn merge(mut self, other: Self) -> Self {
        self.service_cert_validity = other.service_cert_validity.or(self.service_cert_validity);
        self.cert_issuance_timeout = other.cert_issuance_timeout.or(self.cert_issuance_timeout);
        self.permissive_traffic_policy_mode = other
            .permissive_traffic_policy_mode
            .or(self.permissive_traffic_policy_mode);
        self.inbound_san_validation = other.inbound_san_validation.or(self.inbound_san_validation);
        self.default_app_protocol = other.default_app_protocol.or(self.default_app_protocol);
        self.ca_common_name = other.ca_common_name.or(self.ca_common_name);
        self.ca_organization = other.ca_organization.or(self.ca_organization);
        self.ca_validity = other.ca_validity.or(self.ca_validity);
        self.ca_cert_path = other.ca_cert_path.or(self.ca_cert_path);
        self.ca_key_path = other.ca_key_path.or(self.ca_key_path);
        self.local_config_path = other.local_config_path.or(self.local_config_path);
        self
    }
}

fn construct_mesh_config(mc_path: &str, mc_env: Option<&str>) -> anyhow::Result<MeshConfig> {
    let file_config = match fs::File::open(mc_path) {
        Ok(f) => serde_yaml::from_reader(f)
            .map(Some)
            .map_err(anyhow::Error::new),
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(None)
            } else {
                Err(anyhow!(e))
            }
        }
    }
    .map_err(|e| anyhow!("failed parsing mesh config file {}: {}", mc_path, e))?;

    // YAML is a superset of JSON, so either form is accepted here.
    let env_config = mc_env
        .map(|mc_env| {
            if mc_env.is_empty() {
                Ok(None)
            } else {
                serde_yaml::from_str(mc_env).map(Some)
            }
        })
        .unwrap_or(Ok(None))
        .map_err(|e| anyhow!("failed parsing mesh config env: {}", e))?;

    Ok([file_config, env_config]
        .into_iter()
        .flatten()
        .fold(MeshConfig::default(), |mc, v| mc.merge(v)))
}

pub fn empty_to_none<A: AsRef<str>>(inp: Option<A>) -> Option<A> {
    if let Some(inner) = &inp {
        if inner.as_ref().is_empty() {
            return None;
        }
    }
    inp
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = construct_config(MeshConfig::default()).unwrap();
        assert_eq!(cfg.service_cert_validity, Duration::from_secs(86400));
        assert_eq!(cfg.cert_issuance_timeout, Duration::from_secs(5));
        assert_eq!(cfg.default_app_protocol, "http");
        assert!(!cfg.permissive_traffic_policy_mode);
        assert!(!cfg.inbound_san_validation);
        assert_eq!(cfg.ca.cert_path, None);
    }

    #[test]
    fn config_from_mesh_config() {
        let mesh_config_path = "./src/test_helpers/mesh_config.yaml";
        let mc = construct_mesh_config(mesh_config_path, None).unwrap();
        let cfg = construct_config(mc).unwrap();
        assert_eq!(cfg.service_cert_validity, Duration::from_secs(3600));
        assert!(cfg.permissive_traffic_policy_mode);
        assert_eq!(cfg.ca.organization, "cluster.local");

        // env only
        let mc_env = Some(
            r#"{
            "serviceCertValidity": "90m",
            "defaultAppProtocol": "tcp",
            "inboundSanValidation": true
        }"#,
        );
        let mc = construct_mesh_config("", mc_env).unwrap();
        let cfg = construct_config(mc).unwrap();
        assert_eq!(cfg.service_cert_validity, Duration::from_secs(90 * 60));
        assert_eq!(cfg.default_app_protocol, "tcp");
        assert!(cfg.inbound_san_validation);
        assert!(!cfg.permissive_traffic_policy_mode);

        // both, env wins field by field
        let mc = construct_mesh_config(mesh_config_path, mc_env).unwrap();
        let cfg = construct_config(mc).unwrap();
        assert_eq!(cfg.service_cert_validity, Duration::from_secs(90 * 60));
        assert!(cfg.permissive_traffic_policy_mode);
        assert_eq!(cfg.ca.organization, "cluster.local");
    }

    #[test]
    fn invalid_duration() {
        let mc = MeshConfig {
            service_cert_validity: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(matches!(construct_config(mc), Err(Error::MeshConfig(_))));
    }

    #[test]
    fn ca_paths_must_pair() {
        let mc = MeshConfig {
            ca_cert_path: Some(PathBuf::from("/tmp/ca.pem")),
            ..Default::default()
        };
        assert!(matches!(
            construct_config(mc),
            Err(Error::Incomplete(CA_CERT_PATH, CA_KEY_PATH))
        ));
    }
}
