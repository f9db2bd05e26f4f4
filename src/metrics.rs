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

use std::sync::Arc;

use prometheus_client::registry::Registry;

use crate::{identity, xds};

/// Set of control plane metrics. Each component holds on to its own part.
pub struct Metrics {
    pub xds: Arc<xds::metrics::Metrics>,
    pub identity: Arc<identity::metrics::Metrics>,
}

impl Metrics {
    fn new(registry: &mut Registry) -> Self {
        Self {
            xds: Arc::new(xds::metrics::Metrics::new(registry)),
            identity: Arc::new(identity::metrics::Metrics::new(registry)),
        }
    }
}

impl From<&mut Registry> for Metrics {
    fn from(registry: &mut Registry) -> Self {
        Metrics::new(registry.sub_registry_with_prefix("meshcontrol"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        let mut registry = Registry::default();
        Metrics::new(registry.sub_registry_with_prefix("meshcontrol"))
    }
}

pub trait Recorder<E, T> {
    /// Record the given event
    fn record(&self, event: &E, meta: T);
}

pub trait IncrementRecorder<E>: Recorder<E, u64> {
    /// Record the given event by incrementing the counter by count
    fn increment(&self, event: &E);
}

impl<E, R> IncrementRecorder<E> for R
where
    R: Recorder<E, u64>,
{
    fn increment(&self, event: &E) {
        self.record(event, 1);
    }
}

#[cfg(test)]
mod tests {
    use prometheus_client::encoding::text::encode;

    use super::*;
    use crate::identity::metrics::IssuanceOutcome;

    #[test]
    fn registered_under_prefix() {
        let mut registry = Registry::default();
        let metrics = Metrics::from(&mut registry);
        metrics.identity.increment(&IssuanceOutcome::Success);

        let mut out = String::new();
        encode(&mut out, &registry).unwrap();
        assert!(
            out.contains("meshcontrol_certificates_issued_total{outcome=\"Success\"} 1"),
            "{out}"
        );
    }
}
