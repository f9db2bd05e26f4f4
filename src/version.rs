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
use std::fmt::{Display, Formatter};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");
const BUILD_GIT_REVISION: Option<&str> = option_env!("MESHCONTROL_BUILD_GIT_REVISION");
const BUILD_TAG: Option<&str> = option_env!("MESHCONTROL_BUILD_TAG");

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildInfo {
    version: &'static str,
    git_revision: &'static str,
    git_tag: &'static str,
}

impl BuildInfo {
    pub fn new() -> Self {
        BuildInfo {
            version: BUILD_VERSION,
            git_revision: BUILD_GIT_REVISION.unwrap_or("unknown"),
            git_tag: BUILD_TAG.unwrap_or("unknown"),
        }
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BuildInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version.BuildInfo{{Version:\"{}\", GitRevision:\"{}\", GitTag:\"{}\"}}",
            self.version, self.git_revision, self.git_tag
        )
    }
}
