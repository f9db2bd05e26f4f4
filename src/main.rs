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

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use meshcontrol::*;
use tracing::info;

fn main() -> anyhow::Result<()> {
    telemetry::setup_logging();

    // For now we don't need a complex CLI, so rather than pull in dependencies just use basic argv
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("render") => {
            let Some(path) = args.next() else {
                eprintln!("render requires a request file");
                help()?;
                std::process::exit(1)
            };
            let config = Arc::new(config::parse_config()?);
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(async move { render(config, Path::new(&path)).await })
        }
        Some("version") => version(),
        None | Some("help") => help(),
        Some(unknown) => {
            eprintln!("unknown command: {unknown}");
            help()?;
            std::process::exit(1)
        }
    }
}

fn help() -> anyhow::Result<()> {
    let version = version::BuildInfo::new();
    println!(
        "
Mesh Control ({version})

Commands:
render <request.yaml> - Answer the discovery requests in the file and print the responses
version               - Print the version of meshcontrol
help                  - Print commands and version of meshcontrol"
    );
    Ok(())
}

fn version() -> anyhow::Result<()> {
    println!("{}", version::BuildInfo::new());
    Ok(())
}

async fn render(cfg: Arc<config::Config>, path: &Path) -> anyhow::Result<()> {
    info!("version: {}", version::BuildInfo::new());
    info!("running with config: {}", serde_yaml::to_string(&cfg)?);
    let input: app::RenderRequest = serde_yaml::from_str(
        &tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display()))?,
    )?;
    let bound = app::build(cfg).await?;
    print!("{}", app::render(&bound, &input).await?);
    Ok(())
}
