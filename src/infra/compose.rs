use crate::domain::{ImageSource, VolumeMount};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Resolved compose project, as printed by `docker compose config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub name: Option<String>,
    pub services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeService {
    pub name: String,
    pub image: Option<String>,
    pub has_build: bool,
    pub environment: BTreeMap<String, String>,
    /// Named volumes only; bind and tmpfs mounts are not candidates for backup
    pub volumes: Vec<VolumeMount>,
}

impl ComposeService {
    pub fn image_source(&self) -> Result<ImageSource> {
        if self.has_build {
            return Ok(ImageSource::Build);
        }
        match &self.image {
            Some(image) => Ok(ImageSource::Pull(image.clone())),
            None => bail!("Serviço '{}' não define 'image' nem 'build'", self.name),
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawProject {
    name: Option<String>,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
    #[serde(default)]
    volumes: BTreeMap<String, Option<RawVolume>>,
}

#[derive(Deserialize, Debug)]
struct RawService {
    image: Option<String>,
    build: Option<serde_yml::Value>,
    #[serde(default)]
    environment: BTreeMap<String, Option<String>>,
    #[serde(default)]
    volumes: Vec<RawMount>,
}

#[derive(Deserialize, Debug)]
struct RawMount {
    #[serde(rename = "type")]
    kind: String,
    source: Option<String>,
    target: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawVolume {
    name: Option<String>,
}

impl ComposeProject {
    /// Runs `<binary> compose config` in `project_dir` and parses the result
    pub fn load(binary: &str, project_dir: &Path) -> Result<Self> {
        let output = Command::new(binary)
            .args(["compose", "config"])
            .current_dir(project_dir)
            .output()
            .with_context(|| format!("executando '{binary} compose config'"))?;

        if !output.status.success() {
            bail!(
                "'{binary} compose config' falhou em {:?}: {}",
                project_dir,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Self::from_yaml(&String::from_utf8_lossy(&output.stdout))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self {
                name: None,
                services: BTreeMap::new(),
            });
        }

        let raw: RawProject =
            serde_yml::from_str(yaml).context("lendo configuração resolvida do compose")?;

        let mut services = BTreeMap::new();
        for (name, svc) in raw.services {
            let mut volumes = Vec::new();
            for mount in &svc.volumes {
                if mount.kind != "volume" {
                    debug!("Ignorando montagem {} de {}", mount.kind, name);
                    continue;
                }
                volumes.push(resolve_mount(&name, mount, &raw.volumes)?);
            }

            let environment = svc
                .environment
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect();

            services.insert(
                name.clone(),
                ComposeService {
                    name,
                    image: svc.image,
                    has_build: svc.build.is_some(),
                    environment,
                    volumes,
                },
            );
        }

        Ok(Self {
            name: raw.name,
            services,
        })
    }

    pub fn service(&self, name: &str) -> Option<&ComposeService> {
        self.services.get(name)
    }
}

fn resolve_mount(
    service: &str,
    mount: &RawMount,
    definitions: &BTreeMap<String, Option<RawVolume>>,
) -> Result<VolumeMount> {
    let (Some(source), Some(target)) = (&mount.source, &mount.target) else {
        bail!("Volume inválido em '{service}': source e target são obrigatórios");
    };

    let resolved = definitions
        .get(source)
        .with_context(|| format!("Volume '{source}' de '{service}' não está definido em 'volumes'"))?
        .as_ref()
        .and_then(|v| v.name.clone())
        .unwrap_or_else(|| source.clone());

    Ok(VolumeMount::new(source, target, &resolved))
}
