use crate::domain::Credentials;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const USER_KEY: &str = "POSTGRES_USER";
pub const DATABASE_KEY: &str = "POSTGRES_DB";

/// A place credentials may come from. Absence is `Ok(None)`, not an error.
pub trait CredentialSource {
    fn describe(&self) -> String;
    fn resolve(&self) -> Result<Option<Credentials>>;
}

/// Reads `POSTGRES_USER` / `POSTGRES_DB` from a dotenv file
pub struct EnvFileSource {
    path: PathBuf,
}

impl EnvFileSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl CredentialSource for EnvFileSource {
    fn describe(&self) -> String {
        format!("arquivo {:?}", self.path)
    }

    fn resolve(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            debug!("{:?} não existe", self.path);
            return Ok(None);
        }

        let mut values = BTreeMap::new();
        let entries = dotenvy::from_path_iter(&self.path)
            .with_context(|| format!("lendo {:?}", self.path))?;
        for entry in entries {
            let (key, value) = entry.with_context(|| format!("interpretando {:?}", self.path))?;
            values.insert(key, value);
        }

        Ok(from_map(&values))
    }
}

/// Uses the resolved environment of the compose service
pub struct ComposeEnvironmentSource {
    service: String,
    environment: BTreeMap<String, String>,
}

impl ComposeEnvironmentSource {
    pub fn new(service: &str, environment: &BTreeMap<String, String>) -> Self {
        Self {
            service: service.to_string(),
            environment: environment.clone(),
        }
    }
}

impl CredentialSource for ComposeEnvironmentSource {
    fn describe(&self) -> String {
        format!("ambiente do serviço '{}'", self.service)
    }

    fn resolve(&self) -> Result<Option<Credentials>> {
        Ok(from_map(&self.environment))
    }
}

/// Both keys must be present and non-empty for a source to count.
fn from_map(values: &BTreeMap<String, String>) -> Option<Credentials> {
    let non_empty = |key: &str| {
        values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    Some(Credentials::new(non_empty(USER_KEY)?, non_empty(DATABASE_KEY)?))
}

/// Evaluates sources in order and returns the first complete pair
pub fn resolve_credentials(sources: &[&dyn CredentialSource]) -> Result<Credentials> {
    for source in sources {
        if let Some(credentials) = source.resolve()? {
            info!(
                " Credenciais de {} (usuário '{}', banco '{}')",
                source.describe(),
                credentials.user,
                credentials.database
            );
            return Ok(credentials);
        }
        debug!("Sem credenciais em {}", source.describe());
    }

    let tried: Vec<String> = sources.iter().map(|s| s.describe()).collect();
    bail!(
        "{USER_KEY} e {DATABASE_KEY} não encontrados (fontes: {})",
        tried.join(", ")
    )
}
