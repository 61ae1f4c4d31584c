use crate::domain::{
    BackupArtifact, BackupIntegrityReport, BaselineOrigin, ContainerRuntime, Credentials,
    DatabaseStatistics, ExecCommand, ImportVerification, RuntimeResult, UpgradeError,
    VerificationTolerance,
};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, info, warn};

// Ordinary and partitioned tables, unlogged included, outside system schemas.
// Extension-owned tables are left out: pg_dump writes `CREATE EXTENSION` for them.
const STATISTICS_QUERY: &str = "SELECT \
    (SELECT count(*) FROM pg_class c \
       JOIN pg_namespace n ON n.oid = c.relnamespace \
      WHERE c.relkind IN ('r', 'p') \
        AND c.relpersistence <> 't' \
        AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
        AND n.nspname NOT LIKE 'pg_toast%' \
        AND NOT EXISTS (SELECT 1 FROM pg_depend d \
             WHERE d.classid = 'pg_class'::regclass \
               AND d.objid = c.oid \
               AND d.deptype = 'e')), \
    pg_database_size(current_database()), \
    (SELECT coalesce(sum(n_live_tup), 0) FROM pg_stat_user_tables)";

/// Prints the number of table definitions (logged, unlogged, partitioned and
/// partitions) and of COPY data rows in a plain dump.
const DUMP_SCAN_AWK: &str = r#"/^CREATE (UNLOGGED )?TABLE /{t++} /^COPY /{c=1; next} /^\\\.$/{c=0; next} c{n++} END{print t+0; print n+0}"#;

/// Produces, measures and restores logical dumps through in-container commands.
pub struct BackupEngine {
    runtime: Arc<dyn ContainerRuntime>,
    container_user: Option<String>,
    tolerance: VerificationTolerance,
}

impl BackupEngine {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        container_user: Option<&str>,
        tolerance: VerificationTolerance,
    ) -> Self {
        Self {
            runtime,
            container_user: container_user.map(str::to_string),
            tolerance,
        }
    }

    fn exec<I, S>(&self, service: &str, args: I) -> RuntimeResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = ExecCommand::new(args).as_user(self.container_user.as_deref());
        debug!("exec em {service}: {}", command.display());
        Ok(self.runtime.exec_in_container(service, &command)?.stdout)
    }

    fn psql(&self, service: &str, credentials: &Credentials, sql: &str) -> RuntimeResult<String> {
        self.exec(
            service,
            [
                "psql",
                "-U",
                credentials.user.as_str(),
                "-d",
                credentials.database.as_str(),
                "-At",
                "-c",
                sql,
            ],
        )
    }

    pub fn collect_statistics(
        &self,
        service: &str,
        credentials: &Credentials,
    ) -> RuntimeResult<DatabaseStatistics> {
        let stdout = self.psql(service, credentials, STATISTICS_QUERY)?;
        parse_statistics(&stdout).ok_or_else(|| UpgradeError::Exec {
            service: service.to_string(),
            command: "psql (estatísticas)".to_string(),
            exit_code: Some(0),
            output: format!("saída inesperada: {:?}", stdout.trim()),
        })
    }

    /// Dumps the database to `destination`, which must not exist yet, and
    /// measures the result.
    pub fn create_backup(
        &self,
        service: &str,
        credentials: &Credentials,
        destination: &str,
    ) -> RuntimeResult<BackupArtifact> {
        let creation_error = |reason: String| UpgradeError::BackupCreation {
            service: service.to_string(),
            path: destination.to_string(),
            reason,
        };

        // `test` exits 1 when the path exists; anything else is a real failure.
        self.exec(service, ["test", "!", "-e", destination])
            .map_err(|e| match e.exec_details() {
                Some((Some(1), _)) => {
                    creation_error("arquivo já existe, backups nunca são sobrescritos".into())
                }
                _ => creation_error(failure_reason("verificação do destino", &e)),
            })?;

        info!(
            " Criando backup do banco '{}' (usuário '{}')...",
            credentials.database, credentials.user
        );
        self.exec(
            service,
            [
                "pg_dump",
                "-U",
                credentials.user.as_str(),
                "-f",
                destination,
                credentials.database.as_str(),
            ],
        )
        .map_err(|e| creation_error(failure_reason("pg_dump", &e)))?;

        let artifact = self
            .inspect_artifact(service, destination)
            .map_err(|e| creation_error(e.to_string()))?;

        if !artifact.is_valid() {
            return Err(creation_error("pg_dump produziu um arquivo vazio".into()));
        }

        info!(" Backup criado: {} ({} bytes)", artifact.path, artifact.size_bytes);
        Ok(artifact)
    }

    /// Measures an existing dump: byte size plus table and row estimates
    pub fn inspect_artifact(&self, service: &str, path: &str) -> RuntimeResult<BackupArtifact> {
        let size = self.exec(service, ["stat", "-c", "%s", path])?;
        let scan = self.exec(service, ["awk", DUMP_SCAN_AWK, path])?;

        let malformed = |what: &str, raw: &str| UpgradeError::Exec {
            service: service.to_string(),
            command: what.to_string(),
            exit_code: Some(0),
            output: format!("saída inesperada: {:?}", raw.trim()),
        };

        let size_bytes = size
            .trim()
            .parse::<u64>()
            .map_err(|_| malformed("stat", &size))?;

        let mut counts = scan.lines().map(|l| l.trim().parse::<u64>());
        let (Some(Ok(tables)), Some(Ok(rows))) = (counts.next(), counts.next()) else {
            return Err(malformed("awk", &scan));
        };

        Ok(BackupArtifact {
            path: path.to_string(),
            size_bytes,
            estimated_table_count: tables,
            estimated_row_count: rows,
            created_at: Local::now(),
        })
    }

    /// Dump files named `<prefix>-*.sql` in `dir`, oldest first
    pub fn list_backups(&self, service: &str, dir: &str, prefix: &str) -> RuntimeResult<Vec<String>> {
        let stdout = self.exec(service, ["ls", "-1", dir])?;
        let marker = format!("{prefix}-");

        let mut files: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|name| name.starts_with(&marker) && name.ends_with(".sql"))
            .map(|name| format!("{}/{}", dir.trim_end_matches('/'), name))
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn verify_backup_integrity(
        &self,
        artifact: &BackupArtifact,
        baseline: Option<&DatabaseStatistics>,
    ) -> BackupIntegrityReport {
        let report = BackupIntegrityReport::evaluate(artifact, baseline, &self.tolerance);
        for issue in &report.issues {
            warn!("  {}: {issue}", artifact.path);
        }
        report
    }

    pub fn import_backup(
        &self,
        service: &str,
        credentials: &Credentials,
        path: &str,
    ) -> RuntimeResult<()> {
        info!(
            " Importando {path} para o banco '{}'...",
            credentials.database
        );
        self.exec(
            service,
            [
                "psql",
                "-U",
                credentials.user.as_str(),
                "-d",
                credentials.database.as_str(),
                "-v",
                "ON_ERROR_STOP=1",
                "-q",
                "-f",
                path,
            ],
        )
        .map_err(|e| {
            let (exit_code, output) = match e.exec_details() {
                Some((code, output)) => (code, output.to_string()),
                None => (None, e.to_string()),
            };
            UpgradeError::Import {
                service: service.to_string(),
                path: path.to_string(),
                exit_code,
                output,
            }
        })?;
        Ok(())
    }

    /// Refreshes planner statistics, re-collects database statistics and
    /// compares them with `baseline`. See [`ImportVerification::compare`].
    pub fn verify_import(
        &self,
        service: &str,
        credentials: &Credentials,
        baseline: &DatabaseStatistics,
        origin: BaselineOrigin,
    ) -> RuntimeResult<ImportVerification> {
        self.psql(service, credentials, "ANALYZE")?;
        let current = self.collect_statistics(service, credentials)?;

        let verification = ImportVerification::compare(baseline, origin, &current, &self.tolerance);
        if !verification.passed() {
            return Err(UpgradeError::ImportVerification {
                deltas: verification
                    .fatal
                    .iter()
                    .chain(verification.warnings.iter())
                    .cloned()
                    .collect(),
            });
        }

        for warning in &verification.warnings {
            warn!("  {warning}");
        }
        info!(
            " Verificação: {} tabelas, ~{} linhas, {} bytes",
            current.table_count, current.row_count, current.size_bytes
        );
        Ok(verification)
    }

    /// Records the new collation version after a restore. Servers that do
    /// not support the statement are left untouched.
    pub fn update_collation(&self, service: &str, credentials: &Credentials) -> RuntimeResult<()> {
        let sql = format!(
            "ALTER DATABASE {} REFRESH COLLATION VERSION",
            quote_ident(&credentials.database)
        );

        match self.psql(service, credentials, &sql) {
            Ok(_) => {
                info!(" Versão de collation de '{}' atualizada", credentials.database);
                Ok(())
            }
            Err(e) => match e.exec_details() {
                Some((_, output)) if output.contains("syntax error") => {
                    warn!("  Servidor não suporta REFRESH COLLATION VERSION, ignorando");
                    Ok(())
                }
                Some((_, output)) => Err(UpgradeError::Collation {
                    database: credentials.database.clone(),
                    output: output.trim().to_string(),
                }),
                None => Err(e),
            },
        }
    }
}

/// `<dir>/<prefix>-<YYYYmmdd_HHMMSS>.sql`
pub fn backup_file_path(dir: &str, prefix: &str, at: &DateTime<Local>) -> String {
    format!(
        "{}/{}-{}.sql",
        dir.trim_end_matches('/'),
        prefix,
        at.format("%Y%m%d_%H%M%S")
    )
}

fn failure_reason(what: &str, error: &UpgradeError) -> String {
    match error.exec_details() {
        Some((code, output)) => format!("{what} retornou status {code:?}: {}", output.trim()),
        None => error.to_string(),
    }
}

fn parse_statistics(stdout: &str) -> Option<DatabaseStatistics> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split('|').map(|f| f.trim().parse::<u64>());

    Some(DatabaseStatistics {
        table_count: fields.next()?.ok()?,
        size_bytes: fields.next()?.ok()?,
        row_count: fields.next()?.ok()?,
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContainerState;
    use crate::test_support::{ExecReply, MockRuntime};
    use chrono::TimeZone;

    const PATH: &str = "/var/lib/postgresql/backups/backup-20251001_165130.sql";

    fn engine() -> (BackupEngine, Arc<MockRuntime>) {
        let mock = Arc::new(MockRuntime::new());
        mock.add_container("postgres", ContainerState::Running);
        let engine = BackupEngine::new(
            mock.clone(),
            Some("postgres"),
            VerificationTolerance::default(),
        );
        (engine, mock)
    }

    fn creds() -> Credentials {
        Credentials::new("app", "appdb")
    }

    #[test]
    fn test_backup_file_path_format() {
        let at = Local.with_ymd_and_hms(2025, 10, 1, 16, 51, 30).unwrap();
        assert_eq!(
            backup_file_path("/var/lib/postgresql/backups/", "backup", &at),
            PATH
        );
    }

    #[test]
    fn test_parse_statistics() {
        let stats = parse_statistics("5|26214400|1000\n").unwrap();
        assert_eq!(stats.table_count, 5);
        assert_eq!(stats.size_bytes, 26_214_400);
        assert_eq!(stats.row_count, 1000);

        assert!(parse_statistics("").is_none());
        assert!(parse_statistics("5|abc|1").is_none());
    }

    #[test]
    fn test_collect_statistics_parses_query_output() {
        let (engine, mock) = engine();
        mock.on_exec_output("psql", "5|26214400|1000\n");

        let stats = engine.collect_statistics("postgres", &creds()).unwrap();
        assert_eq!(stats.table_count, 5);

        let commands = mock.get_commands();
        assert!(commands.iter().any(|c| c.starts_with("exec:postgres:psql -U app -d appdb -At")));
    }

    #[test]
    fn test_create_backup_measures_artifact() {
        let (engine, mock) = engine();
        mock.on_exec_output("stat -c", "12345\n");
        mock.on_exec_output("awk", "5\n1000\n");

        let artifact = engine.create_backup("postgres", &creds(), PATH).unwrap();

        assert_eq!(artifact.path, PATH);
        assert_eq!(artifact.size_bytes, 12345);
        assert_eq!(artifact.estimated_table_count, 5);
        assert_eq!(artifact.estimated_row_count, 1000);
        assert!(
            mock.get_commands()
                .contains(&format!("exec:postgres:pg_dump -U app -f {PATH} appdb"))
        );
    }

    #[test]
    fn test_create_backup_rejects_empty_dump() {
        let (engine, mock) = engine();
        mock.on_exec_output("stat -c", "0\n");
        mock.on_exec_output("awk", "0\n0\n");

        let err = engine.create_backup("postgres", &creds(), PATH).unwrap_err();
        assert!(matches!(err, UpgradeError::BackupCreation { .. }));
    }

    #[test]
    fn test_create_backup_reports_dump_failure() {
        let (engine, mock) = engine();
        mock.on_exec(
            "pg_dump",
            ExecReply::Failure {
                exit_code: 1,
                output: "pg_dump: error: connection failed".into(),
            },
        );

        let err = engine.create_backup("postgres", &creds(), PATH).unwrap_err();
        match err {
            UpgradeError::BackupCreation { reason, .. } => {
                assert!(reason.contains("connection failed"));
                assert!(reason.contains("Some(1)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.count_commands("exec:postgres:stat"), 0);
    }

    #[test]
    fn test_create_backup_never_overwrites() {
        let (engine, mock) = engine();
        mock.on_exec(
            "test ! -e",
            ExecReply::Failure {
                exit_code: 1,
                output: String::new(),
            },
        );

        let err = engine.create_backup("postgres", &creds(), PATH).unwrap_err();
        assert!(matches!(err, UpgradeError::BackupCreation { .. }));
        assert_eq!(mock.count_commands("exec:postgres:pg_dump"), 0);
    }

    #[test]
    fn test_create_backup_keeps_runtime_failure_reason() {
        let (engine, mock) = engine();
        mock.add_container("postgres", ContainerState::Stopped);

        let err = engine.create_backup("postgres", &creds(), PATH).unwrap_err();
        match err {
            UpgradeError::BackupCreation { reason, .. } => {
                assert!(reason.contains("is not running"), "{reason}");
                assert!(!reason.contains("já existe"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.count_commands("exec:postgres:pg_dump"), 0);
    }

    #[test]
    fn test_create_backup_reports_unexpected_check_status() {
        let (engine, mock) = engine();
        mock.on_exec(
            "test ! -e",
            ExecReply::Failure {
                exit_code: 127,
                output: "exec: \"test\": executable file not found".into(),
            },
        );

        let err = engine.create_backup("postgres", &creds(), PATH).unwrap_err();
        match err {
            UpgradeError::BackupCreation { reason, .. } => {
                assert!(reason.contains("Some(127)"), "{reason}");
                assert!(reason.contains("executable file not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_dump_scan_counts_every_table_kind() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("backup.sql");
        std::fs::write(
            &dump,
            "CREATE EXTENSION IF NOT EXISTS postgis WITH SCHEMA public;\n\
             CREATE TABLE public.orders (id integer);\n\
             CREATE UNLOGGED TABLE public.sessions (id integer);\n\
             CREATE TABLE public.events (id integer) PARTITION BY RANGE (id);\n\
             CREATE TABLE public.events_2025 PARTITION OF public.events FOR VALUES FROM (0) TO (10);\n\
             CREATE FOREIGN TABLE public.remote (id integer) SERVER other;\n\
             COPY public.orders (id) FROM stdin;\n\
             1\n\
             2\n\
             \\.\n\
             COPY public.sessions (id) FROM stdin;\n\
             3\n\
             \\.\n",
        )
        .unwrap();

        let output = std::process::Command::new("awk")
            .arg(DUMP_SCAN_AWK)
            .arg(&dump)
            .output()
            .unwrap();

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "4\n3\n");
    }

    #[test]
    fn test_statistics_query_skips_extension_tables() {
        assert!(STATISTICS_QUERY.contains("deptype = 'e'"));
        assert!(STATISTICS_QUERY.contains("relkind IN ('r', 'p')"));
    }

    #[test]
    fn test_list_backups_filters_and_sorts() {
        let (engine, mock) = engine();
        mock.on_exec_output(
            "ls -1",
            "backup-20251002_090000.sql\nnotes.txt\nbackup-20251001_165130.sql\nother-1.sql\n",
        );

        let files = engine
            .list_backups("postgres", "/var/lib/postgresql/backups", "backup")
            .unwrap();
        assert_eq!(
            files,
            vec![
                "/var/lib/postgresql/backups/backup-20251001_165130.sql".to_string(),
                "/var/lib/postgresql/backups/backup-20251002_090000.sql".to_string(),
            ]
        );
    }

    #[test]
    fn test_import_failure_carries_exit_code() {
        let (engine, mock) = engine();
        mock.on_exec(
            "ON_ERROR_STOP",
            ExecReply::Failure {
                exit_code: 3,
                output: "ERROR: relation exists".into(),
            },
        );

        let err = engine.import_backup("postgres", &creds(), PATH).unwrap_err();
        match err {
            UpgradeError::Import {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(output.contains("relation exists"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_verify_import_table_mismatch_is_fatal() {
        let (engine, mock) = engine();
        mock.on_exec_output("-At -c SELECT", "4|26214400|1000\n");
        let baseline = DatabaseStatistics {
            table_count: 5,
            size_bytes: 26_214_400,
            row_count: 1000,
        };

        let err = engine
            .verify_import("postgres", &creds(), &baseline, BaselineOrigin::Measured)
            .unwrap_err();
        match err {
            UpgradeError::ImportVerification { deltas } => {
                assert!(deltas[0].contains("esperado 5, encontrado 4"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(
            mock.get_commands()
                .iter()
                .any(|c| c.ends_with("-At -c ANALYZE"))
        );
    }

    #[test]
    fn test_verify_import_row_delta_is_a_warning() {
        let (engine, mock) = engine();
        mock.on_exec_output("-At -c SELECT", "5|26214400|500\n");
        let baseline = DatabaseStatistics {
            table_count: 5,
            size_bytes: 26_214_400,
            row_count: 1000,
        };

        let verification = engine
            .verify_import("postgres", &creds(), &baseline, BaselineOrigin::Measured)
            .unwrap();
        assert_eq!(verification.current.table_count, 5);
        assert_eq!(verification.warnings.len(), 1);
    }

    #[test]
    fn test_update_collation_tolerates_old_servers() {
        let (engine, mock) = engine();
        mock.on_exec(
            "REFRESH COLLATION",
            ExecReply::Failure {
                exit_code: 1,
                output: "ERROR:  syntax error at or near \"REFRESH\"".into(),
            },
        );

        assert!(engine.update_collation("postgres", &creds()).is_ok());
    }

    #[test]
    fn test_update_collation_quotes_database_name() {
        let (engine, mock) = engine();
        engine
            .update_collation("postgres", &Credentials::new("app", "my\"db"))
            .unwrap();

        assert!(
            mock.get_commands()
                .iter()
                .any(|c| c.ends_with("ALTER DATABASE \"my\"\"db\" REFRESH COLLATION VERSION"))
        );
    }

    #[test]
    fn test_update_collation_other_failures_are_errors() {
        let (engine, mock) = engine();
        mock.on_exec(
            "REFRESH COLLATION",
            ExecReply::Failure {
                exit_code: 1,
                output: "ERROR:  must be owner of database appdb".into(),
            },
        );

        let err = engine.update_collation("postgres", &creds()).unwrap_err();
        assert!(matches!(err, UpgradeError::Collation { .. }));
    }
}
