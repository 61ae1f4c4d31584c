use chrono::{DateTime, Local};

/// Snapshot of a database's shape, taken before backup and after import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseStatistics {
    pub table_count: u64,
    pub size_bytes: u64,
    pub row_count: u64,
}

impl DatabaseStatistics {
    /// Baseline estimated from a dump file. The on-disk size of the database
    /// cannot be derived from a dump, so it is left at zero (unknown).
    pub fn from_artifact(artifact: &BackupArtifact) -> Self {
        Self {
            table_count: artifact.estimated_table_count,
            size_bytes: 0,
            row_count: artifact.estimated_row_count,
        }
    }
}

/// Where a baseline's numbers come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaselineOrigin {
    /// Queried from the live database before the backup
    #[default]
    Measured,
    /// Estimated by scanning a dump file
    DumpEstimate,
}

/// A logical dump written to the backup volume. Never rewritten once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    /// Path of the dump inside the container
    pub path: String,
    pub size_bytes: u64,
    pub estimated_table_count: u64,
    pub estimated_row_count: u64,
    pub created_at: DateTime<Local>,
}

impl BackupArtifact {
    pub fn is_valid(&self) -> bool {
        self.size_bytes > 0
    }
}

/// Thresholds used when comparing statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationTolerance {
    pub row_percent: f64,
    pub size_percent: f64,
    pub min_backup_bytes: u64,
    /// How many tables a dump scan may come up short. Scans are heuristics.
    pub table_markers: u64,
}

impl Default for VerificationTolerance {
    fn default() -> Self {
        Self {
            row_percent: 10.0,
            size_percent: 50.0,
            min_backup_bytes: 1000,
            table_markers: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupIntegrityReport {
    pub path: String,
    pub size_bytes: u64,
    pub table_markers: u64,
    pub issues: Vec<String>,
}

impl BackupIntegrityReport {
    /// Checks a dump's size and table-definition count against the
    /// statistics of the database it was taken from.
    pub fn evaluate(
        artifact: &BackupArtifact,
        baseline: Option<&DatabaseStatistics>,
        tolerance: &VerificationTolerance,
    ) -> Self {
        let mut issues = Vec::new();

        if artifact.size_bytes == 0 {
            issues.push("arquivo de backup vazio".to_string());
        }

        if let Some(baseline) = baseline.filter(|b| b.table_count > 0) {
            if artifact.estimated_table_count == 0 {
                issues.push(format!(
                    "banco original tinha {} tabelas mas o backup não contém definições de tabela",
                    baseline.table_count
                ));
            } else if baseline.table_count.saturating_sub(artifact.estimated_table_count)
                > tolerance.table_markers
            {
                issues.push(format!(
                    "backup define {} tabelas, banco original tem {}",
                    artifact.estimated_table_count, baseline.table_count
                ));
            }

            if artifact.size_bytes > 0 && artifact.size_bytes < tolerance.min_backup_bytes {
                issues.push(format!(
                    "backup suspeitamente pequeno ({} bytes) para um banco com {} tabelas",
                    artifact.size_bytes, baseline.table_count
                ));
            }
        }

        Self {
            path: artifact.path.clone(),
            size_bytes: artifact.size_bytes,
            table_markers: artifact.estimated_table_count,
            issues,
        }
    }

    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Outcome of comparing post-import statistics with the baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportVerification {
    pub baseline: DatabaseStatistics,
    pub current: DatabaseStatistics,
    /// Table-count mismatches. Any entry here makes the import fail.
    pub fatal: Vec<String>,
    /// Row and size deltas beyond tolerance.
    pub warnings: Vec<String>,
}

impl ImportVerification {
    /// Table counts must match exactly against a measured baseline; a dump
    /// estimate may be off by `tolerance.table_markers`. Losing every row
    /// of a database that had data is fatal.
    pub fn compare(
        baseline: &DatabaseStatistics,
        origin: BaselineOrigin,
        current: &DatabaseStatistics,
        tolerance: &VerificationTolerance,
    ) -> Self {
        let mut fatal = Vec::new();
        let mut warnings = Vec::new();

        let table_slack = match origin {
            BaselineOrigin::Measured => 0,
            BaselineOrigin::DumpEstimate => tolerance.table_markers,
        };
        if baseline.table_count.abs_diff(current.table_count) > table_slack {
            fatal.push(format!(
                "tabelas: esperado {}, encontrado {} (delta {})",
                baseline.table_count,
                current.table_count,
                signed_delta(baseline.table_count, current.table_count)
            ));
        }

        if baseline.row_count > 0 && current.row_count == 0 {
            fatal.push(format!(
                "nenhuma linha no banco restaurado, original tinha ~{}",
                baseline.row_count
            ));
        } else if exceeds(baseline.row_count, current.row_count, tolerance.row_percent) {
            warnings.push(format!(
                "linhas estimadas: original {}, atual {} (delta {})",
                baseline.row_count,
                current.row_count,
                signed_delta(baseline.row_count, current.row_count)
            ));
        }

        // A zero baseline size means the size was never measured.
        if baseline.size_bytes > 0
            && exceeds(baseline.size_bytes, current.size_bytes, tolerance.size_percent)
        {
            warnings.push(format!(
                "tamanho: original {} bytes, atual {} bytes (delta {})",
                baseline.size_bytes,
                current.size_bytes,
                signed_delta(baseline.size_bytes, current.size_bytes)
            ));
        }

        Self {
            baseline: *baseline,
            current: *current,
            fatal,
            warnings,
        }
    }

    pub fn passed(&self) -> bool {
        self.fatal.is_empty()
    }
}

fn signed_delta(before: u64, after: u64) -> i128 {
    after as i128 - before as i128
}

fn exceeds(before: u64, after: u64, percent: f64) -> bool {
    if before == 0 {
        return after != 0;
    }
    let delta = (after as f64 - before as f64).abs();
    delta / before as f64 * 100.0 > percent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(size: u64, tables: u64) -> BackupArtifact {
        BackupArtifact {
            path: "/backups/backup-20251001_165130.sql".into(),
            size_bytes: size,
            estimated_table_count: tables,
            estimated_row_count: 1000,
            created_at: Local::now(),
        }
    }

    fn stats(tables: u64, size: u64, rows: u64) -> DatabaseStatistics {
        DatabaseStatistics {
            table_count: tables,
            size_bytes: size,
            row_count: rows,
        }
    }

    #[test]
    fn test_integrity_passes_for_matching_dump() {
        let baseline = stats(5, 26_214_400, 1000);
        let report = BackupIntegrityReport::evaluate(
            &artifact(12345, 5),
            Some(&baseline),
            &VerificationTolerance::default(),
        );
        assert!(report.passed(), "{:?}", report.issues);
    }

    #[test]
    fn test_integrity_flags_missing_table_definitions() {
        let baseline = stats(5, 26_214_400, 1000);
        let report = BackupIntegrityReport::evaluate(
            &artifact(12345, 0),
            Some(&baseline),
            &VerificationTolerance::default(),
        );
        assert!(!report.passed());
        assert!(report.issues[0].contains("não contém definições"));
    }

    #[test]
    fn test_integrity_flags_tiny_dump() {
        let baseline = stats(3, 8192, 10);
        let report = BackupIntegrityReport::evaluate(
            &artifact(200, 3),
            Some(&baseline),
            &VerificationTolerance::default(),
        );
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("suspeitamente pequeno"));
    }

    #[test]
    fn test_integrity_without_baseline_only_checks_size() {
        let report =
            BackupIntegrityReport::evaluate(&artifact(0, 0), None, &VerificationTolerance::default());
        assert_eq!(report.issues, vec!["arquivo de backup vazio".to_string()]);
    }

    #[test]
    fn test_compare_table_mismatch_is_fatal() {
        let result = ImportVerification::compare(
            &stats(5, 1000, 100),
            BaselineOrigin::Measured,
            &stats(4, 1000, 100),
            &VerificationTolerance::default(),
        );
        assert!(!result.passed());
        assert!(result.fatal[0].contains("delta -1"));
    }

    #[test]
    fn test_compare_row_delta_beyond_tolerance_is_warning() {
        let result = ImportVerification::compare(
            &stats(5, 1000, 1000),
            BaselineOrigin::Measured,
            &stats(5, 1000, 700),
            &VerificationTolerance::default(),
        );
        assert!(result.passed());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("linhas"));
    }

    #[test]
    fn test_compare_within_tolerance_is_clean() {
        let result = ImportVerification::compare(
            &stats(5, 26_214_400, 1000),
            BaselineOrigin::Measured,
            &stats(5, 20_000_000, 950),
            &VerificationTolerance::default(),
        );
        assert!(result.passed());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_compare_skips_size_when_baseline_unknown() {
        let baseline = DatabaseStatistics::from_artifact(&artifact(12345, 5));
        let result = ImportVerification::compare(
            &baseline,
            BaselineOrigin::DumpEstimate,
            &stats(5, 90_000_000, 1000),
            &VerificationTolerance::default(),
        );
        assert!(result.passed());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_integrity_tolerates_one_missing_table_marker() {
        let baseline = stats(6, 26_214_400, 1000);
        let tolerance = VerificationTolerance::default();

        let close =
            BackupIntegrityReport::evaluate(&artifact(12345, 5), Some(&baseline), &tolerance);
        assert!(close.passed(), "{:?}", close.issues);

        let short =
            BackupIntegrityReport::evaluate(&artifact(12345, 4), Some(&baseline), &tolerance);
        assert_eq!(short.issues.len(), 1);
        assert!(short.issues[0].contains("backup define 4 tabelas"));
    }

    #[test]
    fn test_compare_dump_estimate_allows_table_slack() {
        let baseline = DatabaseStatistics::from_artifact(&artifact(12345, 5));
        let tolerance = VerificationTolerance::default();

        let off_by_one = ImportVerification::compare(
            &baseline,
            BaselineOrigin::DumpEstimate,
            &stats(6, 8192, 1000),
            &tolerance,
        );
        assert!(off_by_one.passed(), "{:?}", off_by_one.fatal);

        let measured = ImportVerification::compare(
            &baseline,
            BaselineOrigin::Measured,
            &stats(6, 8192, 1000),
            &tolerance,
        );
        assert!(!measured.passed());
    }

    #[test]
    fn test_compare_all_rows_lost_is_fatal() {
        let result = ImportVerification::compare(
            &stats(5, 1000, 1000),
            BaselineOrigin::Measured,
            &stats(5, 1000, 0),
            &VerificationTolerance::default(),
        );
        assert!(!result.passed());
        assert!(result.fatal[0].contains("nenhuma linha"));
        assert!(result.warnings.is_empty());
    }
}
