use crate::domain::{ContainerRuntime, RuntimeResult, UpgradeError};
use crate::infra::MountPolicy;
use crate::services::ContainerService;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountDecision {
    Verified,
    Restart,
    GiveUp,
}

/// Next move given the mounts just observed and the restarts already spent.
pub fn decide(
    observed: &BTreeSet<String>,
    expected_path: &str,
    restarts_done: u32,
    restart_budget: u32,
) -> MountDecision {
    let expected = expected_path.trim_end_matches('/');
    if observed.iter().any(|m| m.trim_end_matches('/') == expected) {
        MountDecision::Verified
    } else if restarts_done < restart_budget {
        MountDecision::Restart
    } else {
        MountDecision::GiveUp
    }
}

/// Confirms the backup volume is visible inside the running container.
///
/// Tier 1 only inspects. Tier 2 restarts the container and inspects again,
/// up to `restart_attempts` times, sleeping `delay` after each restart.
pub struct MountVerifier {
    runtime: Arc<dyn ContainerRuntime>,
    containers: Arc<ContainerService>,
    policy: MountPolicy,
}

impl MountVerifier {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        containers: Arc<ContainerService>,
        policy: MountPolicy,
    ) -> Self {
        Self {
            runtime,
            containers,
            policy,
        }
    }

    pub fn verify(&self, service: &str, expected_path: &str) -> RuntimeResult<()> {
        let mut restarts = 0;
        let mut inspections = 0;

        loop {
            let observed = self.runtime.inspect_mounts(service)?;
            inspections += 1;
            debug!("Montagens de {service}: {:?}", observed);

            match decide(&observed, expected_path, restarts, self.policy.restart_attempts) {
                MountDecision::Verified => {
                    info!(" Volume de backup {expected_path} montado em {service}");
                    return Ok(());
                }
                MountDecision::Restart => {
                    restarts += 1;
                    warn!(
                        "  {expected_path} não visível em {service}, reiniciando ({restarts}/{})",
                        self.policy.restart_attempts
                    );
                    self.containers.restart(service)?;
                    thread::sleep(self.policy.delay);
                }
                MountDecision::GiveUp => {
                    return Err(UpgradeError::MountVerification {
                        service: service.to_string(),
                        expected_path: expected_path.to_string(),
                        attempts: inspections,
                        observed: observed.into_iter().collect(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContainerState;
    use crate::test_support::MockRuntime;
    use std::time::Duration;

    const BACKUPS: &str = "/var/lib/postgresql/backups";
    const DATA: &str = "/var/lib/postgresql/data";

    fn verifier(attempts: u32) -> (MountVerifier, Arc<MockRuntime>) {
        let mock = Arc::new(MockRuntime::new());
        mock.add_container("postgres", ContainerState::Running);
        let containers = Arc::new(ContainerService::new(mock.clone()));
        let policy = MountPolicy {
            restart_attempts: attempts,
            delay: Duration::ZERO,
        };
        (MountVerifier::new(mock.clone(), containers, policy), mock)
    }

    fn mounts(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_decide() {
        let present = mounts(&[DATA, "/var/lib/postgresql/backups/"]);
        let absent = mounts(&[DATA]);

        assert_eq!(decide(&present, BACKUPS, 0, 3), MountDecision::Verified);
        assert_eq!(decide(&present, BACKUPS, 3, 3), MountDecision::Verified);
        assert_eq!(decide(&absent, BACKUPS, 0, 3), MountDecision::Restart);
        assert_eq!(decide(&absent, BACKUPS, 2, 3), MountDecision::Restart);
        assert_eq!(decide(&absent, BACKUPS, 3, 3), MountDecision::GiveUp);
        assert_eq!(decide(&absent, BACKUPS, 0, 0), MountDecision::GiveUp);
    }

    #[test]
    fn test_decide_does_not_match_prefixes() {
        let observed = mounts(&["/var/lib/postgresql/backups-old"]);
        assert_eq!(decide(&observed, BACKUPS, 1, 1), MountDecision::GiveUp);
    }

    #[test]
    fn test_tier_one_success_never_restarts() {
        let (verifier, mock) = verifier(3);
        mock.set_mounts("postgres", &[DATA, BACKUPS]);

        verifier.verify("postgres", BACKUPS).unwrap();

        assert_eq!(mock.count_commands("inspect_mounts:"), 1);
        assert_eq!(mock.count_commands("stop:"), 0);
        assert_eq!(mock.count_commands("start:"), 0);
    }

    #[test]
    fn test_tier_two_success_restarts_once() {
        let (verifier, mock) = verifier(3);
        mock.push_mount_view(&[DATA]);
        mock.set_mounts("postgres", &[DATA, BACKUPS]);

        verifier.verify("postgres", BACKUPS).unwrap();

        assert_eq!(mock.count_commands("inspect_mounts:"), 2);
        assert_eq!(mock.count_commands("stop:"), 1);
        assert_eq!(mock.count_commands("start:"), 1);
    }

    #[test]
    fn test_gives_up_after_restart_budget() {
        let (verifier, mock) = verifier(3);
        mock.set_mounts("postgres", &[DATA]);

        let err = verifier.verify("postgres", BACKUPS).unwrap_err();

        match err {
            UpgradeError::MountVerification {
                expected_path,
                attempts,
                observed,
                ..
            } => {
                assert_eq!(expected_path, BACKUPS);
                assert_eq!(attempts, 4);
                assert_eq!(observed, vec![DATA.to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.count_commands("start:"), 3);
        assert_eq!(mock.count_commands("inspect_mounts:"), 4);
    }

    #[test]
    fn test_restart_failure_propagates() {
        let (verifier, mock) = verifier(3);
        mock.set_mounts("postgres", &[DATA]);
        mock.set_fail_on("start");

        let err = verifier.verify("postgres", BACKUPS).unwrap_err();
        assert!(matches!(err, UpgradeError::ContainerStart { .. }));
        assert_eq!(mock.count_commands("inspect_mounts:"), 1);
    }
}
