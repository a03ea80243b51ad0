//! Closed status enums for deployments, clusters and instances
//!
//! Remote status strings are parsed once, at the SDK boundary. A string that
//! is not listed here is an `UnknownStatus` error, never a silent fallthrough.

use std::fmt;
use std::str::FromStr;

use switchyard_core::wait::WaitStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            /// The object does not exist
            Absent,
        }

        impl $name {
            /// Every status the remote API can report
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                    $name::Absent => "absent",
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl WaitStatus for $name {
            const ABSENT: Self = $name::Absent;
        }
    };
}

status_enum! {
    /// Status of a blue/green deployment
    DeploymentStatus ("blue/green deployment status") {
        Provisioning => "PROVISIONING",
        Available => "AVAILABLE",
        SwitchoverInProgress => "SWITCHOVER_IN_PROGRESS",
        SwitchoverCompleted => "SWITCHOVER_COMPLETED",
        InvalidConfiguration => "INVALID_CONFIGURATION",
        SwitchoverFailed => "SWITCHOVER_FAILED",
        Deleting => "DELETING",
    }
}

impl DeploymentStatus {
    /// A switchover has been started (or has finished)
    pub fn is_switching_or_switched(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::SwitchoverInProgress | DeploymentStatus::SwitchoverCompleted
        )
    }
}

status_enum! {
    /// Status of a DB cluster
    ClusterStatus ("DB cluster status") {
        Available => "available",
        BackingUp => "backing-up",
        Backtracking => "backtracking",
        CloningFailed => "cloning-failed",
        ConfiguringIamDatabaseAuth => "configuring-iam-database-auth",
        Creating => "creating",
        Deleting => "deleting",
        Failed => "failed",
        FailingOver => "failing-over",
        InaccessibleEncryptionCredentials => "inaccessible-encryption-credentials",
        InaccessibleEncryptionCredentialsRecoverable => "inaccessible-encryption-credentials-recoverable",
        Maintenance => "maintenance",
        Migrating => "migrating",
        MigrationFailed => "migration-failed",
        Modifying => "modifying",
        PreparingDataMigration => "preparing-data-migration",
        Promoting => "promoting",
        Rebooting => "rebooting",
        Renaming => "renaming",
        ResettingMasterCredentials => "resetting-master-credentials",
        ScalingCompute => "scaling-compute",
        Starting => "starting",
        Stopped => "stopped",
        Stopping => "stopping",
        StorageOptimization => "storage-optimization",
        UpdateIamDbAuth => "update-iam-db-auth",
        Upgrading => "upgrading",
    }
}

status_enum! {
    /// Status of a DB instance
    InstanceStatus ("DB instance status") {
        Available => "available",
        BackingUp => "backing-up",
        ConfiguringEnhancedMonitoring => "configuring-enhanced-monitoring",
        ConfiguringIamDatabaseAuth => "configuring-iam-database-auth",
        ConfiguringLogExports => "configuring-log-exports",
        ConvertingToVpc => "converting-to-vpc",
        Creating => "creating",
        DeletePrecheck => "delete-precheck",
        Deleting => "deleting",
        Failed => "failed",
        InaccessibleEncryptionCredentials => "inaccessible-encryption-credentials",
        InaccessibleEncryptionCredentialsRecoverable => "inaccessible-encryption-credentials-recoverable",
        IncompatibleNetwork => "incompatible-network",
        IncompatibleOptionGroup => "incompatible-option-group",
        IncompatibleParameters => "incompatible-parameters",
        IncompatibleRestore => "incompatible-restore",
        InsufficientCapacity => "insufficient-capacity",
        Maintenance => "maintenance",
        Modifying => "modifying",
        MovingToVpc => "moving-to-vpc",
        Rebooting => "rebooting",
        Renaming => "renaming",
        ResettingMasterCredentials => "resetting-master-credentials",
        RestoreError => "restore-error",
        Starting => "starting",
        Stopped => "stopped",
        Stopping => "stopping",
        StorageConfigUpgrade => "storage-config-upgrade",
        StorageFull => "storage-full",
        StorageInitialization => "storage-initialization",
        StorageOptimization => "storage-optimization",
        Upgrading => "upgrading",
    }
}
