mod run;
mod snapshot;
mod step;

pub use run::{RunState, RunStatus, StepOutcome, StepResult, WorkflowRun};
pub use snapshot::{
    DeviceRecord, DiskRecord, DriverPackageRecord, InstalledPackage, InterfaceRecord, OsInfo,
    SystemSnapshot, normalize_mac,
};
pub use step::{PlannedAction, PlannedActionKind, Step, StepKind};
