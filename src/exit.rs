use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Precondition,
    PartialFailure,
    Aborted,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Precondition => 1,
            ExitCode::PartialFailure => 2,
            ExitCode::Aborted => 3,
        }
    }
}

#[derive(Debug)]
pub struct ExitError {
    pub code: ExitCode,
    pub err: anyhow::Error,
}

impl ExitError {
    pub fn new(code: ExitCode, err: anyhow::Error) -> Self {
        Self { code, err }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl std::error::Error for ExitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.err.as_ref())
    }
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(exit) = err.downcast_ref::<ExitError>() {
        return exit.code.as_i32();
    }
    ExitCode::Precondition.as_i32()
}

pub fn precondition(message: impl Into<String>) -> anyhow::Error {
    ExitError::new(ExitCode::Precondition, anyhow::anyhow!(message.into())).into()
}

pub fn precondition_err(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(ExitCode::Precondition, err).into()
}

pub fn backup_failed(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(
        ExitCode::Precondition,
        err.context("backup could not be taken; refusing to run destructive steps"),
    )
    .into()
}
