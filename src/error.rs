use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("PIC offset {offset:#04x} is not a multiple of 8")]
    MisalignedPicOffset { offset: u8 },
    #[error("PIC offset {offset:#04x} lands on the CPU exception vectors")]
    ExceptionOverlap { offset: u8 },
    #[error("master and slave PIC vector ranges overlap")]
    OverlappingPicRanges,
    #[error("unknown boot option `{0}`")]
    UnknownOption(&'static str),
    #[error("invalid value `{value}` for boot option `{option}`")]
    InvalidValue { option: &'static str, value: &'static str },
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("a logger is already installed")]
    LoggerInstalled,
    #[error("interrupt entry stubs are already bound to a router")]
    AlreadyBound,
}
