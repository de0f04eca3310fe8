use strum::Display;

/// Error codes delivered through [`crate::IResult`].
///
/// Success and "not yet set" are not errors here: they are `Ok` and the
/// absence of a value.
#[repr(u8)]
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelError {
    GenericError = 3,
    InvalidCapability = 4,
    InvalidArgument = 5,
    NonCanonicalAddress = 6,
    Unaligned = 7,
    InsufficientResources = 8,
    LostRace = 9,
    Retry = 10,
    NoMessage = 11,
    TypeMismatch = 12,
    NotImplemented = 13,
    CapNonempty = 14,
    NotKernelmem = 15,
    CyclicDependency = 16,
    PortalNotOpen = 17,
    PortalNotInvoked = 18,
    PortalNoBuffer = 19,
    PortalNoEndpoint = 20,
    NoLookup = 21,
    InvalidRequest = 22,
    RequestDenied = 23,
    PagemapMissing = 24,
    PagemapNoconf = 25,
}

impl KernelError {
    pub fn code(self) -> u8 {
        self as u8
    }
}
