//! IP-T response codes and their success predicates.
//!
//! Each response command carries a one-byte code with its own
//! enumeration. Login is the interesting one: `ACCOUNT_LOCKED` still
//! counts as a structurally successful login (the session exists, all
//! further actions stall), `NEW_ADDRESS` is a redirect and `MALFUNCTION`
//! is fatal for the session.

/// Login response codes (public and scrambled logins share them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoginCode {
    /// Unassigned login error.
    GeneralError = 0,
    /// Successful login.
    Success = 1,
    /// Unknown account name.
    UnknownAccount = 2,
    /// Wrong password.
    WrongPassword = 3,
    /// Account already in use.
    AlreadyLoggedOn = 4,
    /// Re-login with a new address requested.
    NewAddress = 5,
    /// Account is disabled; the login itself completes.
    AccountLocked = 13,
    /// Faulty master; fatal for the session.
    Malfunction = 14,
}

impl LoginCode {
    /// Map a wire byte; reserved and unassigned values collapse to
    /// [`LoginCode::GeneralError`].
    #[must_use]
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::UnknownAccount,
            3 => Self::WrongPassword,
            4 => Self::AlreadyLoggedOn,
            5 => Self::NewAddress,
            13 => Self::AccountLocked,
            14 => Self::Malfunction,
            _ => Self::GeneralError,
        }
    }

    /// Structurally successful: the session reached the authorized state.
    ///
    /// A locked account logs in successfully but every further action
    /// stalls, so it counts here.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::AccountLocked)
    }

    /// Whether the account is locked.
    #[must_use]
    pub fn is_locked(self) -> bool {
        self == Self::AccountLocked
    }

    /// Whether the peer must reconnect to another address.
    #[must_use]
    pub fn is_redirect(self) -> bool {
        self == Self::NewAddress
    }

    /// Whether the session must be torn down.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        self == Self::Malfunction
    }
}

/// Logout response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogoutCode {
    /// Logout error.
    Error = 0,
    /// Regular logout.
    Normal = 1,
}

impl LogoutCode {
    /// Map a wire byte.
    #[must_use]
    pub fn from_u8(code: u8) -> Self {
        if code == 1 { Self::Normal } else { Self::Error }
    }

    /// Success predicate.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Normal
    }
}

/// Push target register/deregister response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TargetCode {
    /// Unassigned error.
    GeneralError = 0,
    /// Target operation succeeded.
    Ok = 1,
    /// Target operation rejected (duplicate name, unknown target).
    Rejected = 2,
}

impl TargetCode {
    /// Map a wire byte.
    #[must_use]
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::Ok,
            2 => Self::Rejected,
            _ => Self::GeneralError,
        }
    }

    /// Success predicate.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Ok
    }
}

/// Push channel open/close response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PushChannelCode {
    /// Unassigned error.
    GeneralError = 0,
    /// Channel operation succeeded.
    Success = 1,
    /// No session owns the requested target.
    Unreachable = 2,
    /// The channel id is not assigned.
    Undefined = 3,
}

impl PushChannelCode {
    /// Map a wire byte.
    #[must_use]
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::Unreachable,
            3 => Self::Undefined,
            _ => Self::GeneralError,
        }
    }

    /// Success predicate.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Push data transfer response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PushDataCode {
    /// Unassigned error.
    GeneralError = 0,
    /// Transfer delivered.
    Success = 1,
    /// The channel broke during the transfer.
    Broken = 2,
    /// No reachable target session.
    Unreachable = 3,
}

impl PushDataCode {
    /// Map a wire byte.
    #[must_use]
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::Broken,
            3 => Self::Unreachable,
            _ => Self::GeneralError,
        }
    }

    /// Success predicate.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Open connection response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpenConnectionCode {
    /// Unassigned error.
    GeneralError = 0,
    /// Dial-up succeeded.
    DialupSuccess = 1,
    /// The called party is busy.
    Busy = 2,
    /// The called party is offline.
    Unreachable = 3,
    /// The called address is not assigned.
    Undefined = 4,
}

impl OpenConnectionCode {
    /// Map a wire byte.
    #[must_use]
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::DialupSuccess,
            2 => Self::Busy,
            3 => Self::Unreachable,
            4 => Self::Undefined,
            _ => Self::GeneralError,
        }
    }

    /// Success predicate.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::DialupSuccess
    }
}

/// Close connection response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CloseConnectionCode {
    /// Unassigned error.
    GeneralError = 0,
    /// Connection closed.
    Success = 1,
    /// No connection was open.
    NotConnected = 2,
}

impl CloseConnectionCode {
    /// Map a wire byte.
    #[must_use]
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::NotConnected,
            _ => Self::GeneralError,
        }
    }

    /// Success predicate.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_account_still_logs_in() {
        let code = LoginCode::from_u8(13);
        assert!(code.is_success());
        assert!(code.is_locked());
        assert!(!code.is_redirect());
    }

    #[test]
    fn new_address_is_a_redirect_not_a_success() {
        let code = LoginCode::from_u8(5);
        assert!(code.is_redirect());
        assert!(!code.is_success());
    }

    #[test]
    fn malfunction_is_fatal() {
        assert!(LoginCode::from_u8(14).is_fatal());
    }

    #[test]
    fn reserved_codes_collapse_to_general_error() {
        for raw in 6..=12 {
            assert_eq!(LoginCode::from_u8(raw), LoginCode::GeneralError);
        }
    }

    #[test]
    fn connection_codes() {
        assert!(OpenConnectionCode::from_u8(1).is_success());
        assert!(!OpenConnectionCode::from_u8(2).is_success());
        assert!(CloseConnectionCode::from_u8(1).is_success());
    }
}
