use crate::error::AuthenticatorStatus;

/// Error codes reported by the legacy FIDO2 API.
pub mod legacy_error_code {
    /// Request parameters were not supported.
    pub const NOT_SUPPORTED: i32 = 9;
    /// Invalid state, e.g. an excluded credential exists.
    pub const INVALID_STATE: i32 = 11;
    /// The app id or relying party id failed validation.
    pub const SECURITY: i32 = 18;
    /// The operation timed out.
    pub const TIMEOUT: i32 = 23;
    /// Results could not be encoded after user consent.
    pub const ENCODING: i32 = 27;
    /// Unknown failure.
    pub const UNKNOWN: i32 = 28;
    /// A constraint was not met, e.g. no screen lock.
    pub const CONSTRAINT: i32 = 29;
    /// Incoming request was malformed.
    pub const DATA: i32 = 30;
    /// The request is not allowed.
    pub const NOT_ALLOWED: i32 = 35;
}

const NON_EMPTY_ALLOWLIST_ERROR_MSG: &str = "Authentication request must have non-empty allowList";
const NON_VALID_ALLOWED_CREDENTIALS_ERROR_MSG: &str =
    "Request doesn't have a valid list of allowed credentials.";
const NO_SCREENLOCK_ERROR_MSG: &str = "The device is not secured with any screen lock";
const CREDENTIAL_EXISTS_ERROR_MSG: &str =
    "One of the excluded credentials exists on the local device";
// Returned when the user tries a credential not registered on a U2F security key.
const LOW_LEVEL_ERROR_MSG: &str = "Low level error 0x6a80";

const CREDENTIAL_MANAGER_USER_CANCELED: &[&str] = &[
    "android.credentials.GetCredentialException.TYPE_USER_CANCELED",
    "android.credentials.CreateCredentialException.TYPE_USER_CANCELED",
];

/// Maps a legacy API error code and message to the shared status taxonomy.
pub(crate) fn convert_legacy_error(code: i32, message: Option<&str>) -> AuthenticatorStatus {
    use legacy_error_code as c;

    let unknown = |message: Option<&str>| {
        if message == Some(LOW_LEVEL_ERROR_MSG) {
            AuthenticatorStatus::NotAllowedError
        } else {
            AuthenticatorStatus::UnknownError
        }
    };

    match code {
        c::SECURITY => AuthenticatorStatus::InvalidDomain,
        c::TIMEOUT => AuthenticatorStatus::NotAllowedError,
        c::ENCODING => AuthenticatorStatus::UnknownError,
        c::NOT_ALLOWED => match message {
            Some(NON_EMPTY_ALLOWLIST_ERROR_MSG | NON_VALID_ALLOWED_CREDENTIALS_ERROR_MSG) => {
                AuthenticatorStatus::EmptyAllowCredentials
            }
            _ => AuthenticatorStatus::NotAllowedError,
        },
        c::DATA | c::NOT_SUPPORTED => AuthenticatorStatus::AndroidNotSupportedError,
        c::CONSTRAINT if message == Some(NO_SCREENLOCK_ERROR_MSG) => {
            AuthenticatorStatus::UserVerificationUnsupported
        }
        c::CONSTRAINT => AuthenticatorStatus::UnknownError,
        c::INVALID_STATE if message == Some(CREDENTIAL_EXISTS_ERROR_MSG) => {
            AuthenticatorStatus::CredentialExcluded
        }
        c::INVALID_STATE | c::UNKNOWN => unknown(message),
        _ => AuthenticatorStatus::UnknownError,
    }
}

/// Maps a credential-manager exception type to the shared status taxonomy.
pub(crate) fn convert_credential_manager_error(error_type: &str) -> AuthenticatorStatus {
    if CREDENTIAL_MANAGER_USER_CANCELED.contains(&error_type) {
        AuthenticatorStatus::NotAllowedError
    } else {
        AuthenticatorStatus::UnknownError
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::legacy_error_code as c;
    use super::*;
    use AuthenticatorStatus as S;

    #[test_case(c::SECURITY, None, S::InvalidDomain)]
    #[test_case(c::TIMEOUT, None, S::NotAllowedError)]
    #[test_case(c::ENCODING, None, S::UnknownError)]
    #[test_case(c::NOT_ALLOWED, None, S::NotAllowedError)]
    #[test_case(c::NOT_ALLOWED, Some(NON_EMPTY_ALLOWLIST_ERROR_MSG), S::EmptyAllowCredentials)]
    #[test_case(c::NOT_ALLOWED, Some(NON_VALID_ALLOWED_CREDENTIALS_ERROR_MSG), S::EmptyAllowCredentials)]
    #[test_case(c::DATA, None, S::AndroidNotSupportedError)]
    #[test_case(c::NOT_SUPPORTED, None, S::AndroidNotSupportedError)]
    #[test_case(c::CONSTRAINT, Some(NO_SCREENLOCK_ERROR_MSG), S::UserVerificationUnsupported)]
    #[test_case(c::CONSTRAINT, Some("other"), S::UnknownError)]
    #[test_case(c::INVALID_STATE, Some(CREDENTIAL_EXISTS_ERROR_MSG), S::CredentialExcluded)]
    #[test_case(c::INVALID_STATE, Some(LOW_LEVEL_ERROR_MSG), S::NotAllowedError)]
    #[test_case(c::INVALID_STATE, None, S::UnknownError)]
    #[test_case(c::UNKNOWN, Some(LOW_LEVEL_ERROR_MSG), S::NotAllowedError)]
    #[test_case(c::UNKNOWN, None, S::UnknownError)]
    #[test_case(4242, Some(LOW_LEVEL_ERROR_MSG), S::UnknownError)]
    fn test_convert_legacy_error(code: i32, message: Option<&str>, expected: S) {
        assert_eq!(convert_legacy_error(code, message), expected);
    }

    #[test]
    fn test_convert_credential_manager_error() {
        assert_eq!(
            convert_credential_manager_error(
                "android.credentials.GetCredentialException.TYPE_USER_CANCELED"
            ),
            S::NotAllowedError
        );
        assert_eq!(
            convert_credential_manager_error(
                "android.credentials.GetCredentialException.TYPE_NO_CREDENTIAL"
            ),
            S::UnknownError
        );
    }
}
