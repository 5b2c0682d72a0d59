use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/* ===== errors ===== */
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
pub enum OperationError {
    // Entry and tree state.
    NoSuchObject,
    EntryAlreadyExists,
    NotAllowedOnNonLeaf,
    AttributeOrValueExists,
    NoSuchAttributeValue,
    ConstraintViolation(String),
    // Request parsing.
    FilterParseError,
    InvalidDnSyntax,
    InvalidLdapUrl,
    InvalidAttributeName(String),
    InvalidRequestState,
    // Operation outcome.
    UnwillingToPerform,
    SizeLimitExceeded,
    TimeLimitExceeded,
    Cancelled,
    ResourceLimit,
    // Groups.
    InvalidGroupState(String),
    GroupCycle,
    // Configuration.
    InvalidConfiguration(String),
    FsError,
    SerdeJsonError,
    SerdeTomlError,
}

impl PartialEq for OperationError {
    fn eq(&self, other: &Self) -> bool {
        // Only the kind of error matters when comparing, the payloads are diagnostic.
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl Display for OperationError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let mut output = format!("{:?}", self)
            .split("::")
            .last()
            .unwrap_or("")
            .to_string();

        if let Some(msg) = self.message() {
            output += &format!(" - {}", msg);
        };
        f.write_str(&output)
    }
}

impl std::error::Error for OperationError {}

impl OperationError {
    /// Return the message associated with the error if there is one.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::NoSuchObject => None,
            Self::EntryAlreadyExists => None,
            Self::NotAllowedOnNonLeaf => {
                Some("The entry has subordinates and can not be removed.".into())
            }
            Self::AttributeOrValueExists => None,
            Self::NoSuchAttributeValue => None,
            Self::ConstraintViolation(_) => None,
            Self::FilterParseError => None,
            Self::InvalidDnSyntax => None,
            Self::InvalidLdapUrl => None,
            Self::InvalidAttributeName(_) => None,
            Self::InvalidRequestState => None,
            Self::UnwillingToPerform => None,
            Self::SizeLimitExceeded => {
                Some("The search returned more entries than the size limit permits.".into())
            }
            Self::TimeLimitExceeded => {
                Some("The search did not complete within the time limit.".into())
            }
            Self::Cancelled => Some("The operation was abandoned by the requestor.".into()),
            Self::ResourceLimit => None,
            Self::InvalidGroupState(_) => None,
            Self::GroupCycle => {
                Some("Resolving a virtual static group revisited a group already on the chain.".into())
            }
            Self::InvalidConfiguration(_) => None,
            Self::FsError => None,
            Self::SerdeJsonError => None,
            Self::SerdeTomlError => None,
        }
    }

    /// The RFC 4511 result code an LDAP front end reports for this error.
    pub fn ldap_result_code(&self) -> u32 {
        match self {
            Self::NoSuchObject => 32,
            Self::EntryAlreadyExists => 68,
            Self::NotAllowedOnNonLeaf => 66,
            Self::AttributeOrValueExists => 20,
            Self::NoSuchAttributeValue => 16,
            Self::ConstraintViolation(_) => 19,
            Self::FilterParseError | Self::InvalidRequestState => 2,
            Self::InvalidDnSyntax => 34,
            Self::InvalidLdapUrl | Self::InvalidAttributeName(_) => 21,
            Self::UnwillingToPerform => 53,
            Self::SizeLimitExceeded => 4,
            Self::TimeLimitExceeded => 3,
            Self::Cancelled => 118,
            Self::ResourceLimit => 51,
            Self::GroupCycle => 54,
            Self::InvalidGroupState(_)
            | Self::InvalidConfiguration(_)
            | Self::FsError
            | Self::SerdeJsonError
            | Self::SerdeTomlError => 80,
        }
    }
}

#[test]
fn test_operationerror_as_nice_string() {
    assert_eq!(
        OperationError::NoSuchObject.to_string(),
        "NoSuchObject".to_string()
    );
    assert_eq!(
        OperationError::Cancelled.to_string(),
        "Cancelled - The operation was abandoned by the requestor.".to_string()
    );
    assert_eq!(
        OperationError::InvalidConfiguration("missing value".to_string()).to_string(),
        "InvalidConfiguration(\"missing value\")".to_string()
    );
}

#[test]
fn test_operationerror_discriminant_eq() {
    assert_eq!(
        OperationError::InvalidGroupState("a".to_string()),
        OperationError::InvalidGroupState("b".to_string())
    );
    assert_ne!(OperationError::SizeLimitExceeded, OperationError::TimeLimitExceeded);
    assert_eq!(OperationError::UnwillingToPerform.ldap_result_code(), 53);
}
