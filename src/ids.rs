//! Identifiers for principals, submissions and catalog entries
use std::fmt;

use bech32::Bech32m;
use uuid7::uuid7;

use super::error::IdentifierError;

// String newtypes encode as a plain CBOR text string.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl<C> minicbor::Encode<C> for $name {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                _: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                e.str(&self.0)?.ok()
            }
        }

        impl<'b, C> minicbor::Decode<'b, C> for $name {
            fn decode(
                d: &mut minicbor::Decoder<'b>,
                _: &mut C,
            ) -> Result<Self, minicbor::decode::Error> {
                Ok(Self(d.str()?.to_owned()))
            }
        }
    };
}

string_id!(
    /// Key of a visit report or expense sheet, a bech32m encoded uuid7.
    EntityId
);
string_id!(UserId);
string_id!(RegionId);
string_id!(DoctorId);
string_id!(ProductId);
string_id!(
    /// Flat-rate expense category, e.g. `KM` or `NUI`.
    ExpenseTypeId
);

/// The two kinds of submission moving through the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    VisitReport,
    ExpenseSheet,
}

impl EntityKind {
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::VisitReport => "report_",
            EntityKind::ExpenseSheet => "sheet_",
        }
    }
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::VisitReport => "visit report",
            EntityKind::ExpenseSheet => "expense sheet",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl EntityId {
    pub fn generate(kind: EntityKind) -> Result<Self, IdentifierError> {
        new_uuid_to_bech32(kind.prefix()).map(Self)
    }
}

impl UserId {
    pub fn generate() -> Result<Self, IdentifierError> {
        new_uuid_to_bech32("user_").map(Self)
    }
}

// construct a unique id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, IdentifierError> {
    let parsed = bech32::Hrp::parse(hrp)
        .map_err(|e| IdentifierError::Prefix(hrp.to_owned(), e.to_string()))?;
    bech32::encode::<Bech32m>(parsed, uuid7().as_bytes())
        .map_err(|e| IdentifierError::Encode(e.to_string()))
}
