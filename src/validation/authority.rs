//! Authoritative lookup seam.

use super::IdentifierKind;
use crate::error::Result;

/// An external source that can confirm an identifier exists.
///
/// Implementations may block on network I/O. `Ok(false)` means the authority
/// answered and does not know the identifier; an `Err` means it could not
/// answer, which the validator reports as unavailable.
pub trait LookupAuthority: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Whether this authority handles identifiers of `kind`.
    fn supports(&self, kind: IdentifierKind) -> bool;

    /// Look up one syntactically valid identifier.
    fn lookup(&self, kind: IdentifierKind, identifier: &str) -> Result<bool>;
}

/// Accepts every syntactically valid identifier without calling out.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxOnlyAuthority;

impl LookupAuthority for SyntaxOnlyAuthority {
    fn name(&self) -> &str {
        "syntax-only"
    }

    fn supports(&self, _kind: IdentifierKind) -> bool {
        true
    }

    fn lookup(&self, _kind: IdentifierKind, _identifier: &str) -> Result<bool> {
        Ok(true)
    }
}
