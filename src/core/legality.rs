//! # Legality collaborator.
//!
//! Before a request is queued, the fleet asks an external engine to turn each
//! candidate (a showdown set, an uploaded file, a batch line...) into a
//! payload, or to reject it. The engine is called **once per candidate** and
//! never retried by the fleet.
//!
//! ```rust
//! use fleetvisor::{Legality, LegalityError};
//!
//! struct Upper;
//!
//! impl Legality<String> for Upper {
//!     type Request = String;
//!
//!     fn generate_or_validate(&self, request: &String) -> Result<String, LegalityError> {
//!         if request.trim().is_empty() {
//!             return Err(LegalityError::new("empty set"));
//!         }
//!         Ok(request.to_uppercase())
//!     }
//! }
//! ```

use crate::error::LegalityError;

/// Materializes or rejects one candidate.
pub trait Legality<P>: Send + Sync {
    /// Raw request as submitted.
    type Request;

    /// Returns the payload to queue, or why the candidate is refused.
    fn generate_or_validate(&self, request: &Self::Request) -> Result<P, LegalityError>;
}
