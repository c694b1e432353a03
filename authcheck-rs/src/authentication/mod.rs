//! Email authentication checks
//!
//! One evaluator per mechanism. Each evaluator absorbs its own lookup
//! failures and always returns a result; the aggregate view needed for the
//! final verdict is [`CheckOutcome`].

pub mod dkim;
pub mod dmarc;
pub mod spf;
pub mod types;

pub use dkim::{DkimCheck, DkimFinding, DkimProber};
pub use dmarc::{DmarcCheck, DmarcEvaluator, DmarcPolicy};
pub use spf::{SpfCheck, SpfEvaluator};
pub use types::{CheckOutcome, Mechanism};
