//! Referral capture and attribution.

pub mod capture;
pub mod ledger;

pub use capture::{parse_referral_code, ReferralCapture};
pub use ledger::ReferralLedger;
