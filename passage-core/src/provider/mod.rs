//! External collaborator seams: wallet provider and sponsored signer.
//!
//! - Trait definitions the host application implements
//! - Mock implementations for testing and the CLI simulator

pub mod mock;
pub mod traits;

pub use mock::{MockSigner, MockWalletProvider};
pub use traits::{
    ProviderError, SignatureResult, Signer, SigningError, SigningPayload, WalletProvider,
};
