//! Adapters module - collaborators of the transfer session

pub mod traits;
pub mod mock;
pub mod globus;
pub mod token_store;
pub mod prompt;

pub use traits::{AuthCodeProvider, AuthService, CredentialStore, TransferApi};
pub use mock::{CannedCodeProvider, MemoryCredentialStore, MockAuthService, MockTransferApi};

// HTTP-backed adapters for the Globus auth and transfer services
pub use globus::{GlobusAuthClient, GlobusTransferClient};

pub use token_store::JsonFileTokenStore;
pub use prompt::{PromptCodeProvider, StdinCodeProvider};
