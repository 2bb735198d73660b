pub mod api_key;
pub mod error;
pub mod groups;
pub mod memory;
pub mod odoo;
pub mod password;
pub mod provisioner;
pub mod repository;
pub mod saga;
mod steps;
pub mod vault;

pub use api_key::ApiKeyIssuer;
pub use error::{ProvisioningError, RepositoryError, VaultError};
pub use groups::{GroupPolicy, GroupResolution, GroupResolver};
pub use memory::InMemoryProvisioningRepository;
pub use provisioner::UserProvisioner;
pub use repository::{PgProvisioningRepository, ProvisioningRepository};
pub use saga::{Saga, SagaFailure, SagaStep};
pub use vault::{AesGcmVault, CredentialVault};
