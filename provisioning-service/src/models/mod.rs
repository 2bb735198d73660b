pub mod credential;
pub mod local_user;
pub mod odoo_database;
pub mod provisioning_record;

pub use credential::{
    AdminCredentials, Credential, CredentialKind, ProvisionOutcome, ProvisioningWarning,
    UserCredentials,
};
pub use local_user::LocalUser;
pub use odoo_database::OdooDatabase;
pub use provisioning_record::{ProvisioningRecord, ProvisioningRecordPatch, ProvisioningState};
