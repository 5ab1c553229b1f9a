/// Accounts module
///
/// The account model, its persistence seam and the management service
/// behind registration and the admin endpoints.

pub mod memory;
pub mod model;
pub mod repository;
pub mod service;

pub use memory::InMemoryAccountRepository;
pub use model::{
    Account, AccountChanges, AccountStatus, Gender, NewAccount, Profile, PublicProfile, Role,
};
pub use repository::{AccountRepository, PgAccountRepository};
pub use service::{AccountInput, AccountService, RegisterInput};
