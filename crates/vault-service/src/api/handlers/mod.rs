//! API request handlers

pub mod accounts;
pub mod keypairs;
pub mod session;
pub mod signing;
pub mod signing_log;
pub mod substores;

pub use accounts::{
    create_account, create_model, get_account, list_accounts, list_models, set_default_keypair,
    DefaultKeypairRequest, NewModelRequest,
};
pub use keypairs::{
    disable_keypair, enable_keypair, generate_keypair, import_keypair, keypair_status, list_keypairs,
    register_keypair, GenerateKeypairRequest, ImportKeypairRequest, RegisterKeypairRequest,
};
pub use session::{create_session, SessionBody};
pub use signing::{
    pivot, request_id, sign_model, sign_pivot_model, sign_pivot_serial, sign_serial, sign_system_user,
    PivotBody, SignedAssertionBody,
};
pub use signing_log::list_signing_log;
pub use substores::{create_substore, delete_substore, list_substores, update_substore};
