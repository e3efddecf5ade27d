pub mod credentials;
pub mod negotiator;

pub use credentials::{
    check_auth, delete_secret, get_credential_storage_info, load_secret, load_settings, logout,
    restore_session,
    save_secret, save_settings, AuthStatus, StoredMode, StoredSecret, StoredSettings,
};
pub use negotiator::{login, AuthError, LoginParams};
