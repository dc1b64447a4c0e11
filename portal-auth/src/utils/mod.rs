pub mod password;
pub mod validation;

pub use password::{
    generate_opaque_hex, hash_password, verify_password, Password, PasswordHashString,
};
pub use validation::ValidatedJson;
