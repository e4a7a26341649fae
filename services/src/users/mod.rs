//! Accounts and roles.
//!
//! Persistence lives in [`storage`]; the account flows that use it are in
//! [`crate::auth`] and [`crate::admin`].

pub mod storage;

pub use storage::{
    MockUserStorage, NewUser, PgUserStorage, Role, StoredUser, UserStorage, UserStorageError,
};
