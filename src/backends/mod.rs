//! Built-in secret sources
//!
//! | name | backend | locator |
//! |---|---|---|
//! | `raw` | [`RawBackend`] | the value itself |
//! | `env` | [`EnvBackend`] | environment variable, memoized after the first read |
//! | `dynenv` | [`DynEnvBackend`] | environment variable, read on every call |
//! | `file` | [`FileBackend`] | path of a file whose first line is the value |
//! | `scr` | [`CipherBackend`] | base64 AES-256-GCM ciphertext |
//! | `etcd2` | [`EtcdBackend`] | etcd v2 key path |
//! | `vault` | [`VaultBackend`] | `<path>?<field>` in a Vault KV mount |
//!
//! `vault` needs a server and credentials, so it is not part of
//! [`Registry::with_builtins`](crate::Registry::with_builtins); register a
//! connected [`VaultBackend`] under [`VAULT`] yourself.

pub mod cipher;
mod env;
mod etcd;
mod file;
mod raw;
mod vault;

pub use cipher::CipherBackend;
pub use env::{DynEnvBackend, EnvBackend};
pub use etcd::EtcdBackend;
pub use file::FileBackend;
pub use raw::RawBackend;
pub use vault::VaultBackend;

/// Registry name of [`RawBackend`]
pub const RAW: &str = "raw";
/// Registry name of [`EnvBackend`]
pub const ENV: &str = "env";
/// Registry name of [`DynEnvBackend`]
pub const DYNENV: &str = "dynenv";
/// Registry name of [`FileBackend`]
pub const FILE: &str = "file";
/// Registry name of [`CipherBackend`]
pub const CIPHER: &str = "scr";
/// Registry name of [`EtcdBackend`]
pub const ETCD: &str = "etcd2";
/// Registry name of [`VaultBackend`]
pub const VAULT: &str = "vault";
