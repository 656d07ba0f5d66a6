// src/metadata.rs
//! Metadata keeper: server identifier and series-prefix arity registrations.

use crate::error::{Error, Result};
use crate::storage::{ReadTx, WriteTx};

/// Name of the metadata tree, per spec.md §6.
pub const METADATA_TREE: &str = "$metadata";

const ID_KEY: &[u8] = b"id";
const PREFIX_KEY_PREFIX: &str = "prefixes-";

/// The store's stable 16-byte identity, generated once on first open and
/// never changed for the life of the store (spec.md §3 invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerId(pub [u8; 16]);

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Reads the server id if present, generating and persisting one otherwise.
pub fn bootstrap_server_id(write: &WriteTx) -> Result<ServerId> {
    let tree = write.create_tree(METADATA_TREE)?;
    if let Some(existing) = tree.get(ID_KEY)? {
        return Ok(decode_server_id(&existing)?);
    }
    let bytes = *uuid::Uuid::new_v4().as_bytes();
    tree.insert(ID_KEY, &bytes)?;
    tracing::info!(id = %ServerId(bytes), "generated new server id");
    Ok(ServerId(bytes))
}

fn decode_server_id(bytes: &[u8]) -> Result<ServerId> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| Error::Lifecycle("corrupt server id metadata entry".into()))?;
    Ok(ServerId(arr))
}

/// Registers a prefix's series arity. Fails with [`Error::AlreadyExists`]
/// if the prefix is already registered.
pub fn create_prefix_configuration(write: &WriteTx, prefix: &str, arity: u8) -> Result<()> {
    let tree = write.create_tree(METADATA_TREE)?;
    let key = prefix_key(prefix);
    if tree.get(key.as_bytes())?.is_some() {
        return Err(Error::AlreadyExists(prefix.to_string()));
    }
    tree.insert(key.as_bytes(), &[arity])?;
    Ok(())
}

/// Removes a prefix's registration. Fails with [`Error::NotFound`] if it
/// was never registered, or [`Error::HasData`] if raw data still exists
/// under it in the corresponding `series-<arity>` tree.
pub fn delete_prefix_configuration(
    read_for_data_check: &ReadTx,
    write: &WriteTx,
    prefix: &str,
) -> Result<()> {
    let tree = write.create_tree(METADATA_TREE)?;
    let key = prefix_key(prefix);
    let arity = match tree.get(key.as_bytes())? {
        Some(bytes) => bytes[0],
        None => return Err(Error::NotFound(prefix.to_string())),
    };

    if prefix_has_data(read_for_data_check, prefix, arity)? {
        return Err(Error::HasData(prefix.to_string()));
    }

    tree.remove(key.as_bytes())?;
    Ok(())
}

fn prefix_has_data(read: &ReadTx, prefix: &str, arity: u8) -> Result<bool> {
    let series_tree_name = format!("series-{arity}");
    let Some(series_tree) = read.tree(&series_tree_name)? else {
        return Ok(false);
    };
    Ok(!series_tree.child_suffixes(prefix.as_bytes())?.is_empty())
}

fn prefix_key(prefix: &str) -> String {
    format!("{PREFIX_KEY_PREFIX}{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn server_id_is_stable_across_reopens() {
        let storage = Storage::open_in_memory().unwrap();
        let write = storage.begin_write();
        let id1 = bootstrap_server_id(&write).unwrap();
        write.commit().unwrap();

        let write2 = storage.begin_write();
        let id2 = bootstrap_server_id(&write2).unwrap();
        write2.commit().unwrap();

        assert_eq!(id1, id2);
    }

    #[test]
    fn prefix_registration_rejects_duplicates() {
        let storage = Storage::open_in_memory().unwrap();
        let write = storage.begin_write();
        create_prefix_configuration(&write, "trades", 3).unwrap();
        let err = create_prefix_configuration(&write, "trades", 3).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        write.commit().unwrap();
    }

    #[test]
    fn deleting_unknown_prefix_is_not_found() {
        let storage = Storage::open_in_memory().unwrap();
        let write = storage.begin_write();
        let read = storage.begin_read();
        let err = delete_prefix_configuration(&read, &write, "ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
