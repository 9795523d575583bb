use alloy::primitives::B256;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::Name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionLevel {
    pub actor: Name,
    pub permission: Name,
}

/// A single contract action with its already serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub account: Name,
    pub name: Name,
    pub authorization: Vec<PermissionLevel>,
    pub data: Vec<u8>,
}

impl Action {
    /// Builds an action whose payload is a plain sequence of names, which
    /// is the binary layout of a struct made only of `name` fields.
    pub fn with_name_args(
        account: Name,
        name: Name,
        authorization: Vec<PermissionLevel>,
        args: &[Name],
    ) -> Self {
        let data = args.iter().flat_map(|arg| arg.to_le_bytes()).collect();
        Self {
            account,
            name,
            authorization,
            data,
        }
    }
}

/// Transaction header and actions. Resource limits, delay, context free
/// actions and extensions are always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub expiration: u32,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub actions: Vec<Action>,
}

pub(crate) fn write_varuint32(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

impl Transaction {
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.actions.len() * 64);
        buf.extend_from_slice(&self.expiration.to_le_bytes());
        buf.extend_from_slice(&self.ref_block_num.to_le_bytes());
        buf.extend_from_slice(&self.ref_block_prefix.to_le_bytes());
        write_varuint32(&mut buf, 0); // max_net_usage_words
        buf.push(0); // max_cpu_usage_ms
        write_varuint32(&mut buf, 0); // delay_sec
        write_varuint32(&mut buf, 0); // context_free_actions

        write_varuint32(&mut buf, self.actions.len() as u32);
        for action in &self.actions {
            buf.extend_from_slice(&action.account.to_le_bytes());
            buf.extend_from_slice(&action.name.to_le_bytes());
            write_varuint32(&mut buf, action.authorization.len() as u32);
            for level in &action.authorization {
                buf.extend_from_slice(&level.actor.to_le_bytes());
                buf.extend_from_slice(&level.permission.to_le_bytes());
            }
            write_varuint32(&mut buf, action.data.len() as u32);
            buf.extend_from_slice(&action.data);
        }

        write_varuint32(&mut buf, 0); // transaction_extensions
        buf
    }

    pub fn id(&self) -> B256 {
        B256::from_slice(&Sha256::digest(self.pack()))
    }

    /// Digest signed by authorizers: chain id, packed transaction and the
    /// hash of the (empty) context free data.
    pub fn signing_digest(&self, chain_id: &B256) -> B256 {
        let mut hasher = Sha256::new();
        hasher.update(chain_id.as_slice());
        hasher.update(self.pack());
        hasher.update([0u8; 32]);
        B256::from_slice(&hasher.finalize())
    }
}
