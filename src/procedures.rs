//! Procedure store: a process-wide mapping from opaque tokens to stored
//! ASTs.
//!
//! Tokens embed no executable bytes and are not forgeable: they are
//! minted from a cryptographically strong RNG and carry a fixed,
//! recognizable prefix so `vm::run` can tell a token argument apart from
//! an inline AST.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use tokio::sync::RwLock;

use crate::ast::Atom;
use crate::value::ProcToken;

pub const TOKEN_PREFIX: &str = "proc_";
pub const DEFAULT_TTL_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_MAX_SIZE_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct ProcedureEntry {
    pub ast: Arc<Atom>,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub size: usize,
    pub owner_hint: Option<String>,
}

impl ProcedureEntry {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Mutually-safe under concurrent VM runs: guarded by a
/// single `RwLock` shared by every `RuntimeContext` that points at the
/// same embedder-owned store.
#[derive(Clone, Default)]
pub struct ProcedureStore {
    inner: Arc<RwLock<HashMap<String, ProcedureEntry>>>,
}

#[derive(Debug)]
pub enum StoreError {
    TooLarge { size: usize, max: usize },
    NotSeqRooted,
}

impl StoreError {
    pub fn message(&self) -> String {
        match self {
            StoreError::TooLarge { size, max } => {
                format!("procedure AST too large: {size} bytes exceeds cap of {max} bytes")
            }
            StoreError::NotSeqRooted => "stored procedure must be rooted at `seq`".to_string(),
        }
    }
}

impl ProcedureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes the AST into its canonical text form purely to estimate
    /// its stored size; the canonical text is not kept.
    fn estimate_size(ast: &Atom) -> usize {
        serde_json::to_vec(ast).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    pub async fn store(
        &self,
        ast: Atom,
        ttl_ms: Option<u64>,
        max_size: Option<usize>,
        owner_hint: Option<String>,
    ) -> Result<ProcToken, StoreError> {
        if !ast.is_seq() {
            return Err(StoreError::NotSeqRooted);
        }
        let size = Self::estimate_size(&ast);
        let cap = max_size.unwrap_or(DEFAULT_MAX_SIZE_BYTES);
        if size > cap {
            return Err(StoreError::TooLarge { size, max: cap });
        }
        let mut token_bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut token_bytes);
        let token = format!("{TOKEN_PREFIX}{}", hex_encode(&token_bytes));
        let created_at_ms = now_ms();
        let expires_at_ms = created_at_ms + ttl_ms.unwrap_or(DEFAULT_TTL_MS);
        let entry = ProcedureEntry {
            ast: Arc::new(ast),
            created_at_ms,
            expires_at_ms,
            size,
            owner_hint,
        };
        self.inner.write().await.insert(token.clone(), entry);
        Ok(ProcToken(token))
    }

    pub async fn lookup(&self, token: &str) -> Option<ProcedureEntry> {
        let guard = self.inner.read().await;
        let entry = guard.get(token)?;
        if entry.is_expired(now_ms()) {
            return None;
        }
        Some(entry.clone())
    }

    pub async fn release(&self, token: &str) -> bool {
        self.inner.write().await.remove(token).is_some()
    }

    pub async fn clear_expired(&self) -> usize {
        let now = now_ms();
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(now));
        before - guard.len()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
