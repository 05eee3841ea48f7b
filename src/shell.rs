//! PALIMPSEST - Command Shell
//! A line-oriented command interpreter over a shared `Store`.
//! Several shells can share one store to act out concurrent users.
//!
//! ```text
//! begin [name]                  start a transaction (becomes current)
//! insert <txn> <key> <value..>  first version of a key
//! update <txn> <key> <value..>  new version of a key (may block)
//! delete <txn> <key>            delete a key's head in place
//! commit [txn] / abort [txn]    finish a transaction (default: current)
//! query [txn|ts] [text..]       visible values; with text, the closest top-k
//! export [txn|ts]               visible versions as JSON
//! history <key>                 every version of a key, newest first
//! info                          store metrics
//! ```
//!
//! A failed insert or update aborts the transaction it ran in.
//! Values are embedded with `embed_text` so they can be found by `query`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::concurrent::Store;
use crate::engine::vector::embed_text;
use crate::error::{MvccError, Result};
use crate::types::{Payload, TxnId, VersionView, TS_INFINITY};

/// Number of results a text query returns unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 2;

/// Interpreter state for one user.
pub struct Shell {
    store: Arc<Store>,
    user: String,
    /// Transaction names given at `begin` → issued IDs.
    txns: HashMap<String, TxnId>,
    current: Option<(String, TxnId)>,
    top_k: usize,
}

impl Shell {
    pub fn new(store: Arc<Store>, user: impl Into<String>) -> Self {
        Self {
            store,
            user: user.into(),
            txns: HashMap::new(),
            current: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Number of results returned by a text query.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Execute one command line and return its printable output.
    pub fn process_line(&mut self, line: &str) -> Result<String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&cmd, args)) = parts.split_first() else {
            return Ok(String::new());
        };

        match cmd.to_lowercase().as_str() {
            "begin" => {
                let name = args.first().copied().unwrap_or("default").to_string();
                let id = self.store.begin();
                self.txns.insert(name.clone(), id);
                self.current = Some((name.clone(), id));
                Ok(format!("began {} T{}", name, id))
            }
            "insert" | "update" => {
                if args.len() < 3 {
                    return Err(usage(&format!("{} <txn> <key> <value>", cmd)));
                }
                let txn = self.resolve(args[0])?;
                let key = args[1].as_bytes().to_vec();
                let value = args[2..].join(" ");
                let payload = Payload::new(value.clone())
                    .with_meta("user", self.user.clone())
                    .with_vector(embed_text(&value));
                let written = if cmd.eq_ignore_ascii_case("insert") {
                    self.store.insert(txn, key, payload)
                } else {
                    self.store.update(txn, key, payload)
                };
                if let Err(e) = written {
                    log::warn!("write conflict in T{}, aborting transaction: {}", txn, e);
                    if let Err(abort_err) = self.store.abort(txn) {
                        log::warn!("abort of T{} failed: {}", txn, abort_err);
                    }
                    return Err(e);
                }
                Ok("ok".to_string())
            }
            "delete" | "del" => {
                if args.len() < 2 {
                    return Err(usage("delete <txn> <key>"));
                }
                let txn = self.resolve(args[0])?;
                self.store.delete(txn, args[1].as_bytes())?;
                Ok("ok".to_string())
            }
            "commit" => {
                let (name, id) = self.target(args.first().copied())?;
                self.store.commit(id)?;
                Ok(format!("committed {} T{}", name, id))
            }
            "abort" | "rollback" => {
                let (name, id) = self.target(args.first().copied())?;
                self.store.abort(id)?;
                Ok(format!("aborted {} T{}", name, id))
            }
            "query" | "read" => {
                let (_, as_of) = self.target(args.first().copied())?;
                let text = args.get(1..).unwrap_or_default().join(" ");
                if text.is_empty() {
                    return Ok(render_values(&self.store.read(as_of)));
                }
                let views: Vec<VersionView> = self
                    .store
                    .read_top_k(as_of, &embed_text(&text), self.top_k)
                    .into_iter()
                    .map(|m| m.view)
                    .collect();
                Ok(render_values(&views))
            }
            "export" => {
                let (_, as_of) = self.target(args.first().copied())?;
                serde_json::to_string(&self.store.read(as_of))
                    .map_err(|e| MvccError::Serialization(e.to_string()))
            }
            "history" => {
                let key = args.first().ok_or_else(|| usage("history <key>"))?;
                let history = self.store.history(key.as_bytes());
                if history.is_empty() {
                    return Ok("(none)".to_string());
                }
                let lines: Vec<String> = history
                    .iter()
                    .map(|v| {
                        let end = if v.end_ts == TS_INFINITY {
                            "inf".to_string()
                        } else {
                            v.end_ts.to_string()
                        };
                        format!(
                            "T{} [{}, {}) {:?}{}",
                            v.created_by,
                            v.begin_ts,
                            end,
                            String::from_utf8_lossy(&v.payload.value),
                            if v.deleted { " deleted" } else { "" }
                        )
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            "info" | "stats" => Ok(format!(
                "keys: {}\nlast txn: T{}{}",
                self.store.len(),
                self.store.last_txn_id(),
                self.store.metrics().report()
            )),
            _ => Err(MvccError::Command(format!("Unknown command: '{}'", cmd))),
        }
    }

    /// Transaction name or raw numeric ID → ID.
    fn resolve(&self, arg: &str) -> Result<TxnId> {
        if let Some(&id) = self.txns.get(arg) {
            return Ok(id);
        }
        arg.strip_prefix(['T', 't'])
            .unwrap_or(arg)
            .parse()
            .map_err(|_| MvccError::Command(format!("unknown transaction '{}'", arg)))
    }

    /// Explicit transaction argument, or the current one.
    fn target(&self, arg: Option<&str>) -> Result<(String, TxnId)> {
        match arg {
            Some(arg) => Ok((arg.to_string(), self.resolve(arg)?)),
            None => self
                .current
                .clone()
                .ok_or_else(|| MvccError::Command("no current transaction".to_string())),
        }
    }
}

/// `{key: "value", ...}` in the given order.
fn render_values(views: &[VersionView]) -> String {
    let entries: Vec<String> = views
        .iter()
        .map(|v| {
            format!(
                "{}: {:?}",
                String::from_utf8_lossy(&v.key),
                String::from_utf8_lossy(&v.payload.value)
            )
        })
        .collect();
    format!("{{{}}}", entries.join(", "))
}

fn usage(text: &str) -> MvccError {
    MvccError::Command(format!("Usage: {}", text))
}

/// Run a multi-line script against `store`, one output line per command.
/// Errors are rendered inline as `ERROR: ...`.
pub fn run_script(store: Arc<Store>, script: &str, user: &str) -> Vec<String> {
    let mut shell = Shell::new(store, user);
    script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match shell.process_line(line) {
            Ok(out) => out,
            Err(e) => format!("ERROR: {}", e),
        })
        .collect()
}
