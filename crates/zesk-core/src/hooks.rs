//! Named hook dispatch.
//!
//! A hook is a name with an ordered list of callbacks. Calling a hook runs
//! every callback synchronously and collects their results. Failures are
//! isolated (logged and skipped) unless the hook was declared fail-fast.

use crate::error::{Error, Result};
use crate::model::Member;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Called when an error should be reported to listeners.
pub const EXCEPTION: &str = "exception";
/// Called once the document is ready for output.
pub const DOCUMENT_READY: &str = "document::ready";
/// Called after the class registry changes at boot.
pub const SCHEMA_UPDATED: &str = "schema_updated";
/// Called once configuration is loaded, at boot.
pub const CONFIGURED: &str = "configured";
/// Called when the application state is reset.
pub const RESET: &str = "reset";
/// Called at shutdown.
pub const EXIT: &str = "exit";
/// Per-class, called by `store` after validation and before writing.
pub const STORE: &str = "store";
/// Per-class, called by `store` after the row is written.
pub const STORED: &str = "stored";

/// Name of the per-class hook `hook` for `class`, e.g. `contact::stored`.
pub fn class_hook(class: &str, hook: &str) -> String {
    Hooks::clean_name(&format!("{}::{}", class, hook))
}

/// Error returned by a hook callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Create a hook error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<Error> for HookError {
    fn from(e: Error) -> Self {
        Self::new(e.to_string())
    }
}

/// A hook callback.
pub type Callback = Arc<dyn Fn(&[Member]) -> std::result::Result<Member, HookError> + Send + Sync>;

/// Placement and identity of a callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOptions {
    /// Run before every other callback. The latest `first` registration runs first.
    pub first: bool,
    /// Run after every other callback, in registration order.
    pub last: bool,
    /// Callback id. Defaults to a generated `anonymous-N`.
    pub id: Option<String>,
    /// Reject a second registration with the same id.
    pub no_duplicates: bool,
}

impl HookOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run first.
    pub fn first(mut self) -> Self {
        self.first = true;
        self.last = false;
        self
    }

    /// Run last.
    pub fn last(mut self) -> Self {
        self.last = true;
        self.first = false;
        self
    }

    /// Set the callback id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Reject duplicate ids.
    pub fn no_duplicates(mut self) -> Self {
        self.no_duplicates = true;
        self
    }
}

/// Identifies one registered callback, for [`Hooks::remove`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookHandle {
    hook: String,
    seq: u64,
}

impl HookHandle {
    /// Normalized hook name.
    pub fn hook(&self) -> &str {
        &self.hook
    }
}

/// Call statistics for one hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookStats {
    /// Number of calls.
    pub count: u64,
    /// Time of the first call.
    pub first_call: DateTime<Utc>,
    /// Time of the most recent call.
    pub last_call: DateTime<Utc>,
}

struct Entry {
    seq: u64,
    id: String,
    callback: Callback,
}

#[derive(Default)]
struct HookGroup {
    first: Vec<Entry>,
    middle: Vec<Entry>,
    last: Vec<Entry>,
}

impl HookGroup {
    fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.first.iter().chain(&self.middle).chain(&self.last)
    }

    fn has_id(&self, id: &str) -> bool {
        self.iter().any(|e| e.id == id)
    }

    fn len(&self) -> usize {
        self.first.len() + self.middle.len() + self.last.len()
    }

    fn remove(&mut self, seq: u64) -> bool {
        for list in [&mut self.first, &mut self.middle, &mut self.last] {
            if let Some(pos) = list.iter().position(|e| e.seq == seq) {
                list.remove(pos);
                return true;
            }
        }
        false
    }
}

/// Hook registry and dispatcher.
#[derive(Default)]
pub struct Hooks {
    groups: HashMap<String, HookGroup>,
    fail_fast: HashSet<String>,
    next_seq: u64,
    stats: Mutex<HashMap<String, HookStats>>,
}

impl Hooks {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a hook name: trimmed and lowercased.
    pub fn clean_name(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Register a callback at the end of the hook's normal callbacks.
    pub fn add<F>(&mut self, name: &str, callback: F) -> HookHandle
    where
        F: Fn(&[Member]) -> std::result::Result<Member, HookError> + Send + Sync + 'static,
    {
        self.insert(name, HookOptions::default(), Arc::new(callback))
    }

    /// Register a callback with placement and id options.
    ///
    /// Fails with [`Error::DuplicateHook`] when `no_duplicates` is set and the
    /// id is already registered on this hook.
    pub fn add_with<F>(&mut self, name: &str, options: HookOptions, callback: F) -> Result<HookHandle>
    where
        F: Fn(&[Member]) -> std::result::Result<Member, HookError> + Send + Sync + 'static,
    {
        self.add_callback(name, options, Arc::new(callback))
    }

    /// Register an already shared callback.
    pub fn add_callback(&mut self, name: &str, options: HookOptions, callback: Callback) -> Result<HookHandle> {
        let hook = Self::clean_name(name);
        if options.no_duplicates {
            if let Some(id) = &options.id {
                if self.groups.get(&hook).is_some_and(|g| g.has_id(id)) {
                    return Err(Error::DuplicateHook {
                        hook,
                        id: id.clone(),
                    });
                }
            }
        }
        Ok(self.insert(&hook, options, callback))
    }

    fn insert(&mut self, name: &str, options: HookOptions, callback: Callback) -> HookHandle {
        let hook = Self::clean_name(name);
        self.next_seq += 1;
        let seq = self.next_seq;
        let id = options
            .id
            .unwrap_or_else(|| format!("anonymous-{}", seq));

        debug!(hook = %hook, id = %id, first = options.first, last = options.last, "adding hook");

        let entry = Entry { seq, id, callback };
        let group = self.groups.entry(hook.clone()).or_default();
        if options.first {
            group.first.insert(0, entry);
        } else if options.last {
            group.last.push(entry);
        } else {
            group.middle.push(entry);
        }
        HookHandle { hook, seq }
    }

    /// Remove one callback. Returns false if it was already gone.
    pub fn remove(&mut self, handle: &HookHandle) -> bool {
        let Some(group) = self.groups.get_mut(&handle.hook) else {
            return false;
        };
        let removed = group.remove(handle.seq);
        if group.len() == 0 {
            self.groups.remove(&handle.hook);
        }
        removed
    }

    /// Remove every callback of a hook.
    pub fn unhook(&mut self, name: &str) {
        self.groups.remove(&Self::clean_name(name));
    }

    /// Make the first callback failure of `name` abort the call.
    pub fn declare_fail_fast(&mut self, name: &str) {
        self.fail_fast.insert(Self::clean_name(name));
    }

    /// Is `name` fail-fast?
    pub fn is_fail_fast(&self, name: &str) -> bool {
        self.fail_fast.contains(&Self::clean_name(name))
    }

    /// Does the hook have any callbacks?
    pub fn has(&self, name: &str) -> bool {
        self.groups.contains_key(&Self::clean_name(name))
    }

    /// Hook names with callbacks, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of callbacks on a hook.
    pub fn len(&self, name: &str) -> usize {
        self.groups
            .get(&Self::clean_name(name))
            .map_or(0, HookGroup::len)
    }

    /// Callback ids of a hook, in call order.
    pub fn ids(&self, name: &str) -> Vec<String> {
        self.groups
            .get(&Self::clean_name(name))
            .map(|g| g.iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Drop every callback, fail-fast declaration and statistic.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.fail_fast.clear();
        self.stats.lock().clear();
    }

    /// Call statistics, if the hook was ever called.
    pub fn calls(&self, name: &str) -> Option<HookStats> {
        self.stats.lock().get(&Self::clean_name(name)).copied()
    }

    /// Invoke every callback of `name` in order, collecting results.
    ///
    /// A failing callback is logged and skipped, so the result holds one entry
    /// per successful callback. On a fail-fast hook the first failure returns
    /// [`Error::HookFailed`] and later callbacks do not run. Calling a hook
    /// without callbacks returns an empty list.
    pub fn call(&self, name: &str, args: &[Member]) -> Result<Vec<Member>> {
        let hook = Self::clean_name(name);
        self.record_call(&hook);

        let Some(group) = self.groups.get(&hook) else {
            return Ok(Vec::new());
        };
        let fail_fast = self.fail_fast.contains(&hook);

        let mut results = Vec::with_capacity(group.len());
        for entry in group.iter() {
            match (entry.callback)(args) {
                Ok(result) => results.push(result),
                Err(e) if fail_fast => {
                    error!(hook = %hook, id = %entry.id, error = %e, "hook failed, aborting");
                    return Err(Error::HookFailed {
                        hook,
                        id: entry.id.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(hook = %hook, id = %entry.id, error = %e, "hook failed, continuing");
                }
            }
        }
        Ok(results)
    }

    fn record_call(&self, hook: &str) {
        let now = Utc::now();
        let mut stats = self.stats.lock();
        stats
            .entry(hook.to_string())
            .and_modify(|s| {
                s.count += 1;
                s.last_call = now;
            })
            .or_insert(HookStats {
                count: 1,
                first_call: now,
                last_call: now,
            });
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .groups
            .iter()
            .map(|(name, group)| (name.as_str(), group.len()))
            .collect();
        f.debug_struct("Hooks")
            .field("hooks", &counts)
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: &'static str) -> impl Fn(&[Member]) -> std::result::Result<Member, HookError> {
        move |_| Ok(Member::from(value))
    }

    fn failing(_: &[Member]) -> std::result::Result<Member, HookError> {
        Err(HookError::new("boom"))
    }

    fn strings(results: Vec<Member>) -> Vec<String> {
        results.into_iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_call_order() {
        let mut hooks = Hooks::new();
        hooks.add("configured", constant("A"));
        hooks.add("configured", constant("B"));
        hooks.add("configured", constant("C"));

        let results = hooks.call("configured", &[]).unwrap();
        assert_eq!(strings(results), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_first_and_last() {
        let mut hooks = Hooks::new();
        hooks.add_with("h", HookOptions::new().last(), constant("Z")).unwrap();
        hooks.add("h", constant("M1"));
        hooks.add_with("h", HookOptions::new().first(), constant("A2")).unwrap();
        hooks.add("h", constant("M2"));
        hooks.add_with("h", HookOptions::new().first(), constant("A1")).unwrap();
        hooks.add_with("h", HookOptions::new().last(), constant("ZZ")).unwrap();

        assert_eq!(
            strings(hooks.call("h", &[]).unwrap()),
            vec!["A1", "A2", "M1", "M2", "Z", "ZZ"]
        );
    }

    #[test]
    fn test_names_are_normalized() {
        let mut hooks = Hooks::new();
        hooks.add("  Document::Ready ", constant("x"));
        assert!(hooks.has(DOCUMENT_READY));
        assert_eq!(hooks.len("DOCUMENT::READY"), 1);
        assert_eq!(hooks.names(), vec!["document::ready"]);
    }

    #[test]
    fn test_arguments_are_passed() {
        let mut hooks = Hooks::new();
        hooks.add("sum", |args: &[Member]| {
            Ok(Member::Int(args.iter().filter_map(Member::as_i64).sum()))
        });
        let results = hooks.call("sum", &[Member::Int(2), Member::Int(3)]).unwrap();
        assert_eq!(results, vec![Member::Int(5)]);
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut hooks = Hooks::new();
        hooks.add("h", constant("A"));
        hooks.add("h", failing);
        hooks.add("h", constant("C"));
        assert_eq!(strings(hooks.call("h", &[]).unwrap()), vec!["A", "C"]);
    }

    #[test]
    fn test_fail_fast() {
        let mut hooks = Hooks::new();
        hooks.add("h", constant("A"));
        hooks
            .add_with("h", HookOptions::new().with_id("breaker"), failing)
            .unwrap();
        hooks.add("h", constant("C"));
        hooks.declare_fail_fast("H");

        let err = hooks.call("h", &[]).unwrap_err();
        assert!(matches!(err, Error::HookFailed { ref id, .. } if id == "breaker"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_no_duplicates() {
        let mut hooks = Hooks::new();
        let options = HookOptions::new().with_id("once").no_duplicates();
        hooks.add_with("h", options.clone(), constant("A")).unwrap();
        assert!(matches!(
            hooks.add_with("h", options, constant("B")),
            Err(Error::DuplicateHook { .. })
        ));
        // Without the flag the same id may repeat.
        hooks
            .add_with("h", HookOptions::new().with_id("once"), constant("C"))
            .unwrap();
        assert_eq!(hooks.ids("h"), vec!["once", "once"]);
    }

    #[test]
    fn test_remove_and_unhook() {
        let mut hooks = Hooks::new();
        let a = hooks.add("h", constant("A"));
        hooks.add("h", constant("B"));

        assert!(hooks.remove(&a));
        assert!(!hooks.remove(&a));
        assert_eq!(strings(hooks.call("h", &[]).unwrap()), vec!["B"]);

        hooks.unhook("h");
        assert!(!hooks.has("h"));
        assert!(hooks.call("h", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_call_stats() {
        let mut hooks = Hooks::new();
        assert!(hooks.calls(EXIT).is_none());
        hooks.call(EXIT, &[]).unwrap();
        hooks.call(EXIT, &[]).unwrap();
        let stats = hooks.calls(EXIT).unwrap();
        assert_eq!(stats.count, 2);
        assert!(stats.first_call <= stats.last_call);

        hooks.clear();
        assert!(hooks.calls(EXIT).is_none());
    }
}
