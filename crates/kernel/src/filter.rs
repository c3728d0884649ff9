//! Hierarchical line filtering.
//!
//! One long-running stream (a `mosquitto_sub` process, a telnet socket) is
//! shared by many devices. Each device declares a narrow pattern as a leaf
//! of a [`FilterNode`] tree; the stream owner pushes every line into the
//! root and the tree cascades it down:
//!
//! ```text
//! root (every line)
//! ├── "devices/5/state.*speed:(\d)"   → callback("…", "3")
//! └── "devices/7/state"               → callback("…", "…whole line…")
//!     └── "power:(\d)"                → callback("…", "1")
//! ```
//!
//! A node only looks at lines its parent accepted; it never scans the
//! stream on its own.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use regex::Regex;

use crate::error::{BoxError, KernelError};

type CallbackFn = dyn Fn(&str, &str) -> Result<(), BoxError> + Send + Sync;

/// A line callback, invoked with `(line, captured)`.
///
/// Handles are compared by identity, so registering a clone of the same
/// callback twice on a node is a no-op.
#[derive(Clone)]
pub struct LineCallback(Arc<CallbackFn>);

impl LineCallback {
    /// Wrap a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, &str) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LineCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LineCallback(..)")
    }
}

#[derive(Clone)]
enum Subscriber {
    Callback(LineCallback),
    Child(FilterNode),
}

struct Node {
    pattern: Option<Regex>,
    parent: Option<Weak<Node>>,
    subscribers: RwLock<Vec<Subscriber>>,
}

/// A node of the filter tree. Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct FilterNode {
    node: Arc<Node>,
}

impl Default for FilterNode {
    fn default() -> Self {
        Self::root()
    }
}

impl FilterNode {
    /// A root node: no pattern, every line passes with `captured = line`.
    #[must_use]
    pub fn root() -> Self {
        Self {
            node: Arc::new(Node {
                pattern: None,
                parent: None,
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Create a child that sees the lines this node accepts and keeps those
    /// matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Pattern`] if `pattern` is not a valid regex.
    pub fn filter(&self, pattern: &str) -> Result<FilterNode, KernelError> {
        let regex = Regex::new(pattern).map_err(|source| KernelError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let child = FilterNode {
            node: Arc::new(Node {
                pattern: Some(regex),
                parent: Some(Arc::downgrade(&self.node)),
                subscribers: RwLock::new(Vec::new()),
            }),
        };
        self.subscribers_mut().push(Subscriber::Child(child.clone()));
        Ok(child)
    }

    /// Add a callback; registering the same handle twice is a no-op.
    pub fn register(&self, callback: &LineCallback) -> &Self {
        let mut subscribers = self.subscribers_mut();
        let known = subscribers
            .iter()
            .any(|s| matches!(s, Subscriber::Callback(existing) if existing.same(callback)));
        if !known {
            subscribers.push(Subscriber::Callback(callback.clone()));
        }
        drop(subscribers);
        self
    }

    /// Shorthand for registering a fresh closure.
    pub fn on_match<F>(&self, callback: F) -> &Self
    where
        F: Fn(&str, &str) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(&LineCallback::new(callback))
    }

    /// Source text of this node's pattern, `None` for a root.
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        self.node.pattern.as_ref().map(Regex::as_str)
    }

    /// The node this one was created from, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<FilterNode> {
        self.node
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|node| FilterNode { node })
    }

    /// Offer `line` to this node.
    ///
    /// Returns whether any callback in this subtree handled it. Callback
    /// failures and panics are logged and do not stop the remaining
    /// callbacks.
    pub fn dispatch(&self, line: &str) -> bool {
        let captured = match &self.node.pattern {
            None => line,
            Some(regex) => {
                let Some(found) = regex.captures(line) else {
                    return false;
                };
                if regex.captures_len() > 1 {
                    found.get(1).map_or("", |m| m.as_str())
                } else {
                    line
                }
            }
        };

        let subscribers: Vec<Subscriber> = self
            .node
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut handled = false;
        for subscriber in &subscribers {
            match subscriber {
                Subscriber::Callback(callback) => {
                    handled |= self.invoke(callback, line, captured);
                }
                Subscriber::Child(child) => handled |= child.dispatch(line),
            }
        }
        if handled {
            tracing::trace!(pattern = ?self.pattern(), line, "line handled");
        }
        handled
    }

    fn invoke(&self, callback: &LineCallback, line: &str, captured: &str) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (callback.0)(line, captured))) {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::error!(pattern = ?self.pattern(), line, %err, "line callback failed");
                false
            }
            Err(_) => {
                tracing::error!(pattern = ?self.pattern(), line, "line callback panicked");
                false
            }
        }
    }

    fn subscribers_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Subscriber>> {
        self.node
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterNode")
            .field("pattern", &self.pattern())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(String, String)>>>;

    fn collect(node: &FilterNode) -> Seen {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        node.on_match(move |line, captured| {
            sink.lock()
                .unwrap()
                .push((line.to_string(), captured.to_string()));
            Ok(())
        });
        seen
    }

    #[test]
    fn should_pass_every_line_through_root() {
        let root = FilterNode::root();
        let seen = collect(&root);
        assert!(root.dispatch("anything"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("anything".to_string(), "anything".to_string())]
        );
    }

    #[test]
    fn should_deliver_first_capture_to_matching_child_only() {
        let root = FilterNode::root();
        let fan5 = collect(&root.filter(r"devices/5/state.*speed:(\d)").unwrap());
        let fan7 = collect(&root.filter(r"devices/7/state.*speed:(\d)").unwrap());

        assert!(root.dispatch("devices/5/state power:1 speed:3"));

        assert_eq!(
            *fan5.lock().unwrap(),
            vec![(
                "devices/5/state power:1 speed:3".to_string(),
                "3".to_string()
            )]
        );
        assert!(fan7.lock().unwrap().is_empty());
    }

    #[test]
    fn should_pass_whole_line_without_capture_group() {
        let root = FilterNode::root();
        let seen = collect(&root.filter("~OUTPUT").unwrap());
        root.dispatch("~OUTPUT,12,1,50.00");
        assert_eq!(seen.lock().unwrap()[0].1, "~OUTPUT,12,1,50.00");
    }

    #[test]
    fn should_search_rather_than_anchor() {
        let root = FilterNode::root();
        let seen = collect(&root.filter("speed:(\\d)").unwrap());
        root.dispatch("prefix speed:4 suffix");
        assert_eq!(seen.lock().unwrap()[0].1, "4");
    }

    #[test]
    fn should_capture_empty_text_for_unmatched_optional_group() {
        let root = FilterNode::root();
        let seen = collect(&root.filter(r#""power":(?:0|1.*"speed":(\d))"#).unwrap());
        root.dispatch(r#"{"power":0}"#);
        assert_eq!(seen.lock().unwrap()[0].1, "");
    }

    #[test]
    fn should_cascade_through_nested_filters() {
        let root = FilterNode::root();
        let device = root.filter("^devices/7/").unwrap();
        let power = collect(&device.filter(r"power:(\d)").unwrap());

        root.dispatch("devices/8/state power:1");
        root.dispatch("devices/7/state power:0");

        assert_eq!(*power.lock().unwrap(), vec![(
            "devices/7/state power:0".to_string(),
            "0".to_string()
        )]);
        assert_eq!(
            device.filter("x").unwrap().parent().unwrap().pattern(),
            Some("^devices/7/")
        );
        assert!(root.parent().is_none());
    }

    #[test]
    fn should_ignore_duplicate_registration() {
        let root = FilterNode::root();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let callback = LineCallback::new(move |_, _| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });
        root.register(&callback).register(&callback.clone());
        root.dispatch("line");
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn should_isolate_failing_and_panicking_callbacks() {
        let root = FilterNode::root();
        root.on_match(|_, _| Err("bad payload".into()));
        root.on_match(|_, _| panic!("adapter bug"));
        let seen = collect(&root);

        assert!(root.dispatch("line 1"));
        assert!(root.dispatch("line 2"));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn should_report_unhandled_lines() {
        let root = FilterNode::root();
        let _unused = collect(&root.filter("never").unwrap());
        assert!(!root.dispatch("something else"));
    }

    #[test]
    fn should_reject_malformed_pattern() {
        let root = FilterNode::root();
        assert!(matches!(
            root.filter("speed:(\\d"),
            Err(KernelError::Pattern { .. })
        ));
    }
}
