//! Sandbox nodes: class spaces arranged in a tree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classfile::{self, descriptor, ClassFormatError, ClassWriter};
use crate::rewrite::{ClassRewriter, RewriteContext};
use crate::rules::Policy;
use crate::telemetry::{
    log_security_event, record_cache_hit, record_class_rewritten, record_load_failure,
    SecurityEvent,
};

use super::cache::ClassCache;
use super::config::SandboxConfig;
use super::loaded::LoadedClass;
use super::resolver::ClassResolver;
use super::{HierarchyError, LoadError};

/// Lookup counters for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    /// Served from this node's own cache.
    pub cache_hits: u64,
    /// Served read-only from an ancestor's cache.
    pub ancestor_hits: u64,
    /// Classes rewritten and defined by this node.
    pub rewrites: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    ancestor_hits: AtomicU64,
    rewrites: AtomicU64,
    failures: AtomicU64,
}

#[derive(Default)]
struct Lifecycle {
    destroyed: bool,
    live_children: usize,
}

struct NodeInner {
    id: Uuid,
    depth: usize,
    parent: Option<Arc<NodeInner>>,
    config: SandboxConfig,
    resolver: Arc<dyn ClassResolver>,
    cache: ClassCache,
    lifecycle: Mutex<Lifecycle>,
    counters: Counters,
}

impl NodeInner {
    fn is_destroyed(&self) -> bool {
        self.lifecycle.lock().destroyed
    }

    fn root(self: &Arc<Self>) -> Arc<NodeInner> {
        let mut node = self.clone();
        while let Some(parent) = node.parent.clone() {
            node = parent;
        }
        node
    }

    fn rewrite_context(&self) -> RewriteContext<'_> {
        RewriteContext {
            namespace_prefix: &self.config.namespace_prefix,
            rules: &self.config.rules,
            fixups: &self.config.fixups,
        }
    }

    /// Classes rewritten by `other` are valid here when both nodes rewrite
    /// with the same prefix, catalog and fixups.
    fn shares_rewrite_rules(&self, other: &NodeInner) -> bool {
        let a = &self.config;
        let b = &other.config;
        a.namespace_prefix == b.namespace_prefix
            && (Arc::ptr_eq(&a.rules, &b.rules) || a.rules == b.rules)
            && (Arc::ptr_eq(&a.fixups, &b.fixups) || a.fixups == b.fixups)
    }

    fn define(&self, original: &str) -> Result<Arc<LoadedClass>, LoadError> {
        let bytes = self
            .resolver
            .resolve(original)
            .map_err(|e| LoadError::from_resolve(original, e))?;
        let parsed = classfile::parse(&bytes).map_err(|source| LoadError::Malformed {
            class: original.to_string(),
            source,
        })?;
        if parsed.name != original {
            return Err(LoadError::Malformed {
                class: original.to_string(),
                source: ClassFormatError::Invalid(format!(
                    "resolved bytes define {} instead",
                    parsed.name
                )),
            });
        }

        let outcome = ClassRewriter::new(self.rewrite_context()).rewrite(parsed)?;
        let rewritten = ClassWriter::write(&outcome.descriptor).map_err(|e| LoadError::Rewrite {
            class: original.to_string(),
            reason: e.to_string(),
        })?;

        self.counters.rewrites.fetch_add(1, Ordering::Relaxed);
        record_class_rewritten(outcome.modified);
        debug!(node = %self.id, class = %original, runtime_name = %outcome.descriptor.name, "Class defined");

        Ok(Arc::new(LoadedClass::new(
            outcome.descriptor,
            original.to_string(),
            self.id,
            &rewritten,
            outcome.modified,
            outcome.stats,
        )))
    }

    /// Cache lookup that ignores ancestors. Defines on miss.
    fn load_local(&self, original: &str) -> Result<Arc<LoadedClass>, LoadError> {
        let (loaded, defined) = self.cache.get_or_try_load(original, || self.define(original))?;
        if !defined {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            record_cache_hit("local");
        }
        Ok(loaded)
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().destroyed {
            return;
        }
        if let Some(parent) = &self.parent {
            let mut state = parent.lifecycle.lock();
            state.live_children = state.live_children.saturating_sub(1);
        }
    }
}

/// Handle to one class space. Cloning the handle shares the node.
#[derive(Clone)]
pub struct SandboxNode {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for SandboxNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxNode")
            .field("id", &self.inner.id)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

impl SandboxNode {
    /// Create the root of a new hierarchy.
    pub fn create_root(
        config: SandboxConfig,
        resolver: Arc<dyn ClassResolver>,
    ) -> Result<Self, HierarchyError> {
        config.validate()?;
        let inner = NodeInner {
            id: Uuid::new_v4(),
            depth: 0,
            parent: None,
            config,
            resolver,
            cache: ClassCache::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
            counters: Counters::default(),
        };
        info!(node = %inner.id, prefix = %inner.config.namespace_prefix, "Sandbox root created");
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Create a child that inherits this node's configuration.
    pub fn create_child(&self) -> Result<Self, HierarchyError> {
        self.create_child_with(|config| config)
    }

    /// Create a child whose configuration starts as a copy of this node's.
    pub fn create_child_with<F>(&self, configure: F) -> Result<Self, HierarchyError>
    where
        F: FnOnce(SandboxConfig) -> SandboxConfig,
    {
        self.ensure_alive()?;
        let config = configure(self.inner.config.clone());
        config.validate()?;

        {
            let mut state = self.inner.lifecycle.lock();
            if state.destroyed {
                return Err(HierarchyError::NodeDestroyed);
            }
            state.live_children += 1;
        }

        let inner = NodeInner {
            id: Uuid::new_v4(),
            depth: self.inner.depth + 1,
            parent: Some(self.inner.clone()),
            config,
            resolver: self.inner.resolver.clone(),
            cache: ClassCache::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
            counters: Counters::default(),
        };
        debug!(node = %inner.id, parent = %self.inner.id, depth = inner.depth, "Sandbox child created");
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Distance from the root.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    pub fn parent(&self) -> Option<SandboxNode> {
        self.inner.parent.clone().map(|inner| SandboxNode { inner })
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Fails if this node or any ancestor was destroyed.
    pub fn ensure_alive(&self) -> Result<(), HierarchyError> {
        let mut node = Some(&self.inner);
        while let Some(current) = node {
            if current.is_destroyed() {
                return Err(HierarchyError::NodeDestroyed);
            }
            node = current.parent.as_ref();
        }
        Ok(())
    }

    /// Name a class has inside this node.
    pub fn runtime_name(&self, name: &str) -> String {
        let name = name.replace('.', "/");
        let ctx = self.inner.rewrite_context();
        let original = ctx.original_name(&name);
        if ctx.classify(original).is_sandboxed() {
            format!("{}{}", ctx.namespace_prefix, original)
        } else {
            original.to_string()
        }
    }

    /// Policy this node applies to `name` (dotted, internal or prefixed).
    pub fn classify(&self, name: &str) -> Policy {
        self.inner.rewrite_context().classify(&name.replace('.', "/"))
    }

    /// Whether `name` is already defined in this node or an ancestor.
    /// Never triggers a load.
    pub fn is_loaded(&self, name: &str) -> bool {
        let name = name.replace('.', "/");
        let original = self.inner.rewrite_context().original_name(&name).to_string();
        let mut node = Some(&self.inner);
        while let Some(current) = node {
            if current.cache.get(&original).is_some() {
                return true;
            }
            node = current.parent.as_ref();
        }
        false
    }

    /// Load a class by original or sandboxed name.
    ///
    /// Lookup order: this node's cache, then ancestors that rewrite with the
    /// same rules, then resolve and rewrite here. PIN classes always live at
    /// the root. Failures are never cached.
    pub fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>, LoadError> {
        self.ensure_alive()?;
        let name = name.replace('.', "/");
        let ctx = self.inner.rewrite_context();
        let original = ctx.original_name(&name).to_string();

        let result = match ctx.classify(&original) {
            Policy::Forbid => Err(LoadError::RuleViolation {
                class: original.clone(),
                reason: format!("Disallowed reference to {}", descriptor::display_name(&original)),
            }),
            Policy::Pin => self.inner.root().load_local(&original),
            _ => self.load_cascading(&original),
        };

        if let Err(err) = &result {
            self.inner.counters.failures.fetch_add(1, Ordering::Relaxed);
            record_load_failure(err.kind());
            if let LoadError::RuleViolation { class, reason } = err {
                log_security_event(
                    SecurityEvent::ForbiddenReference,
                    reason,
                    &[("class", class.as_str())],
                );
            }
        }
        result
    }

    fn load_cascading(&self, original: &str) -> Result<Arc<LoadedClass>, LoadError> {
        if let Some(hit) = self.inner.cache.get(original) {
            self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            record_cache_hit("local");
            return Ok(hit);
        }

        let mut ancestor = self.inner.parent.as_ref();
        while let Some(node) = ancestor {
            if self.inner.shares_rewrite_rules(node) {
                if let Some(hit) = node.cache.get(original) {
                    self.inner.counters.ancestor_hits.fetch_add(1, Ordering::Relaxed);
                    record_cache_hit("ancestor");
                    return Ok(hit);
                }
            }
            ancestor = node.parent.as_ref();
        }

        self.inner.load_local(original)
    }

    /// Names of classes defined by this node, sorted.
    pub fn cached_classes(&self) -> Vec<String> {
        self.inner.cache.names()
    }

    pub fn cached_count(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn stats(&self) -> NodeStats {
        let c = &self.inner.counters;
        NodeStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            ancestor_hits: c.ancestor_hits.load(Ordering::Relaxed),
            rewrites: c.rewrites.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }

    /// Tear the node down. Children must be destroyed (or dropped) first.
    pub fn destroy(&self) -> Result<(), HierarchyError> {
        {
            let mut state = self.inner.lifecycle.lock();
            if state.destroyed {
                return Err(HierarchyError::NodeDestroyed);
            }
            if state.live_children > 0 {
                return Err(HierarchyError::NodeHasChildren { count: state.live_children });
            }
            state.destroyed = true;
        }
        self.inner.cache.clear();
        if let Some(parent) = &self.inner.parent {
            let mut state = parent.lifecycle.lock();
            state.live_children = state.live_children.saturating_sub(1);
        }
        log_security_event(
            SecurityEvent::NodeDestroyed,
            "Sandbox node destroyed",
            &[("node", self.inner.id.to_string().as_str())],
        );
        Ok(())
    }
}
