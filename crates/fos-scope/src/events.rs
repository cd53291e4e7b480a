//! Scope Events
//!
//! Named events sent up the scope hierarchy with `emit` or down it with
//! `broadcast`.

use crate::watch::Deregistration;
use crate::Scope;
use fos_value::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type EventCallback = Box<dyn Fn(&ScopeEvent, &[Value]) -> anyhow::Result<()>>;

pub(crate) struct EventListener {
    callback: EventCallback,
    pub removed: Cell<bool>,
}

/// Event delivered to scope listeners
#[derive(Debug)]
pub struct ScopeEvent {
    name: String,
    target: Scope,
    current: RefCell<Option<Scope>>,
    propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

impl ScopeEvent {
    fn new(name: &str, target: Scope) -> Self {
        Self {
            name: name.to_string(),
            target,
            current: RefCell::new(None),
            propagation_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Scope the event was sent from
    pub fn target_scope(&self) -> &Scope { &self.target }

    /// Scope whose listeners are running; None once dispatch is over
    pub fn current_scope(&self) -> Option<Scope> {
        self.current.borrow().clone()
    }

    /// Stop an emitted event from reaching further ancestors
    ///
    /// Listeners on the current scope still run. Broadcasts ignore this.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    fn set_current(&self, scope: Option<Scope>) {
        *self.current.borrow_mut() = scope;
    }
}

impl Scope {
    /// Listen for `name` events reaching this scope
    pub fn on<F>(&self, name: &str, listener: F) -> Deregistration
    where
        F: Fn(&ScopeEvent, &[Value]) -> anyhow::Result<()> + 'static,
    {
        let record = {
            let mut ctx = self.tree.borrow_mut();
            match ctx.record_mut(self.id) {
                Some(scope) if !scope.destroyed => {
                    let record = Rc::new(EventListener {
                        callback: Box::new(listener),
                        removed: Cell::new(false),
                    });
                    scope.listeners.entry(name.to_string()).or_default().push(record.clone());
                    Some(record)
                }
                _ => None,
            }
        };
        let Some(record) = record else {
            tracing::warn!("Ignoring '{}' listener on destroyed scope {:?}", name, self.id);
            return Deregistration::inert();
        };

        let tree = Rc::downgrade(&self.tree);
        let scope_id = self.id;
        let name = name.to_string();
        let listener = Rc::downgrade(&record);
        Deregistration::new(move || {
            let Some(listener) = listener.upgrade() else { return };
            listener.removed.set(true);
            if let Some(tree) = tree.upgrade() {
                let mut ctx = tree.borrow_mut();
                let listeners = ctx.record_mut(scope_id).and_then(|scope| scope.listeners.get_mut(&name));
                if let Some(listeners) = listeners {
                    listeners.retain(|l| !Rc::ptr_eq(l, &listener));
                }
            }
        })
    }

    /// Send an event to this scope, then to each ancestor in turn
    pub fn emit(&self, name: &str, args: &[Value]) -> ScopeEvent {
        let event = ScopeEvent::new(name, self.clone());
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            event.set_current(Some(scope.clone()));
            scope.notify(&event, args);
            if event.is_propagation_stopped() {
                break;
            }
            current = scope.parent();
        }
        event.set_current(None);
        event
    }

    /// Send an event to this scope and every live descendant
    pub fn broadcast(&self, name: &str, args: &[Value]) -> ScopeEvent {
        let event = ScopeEvent::new(name, self.clone());
        self.every_scope(&mut |scope| {
            event.set_current(Some(scope.clone()));
            scope.notify(&event, args);
            true
        });
        event.set_current(None);
        event
    }

    fn notify(&self, event: &ScopeEvent, args: &[Value]) {
        let listeners = self
            .tree
            .borrow()
            .record(self.id)
            .and_then(|scope| scope.listeners.get(event.name()).cloned())
            .unwrap_or_default();

        for listener in listeners {
            if listener.removed.get() {
                continue;
            }
            if let Err(e) = (listener.callback)(event, args) {
                tracing::error!("'{}' listener on scope {:?} failed: {:#}", event.name(), self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventLoop;

    fn recorder(
        log: &Rc<RefCell<Vec<String>>>,
        label: &str,
    ) -> impl Fn(&ScopeEvent, &[Value]) -> anyhow::Result<()> + 'static {
        let log = log.clone();
        let label = label.to_string();
        move |_: &ScopeEvent, _: &[Value]| {
            log.borrow_mut().push(label.clone());
            Ok(())
        }
    }

    #[test]
    fn test_emit_walks_up() {
        let root = Scope::new_root(EventLoop::new());
        let child = root.new_child();
        let grandchild = child.new_child();
        let log = Rc::new(RefCell::new(Vec::new()));
        root.on("ping", recorder(&log, "root"));
        child.on("ping", recorder(&log, "child"));
        grandchild.on("ping", recorder(&log, "grandchild"));

        let event = grandchild.emit("ping", &[]);
        assert_eq!(*log.borrow(), vec!["grandchild", "child", "root"]);
        assert_eq!(event.target_scope(), &grandchild);
        assert!(event.current_scope().is_none());
    }

    #[test]
    fn test_emit_stops_propagation() {
        let root = Scope::new_root(EventLoop::new());
        let child = root.new_child();
        let log = Rc::new(RefCell::new(Vec::new()));
        root.on("ping", recorder(&log, "root"));
        child.on("ping", |event, _| {
            event.stop_propagation();
            Ok(())
        });
        child.on("ping", recorder(&log, "child"));

        child.emit("ping", &[]);
        assert_eq!(*log.borrow(), vec!["child"]);
    }

    #[test]
    fn test_broadcast_reaches_isolated() {
        let root = Scope::new_root(EventLoop::new());
        let child = root.new_child();
        let isolated = child.new_isolated();
        let log = Rc::new(RefCell::new(Vec::new()));
        root.on("ping", |event, _| {
            event.stop_propagation();
            Ok(())
        });
        child.on("ping", recorder(&log, "child"));
        isolated.on("ping", recorder(&log, "isolated"));

        root.broadcast("ping", &[]);
        assert_eq!(*log.borrow(), vec!["child", "isolated"]);
    }

    #[test]
    fn test_listener_args_and_current_scope() {
        let root = Scope::new_root(EventLoop::new());
        let child = root.new_child();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        root.on("data", move |event, args| {
            let current = event.current_scope().map(|s| s.id());
            log.borrow_mut().push((current, args.to_vec()));
            event.prevent_default();
            Ok(())
        });

        let event = child.emit("data", &[Value::from(1), Value::from("two")]);
        assert!(event.default_prevented());
        assert_eq!(*seen.borrow(), vec![(Some(root.id()), vec![Value::from(1), Value::from("two")])]);
    }

    #[test]
    fn test_deregister_during_dispatch() {
        let root = Scope::new_root(EventLoop::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let later: Rc<RefCell<Option<Deregistration>>> = Rc::new(RefCell::new(None));
        let handle = later.clone();
        root.on("ping", move |_, _| {
            if let Some(handle) = handle.borrow().as_ref() {
                handle.destroy();
            }
            Ok(())
        });
        *later.borrow_mut() = Some(root.on("ping", recorder(&log, "removed")));

        root.emit("ping", &[]);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_failing_listener_does_not_stop_dispatch() {
        let root = Scope::new_root(EventLoop::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        root.on("ping", |_, _| Err(anyhow::anyhow!("listener failed")));
        root.on("ping", recorder(&log, "second"));

        root.broadcast("ping", &[]);
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn test_destroy_broadcasts() {
        let root = Scope::new_root(EventLoop::new());
        let child = root.new_child();
        let grandchild = child.new_child();
        let log = Rc::new(RefCell::new(Vec::new()));
        root.on("$destroy", recorder(&log, "root"));
        child.on("$destroy", recorder(&log, "child"));
        grandchild.on("$destroy", recorder(&log, "grandchild"));

        child.destroy();
        assert_eq!(*log.borrow(), vec!["child", "grandchild"]);

        child.destroy();
        assert_eq!(log.borrow().len(), 2);
    }
}
