use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Called after an [`Enabler`] actually changes state.
pub type StateChangeNotifier = Arc<dyn Fn(bool) + Send + Sync>;

/// Atomic on/off flag shared between a component and whoever controls it.
///
/// Transitions are compare-and-swap: `enable`/`disable`/`store` return `true` only when
/// they changed the state, and only then is the notifier called.
#[derive(Default)]
pub struct Enabler {
    enabled: AtomicBool,
    notifier: Option<StateChangeNotifier>,
}

impl Enabler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: StateChangeNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enable(&self) -> bool {
        self.store(true)
    }

    pub fn disable(&self) -> bool {
        self.store(false)
    }

    pub fn store(&self, set: bool) -> bool {
        let changed = self
            .enabled
            .compare_exchange(!set, set, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if changed && let Some(notify) = &self.notifier {
            notify(set);
        }
        changed
    }
}

impl std::fmt::Debug for Enabler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enabler")
            .field("enabled", &self.enabled())
            .finish_non_exhaustive()
    }
}
