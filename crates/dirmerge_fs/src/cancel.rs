use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag used to stop a running merge.
///
/// Clones observe the same flag. The engine checks it once per visited entry.
#[derive(Debug, Clone, Default)]
pub struct MergeCancelToken {
    flag: Arc<AtomicBool>,
}

impl MergeCancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
