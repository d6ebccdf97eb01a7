use std::sync::atomic::{AtomicU64, Ordering};

/// Per-client monotonic session id generator, formatted `"{prefix}-{n}"`
/// (generalizes the Python clients' `f"session_{counter}"` scheme to one
/// prefix per client — `stt`, `mt`, `tts`).
pub struct SessionIdGenerator {
    prefix: &'static str,
    counter: AtomicU64,
}

impl SessionIdGenerator {
    pub fn new(prefix: &'static str) -> Self {
        SessionIdGenerator { prefix, counter: AtomicU64::new(0) }
    }

    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let gen = SessionIdGenerator::new("mt");
        let ids: HashSet<String> = (0..1_000).map(|_| gen.next()).collect();
        assert_eq!(ids.len(), 1_000);
        assert!(ids.iter().all(|id| id.starts_with("mt-")));
    }
}
