use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct Counter {
    val: AtomicUsize,
}
impl Counter {
    pub fn load(&self) -> usize {
        self.val.load(Ordering::Acquire)
    }

    pub fn store(&self, val: usize) {
        self.val.store(val, Ordering::Release);
    }

    pub fn fetch_add(&self, inc: usize) -> usize {
        self.val.fetch_add(inc, Ordering::AcqRel)
    }
}
impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.load())
    }
}

/// Progress of a sequence of engine passes: how many passes
/// started, and how far the current one is.
#[derive(Debug)]
pub struct PassCounter {
    pub passes: Counter,
    pub percent: Counter,
    pub rows: Counter,
    total: usize,
    name: &'static str,
}
impl PassCounter {
    /// `total` is the number of passes expected; 0 if
    /// unknown.
    pub fn new(name: &'static str, total: usize) -> Self {
        PassCounter {
            passes: Default::default(),
            percent: Default::default(),
            rows: Default::default(),
            total,
            name,
        }
    }

    pub fn start_pass(&self, rows: usize) {
        self.passes.fetch_add(1);
        self.rows.store(rows);
        self.percent.store(0);
    }
}
impl fmt::Display for PassCounter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: pass {}", self.name, self.passes.load())?;
        if self.total > 0 {
            write!(f, " of {}", self.total)?;
        }
        write!(
            f,
            ", {}% of {} rows.",
            self.percent.load(),
            self.rows.load()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_passes() {
        let counter = PassCounter::new("fmask", 3);
        counter.start_pass(400);
        counter.percent.store(40);
        assert_eq!(counter.to_string(), "fmask: pass 1 of 3, 40% of 400 rows.");

        let open = PassCounter::new("stats", 0);
        open.start_pass(10);
        assert_eq!(open.to_string(), "stats: pass 1, 0% of 10 rows.");
    }
}
