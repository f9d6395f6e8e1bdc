//! Progress reporting seam between the procedures and their front end.

/// Progress callback for reporting procedure status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called for each unit of work (session, PAR file, CSV row...).
    fn item(&self, label: &str, current: usize, total: usize);
    /// Called once when the procedure completes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _label: &str, _current: usize, _total: usize) {}
    fn done(&self, _summary: &str) {}
}
